//! Transport capability: the seam between the connection supervisor and
//! whatever speaks the messaging network's wire protocol.
//!
//! A [`Transport`] opens one socket per call to [`Transport::connect`] and
//! hands back a [`Connection`] handle for outbound operations plus an
//! [`EventStream`] of lifecycle, credential and message events. The stream
//! ends when the socket is gone.

pub mod error;

use std::sync::Arc;

use {async_trait::async_trait, tokio::sync::mpsc};

pub use {
    airbot_protocol::{
        ConnectionPhase, ConnectionUpdate, DisconnectReason, MediaRef, MessagesUpsert,
        OutboundContent, RawMessage, SendOptions, SessionState, SessionUpdate,
    },
    error::{Error, Result},
};

// ── Events ───────────────────────────────────────────────────────────────────

/// Everything a live socket reports back.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// Lifecycle change (`connecting`, `open`, `close`), QR payloads.
    Connection(ConnectionUpdate),
    /// Credential rotation that must be persisted.
    Credentials(SessionUpdate),
    /// Batch of inbound chat events.
    Messages(MessagesUpsert),
}

/// Receiving half of a socket's event feed.
pub type EventStream = mpsc::UnboundedReceiver<TransportEvent>;

/// Sending half, held by transport implementations.
pub type EventSink = mpsc::UnboundedSender<TransportEvent>;

/// Create a linked sink/stream pair.
#[must_use]
pub fn event_channel() -> (EventSink, EventStream) {
    mpsc::unbounded_channel()
}

// ── Capabilities ─────────────────────────────────────────────────────────────

/// Opens connections to the messaging network.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open a socket authenticated with `session`.
    async fn connect(&self, session: SessionState) -> Result<(Arc<dyn Connection>, EventStream)>;
}

/// Handle to one live socket.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Our own JID once the socket is open, possibly device-scoped.
    fn user_id(&self) -> Option<String>;

    /// Whether the session behind this socket has completed pairing.
    fn is_registered(&self) -> bool;

    /// Send a message; returns the network message id when known.
    async fn send_message(
        &self,
        jid: &str,
        content: OutboundContent,
        options: SendOptions,
    ) -> Result<Option<String>>;

    /// Ask the network for an 8-character pairing code for `phone_number`
    /// (digits only).
    async fn request_pairing_code(&self, phone_number: &str) -> Result<String>;

    /// Fetch and decrypt the media behind `media`.
    async fn download_media(&self, media: &MediaRef) -> Result<Vec<u8>>;

    /// Unlink this device from the account.
    async fn logout(&self) -> Result<()>;

    /// Close the socket without touching the session.
    async fn close(&self) -> Result<()>;
}
