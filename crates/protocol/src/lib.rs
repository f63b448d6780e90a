//! Wire types shared between airbot and the WhatsApp Baileys sidecar.
//!
//! All communication uses JSON text frames over a local WebSocket, tagged
//! by `type`:
//! - [`GatewayFrame`]: airbot → sidecar commands
//! - [`SidecarFrame`]: sidecar → airbot events and command results
//!
//! Inbound chat events are carried as [`RawMessage`], which mirrors the
//! Baileys `WebMessageInfo` JSON shape. The `message` content tree is kept
//! as an opaque JSON value; interpreting it is the normalizer's job.

pub mod jid;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

// ── Constants ────────────────────────────────────────────────────────────────

pub const PROTOCOL_VERSION: u32 = 1;

/// Browser triple announced to the network on connect.
pub const BROWSER: [&str; 3] = ["AirBot", "Chrome", "20.0.04"];

// ── Disconnect reasons ───────────────────────────────────────────────────────

/// Why the network closed the socket, keyed by the close status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    ConnectionClosed,
    /// Also used by the network for timeouts.
    ConnectionLost,
    ConnectionReplaced,
    LoggedOut,
    BadSession,
    RestartRequired,
    MultideviceMismatch,
    Forbidden,
    UnavailableService,
    Unknown(Option<u16>),
}

impl DisconnectReason {
    #[must_use]
    pub fn from_status_code(code: Option<u16>) -> Self {
        match code {
            Some(428) => Self::ConnectionClosed,
            Some(408) => Self::ConnectionLost,
            Some(440) => Self::ConnectionReplaced,
            Some(401) => Self::LoggedOut,
            Some(500) => Self::BadSession,
            Some(515) => Self::RestartRequired,
            Some(411) => Self::MultideviceMismatch,
            Some(403) => Self::Forbidden,
            Some(503) => Self::UnavailableService,
            other => Self::Unknown(other),
        }
    }

    #[must_use]
    pub fn status_code(self) -> Option<u16> {
        match self {
            Self::ConnectionClosed => Some(428),
            Self::ConnectionLost => Some(408),
            Self::ConnectionReplaced => Some(440),
            Self::LoggedOut => Some(401),
            Self::BadSession => Some(500),
            Self::RestartRequired => Some(515),
            Self::MultideviceMismatch => Some(411),
            Self::Forbidden => Some(403),
            Self::UnavailableService => Some(503),
            Self::Unknown(code) => code,
        }
    }
}

impl std::fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ConnectionClosed => write!(f, "connection closed"),
            Self::ConnectionLost => write!(f, "connection lost"),
            Self::ConnectionReplaced => write!(f, "connection replaced"),
            Self::LoggedOut => write!(f, "logged out"),
            Self::BadSession => write!(f, "bad session"),
            Self::RestartRequired => write!(f, "restart required"),
            Self::MultideviceMismatch => write!(f, "multi-device mismatch"),
            Self::Forbidden => write!(f, "forbidden"),
            Self::UnavailableService => write!(f, "service unavailable"),
            Self::Unknown(Some(code)) => write!(f, "unknown ({code})"),
            Self::Unknown(None) => write!(f, "unknown"),
        }
    }
}

// ── Inbound events ───────────────────────────────────────────────────────────

/// Addressing metadata of a raw message.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageKey {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_jid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_me: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Sender inside a group chat.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub participant: Option<String>,
}

/// One inbound chat event as decoded by the transport.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<MessageKey>,
    /// Content tree (`conversation`, `imageMessage`, `extendedTextMessage`, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub push_name: Option<String>,
    /// Seconds since epoch; a number, a numeric string or a `{low, high}` long.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_timestamp: Option<serde_json::Value>,
}

impl RawMessage {
    #[must_use]
    pub fn remote_jid(&self) -> Option<&str> {
        self.key.as_ref().and_then(|k| k.remote_jid.as_deref())
    }

    #[must_use]
    pub fn timestamp(&self) -> Option<u64> {
        match self.message_timestamp.as_ref()? {
            serde_json::Value::Number(n) => n.as_u64(),
            serde_json::Value::String(s) => s.parse().ok(),
            serde_json::Value::Object(long) => {
                let low = long.get("low")?.as_i64()? as u32;
                let high = long.get("high").and_then(|h| h.as_i64()).unwrap_or(0) as u32;
                Some((u64::from(high) << 32) | u64::from(low))
            },
            _ => None,
        }
    }
}

/// A batch of inbound messages.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessagesUpsert {
    #[serde(default)]
    pub messages: Vec<RawMessage>,
    /// `notify` for live messages, `append` for history sync.
    #[serde(default, rename = "kind", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

/// Phase reported by a connection update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionPhase {
    Connecting,
    Open,
    Close,
}

/// Lifecycle notification from the transport.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConnectionUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection: Option<ConnectionPhase>,
    /// Close status code of the last disconnect.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// QR payload to render while waiting for a scan.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qr: Option<String>,
    /// Our own JID once the connection is open.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

impl ConnectionUpdate {
    #[must_use]
    pub fn closed(status_code: Option<u16>, error: impl Into<String>) -> Self {
        Self {
            connection: Some(ConnectionPhase::Close),
            status_code,
            error: Some(error.into()),
            ..Default::default()
        }
    }

    #[must_use]
    pub fn disconnect_reason(&self) -> DisconnectReason {
        DisconnectReason::from_status_code(self.status_code)
    }
}

// ── Session state ────────────────────────────────────────────────────────────

/// Persisted authentication state: credentials plus signal keys.
///
/// Both trees are opaque to airbot; only `registered` and `me.id` are read.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    #[serde(default)]
    pub creds: serde_json::Value,
    /// Signal keys by `<type>-<id>`.
    #[serde(default)]
    pub keys: BTreeMap<String, serde_json::Value>,
}

impl SessionState {
    /// Whether the device finished pairing.
    #[must_use]
    pub fn is_registered(&self) -> bool {
        self.creds
            .get("registered")
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(false)
    }

    /// Our own JID as stored in the credentials.
    #[must_use]
    pub fn me_id(&self) -> Option<&str> {
        self.creds.get("me")?.get("id")?.as_str()
    }

    /// Apply a credential rotation in place.
    pub fn apply(&mut self, update: &SessionUpdate) {
        if let Some(creds) = &update.creds {
            self.creds = creds.clone();
        }
        for (name, value) in &update.keys {
            match value {
                Some(value) => {
                    self.keys.insert(name.clone(), value.clone());
                },
                None => {
                    self.keys.remove(name);
                },
            }
        }
    }
}

/// Credential rotation: full replacement creds plus key upserts (`Some`) and
/// deletions (`None`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creds: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub keys: BTreeMap<String, Option<serde_json::Value>>,
}

impl SessionUpdate {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.creds.is_none() && self.keys.is_empty()
    }
}

// ── Outbound ─────────────────────────────────────────────────────────────────

/// Content of an outbound message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OutboundContent {
    Text {
        text: String,
    },
    Image {
        #[serde(with = "b64")]
        data: Vec<u8>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        caption: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        mimetype: Option<String>,
    },
    Document {
        #[serde(with = "b64")]
        data: Vec<u8>,
        file_name: String,
        mimetype: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        caption: Option<String>,
    },
}

impl OutboundContent {
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }
}

/// Delivery options for an outbound message.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SendOptions {
    /// Message to quote (reply to).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quoted: Option<RawMessage>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mentions: Vec<String>,
}

impl SendOptions {
    #[must_use]
    pub fn quoting(message: RawMessage) -> Self {
        Self {
            quoted: Some(message),
            ..Default::default()
        }
    }
}

/// Handle to downloadable media inside a received message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaRef {
    /// `image`, `video`, `audio`, `document` or `sticker`.
    pub media_type: String,
    /// The media content node (`url`, `mediaKey`, `directPath`, ...).
    pub node: serde_json::Value,
}

// ── Frames ───────────────────────────────────────────────────────────────────

/// airbot → sidecar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GatewayFrame {
    /// Open a network socket with the given auth state.
    Connect {
        protocol_version: u32,
        session: SessionState,
        browser: Vec<String>,
        print_qr: bool,
    },
    SendMessage {
        request_id: String,
        jid: String,
        content: OutboundContent,
        #[serde(default)]
        options: SendOptions,
    },
    RequestPairingCode {
        request_id: String,
        phone_number: String,
    },
    DownloadMedia {
        request_id: String,
        media: MediaRef,
    },
    Logout {
        request_id: String,
    },
    /// Close the network socket without logging out.
    Close,
}

/// sidecar → airbot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SidecarFrame {
    ConnectionUpdate(ConnectionUpdate),
    CredsUpdate(SessionUpdate),
    MessagesUpsert(MessagesUpsert),
    SendResult {
        request_id: String,
        success: bool,
        #[serde(default)]
        message_id: Option<String>,
        #[serde(default)]
        error: Option<String>,
    },
    PairingCode {
        request_id: String,
        #[serde(default)]
        code: Option<String>,
        #[serde(default)]
        error: Option<String>,
    },
    MediaDownloaded {
        request_id: String,
        #[serde(default, with = "b64::option")]
        data: Option<Vec<u8>>,
        #[serde(default)]
        error: Option<String>,
    },
    LogoutResult {
        request_id: String,
        success: bool,
        #[serde(default)]
        error: Option<String>,
    },
    Error {
        error: String,
    },
}

impl SidecarFrame {
    /// Correlation id for command results; `None` for unsolicited events.
    #[must_use]
    pub fn request_id(&self) -> Option<&str> {
        match self {
            Self::SendResult { request_id, .. }
            | Self::PairingCode { request_id, .. }
            | Self::MediaDownloaded { request_id, .. }
            | Self::LogoutResult { request_id, .. } => Some(request_id),
            Self::ConnectionUpdate(_)
            | Self::CredsUpdate(_)
            | Self::MessagesUpsert(_)
            | Self::Error { .. } => None,
        }
    }
}

mod b64 {
    use {
        base64::{Engine, engine::general_purpose::STANDARD},
        serde::{Deserialize, Deserializer, Serializer},
    };

    pub fn serialize<S: Serializer>(data: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(data))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }

    pub mod option {
        use super::*;

        pub fn serialize<S: Serializer>(
            data: &Option<Vec<u8>>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match data {
                Some(bytes) => serializer.serialize_some(&STANDARD.encode(bytes)),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<Vec<u8>>, D::Error> {
            let encoded: Option<String> = Option::deserialize(deserializer)?;
            encoded
                .map(|s| STANDARD.decode(s.as_bytes()).map_err(serde::de::Error::custom))
                .transpose()
        }
    }
}
