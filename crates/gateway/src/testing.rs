//! In-memory fakes for supervisor tests.

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
};

use {
    airbot_message::{Message, MessageHandler},
    airbot_protocol::{
        ConnectionPhase, ConnectionUpdate, MediaRef, MessagesUpsert, OutboundContent, RawMessage,
        SendOptions, SessionState, SessionUpdate,
    },
    airbot_sessions::{Error as SessionError, SessionStore},
    airbot_transport::{
        Connection, Error as TransportError, EventSink, EventStream, Result as TransportResult,
        Transport, TransportEvent, event_channel,
    },
    async_trait::async_trait,
    tokio::sync::mpsc,
};

pub type Log = Arc<Mutex<Vec<&'static str>>>;

pub fn phase(phase: ConnectionPhase) -> TransportEvent {
    TransportEvent::Connection(ConnectionUpdate {
        connection: Some(phase),
        ..Default::default()
    })
}

pub fn close(status: Option<u16>) -> TransportEvent {
    TransportEvent::Connection(ConnectionUpdate::closed(status, "closed"))
}

pub fn messages(events: serde_json::Value) -> TransportEvent {
    TransportEvent::Messages(MessagesUpsert {
        messages: serde_json::from_value(events).unwrap(),
        kind: Some("notify".into()),
    })
}

pub struct FakeConnection {
    pub sent: mpsc::UnboundedSender<(String, OutboundContent)>,
    pub pairing: mpsc::UnboundedSender<String>,
    pub log: Log,
}

#[async_trait]
impl Connection for FakeConnection {
    fn user_id(&self) -> Option<String> {
        Some("6289999:4@s.whatsapp.net".into())
    }

    fn is_registered(&self) -> bool {
        false
    }

    async fn send_message(
        &self,
        jid: &str,
        content: OutboundContent,
        _options: SendOptions,
    ) -> TransportResult<Option<String>> {
        let _ = self.sent.send((jid.to_string(), content));
        Ok(None)
    }

    async fn request_pairing_code(&self, phone_number: &str) -> TransportResult<String> {
        let _ = self.pairing.send(phone_number.to_string());
        Ok("ABCD1234".into())
    }

    async fn download_media(&self, _media: &MediaRef) -> TransportResult<Vec<u8>> {
        Err(TransportError::unavailable("no media"))
    }

    async fn logout(&self) -> TransportResult<()> {
        Ok(())
    }

    async fn close(&self) -> TransportResult<()> {
        self.log.lock().unwrap().push("close");
        Ok(())
    }
}

/// One connection's worth of events.
pub struct Script {
    pub events: Vec<TransportEvent>,
    /// Keep the stream open after the events instead of ending it.
    pub keep_open: bool,
}

impl Script {
    pub fn ending(events: Vec<TransportEvent>) -> Self {
        Self {
            events,
            keep_open: false,
        }
    }

    pub fn open(events: Vec<TransportEvent>) -> Self {
        Self {
            events,
            keep_open: true,
        }
    }
}

pub struct ScriptedTransport {
    scripts: Mutex<VecDeque<Script>>,
    conn: Arc<FakeConnection>,
    live: Mutex<Vec<EventSink>>,
    log: Log,
}

pub struct Outputs {
    pub sent: mpsc::UnboundedReceiver<(String, OutboundContent)>,
    pub pairing: mpsc::UnboundedReceiver<String>,
}

impl ScriptedTransport {
    pub fn new(scripts: Vec<Script>, log: Log) -> (Self, Outputs) {
        let (sent_tx, sent) = mpsc::unbounded_channel();
        let (pairing_tx, pairing) = mpsc::unbounded_channel();
        let transport = Self {
            scripts: Mutex::new(scripts.into()),
            conn: Arc::new(FakeConnection {
                sent: sent_tx,
                pairing: pairing_tx,
                log: Arc::clone(&log),
            }),
            live: Mutex::new(Vec::new()),
            log,
        };
        (transport, Outputs { sent, pairing })
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn connect(
        &self,
        _session: SessionState,
    ) -> TransportResult<(Arc<dyn Connection>, EventStream)> {
        self.log.lock().unwrap().push("connect");
        let Some(script) = self.scripts.lock().unwrap().pop_front() else {
            return Err(TransportError::unavailable("script exhausted"));
        };
        let (sink, stream) = event_channel();
        for event in script.events {
            sink.send(event).unwrap();
        }
        if script.keep_open {
            self.live.lock().unwrap().push(sink);
        }
        let conn: Arc<dyn Connection> = self.conn.clone();
        Ok((conn, stream))
    }
}

#[derive(Default)]
pub struct RecordingStore {
    pub state: SessionState,
    pub saved: Mutex<Vec<SessionUpdate>>,
    pub fail_saves: bool,
    pub log: Log,
}

#[async_trait]
impl SessionStore for RecordingStore {
    async fn load(&self) -> airbot_sessions::Result<SessionState> {
        Ok(self.state.clone())
    }

    async fn save(&self, update: &SessionUpdate) -> airbot_sessions::Result<()> {
        if self.fail_saves {
            return Err(SessionError::message("disk full"));
        }
        self.saved.lock().unwrap().push(update.clone());
        Ok(())
    }

    async fn delete(&self) -> airbot_sessions::Result<()> {
        self.log.lock().unwrap().push("delete");
        Ok(())
    }
}

/// Forwards every message to a channel; panics on a `.boom` body.
pub struct ChannelHandler {
    pub tx: mpsc::UnboundedSender<Message>,
}

impl ChannelHandler {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Message>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl MessageHandler for ChannelHandler {
    async fn handle(
        &self,
        _conn: Arc<dyn Connection>,
        message: Message,
        _raw: Arc<RawMessage>,
    ) -> anyhow::Result<()> {
        if message.content.body == ".boom" {
            panic!("boom");
        }
        if message.content.body == ".fail" {
            anyhow::bail!("handler failed");
        }
        let _ = self.tx.send(message);
        Ok(())
    }
}
