//! WebSocket client for the Baileys sidecar.
//!
//! One WebSocket carries one network socket: the `connect` frame opens it,
//! and the WebSocket closing ends it. Command results are correlated to
//! their requests by a UUID `request_id`.

use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex, PoisonError,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use {
    airbot_protocol::{
        ConnectionPhase, ConnectionUpdate, GatewayFrame, MediaRef, OutboundContent, SendOptions,
        SidecarFrame,
    },
    airbot_transport::{Connection, EventSink, TransportEvent},
    async_trait::async_trait,
    futures::{SinkExt, StreamExt},
    tokio::{
        net::TcpStream,
        sync::{mpsc, oneshot},
    },
    tokio_tungstenite::{
        MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message as WsMessage,
    },
    tokio_util::sync::CancellationToken,
    tracing::{debug, info, warn},
};

use crate::error::{Error, Result};

pub const DEFAULT_SIDECAR_PORT: u16 = 9277;

const RETRY_DELAY: Duration = Duration::from_millis(500);

type Pending = HashMap<String, oneshot::Sender<SidecarFrame>>;

/// Open a WebSocket to the sidecar, retrying while it starts up.
pub async fn connect_with_retry(
    url: &str,
    max_attempts: u32,
) -> Result<WebSocketStream<MaybeTlsStream<TcpStream>>> {
    let attempts = max_attempts.max(1);
    let mut last_err = None;
    for attempt in 1..=attempts {
        match connect_async(url).await {
            Ok((ws, _response)) => {
                debug!(url, attempt, "connected to whatsapp sidecar");
                return Ok(ws);
            },
            Err(e) => {
                debug!(url, attempt, error = %e, "whatsapp sidecar not reachable yet");
                last_err = Some(e);
                if attempt < attempts {
                    tokio::time::sleep(RETRY_DELAY).await;
                }
            },
        }
    }
    if let Some(e) = last_err {
        warn!(url, error = %e, "giving up on whatsapp sidecar");
    }
    let port = url
        .rsplit(':')
        .next()
        .and_then(|p| p.parse().ok())
        .unwrap_or(DEFAULT_SIDECAR_PORT);
    Err(Error::Unreachable { port, attempts })
}

/// State shared between the connection handle and its I/O task.
struct Shared {
    pending: Mutex<Pending>,
    user_id: Mutex<Option<String>>,
    registered: AtomicBool,
    closed: AtomicBool,
}

impl Shared {
    fn take_pending(&self, request_id: &str) -> Option<oneshot::Sender<SidecarFrame>> {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(request_id)
    }

    /// Route one inbound frame. Returns `true` for a close update.
    fn route(&self, frame: SidecarFrame, events: &EventSink) -> bool {
        if let Some(request_id) = frame.request_id().map(str::to_string) {
            match self.take_pending(&request_id) {
                Some(tx) => {
                    let _ = tx.send(frame);
                },
                None => debug!(request_id = %request_id, "dropping late sidecar response"),
            }
            return false;
        }

        let event = match frame {
            SidecarFrame::ConnectionUpdate(update) => {
                if let Some(user_id) = &update.user_id {
                    *self.user_id.lock().unwrap_or_else(PoisonError::into_inner) =
                        Some(user_id.clone());
                }
                TransportEvent::Connection(update)
            },
            SidecarFrame::CredsUpdate(update) => {
                if let Some(registered) = update
                    .creds
                    .as_ref()
                    .and_then(|c| c.get("registered"))
                    .and_then(serde_json::Value::as_bool)
                {
                    self.registered.store(registered, Ordering::Relaxed);
                }
                TransportEvent::Credentials(update)
            },
            SidecarFrame::MessagesUpsert(upsert) => TransportEvent::Messages(upsert),
            SidecarFrame::Error { error } => {
                warn!(error = %error, "whatsapp sidecar reported an error");
                return false;
            },
            other => {
                debug!(?other, "unexpected sidecar frame");
                return false;
            },
        };
        let is_close = matches!(
            &event,
            TransportEvent::Connection(ConnectionUpdate {
                connection: Some(ConnectionPhase::Close),
                ..
            })
        );
        let _ = events.send(event);
        is_close
    }

    fn mark_closed(&self) {
        self.closed.store(true, Ordering::Relaxed);
        // Dropping the senders wakes every waiter with `Closed`.
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

/// Live network socket behind the sidecar.
pub struct SidecarConnection {
    write_tx: mpsc::UnboundedSender<String>,
    shared: Arc<Shared>,
    cancel: CancellationToken,
    request_timeout: Duration,
}

impl SidecarConnection {
    /// Take over an open WebSocket. Events are forwarded to `events` until
    /// the WebSocket closes.
    pub fn spawn(
        ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
        registered: bool,
        request_timeout: Duration,
        events: EventSink,
    ) -> Self {
        let (write_tx, write_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            pending: Mutex::new(HashMap::new()),
            user_id: Mutex::new(None),
            registered: AtomicBool::new(registered),
            closed: AtomicBool::new(false),
        });
        let cancel = CancellationToken::new();
        tokio::spawn(run_socket(
            ws,
            write_rx,
            Arc::clone(&shared),
            events,
            cancel.clone(),
        ));
        Self {
            write_tx,
            shared,
            cancel,
            request_timeout,
        }
    }

    /// Queue a frame for the sidecar.
    pub fn send_frame(&self, frame: &GatewayFrame) -> Result<()> {
        if self.shared.closed.load(Ordering::Relaxed) {
            return Err(Error::Closed);
        }
        let text = serde_json::to_string(frame)?;
        self.write_tx.send(text).map_err(|_| Error::Closed)
    }

    async fn request(
        &self,
        operation: &'static str,
        build: impl FnOnce(String) -> GatewayFrame,
    ) -> Result<SidecarFrame> {
        let request_id = uuid::Uuid::new_v4().to_string();
        let (tx, rx) = oneshot::channel();
        self.shared
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(request_id.clone(), tx);

        if let Err(e) = self.send_frame(&build(request_id.clone())) {
            self.shared.take_pending(&request_id);
            return Err(e);
        }

        match tokio::time::timeout(self.request_timeout, rx).await {
            Ok(Ok(frame)) => Ok(frame),
            Ok(Err(_)) => Err(Error::Closed),
            Err(_) => {
                self.shared.take_pending(&request_id);
                Err(Error::Timeout {
                    operation,
                    timeout: self.request_timeout,
                })
            },
        }
    }
}

#[async_trait]
impl Connection for SidecarConnection {
    fn user_id(&self) -> Option<String> {
        self.shared
            .user_id
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn is_registered(&self) -> bool {
        self.shared.registered.load(Ordering::Relaxed)
    }

    async fn send_message(
        &self,
        jid: &str,
        content: OutboundContent,
        options: SendOptions,
    ) -> airbot_transport::Result<Option<String>> {
        let jid = jid.to_string();
        let frame = self
            .request("send_message", |request_id| GatewayFrame::SendMessage {
                request_id,
                jid,
                content,
                options,
            })
            .await?;
        match frame {
            SidecarFrame::SendResult {
                success: true,
                message_id,
                ..
            } => Ok(message_id),
            SidecarFrame::SendResult { error, .. } => Err(Error::sidecar(
                error.unwrap_or_else(|| "send failed".into()),
            )
            .into()),
            other => Err(unexpected("send_message", &other)),
        }
    }

    async fn request_pairing_code(&self, phone_number: &str) -> airbot_transport::Result<String> {
        let phone_number = phone_number.to_string();
        let frame = self
            .request("request_pairing_code", |request_id| {
                GatewayFrame::RequestPairingCode {
                    request_id,
                    phone_number,
                }
            })
            .await?;
        match frame {
            SidecarFrame::PairingCode {
                code: Some(code), ..
            } => Ok(code),
            SidecarFrame::PairingCode { error, .. } => Err(Error::sidecar(
                error.unwrap_or_else(|| "no pairing code returned".into()),
            )
            .into()),
            other => Err(unexpected("request_pairing_code", &other)),
        }
    }

    async fn download_media(&self, media: &MediaRef) -> airbot_transport::Result<Vec<u8>> {
        let media = media.clone();
        let frame = self
            .request("download_media", |request_id| GatewayFrame::DownloadMedia {
                request_id,
                media,
            })
            .await?;
        match frame {
            SidecarFrame::MediaDownloaded {
                data: Some(data), ..
            } => Ok(data),
            SidecarFrame::MediaDownloaded { error, .. } => Err(Error::sidecar(
                error.unwrap_or_else(|| "media download failed".into()),
            )
            .into()),
            other => Err(unexpected("download_media", &other)),
        }
    }

    async fn logout(&self) -> airbot_transport::Result<()> {
        let frame = self
            .request("logout", |request_id| GatewayFrame::Logout { request_id })
            .await?;
        match frame {
            SidecarFrame::LogoutResult { success: true, .. } => Ok(()),
            SidecarFrame::LogoutResult { error, .. } => Err(Error::sidecar(
                error.unwrap_or_else(|| "logout failed".into()),
            )
            .into()),
            other => Err(unexpected("logout", &other)),
        }
    }

    async fn close(&self) -> airbot_transport::Result<()> {
        // Already gone is fine.
        let _ = self.send_frame(&GatewayFrame::Close);
        self.cancel.cancel();
        Ok(())
    }
}

impl Drop for SidecarConnection {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

fn unexpected(operation: &str, frame: &SidecarFrame) -> airbot_transport::Error {
    airbot_transport::Error::rejected(format!("unexpected {operation} response: {frame:?}"))
}

async fn run_socket(
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
    mut write_rx: mpsc::UnboundedReceiver<String>,
    shared: Arc<Shared>,
    events: EventSink,
    cancel: CancellationToken,
) {
    let (mut sink, mut reader) = ws.split();
    let mut saw_close = false;

    loop {
        tokio::select! {
            biased;

            out = write_rx.recv() => match out {
                Some(text) => {
                    if let Err(e) = sink.send(WsMessage::Text(text.into())).await {
                        warn!(error = %e, "failed to write to whatsapp sidecar");
                        break;
                    }
                },
                None => break,
            },
            msg = reader.next() => match msg {
                Some(Ok(WsMessage::Text(text))) => {
                    match serde_json::from_str::<SidecarFrame>(&text) {
                        Ok(frame) => saw_close |= shared.route(frame, &events),
                        Err(e) => warn!(error = %e, "invalid frame from whatsapp sidecar"),
                    }
                },
                Some(Ok(WsMessage::Ping(data))) => {
                    if sink.send(WsMessage::Pong(data)).await.is_err() {
                        break;
                    }
                },
                Some(Ok(WsMessage::Close(_))) | None => {
                    debug!("whatsapp sidecar closed the websocket");
                    break;
                },
                Some(Ok(_)) => {},
                Some(Err(e)) => {
                    warn!(error = %e, "whatsapp sidecar websocket error");
                    break;
                },
            },
            () = cancel.cancelled() => {
                let _ = sink.close().await;
                break;
            },
        }
    }

    shared.mark_closed();
    if !saw_close && !cancel.is_cancelled() {
        info!("whatsapp sidecar connection lost");
        let _ = events.send(TransportEvent::Connection(ConnectionUpdate::closed(
            None,
            "sidecar connection lost",
        )));
    }
}
