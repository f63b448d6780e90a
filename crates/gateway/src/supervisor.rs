//! The connection supervisor.
//!
//! One loop owns one logical connection at a time: load the session, connect,
//! pump transport events until the socket closes, classify the closure, then
//! either reconnect or stop. Credential updates are persisted inline so they
//! land in arrival order; inbound messages are fanned out to their own tasks.

use std::{sync::Arc, time::Duration};

use {
    airbot_message::{MessageHandler, Normalizer},
    airbot_protocol::{ConnectionPhase, ConnectionUpdate, DisconnectReason, SessionUpdate},
    airbot_sessions::SessionStore,
    airbot_transport::{Connection, EventStream, Transport, TransportEvent},
    tokio::sync::watch,
    tokio_util::sync::CancellationToken,
    tracing::{debug, error, info, warn},
};

use crate::{
    backoff::Backoff,
    dispatch::dispatch,
    error::Result,
    notify, pairing,
    state::{ConnectionState, DisconnectCause, Shutdown},
};

pub const DEFAULT_PAIRING_DELAY: Duration = Duration::from_secs(3);

#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    pub normalizer: Normalizer,
    /// Owner numbers or LIDs; the first usable one receives the online notice.
    pub owners: Vec<String>,
    /// Pair by code instead of QR when the session is unregistered.
    pub pairing_number: Option<String>,
    pub pairing_delay: Duration,
    pub notify_owner: bool,
    pub backoff: Backoff,
}

impl SupervisorConfig {
    #[must_use]
    pub fn new(normalizer: Normalizer) -> Self {
        Self {
            normalizer,
            owners: Vec::new(),
            pairing_number: None,
            pairing_delay: DEFAULT_PAIRING_DELAY,
            notify_owner: true,
            backoff: Backoff::default(),
        }
    }
}

enum Ended {
    Stopped,
    Closed(DisconnectCause),
}

enum Outcome {
    Reconnect { opened: bool },
    Shutdown(Shutdown),
}

pub struct Supervisor {
    config: SupervisorConfig,
    transport: Arc<dyn Transport>,
    store: Arc<dyn SessionStore>,
    handler: Arc<dyn MessageHandler>,
    state: watch::Sender<ConnectionState>,
    shutdown: CancellationToken,
}

impl Supervisor {
    pub fn new(
        config: SupervisorConfig,
        transport: Arc<dyn Transport>,
        store: Arc<dyn SessionStore>,
        handler: Arc<dyn MessageHandler>,
    ) -> Self {
        let (state, _) = watch::channel(ConnectionState::Idle);
        Self {
            config,
            transport,
            store,
            handler,
            state,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Token that stops [`Supervisor::run`] when cancelled.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Keep a connection alive until logout or shutdown.
    ///
    /// Every closure other than logout leads to exactly one fresh connection
    /// attempt, delayed per the configured [`Backoff`]. A logout deletes the
    /// session before returning [`Shutdown::LoggedOut`].
    pub async fn run(&self) -> Result<Shutdown> {
        let mut attempt: u32 = 0;
        loop {
            let delay = self.config.backoff.delay(attempt);
            if !delay.is_zero() {
                info!(
                    attempt,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    "waiting before reconnect"
                );
                tokio::select! {
                    () = self.shutdown.cancelled() => return Ok(self.stopped()),
                    () = tokio::time::sleep(delay) => {},
                }
            }
            if self.shutdown.is_cancelled() {
                return Ok(self.stopped());
            }

            match self.connect_once().await? {
                Outcome::Reconnect { opened } => {
                    attempt = if opened {
                        1
                    } else {
                        attempt.saturating_add(1)
                    };
                },
                Outcome::Shutdown(shutdown) => return Ok(shutdown),
            }
        }
    }

    fn set_state(&self, next: ConnectionState) {
        let prev = self.state.send_replace(next);
        if prev != next {
            debug!(from = ?prev, to = ?next, "connection state");
        }
    }

    fn stopped(&self) -> Shutdown {
        info!("supervisor stopped");
        self.set_state(ConnectionState::Idle);
        Shutdown::Stopped
    }

    async fn connect_once(&self) -> Result<Outcome> {
        self.set_state(ConnectionState::Connecting);

        let session = match self.store.load().await {
            Ok(session) => session,
            Err(e) => {
                error!(error = %e, "failed to load session");
                return Ok(self.reconnect(DisconnectCause::Other(DisconnectReason::Unknown(None)), false));
            },
        };
        let registered = session.is_registered();
        info!(registered, "connecting to whatsapp");

        let (conn, mut events) = match self.transport.connect(session).await {
            Ok(connected) => connected,
            Err(e) => {
                warn!(error = %e, "transport connect failed");
                return Ok(self.reconnect(DisconnectCause::Other(DisconnectReason::Unknown(None)), false));
            },
        };

        let pairing_by_code = self.config.pairing_number.is_some();
        let pairing = match &self.config.pairing_number {
            Some(phone) if !registered && !conn.is_registered() => Some(pairing::schedule(
                Arc::clone(&conn),
                phone,
                self.config.pairing_delay,
            )),
            _ => None,
        };

        let mut opened = false;
        let ended = loop {
            tokio::select! {
                () = self.shutdown.cancelled() => break Ended::Stopped,
                event = events.recv() => {
                    let Some(event) = event else {
                        warn!("transport event stream ended");
                        break Ended::Closed(DisconnectCause::Other(DisconnectReason::Unknown(None)));
                    };
                    match event {
                        TransportEvent::Credentials(update) => self.save_credentials(&update).await,
                        TransportEvent::Messages(upsert) => {
                            dispatch(upsert, &self.config.normalizer, &self.handler, &conn);
                        },
                        TransportEvent::Connection(update) => {
                            if let Some(cause) = self.on_connection_update(&update, &conn, pairing_by_code) {
                                break Ended::Closed(cause);
                            }
                            if update.connection == Some(ConnectionPhase::Open) {
                                opened = true;
                            }
                        },
                    }
                },
            }
        };

        if let Some(pairing) = pairing {
            pairing.abort();
        }
        if let Err(e) = conn.close().await {
            debug!(error = %e, "closing socket failed");
        }

        match ended {
            Ended::Stopped => Ok(Outcome::Shutdown(self.stopped())),
            Ended::Closed(DisconnectCause::LoggedOut) => {
                self.set_state(ConnectionState::Closed(DisconnectCause::LoggedOut));
                warn!("logged out, deleting session");
                self.store.delete().await?;
                Ok(Outcome::Shutdown(Shutdown::LoggedOut))
            },
            Ended::Closed(cause) => {
                self.drain_credentials(&mut events).await;
                Ok(self.reconnect(cause, opened))
            },
        }
    }

    fn reconnect(&self, cause: DisconnectCause, opened: bool) -> Outcome {
        self.set_state(ConnectionState::Closed(cause));
        info!(cause = %cause, "reconnecting");
        Outcome::Reconnect { opened }
    }

    /// Returns the closure cause when the update closes the connection.
    fn on_connection_update(
        &self,
        update: &ConnectionUpdate,
        conn: &Arc<dyn Connection>,
        pairing_by_code: bool,
    ) -> Option<DisconnectCause> {
        if let Some(qr) = &update.qr
            && !pairing_by_code
        {
            info!(qr = %qr, "scan this qr code under linked devices");
        }

        match update.connection? {
            ConnectionPhase::Connecting => {
                debug!("socket connecting");
                None
            },
            ConnectionPhase::Open => {
                let user = conn.user_id().or_else(|| update.user_id.clone());
                info!(user = ?user, "connection open");
                self.set_state(ConnectionState::Open);
                if self.config.notify_owner
                    && let Some(owner) = notify::primary_owner(&self.config.owners)
                {
                    tokio::spawn(notify::notify_owner(Arc::clone(conn), owner));
                }
                None
            },
            ConnectionPhase::Close => {
                let reason = update.disconnect_reason();
                warn!(
                    reason = %reason,
                    status = ?update.status_code,
                    error = ?update.error,
                    "connection closed"
                );
                Some(DisconnectCause::from_reason(reason))
            },
        }
    }

    async fn save_credentials(&self, update: &SessionUpdate) {
        if update.is_empty() {
            return;
        }
        if let Err(e) = self.store.save(update).await {
            error!(error = %e, "failed to persist credentials");
        }
    }

    /// Persist credential updates still queued behind a close.
    async fn drain_credentials(&self, events: &mut EventStream) {
        while let Ok(event) = events.try_recv() {
            if let TransportEvent::Credentials(update) = event {
                self.save_credentials(&update).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::testing::*,
        airbot_message::{DEFAULT_FALLBACK_PREFIX, DEFAULT_PREFIX_PATTERN, PrefixMatcher},
        airbot_protocol::{OutboundContent, SessionState},
        serde_json::json,
    };

    const WAIT: Duration = Duration::from_secs(5);

    fn config() -> SupervisorConfig {
        let prefix = PrefixMatcher::new(DEFAULT_PREFIX_PATTERN, DEFAULT_FALLBACK_PREFIX).unwrap();
        SupervisorConfig {
            pairing_delay: Duration::ZERO,
            backoff: Backoff::none(),
            ..SupervisorConfig::new(Normalizer::new(prefix))
        }
    }

    struct Harness {
        supervisor: Arc<Supervisor>,
        store: Arc<RecordingStore>,
        outputs: Outputs,
        messages: tokio::sync::mpsc::UnboundedReceiver<airbot_message::Message>,
        log: Log,
    }

    fn harness(config: SupervisorConfig, scripts: Vec<Script>, store: RecordingStore) -> Harness {
        let log = Arc::clone(&store.log);
        let (transport, outputs) = ScriptedTransport::new(scripts, Arc::clone(&log));
        let (handler, messages) = ChannelHandler::new();
        let store = Arc::new(store);
        let supervisor = Arc::new(Supervisor::new(
            config,
            Arc::new(transport),
            Arc::clone(&store) as Arc<dyn SessionStore>,
            Arc::new(handler),
        ));
        Harness {
            supervisor,
            store,
            outputs,
            messages,
            log,
        }
    }

    fn logged(log: &Log) -> Vec<&'static str> {
        log.lock().unwrap().clone()
    }

    fn registered() -> RecordingStore {
        RecordingStore {
            state: SessionState {
                creds: json!({"registered": true, "me": {"id": "6289999:4@s.whatsapp.net"}}),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn logout_deletes_session_and_stops() {
        let h = harness(
            config(),
            vec![Script::ending(vec![
                phase(ConnectionPhase::Connecting),
                phase(ConnectionPhase::Open),
                close(Some(401)),
            ])],
            registered(),
        );
        let shutdown = h.supervisor.run().await.unwrap();
        assert_eq!(shutdown, Shutdown::LoggedOut);
        assert_eq!(logged(&h.log), ["connect", "close", "delete"]);
        assert_eq!(
            h.supervisor.state(),
            ConnectionState::Closed(DisconnectCause::LoggedOut)
        );
    }

    #[tokio::test]
    async fn bad_session_reconnects_without_deleting() {
        let h = harness(
            config(),
            vec![
                Script::ending(vec![close(Some(500))]),
                Script::ending(vec![close(Some(401))]),
            ],
            registered(),
        );
        assert_eq!(h.supervisor.run().await.unwrap(), Shutdown::LoggedOut);
        assert_eq!(logged(&h.log), [
            "connect", "close", "connect", "close", "delete"
        ]);
    }

    #[tokio::test]
    async fn every_other_closure_reconnects_once() {
        let h = harness(
            config(),
            vec![
                Script::ending(vec![close(Some(408))]),
                Script::ending(vec![phase(ConnectionPhase::Open), close(Some(515))]),
                // Stream ends without a close update.
                Script::ending(vec![]),
                Script::ending(vec![close(None)]),
                Script::ending(vec![close(Some(401))]),
            ],
            registered(),
        );
        assert_eq!(h.supervisor.run().await.unwrap(), Shutdown::LoggedOut);
        let log = logged(&h.log);
        assert_eq!(log.iter().filter(|e| **e == "connect").count(), 5);
        assert_eq!(log.iter().filter(|e| **e == "delete").count(), 1);
        assert_eq!(log.last(), Some(&"delete"));
    }

    #[tokio::test]
    async fn failed_connect_is_retried() {
        // First connect fails because the script is empty.
        let log: Log = Arc::default();
        let (transport, _outputs) = ScriptedTransport::new(vec![], Arc::clone(&log));
        let (handler, _messages) = ChannelHandler::new();
        let supervisor = Arc::new(Supervisor::new(
            SupervisorConfig {
                backoff: Backoff {
                    base: Duration::from_secs(3600),
                    max: Duration::from_secs(3600),
                    immediate_first: true,
                },
                ..config()
            },
            Arc::new(transport),
            Arc::new(registered()),
            Arc::new(handler),
        ));
        let token = supervisor.shutdown_token();
        let run = tokio::spawn({
            let supervisor = Arc::clone(&supervisor);
            async move { supervisor.run().await }
        });

        // Two immediate attempts, then the long backoff.
        tokio::time::timeout(WAIT, async {
            while log.lock().unwrap().len() < 2 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
        token.cancel();
        let shutdown = tokio::time::timeout(WAIT, run).await.unwrap().unwrap();
        assert_eq!(shutdown.unwrap(), Shutdown::Stopped);
        assert_eq!(logged(&log), ["connect", "connect"]);
        assert_eq!(supervisor.state(), ConnectionState::Idle);
    }

    #[tokio::test]
    async fn credentials_are_saved_in_order() {
        let first = SessionUpdate {
            creds: Some(json!({"registered": false})),
            ..Default::default()
        };
        let second = SessionUpdate {
            creds: Some(json!({"registered": true})),
            ..Default::default()
        };
        let h = harness(
            config(),
            vec![Script::ending(vec![
                TransportEvent::Credentials(first.clone()),
                TransportEvent::Credentials(SessionUpdate::default()),
                TransportEvent::Credentials(second.clone()),
                close(Some(401)),
            ])],
            registered(),
        );
        h.supervisor.run().await.unwrap();
        assert_eq!(*h.store.saved.lock().unwrap(), [first, second]);
    }

    #[tokio::test]
    async fn credentials_behind_a_close_are_still_saved() {
        let update = SessionUpdate {
            creds: Some(json!({"registered": true})),
            ..Default::default()
        };
        let h = harness(
            config(),
            vec![
                Script::ending(vec![
                    close(Some(515)),
                    TransportEvent::Credentials(update.clone()),
                ]),
                Script::ending(vec![close(Some(401))]),
            ],
            registered(),
        );
        h.supervisor.run().await.unwrap();
        assert_eq!(*h.store.saved.lock().unwrap(), [update]);
    }

    #[tokio::test]
    async fn failed_save_does_not_stop_the_loop() {
        let h = harness(
            config(),
            vec![Script::ending(vec![
                TransportEvent::Credentials(SessionUpdate {
                    creds: Some(json!({})),
                    ..Default::default()
                }),
                close(Some(401)),
            ])],
            RecordingStore {
                fail_saves: true,
                ..registered()
            },
        );
        assert_eq!(h.supervisor.run().await.unwrap(), Shutdown::LoggedOut);
    }

    #[tokio::test]
    async fn messages_are_normalized_and_dispatched() {
        let mut h = harness(
            config(),
            vec![Script::ending(vec![
                messages(json!([
                    {"key": {"remoteJid": "status@broadcast", "id": "S"}, "message": {"conversation": ".saldo"}},
                    {"key": {"remoteJid": "628123@s.whatsapp.net", "id": "E"}},
                    {"key": {"remoteJid": "628123@s.whatsapp.net", "id": "B"}, "message": {"conversation": ".boom"}},
                    {"key": {"remoteJid": "628123@s.whatsapp.net", "id": "F"}, "message": {"conversation": ".fail"}},
                    {"key": {"remoteJid": "628123:2@s.whatsapp.net", "id": "OK"}, "message": {"conversation": ".Saldo now"}},
                ])),
                close(Some(401)),
            ])],
            registered(),
        );
        h.supervisor.run().await.unwrap();

        let message = tokio::time::timeout(WAIT, h.messages.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(message.id.as_deref(), Some("OK"));
        assert_eq!(message.identity.chat, "628123@s.whatsapp.net");
        assert_eq!(message.command.command, "saldo");
        assert_eq!(message.command.text, "now");
    }

    #[tokio::test]
    async fn open_notifies_primary_owner() {
        let mut h = harness(
            SupervisorConfig {
                owners: vec![String::new(), "13340554342579".into(), "628111".into()],
                ..config()
            },
            vec![Script::ending(vec![
                phase(ConnectionPhase::Open),
                close(Some(401)),
            ])],
            registered(),
        );
        h.supervisor.run().await.unwrap();
        let (jid, content) = tokio::time::timeout(WAIT, h.outputs.sent.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(jid, "13340554342579@lid");
        assert_eq!(content, OutboundContent::text(notify::ONLINE_NOTICE));
    }

    #[tokio::test]
    async fn pairing_code_requested_for_unregistered_session() {
        let mut h = harness(
            SupervisorConfig {
                pairing_number: Some("+62 812-345".into()),
                ..config()
            },
            vec![Script::open(vec![phase(ConnectionPhase::Connecting)])],
            RecordingStore::default(),
        );
        let supervisor = Arc::clone(&h.supervisor);
        let run = tokio::spawn(async move { supervisor.run().await });

        let phone = tokio::time::timeout(WAIT, h.outputs.pairing.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(phone, "62812345");

        h.supervisor.shutdown_token().cancel();
        let shutdown = tokio::time::timeout(WAIT, run).await.unwrap().unwrap();
        assert_eq!(shutdown.unwrap(), Shutdown::Stopped);
        assert!(!logged(&h.log).contains(&"delete"));
    }

    #[tokio::test]
    async fn registered_session_skips_pairing() {
        let mut h = harness(
            SupervisorConfig {
                pairing_number: Some("62812345".into()),
                ..config()
            },
            vec![Script::open(vec![phase(ConnectionPhase::Open)])],
            registered(),
        );
        let supervisor = Arc::clone(&h.supervisor);
        let run = tokio::spawn(async move { supervisor.run().await });

        let mut state = h.supervisor.subscribe_state();
        tokio::time::timeout(
            WAIT,
            state.wait_for(|s| *s == ConnectionState::Open),
        )
        .await
        .unwrap()
        .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(h.outputs.pairing.try_recv().is_err());

        h.supervisor.shutdown_token().cancel();
        tokio::time::timeout(WAIT, run).await.unwrap().unwrap().unwrap();
    }

    #[tokio::test]
    async fn stop_closes_the_socket() {
        let h = harness(
            config(),
            vec![Script::open(vec![phase(ConnectionPhase::Open)])],
            registered(),
        );
        let supervisor = Arc::clone(&h.supervisor);
        let run = tokio::spawn(async move { supervisor.run().await });
        let mut state = h.supervisor.subscribe_state();
        tokio::time::timeout(
            WAIT,
            state.wait_for(|s| *s == ConnectionState::Open),
        )
        .await
        .unwrap()
        .unwrap();

        h.supervisor.shutdown_token().cancel();
        let shutdown = tokio::time::timeout(WAIT, run).await.unwrap().unwrap();
        assert_eq!(shutdown.unwrap(), Shutdown::Stopped);
        assert_eq!(logged(&h.log), ["connect", "close"]);
    }
}
