use std::sync::Arc;

use {
    airbot_protocol::{BROWSER, GatewayFrame, PROTOCOL_VERSION, SessionState},
    airbot_transport::{Connection, EventStream, Transport, event_channel},
    async_trait::async_trait,
    tracing::info,
};

use crate::{
    config::WhatsAppConfig,
    sidecar::{SidecarConnection, connect_with_retry},
};

/// [`Transport`] backed by the Baileys sidecar. Every `connect` opens a fresh
/// WebSocket, and with it a fresh network socket.
pub struct SidecarTransport {
    config: WhatsAppConfig,
}

impl SidecarTransport {
    pub fn new(config: WhatsAppConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &WhatsAppConfig {
        &self.config
    }
}

#[async_trait]
impl Transport for SidecarTransport {
    async fn connect(
        &self,
        session: SessionState,
    ) -> airbot_transport::Result<(Arc<dyn Connection>, EventStream)> {
        let url = self.config.url();
        let ws = connect_with_retry(&url, self.config.connect_retries).await?;

        let (sink, stream) = event_channel();
        let registered = session.is_registered();
        let conn = SidecarConnection::spawn(ws, registered, self.config.request_timeout, sink);
        conn.send_frame(&GatewayFrame::Connect {
            protocol_version: PROTOCOL_VERSION,
            session,
            browser: BROWSER.iter().map(|s| (*s).to_string()).collect(),
            print_qr: self.config.print_qr,
        })?;
        info!(url, registered, "opened whatsapp socket");

        Ok((Arc::new(conn), stream))
    }
}
