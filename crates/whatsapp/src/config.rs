use std::{path::PathBuf, time::Duration};

use crate::sidecar::DEFAULT_SIDECAR_PORT;

/// Settings for the Baileys sidecar transport.
#[derive(Debug, Clone)]
pub struct WhatsAppConfig {
    /// Port the sidecar's WebSocket server listens on (loopback only).
    pub port: u16,
    /// Directory containing the sidecar's `package.json`; searched when unset.
    pub sidecar_dir: Option<PathBuf>,
    /// Spawn and manage the sidecar process. Disable to run it by hand.
    pub auto_start: bool,
    /// WebSocket connect attempts before giving up.
    pub connect_retries: u32,
    /// How long to wait for a command result.
    pub request_timeout: Duration,
    /// Ask the sidecar to render QR codes in its own terminal output.
    pub print_qr: bool,
}

impl Default for WhatsAppConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_SIDECAR_PORT,
            sidecar_dir: None,
            auto_start: true,
            connect_retries: 10,
            request_timeout: Duration::from_secs(60),
            print_qr: false,
        }
    }
}

impl WhatsAppConfig {
    /// WebSocket URL of the sidecar.
    #[must_use]
    pub fn url(&self) -> String {
        format!("ws://127.0.0.1:{}", self.port)
    }
}
