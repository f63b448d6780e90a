//! Config schema. Every section is optional; missing fields take defaults.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AirbotConfig {
    pub bot: BotConfig,
    pub sidecar: SidecarConfig,
    pub reconnect: ReconnectConfig,
    pub ledger: LedgerConfig,
}

/// Identity and command behaviour.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    /// Regex matched at the start of a body to find the command prefix.
    pub prefix: String,
    /// Prefix assumed when the pattern does not match.
    pub fallback_prefix: String,
    /// Owner phone numbers or LIDs. The first one gets the online notice.
    pub owners: Vec<String>,
    /// When false, only owners may use commands.
    pub public: bool,
    /// Pair by code with this number instead of scanning a QR code.
    pub pairing_number: Option<String>,
    /// Delay before requesting the pairing code.
    pub pairing_delay_ms: u64,
    /// Directory holding `creds.json` and the signal keys.
    pub session_dir: PathBuf,
    /// Number advertised by the `admin` command.
    pub admin_contact: String,
    /// Message the primary owner every time the connection opens.
    pub notify_owner_on_connect: bool,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            prefix: "^[./!#]".into(),
            fallback_prefix: "#".into(),
            owners: Vec::new(),
            public: true,
            pairing_number: None,
            pairing_delay_ms: 3000,
            session_dir: PathBuf::from("session"),
            admin_contact: "6289523261157".into(),
            notify_owner_on_connect: true,
        }
    }
}

/// The Baileys sidecar process and its WebSocket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SidecarConfig {
    pub port: u16,
    /// Sidecar checkout; discovered when unset.
    pub dir: Option<PathBuf>,
    /// Spawn the sidecar instead of connecting to a running one.
    pub auto_start: bool,
    pub connect_retries: u32,
    pub request_timeout_secs: u64,
}

impl Default for SidecarConfig {
    fn default() -> Self {
        Self {
            port: 9277,
            dir: None,
            auto_start: true,
            connect_retries: 10,
            request_timeout_secs: 60,
        }
    }
}

/// Delay schedule between reconnects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectConfig {
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    /// Retry the first closure after an open connection without waiting.
    pub immediate_first: bool,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: 1000,
            max_delay_ms: 60_000,
            immediate_first: true,
        }
    }
}

/// Balance ledger files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    pub path: PathBuf,
    pub history_path: PathBuf,
    /// QRIS image sent by `deposit`.
    pub qris_image: PathBuf,
    /// IANA timezone for history timestamps.
    pub timezone: String,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("database.json"),
            history_path: PathBuf::from("history_saldo.json"),
            qris_image: PathBuf::from("qris.jpg"),
            timezone: "Asia/Jakarta".into(),
        }
    }
}
