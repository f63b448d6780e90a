//! WhatsApp transport via Baileys.
//!
//! The network protocol is spoken by a Node.js sidecar process wrapping
//! Baileys; this crate manages that process and talks to it over a local
//! WebSocket, exposing it as an [`airbot_transport::Transport`].

pub mod config;
pub mod error;
pub mod process;
pub mod sidecar;
pub mod transport;

pub use {
    config::WhatsAppConfig,
    error::{Error, Result},
    process::{SidecarProcess, find_sidecar_dir, start_sidecar},
    sidecar::{DEFAULT_SIDECAR_PORT, SidecarConnection},
    transport::SidecarTransport,
};
