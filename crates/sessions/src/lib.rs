//! Durable WhatsApp authentication state.
//!
//! Sessions are stored as a directory of JSON files: `creds.json` plus one
//! file per signal key (`<type>-<id>.json`), written atomically under a file
//! lock so a crash mid-rotation never leaves a truncated credential file.

pub mod error;
pub mod store;

pub use {
    error::{Error, Result},
    store::{FileSessionStore, SessionStore},
};
