//! Error helpers shared by the airbot crates.

pub mod error;

pub use error::FromMessage;
