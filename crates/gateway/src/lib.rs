//! Connection supervision for the bot.
//!
//! [`Supervisor`] owns the single logical WhatsApp connection: it loads the
//! session, connects through a [`airbot_transport::Transport`], persists
//! credential rotations, fans inbound messages out to a
//! [`airbot_message::MessageHandler`], and decides after every closure
//! whether to reconnect or shut down.

pub mod backoff;
pub mod dispatch;
pub mod error;
pub mod notify;
pub mod pairing;
pub mod state;
pub mod supervisor;

#[cfg(test)]
mod testing;

pub use {
    backoff::Backoff,
    error::{Error, Result},
    state::{ConnectionState, DisconnectCause, Shutdown},
    supervisor::{DEFAULT_PAIRING_DELAY, Supervisor, SupervisorConfig},
};
