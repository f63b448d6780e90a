//! Chat commands for the bot: a registry of named commands, the dispatcher
//! that feeds normalized messages into it, and the JSON balance ledger the
//! commands operate on.

pub mod context;
pub mod dispatcher;
pub mod error;
pub mod filter8;
pub mod handlers;
pub mod ledger;
pub mod target;

pub use {
    context::{Command, CommandContext, CommandSettings, Registry},
    dispatcher::Dispatcher,
    error::{Error, Result},
    ledger::{Charge, Database, HistoryEntry, Ledger, LedgerPaths, Prices, UserRecord},
};
