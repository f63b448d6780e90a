//! Built-in commands.

mod admin;
mod balance;
mod deposit;
mod filter8;
mod menu;

pub use {
    admin::Admin,
    balance::{AddBalance, AddVip, Balance, RemoveBalance},
    deposit::Deposit,
    filter8::Filter8,
    menu::Menu,
};

use crate::context::Registry;

pub const OWNER_ONLY: &str = "❌ Maaf, perintah ini hanya untuk Admin.";

/// Registry with every built-in command.
#[must_use]
pub fn builtin() -> Registry {
    let mut registry = Registry::new();
    registry
        .register(Menu)
        .register(Deposit)
        .register(AddBalance)
        .register(RemoveBalance)
        .register(AddVip)
        .register(Balance)
        .register(Filter8)
        .register(Admin);
    registry
}
