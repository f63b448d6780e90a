//! Configuration loading, validation and env substitution.
//!
//! Config files: `airbot.toml`, `airbot.yaml`, `airbot.yml` or `airbot.json`,
//! searched in `./` then the platform config dir (`~/.config/airbot/`).
//!
//! Supports `${ENV_VAR}` substitution in all string values.

pub mod env_subst;
pub mod loader;
pub mod schema;
pub mod template;
pub mod validate;

pub use {
    loader::{config_dir, discover_and_load, load_config},
    schema::{AirbotConfig, BotConfig, LedgerConfig, ReconnectConfig, SidecarConfig},
    template::DEFAULT_CONFIG_TEMPLATE,
    validate::{Diagnostic, Severity, ValidationResult},
};
