mod bot;
mod config_commands;
mod session_commands;

use std::path::PathBuf;

use {
    clap::{Parser, Subcommand},
    tracing::info,
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

#[derive(Parser)]
#[command(name = "airbot", about = "AirBot, a WhatsApp command bot", version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    /// Config file (overrides discovery of ./airbot.toml and friends).
    #[arg(long, short, global = true, env = "AIRBOT_CONFIG")]
    config: Option<PathBuf>,

    /// Pair by code with this number (overrides `bot.pairing_number`).
    #[arg(long, global = true, env = "AIRBOT_PAIRING_NUMBER")]
    pairing_number: Option<String>,

    /// Session directory (overrides `bot.session_dir`).
    #[arg(long, global = true, env = "AIRBOT_SESSION_DIR")]
    session_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect to WhatsApp and serve commands (default).
    Run,
    /// Validate the configuration file and report errors/warnings.
    CheckConfig {
        /// Show informational diagnostics in addition to errors and warnings.
        #[arg(long)]
        verbose: bool,
    },
    /// Write a commented default config file.
    InitConfig {
        /// Destination; defaults to ./airbot.toml.
        #[arg(long)]
        path: Option<PathBuf>,
        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },
    /// Delete the stored session so the next start pairs again.
    Logout,
}

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    let registry = tracing_subscriber::registry().with(filter);

    if cli.json_logs {
        registry
            .with(fmt::layer().json().with_target(true).with_thread_ids(false))
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(true),
            )
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    init_telemetry(&cli);

    let overrides = bot::Overrides {
        pairing_number: cli.pairing_number.clone(),
        session_dir: cli.session_dir.clone(),
    };

    match cli.command {
        None | Some(Commands::Run) => {
            info!(version = env!("CARGO_PKG_VERSION"), "airbot starting");
            bot::run(cli.config.as_deref(), overrides).await
        },
        Some(Commands::CheckConfig { verbose }) => {
            config_commands::check(cli.config.as_deref(), verbose)
        },
        Some(Commands::InitConfig { path, force }) => config_commands::init(path, force),
        Some(Commands::Logout) => session_commands::logout(cli.config.as_deref(), overrides).await,
    }
}
