//! Wiring for the `run` command: config in, supervisor out.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use {
    airbot_commands::{CommandSettings, Dispatcher, Ledger, LedgerPaths, handlers},
    airbot_config::{AirbotConfig, ReconnectConfig},
    airbot_gateway::{Backoff, Shutdown, Supervisor, SupervisorConfig},
    airbot_message::{Normalizer, PrefixMatcher},
    airbot_sessions::FileSessionStore,
    airbot_whatsapp::{
        SidecarProcess, SidecarTransport, WhatsAppConfig, find_sidecar_dir, start_sidecar,
    },
    anyhow::{Context, Result, anyhow},
    chrono_tz::Tz,
    tracing::{info, warn},
};

/// Command-line values that take precedence over the config file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub pairing_number: Option<String>,
    pub session_dir: Option<PathBuf>,
}

impl Overrides {
    pub fn apply(self, config: &mut AirbotConfig) {
        if let Some(number) = self.pairing_number {
            config.bot.pairing_number = Some(number);
        }
        if let Some(dir) = self.session_dir {
            config.bot.session_dir = dir;
        }
    }
}

/// Discover the config file and apply `overrides` on top.
pub fn load(path: Option<&Path>, overrides: Overrides) -> Result<AirbotConfig> {
    let (mut config, found) = airbot_config::discover_and_load(path)?;
    match found {
        Some(path) => info!(path = %path.display(), "loaded config"),
        None => info!("no config file found, using defaults"),
    }
    overrides.apply(&mut config);
    Ok(config)
}

pub fn backoff(reconnect: &ReconnectConfig) -> Backoff {
    Backoff {
        base: Duration::from_millis(reconnect.base_delay_ms),
        max: Duration::from_millis(reconnect.max_delay_ms),
        immediate_first: reconnect.immediate_first,
    }
}

pub fn whatsapp_config(config: &AirbotConfig) -> WhatsAppConfig {
    WhatsAppConfig {
        port: config.sidecar.port,
        sidecar_dir: config.sidecar.dir.clone(),
        auto_start: config.sidecar.auto_start,
        connect_retries: config.sidecar.connect_retries,
        request_timeout: Duration::from_secs(config.sidecar.request_timeout_secs),
        print_qr: false,
    }
}

pub fn command_settings(config: &AirbotConfig) -> CommandSettings {
    CommandSettings {
        owners: config.bot.owners.clone(),
        public: config.bot.public,
        admin_contact: config.bot.admin_contact.clone(),
        qris_image: config.ledger.qris_image.clone(),
    }
}

pub fn supervisor_config(config: &AirbotConfig) -> Result<SupervisorConfig> {
    let prefix = PrefixMatcher::new(&config.bot.prefix, config.bot.fallback_prefix.clone())
        .with_context(|| format!("invalid bot.prefix pattern {:?}", config.bot.prefix))?;
    Ok(SupervisorConfig {
        owners: config.bot.owners.clone(),
        pairing_number: config.bot.pairing_number.clone(),
        pairing_delay: Duration::from_millis(config.bot.pairing_delay_ms),
        notify_owner: config.bot.notify_owner_on_connect,
        backoff: backoff(&config.reconnect),
        ..SupervisorConfig::new(Normalizer::new(prefix))
    })
}

fn timezone(config: &AirbotConfig) -> Result<Tz> {
    config
        .ledger
        .timezone
        .parse()
        .map_err(|e| anyhow!("invalid ledger.timezone {:?}: {e}", config.ledger.timezone))
}

pub async fn run(config_path: Option<&Path>, overrides: Overrides) -> Result<()> {
    let config = load(config_path, overrides)?;

    let ledger = Ledger::open(
        LedgerPaths {
            database: config.ledger.path.clone(),
            history: config.ledger.history_path.clone(),
        },
        timezone(&config)?,
    )
    .await
    .context("failed to open ledger")?;
    let dispatcher = Dispatcher::new(handlers::builtin(), ledger, command_settings(&config));

    let mut sidecar = if config.sidecar.auto_start {
        let dir = find_sidecar_dir(config.sidecar.dir.as_deref())?;
        Some(start_sidecar(&dir, config.sidecar.port).await?)
    } else {
        info!(port = config.sidecar.port, "using externally managed sidecar");
        None
    };

    let supervisor = Supervisor::new(
        supervisor_config(&config)?,
        Arc::new(SidecarTransport::new(whatsapp_config(&config))),
        Arc::new(FileSessionStore::new(config.bot.session_dir.clone())),
        Arc::new(dispatcher),
    );

    let token = supervisor.shutdown_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown requested");
            token.cancel();
        }
    });

    let outcome = supervisor.run().await;

    if let Some(ref mut process) = sidecar {
        stop_sidecar(process).await;
    }

    report(outcome)
}

async fn stop_sidecar(process: &mut SidecarProcess) {
    if let Err(e) = process.stop().await {
        warn!(error = %e, "failed to stop whatsapp sidecar");
    }
}

/// Log how the supervisor ended; its error wins over any shutdown noise.
fn report(outcome: airbot_gateway::Result<Shutdown>) -> Result<()> {
    match outcome.context("connection supervisor failed")? {
        Shutdown::LoggedOut => {
            warn!("logged out, session deleted; start again to pair a new device");
        },
        Shutdown::Stopped => info!("airbot stopped"),
    }
    Ok(())
}
