//! Routes normalized messages to commands.

use std::sync::Arc;

use {
    airbot_message::{Message, MessageHandler},
    airbot_protocol::RawMessage,
    airbot_transport::Connection,
    async_trait::async_trait,
    tracing::{debug, info},
};

use crate::{
    context::{CommandContext, CommandSettings, Registry},
    ledger::Ledger,
};

/// Prefix that lets the bot's own account issue commands.
const SELF_COMMAND_PREFIX: char = '.';

pub struct Dispatcher {
    registry: Registry,
    ledger: Ledger,
    settings: CommandSettings,
}

impl Dispatcher {
    pub fn new(registry: Registry, ledger: Ledger, settings: CommandSettings) -> Self {
        Self {
            registry,
            ledger,
            settings,
        }
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn settings(&self) -> &CommandSettings {
        &self.settings
    }
}

#[async_trait]
impl MessageHandler for Dispatcher {
    async fn handle(
        &self,
        conn: Arc<dyn Connection>,
        message: Message,
        raw: Arc<RawMessage>,
    ) -> anyhow::Result<()> {
        let identity = &message.identity;
        if identity.from_me && !message.content.body.starts_with(SELF_COMMAND_PREFIX) {
            return Ok(());
        }

        let (user, prices) = self
            .ledger
            .register(&identity.sender, &identity.push_name)
            .await?;

        let is_owner =
            identity.from_me || self.settings.is_owner_number(identity.sender_number());
        if !self.settings.public && !is_owner {
            debug!(sender = %identity.sender, "private mode, ignoring non-owner");
            return Ok(());
        }
        if !message.is_command() {
            return Ok(());
        }

        let name = message.command.command.as_str();
        let Some(command) = self.registry.get(name) else {
            debug!(command = name, sender = %identity.sender, "unknown command");
            return Ok(());
        };
        info!(
            command = name,
            sender = %identity.sender,
            chat = %identity.chat,
            owner = is_owner,
            "running command"
        );

        let ctx = CommandContext {
            conn: &conn,
            message: &message,
            raw: &raw,
            ledger: &self.ledger,
            settings: &self.settings,
            is_owner,
            user,
            prices,
        };
        command.run(&ctx).await
    }
}
