use std::{collections::HashMap, path::PathBuf, sync::Arc};

use {
    airbot_message::Message,
    airbot_protocol::RawMessage,
    airbot_transport::{Connection, OutboundContent},
    async_trait::async_trait,
};

use crate::ledger::{Ledger, Prices, UserRecord};

/// Static settings the commands need.
#[derive(Debug, Clone)]
pub struct CommandSettings {
    /// Owner numbers or LIDs; a sender whose number contains one is an owner.
    pub owners: Vec<String>,
    /// When false only owners may use the bot.
    pub public: bool,
    /// Number shown by `admin` as a `wa.me` link.
    pub admin_contact: String,
    /// QRIS image sent by `deposit`.
    pub qris_image: PathBuf,
}

impl CommandSettings {
    /// Whether `sender_number` belongs to an owner.
    #[must_use]
    pub fn is_owner_number(&self, sender_number: &str) -> bool {
        self.owners
            .iter()
            .filter(|o| !o.is_empty())
            .any(|o| sender_number.contains(o.as_str()))
    }
}

/// Everything a command invocation can see.
pub struct CommandContext<'a> {
    pub conn: &'a Arc<dyn Connection>,
    pub message: &'a Message,
    pub raw: &'a RawMessage,
    pub ledger: &'a Ledger,
    pub settings: &'a CommandSettings,
    pub is_owner: bool,
    /// The sender's account as of dispatch.
    pub user: UserRecord,
    pub prices: Prices,
}

impl CommandContext<'_> {
    pub fn prefix(&self) -> &str {
        &self.message.command.prefix
    }

    /// Argument text after the command token.
    pub fn text(&self) -> &str {
        &self.message.command.text
    }

    pub fn sender(&self) -> &str {
        &self.message.identity.sender
    }

    pub async fn reply(&self, text: impl Into<String> + Send) -> anyhow::Result<()> {
        self.message.reply(self.conn.as_ref(), text).await?;
        Ok(())
    }

    pub async fn reply_with(&self, content: OutboundContent) -> anyhow::Result<()> {
        self.message.reply_with(self.conn.as_ref(), content).await?;
        Ok(())
    }
}

/// One chat command.
#[async_trait]
pub trait Command: Send + Sync {
    /// Primary name first, then aliases. Lower-case.
    fn names(&self) -> &'static [&'static str];

    async fn run(&self, ctx: &CommandContext<'_>) -> anyhow::Result<()>;
}

/// Command lookup table.
#[derive(Default, Clone)]
pub struct Registry {
    by_name: HashMap<&'static str, Arc<dyn Command>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a command under all its names. Later registrations win.
    pub fn register(&mut self, command: impl Command + 'static) -> &mut Self {
        let command: Arc<dyn Command> = Arc::new(command);
        for name in command.names() {
            self.by_name.insert(name, Arc::clone(&command));
        }
        self
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Command>> {
        self.by_name.get(name)
    }

    /// All registered names, sorted.
    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.by_name.keys().copied().collect();
        names.sort_unstable();
        names
    }
}
