use async_trait::async_trait;

use crate::context::{Command, CommandContext};

/// `admin`: contact link for the operator.
pub struct Admin;

#[async_trait]
impl Command for Admin {
    fn names(&self) -> &'static [&'static str] {
        &["admin"]
    }

    async fn run(&self, ctx: &CommandContext<'_>) -> anyhow::Result<()> {
        ctx.reply(format!(
            "📞 Hubungi Admin: wa.me/{}",
            ctx.settings.admin_contact
        ))
        .await
    }
}
