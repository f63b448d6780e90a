use {async_trait::async_trait, std::fmt::Write};

use crate::{
    context::{Command, CommandContext},
    target::rupiah,
};

pub struct Menu;

#[async_trait]
impl Command for Menu {
    fn names(&self) -> &'static [&'static str] {
        &["menu", "help"]
    }

    async fn run(&self, ctx: &CommandContext<'_>) -> anyhow::Result<()> {
        ctx.reply(render(ctx)).await
    }
}

fn render(ctx: &CommandContext<'_>) -> String {
    let p = ctx.prefix();
    let status = if ctx.user.vip {
        "👑 VIP MEMBER"
    } else {
        "🆓 Free User"
    };
    let mut text = format!(
        "🤖 *AIRBOT SERVICE*\n\
         👤 User: {}\n\
         🏷️ Status: {status}\n\
         💰 Saldo: Rp {}\n\n\
         🛠️ *TOOLS*\n\
         • {p}filter8 (Sortir IMEI 8 digit)\n\n\
         💸 *HARGA*\n\
         • Filter8: Rp {}\n\n\
         🏧 *DEPOSIT*\n\
         • {p}deposit\n\n\
         ℹ️ *INFO*\n\
         • {p}saldo\n\
         • {p}admin",
        ctx.message.identity.push_name,
        rupiah(ctx.user.balance),
        rupiah(ctx.prices.filter8),
    );
    if ctx.is_owner {
        let _ = write!(
            text,
            "\n\n👑 *PANEL ADMIN*\n\
             • {p}addsaldo 628xxx|nominal\n\
             • {p}minsaldo 628xxx|nominal\n\
             • {p}addvip 628xxx|1"
        );
    }
    text
}
