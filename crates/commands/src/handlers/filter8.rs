use {async_trait::async_trait, tracing::debug};

use crate::{
    context::{Command, CommandContext},
    filter8::{extract_imeis, group},
    ledger::Charge,
    target::rupiah,
};

/// `filter8`: sort IMEIs by their 8-digit prefix.
///
/// Reads IMEIs from the arguments, or from the quoted message when there are
/// none. Non-owners pay the `filter8` price.
pub struct Filter8;

#[async_trait]
impl Command for Filter8 {
    fn names(&self) -> &'static [&'static str] {
        &["filter8"]
    }

    async fn run(&self, ctx: &CommandContext<'_>) -> anyhow::Result<()> {
        let mut imeis = extract_imeis(ctx.text());
        if imeis.is_empty()
            && let Some(quoted) = &ctx.message.quoted
        {
            imeis = extract_imeis(&quoted.body);
        }
        if imeis.is_empty() {
            return ctx
                .reply(format!(
                    "❌ *CARA PAKAI:*\n{}filter8 <daftar IMEI>\natau reply pesan berisi IMEI.",
                    ctx.prefix()
                ))
                .await;
        }

        let price = if ctx.is_owner {
            0
        } else {
            ctx.prices.filter8
        };
        let balance = match ctx.ledger.charge(ctx.sender(), price).await? {
            Charge::Charged { balance } => balance,
            Charge::Insufficient { balance } => {
                return ctx
                    .reply(format!(
                        "⚠️ *SALDO TIDAK CUKUP!*\n❌ Butuh: Rp {}\n💰 Saldo Kamu: Rp {}",
                        rupiah(price),
                        rupiah(balance)
                    ))
                    .await;
            },
        };

        ctx.reply("⏳ Sedang menyortir...").await?;
        let grouping = group(&imeis);
        debug!(
            imeis = imeis.len(),
            twins = grouping.twins.len(),
            singles = grouping.singles.len(),
            "filter8 grouped"
        );
        ctx.reply(format!(
            "✅ *FILTER 8 DIGIT SELESAI*\n\n{}\n\n💸 Terpotong: Rp {}\n💰 Sisa: Rp {}",
            grouping.render(),
            rupiah(price),
            rupiah(balance)
        ))
        .await
    }
}
