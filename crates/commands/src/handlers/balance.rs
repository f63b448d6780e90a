//! Balance administration and lookup.

use {
    airbot_transport::{OutboundContent, SendOptions},
    async_trait::async_trait,
    tracing::warn,
};

use {
    super::OWNER_ONLY,
    crate::{
        context::{Command, CommandContext},
        target::{parse_amount, parse_target, rupiah, split_pair},
    },
};

const BAD_AMOUNT: &str = "❌ Nominal salah/kosong.";

/// Parse `<target>|<amount>` from the argument text.
fn target_and_amount(text: &str) -> Option<(String, Option<i64>)> {
    let (target, amount) = split_pair(text)?;
    Some((parse_target(target)?, parse_amount(amount)))
}

fn number(jid: &str) -> &str {
    airbot_protocol::jid::user_part(jid)
}

/// `addsaldo <target>|<amount>`: owner credit.
pub struct AddBalance;

#[async_trait]
impl Command for AddBalance {
    fn names(&self) -> &'static [&'static str] {
        &["addsaldo", "tambahsaldo"]
    }

    async fn run(&self, ctx: &CommandContext<'_>) -> anyhow::Result<()> {
        if !ctx.is_owner {
            return ctx.reply(OWNER_ONLY).await;
        }
        let Some((target, amount)) = target_and_amount(ctx.text()) else {
            return ctx
                .reply(format!(
                    "❌ *CARA PAKAI:*\n{}addsaldo 628xxx|50000",
                    ctx.prefix()
                ))
                .await;
        };
        let Some(amount) = amount else {
            return ctx.reply(BAD_AMOUNT).await;
        };

        let total = ctx.ledger.credit(&target, amount, ctx.sender()).await?;
        ctx.reply(format!(
            "✅ *SUKSES TAMBAH SALDO*\n\n👤 User: {}\n💵 Masuk: Rp {}\n💰 Total: Rp {}",
            number(&target),
            rupiah(amount),
            rupiah(total)
        ))
        .await?;

        let notice = format!(
            "🎉 *DEPOSIT BERHASIL!*\n\nNominal: Rp {}\nTotal Saldo: Rp {}",
            rupiah(amount),
            rupiah(total)
        );
        if let Err(e) = ctx
            .conn
            .send_message(&target, OutboundContent::text(notice), SendOptions::default())
            .await
        {
            warn!(target_jid = %target, error = %e, "failed to notify credited user");
            ctx.reply("⚠️ Saldo masuk, tapi gagal kirim notif ke User.")
                .await?;
        }
        Ok(())
    }
}

/// `minsaldo <target>|<amount>`: owner debit, floored at zero.
pub struct RemoveBalance;

#[async_trait]
impl Command for RemoveBalance {
    fn names(&self) -> &'static [&'static str] {
        &["minsaldo", "kurangsaldo", "removesaldo"]
    }

    async fn run(&self, ctx: &CommandContext<'_>) -> anyhow::Result<()> {
        if !ctx.is_owner {
            return ctx.reply(OWNER_ONLY).await;
        }
        let Some((target, amount)) = target_and_amount(ctx.text()) else {
            return ctx
                .reply(format!(
                    "❌ *CARA PAKAI:*\n{}kurangsaldo 628xxx|50000",
                    ctx.prefix()
                ))
                .await;
        };
        let Some(amount) = amount else {
            return ctx.reply(BAD_AMOUNT).await;
        };

        let Some(remaining) = ctx.ledger.debit(&target, amount, ctx.sender()).await? else {
            return ctx.reply("⚠️ User belum terdaftar di database.").await;
        };
        ctx.reply(format!(
            "✅ *SUKSES KURANGI SALDO*\n\n👤 User: {}\n📉 Dikurang: Rp {}\n💰 Sisa: Rp {}",
            number(&target),
            rupiah(amount),
            rupiah(remaining)
        ))
        .await?;

        let notice = format!(
            "📉 *PENGURANGAN SALDO*\n\nNominal: Rp {}\nSisa Saldo: Rp {}",
            rupiah(amount),
            rupiah(remaining)
        );
        if let Err(e) = ctx
            .conn
            .send_message(&target, OutboundContent::text(notice), SendOptions::default())
            .await
        {
            warn!(target_jid = %target, error = %e, "failed to notify debited user");
            ctx.reply("⚠️ Saldo berkurang, tapi gagal kirim notif ke User.")
                .await?;
        }
        Ok(())
    }
}

/// `addvip <target>|<1|0>`: owner VIP toggle.
pub struct AddVip;

#[async_trait]
impl Command for AddVip {
    fn names(&self) -> &'static [&'static str] {
        &["addvip"]
    }

    async fn run(&self, ctx: &CommandContext<'_>) -> anyhow::Result<()> {
        if !ctx.is_owner {
            return ctx.reply("❌ Khusus Admin.").await;
        }
        let parsed = split_pair(ctx.text())
            .and_then(|(target, flag)| Some((parse_target(target)?, flag.trim() == "1")));
        let Some((target, vip)) = parsed else {
            return ctx
                .reply(format!("❌ Contoh: {}addvip 628xxx|1", ctx.prefix()))
                .await;
        };
        ctx.ledger.set_vip(&target, vip).await?;
        ctx.reply(format!("✅ VIP Update: {} status: {vip}", number(&target)))
            .await
    }
}

/// `saldo`: the sender's own balance.
pub struct Balance;

#[async_trait]
impl Command for Balance {
    fn names(&self) -> &'static [&'static str] {
        &["saldo", "balance"]
    }

    async fn run(&self, ctx: &CommandContext<'_>) -> anyhow::Result<()> {
        let identity = &ctx.message.identity;
        ctx.reply(format!(
            "💳 *INFO SALDO*\nUser: {}\nSisa: Rp {}\nID: {}",
            identity.push_name,
            rupiah(ctx.user.balance),
            identity.sender_number()
        ))
        .await
    }
}
