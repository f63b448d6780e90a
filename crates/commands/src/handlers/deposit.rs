use {airbot_transport::OutboundContent, async_trait::async_trait, tracing::warn};

use crate::context::{Command, CommandContext};

const CAPTION: &str = "🏧 *METODE PEMBAYARAN*\n\n\
    Silakan scan QRIS di atas.\n\n\
    Setelah transfer, kirim bukti ke Admin.\n\n\
    Support: BCA, BRI, DANA, GOPAY, OVO, SHOPEEPAY";

/// `deposit`: send the QRIS payment image.
pub struct Deposit;

#[async_trait]
impl Command for Deposit {
    fn names(&self) -> &'static [&'static str] {
        &["deposit", "topup", "isisaldo"]
    }

    async fn run(&self, ctx: &CommandContext<'_>) -> anyhow::Result<()> {
        let path = &ctx.settings.qris_image;
        let data = match tokio::fs::read(path).await {
            Ok(data) => data,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "qris image unavailable");
                return ctx
                    .reply("⚠️ *MAAF!* Admin belum upload foto QRIS (qris.jpg).")
                    .await;
            },
        };
        let image = OutboundContent::Image {
            data,
            caption: Some(CAPTION.to_string()),
            mimetype: Some("image/jpeg".to_string()),
        };
        if let Err(e) = ctx.reply_with(image).await {
            warn!(error = %e, "failed to send qris image");
            ctx.reply("⚠️ Gagal mengirim QRIS.").await?;
        }
        Ok(())
    }
}
