use std::sync::Arc;

use {
    airbot_protocol::{OutboundContent, SendOptions, jid},
    airbot_transport::Connection,
    tracing::{debug, warn},
};

pub const ONLINE_NOTICE: &str = "✅ *AIRBOT ONLINE*\n\nSiap menerima perintah, Bos!";

/// JID of the primary owner: the first owner entry with any digits.
#[must_use]
pub fn primary_owner(owners: &[String]) -> Option<String> {
    owners.iter().find_map(|owner| jid::user_jid(owner))
}

/// Tell the primary owner the bot is online. Failures are logged only.
pub async fn notify_owner(conn: Arc<dyn Connection>, owner: String) {
    match conn
        .send_message(
            &owner,
            OutboundContent::text(ONLINE_NOTICE),
            SendOptions::default(),
        )
        .await
    {
        Ok(_) => debug!(owner = %owner, "online notice sent"),
        Err(e) => warn!(owner = %owner, error = %e, "failed to send online notice"),
    }
}
