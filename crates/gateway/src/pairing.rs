//! Phone-number pairing for unregistered sessions.

use std::{sync::Arc, time::Duration};

use {
    airbot_protocol::jid,
    airbot_transport::Connection,
    tokio::task::JoinHandle,
    tracing::{info, warn},
};

/// Group a raw pairing code in blocks of four: `ABCD1234` → `ABCD-1234`.
#[must_use]
pub fn format_code(code: &str) -> String {
    code.chars()
        .collect::<Vec<_>>()
        .chunks(4)
        .map(|chunk| chunk.iter().collect::<String>())
        .collect::<Vec<_>>()
        .join("-")
}

/// Request a pairing code for `phone` after `delay`, once.
///
/// The delay lets the socket settle before the request. The result is only
/// logged; the operator types the code on their phone.
pub fn schedule(conn: Arc<dyn Connection>, phone: &str, delay: Duration) -> JoinHandle<()> {
    let phone = jid::digits_only(phone);
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        match conn.request_pairing_code(&phone).await {
            Ok(code) => info!(
                phone = %phone,
                code = %format_code(&code),
                "pairing code ready, enter it under linked devices"
            ),
            Err(e) => warn!(phone = %phone, error = %e, "pairing code request failed"),
        }
    })
}
