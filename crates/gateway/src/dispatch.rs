//! Inbound message fan-out.

use std::{any::Any, panic::AssertUnwindSafe, sync::Arc};

use {
    airbot_message::{MessageHandler, Normalizer},
    airbot_protocol::{MessagesUpsert, jid},
    airbot_transport::Connection,
    futures::FutureExt,
    tokio::task::JoinHandle,
    tracing::{debug, error, trace},
};

/// Normalize every event in `upsert` and hand each message to `handler` on
/// its own task.
///
/// Status broadcasts and events that do not normalize are dropped. Handler
/// errors and panics are logged and never reach the caller.
pub fn dispatch(
    upsert: MessagesUpsert,
    normalizer: &Normalizer,
    handler: &Arc<dyn MessageHandler>,
    conn: &Arc<dyn Connection>,
) -> Vec<JoinHandle<()>> {
    let self_id = conn.user_id();
    let mut tasks = Vec::new();
    for raw in upsert.messages {
        let Some(remote_jid) = raw.remote_jid() else {
            trace!("dropping event without chat jid");
            continue;
        };
        if jid::is_status_broadcast(remote_jid) {
            continue;
        }
        let Some(message) = normalizer.normalize(&raw, self_id.as_deref()) else {
            trace!(chat = %remote_jid, "dropping event without content");
            continue;
        };
        debug!(
            chat = %message.identity.chat,
            sender = %message.identity.sender,
            kind = ?message.content.kind,
            "inbound message"
        );

        let handler = Arc::clone(handler);
        let conn = Arc::clone(conn);
        let raw = Arc::new(raw);
        tasks.push(tokio::spawn(async move {
            let id = message.id.clone();
            let work = handler.handle(conn, message, raw);
            match AssertUnwindSafe(work).catch_unwind().await {
                Ok(Ok(())) => {},
                Ok(Err(e)) => error!(message_id = ?id, error = %e, "message handler failed"),
                Err(panic) => error!(
                    message_id = ?id,
                    panic = %panic_message(panic.as_ref()),
                    "message handler panicked"
                ),
            }
        }));
    }
    tasks
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
