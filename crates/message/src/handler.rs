use std::sync::Arc;

use {airbot_protocol::RawMessage, airbot_transport::Connection, async_trait::async_trait};

use crate::Message;

/// Consumer of normalized messages (the command layer).
///
/// Each call runs as its own task; errors and panics are caught and logged by
/// the caller.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(
        &self,
        conn: Arc<dyn Connection>,
        message: Message,
        raw: Arc<RawMessage>,
    ) -> anyhow::Result<()>;
}
