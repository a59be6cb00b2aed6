// Sink handler for daemon-hosted queues

use async_trait::async_trait;
use serde_json::Value;
use tracing::info;
use workqueue_core::domain::Item;
use workqueue_core::port::Handler;

/// Logs every payload and acknowledges the batch.
///
/// Stands in for domain handlers when queues are declared purely in
/// configuration; operators push through the admin RPC and watch the log.
pub struct LogHandler {
    queue: String,
}

impl LogHandler {
    pub fn new(queue: impl Into<String>) -> Self {
        Self {
            queue: queue.into(),
        }
    }
}

#[async_trait]
impl Handler<Value> for LogHandler {
    async fn handle(&self, batch: Vec<Item<Value>>) -> Vec<Item<Value>> {
        for item in &batch {
            info!(
                queue = %self.queue,
                key = ?item.key(),
                attempts = item.attempts(),
                payload = %item.data,
                "Item handled"
            );
        }
        Vec::new()
    }
}
