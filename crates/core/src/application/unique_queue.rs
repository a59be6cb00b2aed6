// Unique Queue - at most one outstanding item per key

use crate::application::queue::{Queue, QueueBuilder};
use crate::application::unique_set::UniqueSet;
use crate::application::worker::ShutdownToken;
use crate::domain::{Item, Payload, PushOutcome, QueueConfig, QueueState, QueueStats};
use crate::error::{AppError, Result};
use crate::port::{ByteFifo, Handler};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Queue that suppresses a push while an item with the same key is queued
/// or being handled.
///
/// A key enters the set at push time and leaves only after the handler has
/// returned for its item and the item is done (success or permanent
/// failure). With a durable backend the set is rebuilt from the stored
/// records at construction, so a restart does not admit duplicates of
/// replayed work.
pub struct UniqueQueue<T> {
    queue: Queue<T>,
    keys: Arc<UniqueSet>,
}

impl<T> Clone for UniqueQueue<T> {
    fn clone(&self) -> Self {
        Self {
            queue: self.queue.clone(),
            keys: Arc::clone(&self.keys),
        }
    }
}

impl<T: Payload> UniqueQueue<T> {
    /// Channel-only unique queue
    pub async fn new(config: QueueConfig, handler: Arc<dyn Handler<T>>) -> Result<Self> {
        Self::from_builder(Queue::builder(config, handler)).await
    }

    /// Unique queue backed by `fifo`
    pub async fn durable(
        config: QueueConfig,
        handler: Arc<dyn Handler<T>>,
        fifo: Arc<dyn ByteFifo>,
    ) -> Result<Self> {
        Self::from_builder(Queue::builder(config, handler).backend(fifo)).await
    }

    /// Build from a configured queue builder, rebuilding the key set from
    /// the backend when there is one
    pub async fn from_builder(builder: QueueBuilder<T>) -> Result<Self> {
        let keys = Arc::new(UniqueSet::new());
        let queue = builder.unique(Arc::clone(&keys)).build()?;

        if let Some(store) = queue.store() {
            let stored = store.keys().await?;
            if !stored.is_empty() {
                info!(queue = %queue.name(), keys = stored.len(), "Rebuilt unique keys from backend");
            }
            keys.extend(stored);
        }

        Ok(Self { queue, keys })
    }

    pub fn name(&self) -> &str {
        self.queue.name()
    }

    pub fn config(&self) -> &QueueConfig {
        self.queue.config()
    }

    pub fn state(&self) -> QueueState {
        self.queue.state()
    }

    /// Enqueue `data` under `key` unless the key is already outstanding
    pub async fn push(&self, data: T, key: impl Into<String>) -> Result<PushOutcome> {
        let key = key.into();
        if key.is_empty() {
            return Err(AppError::Validation("unique key cannot be empty".to_string()));
        }

        if !self.keys.insert_if_absent(&key) {
            debug!(queue = %self.name(), key = %key, "Duplicate key suppressed");
            return Ok(PushOutcome::Duplicate);
        }

        match self.queue.push(Item::keyed(data, key.clone())).await {
            Ok(PushOutcome::Dropped) => {
                self.keys.remove(&key);
                Ok(PushOutcome::Dropped)
            }
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                self.keys.remove(&key);
                Err(e)
            }
        }
    }

    /// True while an item with `key` is queued or in flight
    pub fn has(&self, key: &str) -> bool {
        self.keys.contains(key)
    }

    pub fn run(&self, token: ShutdownToken) {
        self.queue.run(token);
    }

    pub async fn flush(&self, timeout: Duration) -> bool {
        self.queue.flush(timeout).await
    }

    pub async fn shutdown(&self) {
        self.queue.shutdown().await;
    }

    pub async fn terminate(&self) {
        self.queue.terminate().await;
    }

    pub async fn stats(&self) -> QueueStats {
        QueueStats {
            unique: true,
            ..self.queue.stats().await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::worker::shutdown_channel;
    use crate::port::byte_fifo::MockByteFifo;
    use crate::port::{handler_fn, MemoryByteFifo};
    use tokio::sync::Semaphore;

    fn gated(gate: Arc<Semaphore>) -> Arc<dyn Handler<u64>> {
        handler_fn(move |_batch: Vec<Item<u64>>| {
            let gate = Arc::clone(&gate);
            async move {
                gate.acquire().await.unwrap().forget();
                Vec::new()
            }
        })
    }

    #[tokio::test]
    async fn test_duplicate_suppressed_until_handled() {
        let gate = Arc::new(Semaphore::new(0));
        let queue = UniqueQueue::new(QueueConfig::new("pr_patch_checker"), gated(Arc::clone(&gate)))
            .await
            .unwrap();
        let (_tx, token) = shutdown_channel();
        queue.run(token);

        assert_eq!(queue.push(2, "2").await.unwrap(), PushOutcome::Dispatched);
        assert_eq!(queue.push(2, "2").await.unwrap(), PushOutcome::Duplicate);
        assert!(queue.has("2"));
        assert!(!queue.has("3"));

        // Still in flight: the handler is blocked on the gate
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(queue.has("2"));
        assert_eq!(queue.push(2, "2").await.unwrap(), PushOutcome::Duplicate);

        gate.add_permits(10);
        assert!(queue.flush(Duration::from_secs(2)).await);
        assert!(!queue.has("2"));
        assert_eq!(queue.push(2, "2").await.unwrap(), PushOutcome::Dispatched);
    }

    #[tokio::test]
    async fn test_keys_rebuilt_from_backend() {
        let fifo: Arc<dyn ByteFifo> = Arc::new(MemoryByteFifo::new());
        let gate = Arc::new(Semaphore::new(100));

        let first = UniqueQueue::durable(QueueConfig::new("checks"), gated(Arc::clone(&gate)), Arc::clone(&fifo))
            .await
            .unwrap();
        assert_eq!(first.push(1, "a").await.unwrap(), PushOutcome::Persisted);
        assert_eq!(first.push(2, "b").await.unwrap(), PushOutcome::Persisted);
        drop(first);

        let second = UniqueQueue::durable(QueueConfig::new("checks"), gated(gate), Arc::clone(&fifo))
            .await
            .unwrap();
        assert!(second.has("a"));
        assert!(second.has("b"));
        assert_eq!(second.push(1, "a").await.unwrap(), PushOutcome::Duplicate);

        let (_tx, token) = shutdown_channel();
        second.run(token);
        assert!(second.flush(Duration::from_secs(2)).await);
        assert!(!second.has("a"));
        assert!(!second.has("b"));
    }

    #[tokio::test]
    async fn test_rejected_push_rolls_back_key() {
        let gate = Arc::new(Semaphore::new(0));
        let config = QueueConfig::new("tight").with_queue_length(1).without_boost();
        let queue = UniqueQueue::new(config, gated(gate)).await.unwrap();

        queue.push(1, "one").await.unwrap();
        let err = queue.push(2, "two").await.unwrap_err();
        assert!(matches!(err, AppError::ChannelFull(_)));
        assert!(queue.has("one"));
        assert!(!queue.has("two"));
    }

    #[tokio::test]
    async fn test_backend_failure_rolls_back_key() {
        let mut fifo = MockByteFifo::new();
        fifo.expect_snapshot().returning(|| Ok(Vec::new()));
        fifo.expect_push()
            .returning(|_| Err(AppError::Backend("disk full".to_string())));

        let queue = UniqueQueue::durable(
            QueueConfig::new("failing"),
            gated(Arc::new(Semaphore::new(0))),
            Arc::new(fifo),
        )
        .await
        .unwrap();

        let err = queue.push(7, "seven").await.unwrap_err();
        assert!(matches!(err, AppError::Backend(_)));
        assert!(!queue.has("seven"));
    }

    #[tokio::test]
    async fn test_empty_key_rejected() {
        let queue = UniqueQueue::new(QueueConfig::new("q"), gated(Arc::new(Semaphore::new(0))))
            .await
            .unwrap();
        let err = queue.push(1, "").await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_stats_marked_unique() {
        let queue = UniqueQueue::new(QueueConfig::new("q"), gated(Arc::new(Semaphore::new(0))))
            .await
            .unwrap();
        let stats = queue.stats().await;
        assert!(stats.unique);
        assert_eq!(stats.name, "q");
    }
}
