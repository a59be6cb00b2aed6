// Queue Manager - process-wide registry and coordinated shutdown

use crate::application::queue::Queue;
use crate::application::unique_queue::UniqueQueue;
use crate::application::worker::{shutdown_channel, ShutdownSender, ShutdownToken};
use crate::domain::{DomainError, Item, Payload, PushOutcome, QueueId, QueueStats};
use crate::error::{AppError, Result};
use async_trait::async_trait;
use futures::future::join_all;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;
use tracing::{info, warn};

/// Type-erased view of a queue, as the manager and admin surface see it
#[async_trait]
pub trait ManagedQueue: Send + Sync {
    fn name(&self) -> &str;

    fn is_unique(&self) -> bool;

    /// Start the queue, following `token` for shutdown and terminate
    fn run(&self, token: ShutdownToken);

    async fn stats(&self) -> QueueStats;

    async fn flush(&self, timeout: Duration) -> bool;

    async fn shutdown(&self);

    async fn terminate(&self);

    /// Push a JSON payload decoded into the queue's item type
    async fn push_json(&self, payload: Value, key: Option<String>) -> Result<PushOutcome>;

    /// Key membership (unique queues only)
    fn has(&self, key: &str) -> Result<bool>;
}

fn decode_payload<T: Payload>(queue: &str, payload: Value) -> Result<T> {
    serde_json::from_value(payload).map_err(|e| {
        AppError::Validation(format!("payload does not fit queue '{}': {}", queue, e))
    })
}

#[async_trait]
impl<T: Payload> ManagedQueue for Queue<T> {
    fn name(&self) -> &str {
        Queue::name(self)
    }

    fn is_unique(&self) -> bool {
        false
    }

    fn run(&self, token: ShutdownToken) {
        Queue::run(self, token)
    }

    async fn stats(&self) -> QueueStats {
        Queue::stats(self).await
    }

    async fn flush(&self, timeout: Duration) -> bool {
        Queue::flush(self, timeout).await
    }

    async fn shutdown(&self) {
        Queue::shutdown(self).await
    }

    async fn terminate(&self) {
        Queue::terminate(self).await
    }

    async fn push_json(&self, payload: Value, key: Option<String>) -> Result<PushOutcome> {
        let data: T = decode_payload(Queue::name(self), payload)?;
        let item = match key {
            Some(key) => Item::keyed(data, key),
            None => Item::new(data),
        };
        Queue::push(self, item).await
    }

    fn has(&self, _key: &str) -> Result<bool> {
        Err(AppError::Validation(format!(
            "queue '{}' is not a unique queue",
            Queue::name(self)
        )))
    }
}

#[async_trait]
impl<T: Payload> ManagedQueue for UniqueQueue<T> {
    fn name(&self) -> &str {
        UniqueQueue::name(self)
    }

    fn is_unique(&self) -> bool {
        true
    }

    fn run(&self, token: ShutdownToken) {
        UniqueQueue::run(self, token)
    }

    async fn stats(&self) -> QueueStats {
        UniqueQueue::stats(self).await
    }

    async fn flush(&self, timeout: Duration) -> bool {
        UniqueQueue::flush(self, timeout).await
    }

    async fn shutdown(&self) {
        UniqueQueue::shutdown(self).await
    }

    async fn terminate(&self) {
        UniqueQueue::terminate(self).await
    }

    async fn push_json(&self, payload: Value, key: Option<String>) -> Result<PushOutcome> {
        let key = key.ok_or_else(|| {
            AppError::Validation(format!(
                "queue '{}' is unique, a key is required",
                UniqueQueue::name(self)
            ))
        })?;
        let data: T = decode_payload(UniqueQueue::name(self), payload)?;
        UniqueQueue::push(self, data, key).await
    }

    fn has(&self, key: &str) -> Result<bool> {
        Ok(UniqueQueue::has(self, key))
    }
}

/// Registry of named queues.
///
/// Built once by the composition root and passed where needed. Owns the
/// shutdown sender; queues receive its tokens in `run`.
pub struct Manager {
    queues: RwLock<BTreeMap<QueueId, Arc<dyn ManagedQueue>>>,
    lifecycle: ShutdownSender,
}

impl Manager {
    pub fn new() -> Self {
        let (lifecycle, _token) = shutdown_channel();
        Self {
            queues: RwLock::new(BTreeMap::new()),
            lifecycle,
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, BTreeMap<QueueId, Arc<dyn ManagedQueue>>> {
        self.queues.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, BTreeMap<QueueId, Arc<dyn ManagedQueue>>> {
        self.queues.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Token observing this manager's shutdown and terminate broadcasts
    pub fn token(&self) -> ShutdownToken {
        self.lifecycle.token()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.token().is_shutdown()
    }

    /// Add a queue under its name
    pub fn register(&self, queue: Arc<dyn ManagedQueue>) -> Result<()> {
        if self.is_shutting_down() {
            return Err(AppError::ShutDown("manager".to_string()));
        }

        let name = queue.name().to_string();
        let mut queues = self.write();
        if queues.contains_key(&name) {
            return Err(DomainError::DuplicateQueue(name).into());
        }
        queues.insert(name.clone(), queue);
        info!(queue = %name, "Queue registered");
        Ok(())
    }

    /// Register and start a queue on this manager's token
    pub fn register_and_run(&self, queue: Arc<dyn ManagedQueue>) -> Result<()> {
        self.register(Arc::clone(&queue))?;
        queue.run(self.token());
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ManagedQueue>> {
        self.read().get(name).cloned()
    }

    /// Like `get`, failing with `QueueNotFound`
    pub fn require(&self, name: &str) -> Result<Arc<dyn ManagedQueue>> {
        self.get(name)
            .ok_or_else(|| DomainError::QueueNotFound(name.to_string()).into())
    }

    /// Registered names in order
    pub fn names(&self) -> Vec<QueueId> {
        self.read().keys().cloned().collect()
    }

    fn snapshot(&self) -> Vec<Arc<dyn ManagedQueue>> {
        self.read().values().cloned().collect()
    }

    pub async fn stats(&self) -> Vec<QueueStats> {
        join_all(self.snapshot().iter().map(|queue| queue.stats())).await
    }

    /// Flush every queue concurrently; true only if all drained in time
    pub async fn flush_all(&self, timeout: Duration) -> bool {
        let queues = self.snapshot();
        let results = join_all(queues.iter().map(|queue| queue.flush(timeout))).await;

        let mut drained = true;
        for (queue, flushed) in queues.iter().zip(results) {
            if !flushed {
                warn!(queue = %queue.name(), "Flush timed out");
                drained = false;
            }
        }
        drained
    }

    /// Two-phase shutdown: graceful for up to `grace`, then terminate.
    ///
    /// Returns true when every queue finished its graceful phase in time.
    pub async fn shutdown(&self, grace: Duration) -> bool {
        let queues = self.snapshot();
        info!(
            queues = queues.len(),
            grace_ms = grace.as_millis() as u64,
            "Shutting down queues"
        );

        self.lifecycle.shutdown();
        let graceful = tokio::time::timeout(
            grace,
            join_all(queues.iter().map(|queue| queue.shutdown())),
        )
        .await
        .is_ok();
        if !graceful {
            warn!(
                grace_ms = grace.as_millis() as u64,
                "Grace period elapsed, terminating remaining work"
            );
        }

        self.lifecycle.terminate();
        join_all(queues.iter().map(|queue| queue.terminate())).await;
        info!("All queues terminated");
        graceful
    }
}

impl Default for Manager {
    fn default() -> Self {
        Self::new()
    }
}
