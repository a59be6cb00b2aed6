// Queue - worker pool plus optional durable overflow

use crate::application::codec::{Codec, JsonCodec};
use crate::application::durable::DurableStore;
use crate::application::unique_set::UniqueSet;
use crate::application::worker::constants::{
    ERROR_RECOVERY_SLEEP_DURATION, FLUSH_POLL_DURATION, PUMP_POLL_DURATION,
};
use crate::application::worker::{
    shutdown_channel, ShutdownSender, ShutdownToken, TryPushError, WorkerPool,
};
use crate::domain::{Item, OverflowPolicy, Payload, PushOutcome, QueueConfig, QueueState, QueueStats};
use crate::error::{AppError, Result};
use crate::port::{ByteFifo, Handler, TimeProvider};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};
use tracing::{debug, error, info, warn};

struct QueueInner<T> {
    pool: WorkerPool<T>,
    store: Option<Arc<DurableStore<T>>>,
    state: Mutex<QueueState>,
    /// Set once the startup replay has emptied the backend
    replayed: AtomicBool,
    terminated: AtomicBool,
    /// Record popped by the pump but not yet on the channel
    in_transit: AtomicUsize,
    /// Wakes the pump when a push lands in the backend
    overflowed: Notify,
    /// Stops the pump ahead of the pool
    halt: ShutdownSender,
    pump: Mutex<Option<JoinHandle<()>>>,
    /// Serializes graceful shutdown
    stopping: tokio::sync::Mutex<()>,
}

/// Builder for [`Queue`]
pub struct QueueBuilder<T> {
    config: QueueConfig,
    handler: Arc<dyn Handler<T>>,
    backend: Option<Arc<dyn ByteFifo>>,
    codec: Option<Arc<dyn Codec<T>>>,
    unique: Option<Arc<UniqueSet>>,
    time_provider: Option<Arc<dyn TimeProvider>>,
}

impl<T: Payload> QueueBuilder<T> {
    /// Durable backend for overflow, pre-run pushes and shutdown residue
    pub fn backend(mut self, fifo: Arc<dyn ByteFifo>) -> Self {
        self.backend = Some(fifo);
        self
    }

    /// Record codec (JSON by default)
    pub fn codec(mut self, codec: Arc<dyn Codec<T>>) -> Self {
        self.codec = Some(codec);
        self
    }

    pub fn time_provider(mut self, time_provider: Arc<dyn TimeProvider>) -> Self {
        self.time_provider = Some(time_provider);
        self
    }

    pub(crate) fn unique(mut self, set: Arc<UniqueSet>) -> Self {
        self.unique = Some(set);
        self
    }

    pub fn build(self) -> Result<Queue<T>> {
        let store = self.backend.map(|fifo| {
            let codec = self
                .codec
                .unwrap_or_else(|| Arc::new(JsonCodec) as Arc<dyn Codec<T>>);
            Arc::new(DurableStore::with_codec(self.config.name.clone(), fifo, codec))
        });

        let mut pool = WorkerPool::builder(self.config, self.handler);
        if let Some(store) = &store {
            pool = pool.overflow(Arc::clone(store));
        }
        if let Some(unique) = self.unique {
            pool = pool.unique(unique);
        }
        if let Some(time_provider) = self.time_provider {
            pool = pool.time_provider(time_provider);
        }
        let pool = pool.build()?;

        let (halt, _token) = shutdown_channel();
        Ok(Queue {
            inner: Arc::new(QueueInner {
                replayed: AtomicBool::new(store.is_none()),
                pool,
                store,
                state: Mutex::new(QueueState::Created),
                terminated: AtomicBool::new(false),
                in_transit: AtomicUsize::new(0),
                overflowed: Notify::new(),
                halt,
                pump: Mutex::new(None),
                stopping: tokio::sync::Mutex::new(()),
            }),
        })
    }
}

/// Named queue: a worker pool fed directly, or through a durable backend
/// when the channel cannot take an item.
///
/// With a backend, pushes before `run`, during the startup replay, on a full
/// channel, or after shutdown are written to the backend and reported as
/// [`PushOutcome::Persisted`]. Without one, a full channel follows the
/// configured [`OverflowPolicy`].
pub struct Queue<T> {
    inner: Arc<QueueInner<T>>,
}

impl<T> Clone for Queue<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Payload> Queue<T> {
    /// Channel-only queue
    pub fn new(config: QueueConfig, handler: Arc<dyn Handler<T>>) -> Result<Self> {
        Self::builder(config, handler).build()
    }

    /// Queue backed by `fifo`
    pub fn durable(
        config: QueueConfig,
        handler: Arc<dyn Handler<T>>,
        fifo: Arc<dyn ByteFifo>,
    ) -> Result<Self> {
        Self::builder(config, handler).backend(fifo).build()
    }

    pub fn builder(config: QueueConfig, handler: Arc<dyn Handler<T>>) -> QueueBuilder<T> {
        QueueBuilder {
            config,
            handler,
            backend: None,
            codec: None,
            unique: None,
            time_provider: None,
        }
    }

    pub fn name(&self) -> &str {
        self.inner.pool.name()
    }

    pub fn config(&self) -> &QueueConfig {
        self.inner.pool.config()
    }

    pub fn is_durable(&self) -> bool {
        self.inner.store.is_some()
    }

    pub fn state(&self) -> QueueState {
        *self.inner.state()
    }

    pub(crate) fn store(&self) -> Option<&Arc<DurableStore<T>>> {
        self.inner.store.as_ref()
    }

    /// Enqueue an item
    pub async fn push(&self, item: Item<T>) -> Result<PushOutcome> {
        if self.inner.terminated.load(Ordering::SeqCst) {
            return Err(AppError::ShutDown(self.name().to_string()));
        }

        match &self.inner.store {
            Some(store) => {
                let item = if self.inner.channel_open() {
                    match self.inner.pool.try_push(item) {
                        Ok(()) => return Ok(PushOutcome::Dispatched),
                        Err(rejected) => rejected.into_item(),
                    }
                } else {
                    item
                };

                store.push(&item).await?;
                self.inner.overflowed.notify_one();
                debug!(queue = %self.name(), key = ?item.key(), "Item persisted to backend");
                Ok(PushOutcome::Persisted)
            }
            None => self.push_channel(item).await,
        }
    }

    async fn push_channel(&self, item: Item<T>) -> Result<PushOutcome> {
        let name = self.name();
        let item = match self.inner.pool.try_push(item) {
            Ok(()) => return Ok(PushOutcome::Dispatched),
            Err(TryPushError::Closed(_)) => return Err(AppError::ShutDown(name.to_string())),
            Err(TryPushError::Full(item)) => item,
        };

        match self.config().overflow {
            OverflowPolicy::Reject => Err(AppError::ChannelFull(name.to_string())),
            OverflowPolicy::Drop => {
                warn!(queue = %name, key = ?item.key(), "Channel full, item dropped");
                Ok(PushOutcome::Dropped)
            }
            OverflowPolicy::Block => {
                let wait = self.config().block_timeout();
                match self.inner.pool.push_timeout(item, wait).await {
                    Ok(()) => Ok(PushOutcome::Dispatched),
                    Err(TryPushError::Closed(_)) => Err(AppError::ShutDown(name.to_string())),
                    Err(TryPushError::Full(_)) => Err(AppError::ChannelFull(format!(
                        "{} (blocked {}ms)",
                        name,
                        wait.as_millis()
                    ))),
                }
            }
        }
    }

    /// Start workers and the backend replay, then follow `token`
    pub fn run(&self, token: ShutdownToken) {
        {
            let mut state = self.inner.state();
            if *state != QueueState::Created {
                warn!(queue = %self.name(), state = %*state, "Queue already run");
                return;
            }
            *state = QueueState::Running;
        }

        self.inner.pool.start();
        if let Some(store) = &self.inner.store {
            let pump = tokio::spawn(Arc::clone(&self.inner).pump(Arc::clone(store)));
            *self.inner.pump_handle() = Some(pump);
        }
        info!(queue = %self.name(), durable = self.is_durable(), "Queue running");

        let queue = self.clone();
        tokio::spawn(async move {
            let mut token = token;
            let mut terminate = token.clone();
            token.wait_shutdown().await;
            tokio::select! {
                _ = queue.shutdown() => {}
                _ = terminate.wait_terminate() => {}
            }
            token.wait_terminate().await;
            queue.terminate().await;
        });
    }

    /// Wait until channel, in-flight work, pending retries and backend are
    /// empty. Returns false if `timeout` elapses first.
    pub async fn flush(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.is_drained().await {
                return true;
            }
            if Instant::now() >= deadline {
                debug!(queue = %self.name(), outstanding = self.inner.pool.outstanding(), "Flush timed out");
                return false;
            }
            sleep(FLUSH_POLL_DURATION).await;
        }
    }

    async fn is_drained(&self) -> bool {
        if self.inner.pool.outstanding() > 0 || self.inner.in_transit.load(Ordering::SeqCst) > 0 {
            return false;
        }
        match &self.inner.store {
            Some(store) => match store.len().await {
                Ok(len) => len == 0,
                Err(e) => {
                    warn!(queue = %self.name(), error = %e, "Backend length unavailable");
                    false
                }
            },
            None => true,
        }
    }

    /// Stop accepting non-durable work and let in-flight work finish.
    ///
    /// The pump stops first, then the pool; with a backend the channel
    /// residue ends up there. Idempotent.
    pub async fn shutdown(&self) {
        let _stopping = self.inner.stopping.lock().await;
        if matches!(self.state(), QueueState::Stopped | QueueState::Terminated) {
            return;
        }
        self.inner.set_state(QueueState::ShuttingDown);
        info!(queue = %self.name(), "Queue shutting down");

        self.inner.halt.shutdown();
        let pump = self.inner.pump_handle().take();
        if let Some(pump) = pump {
            if let Err(e) = pump.await {
                if e.is_panic() {
                    error!(queue = %self.name(), "Backend pump panicked");
                }
            }
        }

        self.inner.pool.shutdown().await;
        self.inner.set_state(QueueState::Stopped);
        info!(queue = %self.name(), "Queue stopped");
    }

    /// Abandon in-flight work and close the backend. Idempotent.
    pub async fn terminate(&self) {
        if self.inner.terminated.swap(true, Ordering::SeqCst) {
            return;
        }

        self.inner.halt.terminate();
        let pump = self.inner.pump_handle().take();
        if let Some(pump) = pump {
            pump.abort();
        }
        self.inner.pool.terminate().await;

        if let Some(store) = &self.inner.store {
            if let Err(e) = store.close().await {
                warn!(queue = %self.name(), error = %e, "Failed to close backend");
            }
        }
        self.inner.set_state(QueueState::Terminated);
        info!(queue = %self.name(), "Queue terminated");
    }

    pub async fn stats(&self) -> QueueStats {
        let config = self.config();
        let backend_len = match &self.inner.store {
            Some(store) => match store.len().await {
                Ok(len) => Some(len),
                Err(e) => {
                    warn!(queue = %self.name(), error = %e, "Backend length unavailable");
                    None
                }
            },
            None => None,
        };

        QueueStats {
            name: self.name().to_string(),
            unique: false,
            state: self.state(),
            workers: self.inner.pool.live_workers(),
            base_workers: config.workers,
            max_workers: config.max_workers(),
            boosted: self.inner.pool.is_boosted(),
            channel_len: self.inner.pool.channel_len(),
            backend_len,
            outstanding: self.inner.pool.outstanding()
                + self.inner.in_transit.load(Ordering::SeqCst),
        }
    }
}

impl<T: Payload> QueueInner<T> {
    fn state(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn pump_handle(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.pump.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Terminated is final
    fn set_state(&self, next: QueueState) {
        let mut state = self.state();
        if *state != QueueState::Terminated {
            *state = next;
        }
    }

    /// Live channel path: running, replay finished, pool accepting
    fn channel_open(&self) -> bool {
        *self.state() == QueueState::Running
            && self.replayed.load(Ordering::SeqCst)
            && self.pool.is_accepting()
    }

    /// Replay the backend into the channel, then keep moving later overflow
    async fn pump(self: Arc<Self>, store: Arc<DurableStore<T>>) {
        let name = self.pool.name().to_string();
        let mut halt = self.halt.token();

        let replayed = match self.drain_backend(&store).await {
            Some(count) => count,
            None => return,
        };
        self.replayed.store(true, Ordering::SeqCst);
        info!(queue = %name, replayed, "Backend replay complete");

        loop {
            tokio::select! {
                _ = self.overflowed.notified() => {}
                _ = sleep(PUMP_POLL_DURATION) => {}
                _ = halt.wait_shutdown() => return,
            }
            if self.drain_backend(&store).await.is_none() {
                return;
            }
        }
    }

    /// Stays in transit until the write lands
    async fn return_to_backend(&self, store: &DurableStore<T>, item: &Item<T>) {
        if let Err(e) = store.push(item).await {
            error!(queue = %self.pool.name(), key = ?item.key(), error = %e, "Failed to return record to backend");
        }
        self.in_transit.store(0, Ordering::SeqCst);
    }

    /// Move records front-to-back onto the channel until the backend is
    /// empty. None when halted.
    async fn drain_backend(&self, store: &DurableStore<T>) -> Option<usize> {
        let name = self.pool.name();
        let mut halt = self.halt.token();
        let mut moved = 0;

        loop {
            if halt.is_shutdown() {
                return None;
            }

            // Mark before popping so a flush never sees the record nowhere
            self.in_transit.store(1, Ordering::SeqCst);
            let item = match store.pop().await {
                Ok(Some(item)) => item,
                Ok(None) => {
                    self.in_transit.store(0, Ordering::SeqCst);
                    return Some(moved);
                }
                Err(AppError::Serialization(e)) => {
                    self.in_transit.store(0, Ordering::SeqCst);
                    warn!(queue = %name, error = %e, "Skipping undecodable record");
                    continue;
                }
                Err(e) => {
                    self.in_transit.store(0, Ordering::SeqCst);
                    error!(queue = %name, error = %e, "Backend pop failed");
                    tokio::select! {
                        _ = sleep(ERROR_RECOVERY_SLEEP_DURATION) => continue,
                        _ = halt.wait_shutdown() => return None,
                    }
                }
            };

            match self.pool.push_wait(item, self.halt.token()).await {
                Ok(()) => {
                    self.in_transit.store(0, Ordering::SeqCst);
                    moved += 1;
                }
                Err(rejected) => {
                    // Halted while waiting for capacity: the record goes back
                    let item = rejected.into_item();
                    self.return_to_backend(store, &item).await;
                    return None;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::handler::mocks::RecordingHandler;
    use crate::port::{handler_fn, MemoryByteFifo};
    use tokio::sync::Semaphore;

    fn recording() -> (Arc<RecordingHandler<u32>>, Arc<dyn Handler<u32>>) {
        let handler = Arc::new(RecordingHandler::new());
        let dyn_handler: Arc<dyn Handler<u32>> = handler.clone();
        (handler, dyn_handler)
    }

    fn blocked_handler(gate: Arc<Semaphore>) -> Arc<dyn Handler<u32>> {
        handler_fn(move |_batch: Vec<Item<u32>>| {
            let gate = Arc::clone(&gate);
            async move {
                gate.acquire().await.unwrap().forget();
                Vec::new()
            }
        })
    }

    /// Memory ring whose pushes wait for a permit
    struct GatedFifo {
        inner: MemoryByteFifo,
        gate: Arc<Semaphore>,
    }

    #[async_trait::async_trait]
    impl ByteFifo for GatedFifo {
        async fn push(&self, data: Vec<u8>) -> Result<()> {
            self.gate.acquire().await.unwrap().forget();
            self.inner.push(data).await
        }

        async fn pop(&self) -> Result<Option<Vec<u8>>> {
            self.inner.pop().await
        }

        async fn len(&self) -> Result<usize> {
            self.inner.len().await
        }

        async fn snapshot(&self) -> Result<Vec<Vec<u8>>> {
            self.inner.snapshot().await
        }
    }

    #[tokio::test]
    async fn test_returned_record_counts_until_written() {
        let gate = Arc::new(Semaphore::new(0));
        let fifo = Arc::new(GatedFifo {
            inner: MemoryByteFifo::new(),
            gate: Arc::clone(&gate),
        });
        let (_, dyn_handler) = recording();
        let queue = Queue::durable(QueueConfig::new("returning"), dyn_handler, fifo.clone()).unwrap();

        // Popped record on its way back after a halt
        let inner = Arc::clone(&queue.inner);
        inner.in_transit.store(1, Ordering::SeqCst);
        let returning = tokio::spawn(async move {
            let store = inner.store.clone().unwrap();
            inner.return_to_backend(&store, &Item::new(7)).await;
        });

        // Write blocked: the record is in neither place yet
        assert!(!queue.flush(Duration::from_millis(50)).await);
        assert_eq!(queue.stats().await.outstanding, 1);
        assert_eq!(fifo.len().await.unwrap(), 0);

        gate.add_permits(1);
        returning.await.unwrap();
        assert_eq!(queue.inner.in_transit.load(Ordering::SeqCst), 0);
        assert_eq!(fifo.len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_channel_queue_delivers_each_push_once() {
        let (handler, dyn_handler) = recording();
        let queue = Queue::new(QueueConfig::new("plain"), dyn_handler).unwrap();
        let (_tx, token) = shutdown_channel();
        queue.run(token);

        for i in 0..10 {
            assert_eq!(queue.push(Item::new(i)).await.unwrap(), PushOutcome::Dispatched);
        }
        assert!(queue.flush(Duration::from_secs(2)).await);

        let mut seen = handler.seen();
        seen.sort();
        assert_eq!(seen, (0..10).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_backpressure_without_backend() {
        let gate = Arc::new(Semaphore::new(0));
        let config = QueueConfig::new("tight")
            .with_queue_length(1)
            .with_batch_length(1)
            .without_boost();
        let queue = Queue::new(config, blocked_handler(Arc::clone(&gate))).unwrap();
        let (_tx, token) = shutdown_channel();
        queue.run(token);

        queue.push(Item::new(1)).await.unwrap();
        // Wait for the worker to pick it up and block
        assert!(
            tokio::time::timeout(Duration::from_secs(1), async {
                while queue.inner.pool.channel_len() > 0 {
                    sleep(Duration::from_millis(5)).await;
                }
            })
            .await
            .is_ok()
        );
        queue.push(Item::new(2)).await.unwrap();

        let err = queue.push(Item::new(3)).await.unwrap_err();
        assert!(matches!(err, AppError::ChannelFull(_)));
        assert!(err.is_backpressure());

        gate.add_permits(10);
        assert!(queue.flush(Duration::from_secs(2)).await);
    }

    #[tokio::test]
    async fn test_drop_and_block_policies() {
        let gate = Arc::new(Semaphore::new(0));
        let config = QueueConfig::new("dropping")
            .with_queue_length(1)
            .without_boost()
            .with_overflow(OverflowPolicy::Drop);
        // Not run: nothing consumes the channel
        let queue = Queue::new(config.clone(), blocked_handler(Arc::clone(&gate))).unwrap();
        assert_eq!(queue.push(Item::new(1)).await.unwrap(), PushOutcome::Dispatched);
        assert_eq!(queue.push(Item::new(2)).await.unwrap(), PushOutcome::Dropped);

        let config = config
            .with_overflow(OverflowPolicy::Block)
            .with_block_timeout(Duration::from_millis(50));
        let queue = Queue::new(config, blocked_handler(gate)).unwrap();
        queue.push(Item::new(1)).await.unwrap();
        let started = Instant::now();
        let err = queue.push(Item::new(2)).await.unwrap_err();
        assert!(matches!(err, AppError::ChannelFull(_)));
        assert!(started.elapsed() >= Duration::from_millis(50));
    }

    #[tokio::test]
    async fn test_durable_queue_replays_after_restart() {
        let fifo: Arc<dyn ByteFifo> = Arc::new(MemoryByteFifo::new());

        // First life: never run, every push lands in the backend
        let (_, dyn_handler) = recording();
        let first = Queue::durable(QueueConfig::new("durable"), dyn_handler, Arc::clone(&fifo))
            .unwrap();
        for i in 0..5 {
            assert_eq!(first.push(Item::new(i)).await.unwrap(), PushOutcome::Persisted);
        }
        drop(first);
        assert_eq!(fifo.len().await.unwrap(), 5);

        // Second life on the same backend
        let (handler, dyn_handler) = recording();
        let second = Queue::durable(QueueConfig::new("durable"), dyn_handler, Arc::clone(&fifo))
            .unwrap();
        let (_tx, token) = shutdown_channel();
        second.run(token);

        assert!(second.flush(Duration::from_secs(2)).await);
        let mut seen = handler.seen();
        seen.sort();
        assert_eq!(seen, vec![0, 1, 2, 3, 4]);
        assert_eq!(fifo.len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_durable_queue_overflows_to_backend() {
        let gate = Arc::new(Semaphore::new(0));
        let fifo = Arc::new(MemoryByteFifo::new());
        let config = QueueConfig::new("overflowing")
            .with_queue_length(2)
            .with_batch_length(1)
            .without_boost();
        let queue = Queue::durable(config, blocked_handler(Arc::clone(&gate)), fifo.clone()).unwrap();
        let (_tx, token) = shutdown_channel();
        queue.run(token);

        // Wait for the (empty) replay to finish
        assert!(queue.flush(Duration::from_secs(1)).await);

        let mut persisted = 0;
        for i in 0..10 {
            if queue.push(Item::new(i)).await.unwrap() == PushOutcome::Persisted {
                persisted += 1;
            }
        }
        assert!(persisted >= 7, "persisted {}", persisted);

        gate.add_permits(100);
        assert!(queue.flush(Duration::from_secs(5)).await);
        assert_eq!(fifo.len().await.unwrap(), 0);
        assert_eq!(queue.stats().await.outstanding, 0);
    }

    #[tokio::test]
    async fn test_shutdown_ordering() {
        // Non-durable: rejected after shutdown
        let (_, dyn_handler) = recording();
        let plain = Queue::new(QueueConfig::new("plain"), dyn_handler).unwrap();
        let (tx, token) = shutdown_channel();
        plain.run(token);
        plain.push(Item::new(1)).await.unwrap();
        assert!(plain.flush(Duration::from_secs(1)).await);
        plain.shutdown().await;
        assert_eq!(plain.state(), QueueState::Stopped);
        assert!(matches!(
            plain.push(Item::new(2)).await,
            Err(AppError::ShutDown(_))
        ));
        tx.terminate();

        // Durable: lands in the backend after shutdown
        let fifo = Arc::new(MemoryByteFifo::new());
        let (_, dyn_handler) = recording();
        let durable = Queue::durable(QueueConfig::new("durable"), dyn_handler, fifo.clone()).unwrap();
        let (_tx, token) = shutdown_channel();
        durable.run(token);
        durable.shutdown().await;
        assert_eq!(durable.push(Item::new(3)).await.unwrap(), PushOutcome::Persisted);
        assert_eq!(fifo.len().await.unwrap(), 1);
        assert!(!durable.flush(Duration::from_millis(30)).await);
    }

    #[tokio::test]
    async fn test_token_drives_shutdown_and_terminate() {
        let (_, dyn_handler) = recording();
        let fifo = Arc::new(MemoryByteFifo::new());
        let queue = Queue::durable(QueueConfig::new("token"), dyn_handler, fifo).unwrap();
        let (tx, token) = shutdown_channel();
        queue.run(token);

        tx.shutdown();
        let stopped = tokio::time::timeout(Duration::from_secs(2), async {
            while queue.state() != QueueState::Stopped {
                sleep(Duration::from_millis(10)).await;
            }
        })
        .await;
        assert!(stopped.is_ok());

        tx.terminate();
        let terminated = tokio::time::timeout(Duration::from_secs(2), async {
            while queue.state() != QueueState::Terminated {
                sleep(Duration::from_millis(10)).await;
            }
        })
        .await;
        assert!(terminated.is_ok());
        assert!(matches!(
            queue.push(Item::new(1)).await,
            Err(AppError::ShutDown(_))
        ));
    }

    #[tokio::test]
    async fn test_stats_reflect_configuration() {
        let (_, dyn_handler) = recording();
        let config = QueueConfig::new("stats").with_workers(2);
        let queue = Queue::durable(config, dyn_handler, Arc::new(MemoryByteFifo::new())).unwrap();
        queue.push(Item::new(1)).await.unwrap();

        let stats = queue.stats().await;
        assert_eq!(stats.name, "stats");
        assert_eq!(stats.state, QueueState::Created);
        assert_eq!(stats.base_workers, 2);
        assert_eq!(stats.max_workers, 7);
        assert_eq!(stats.backend_len, Some(1));
        assert_eq!(stats.channel_len, 0);
        assert!(!stats.unique);
    }
}
