// Worker Pool - self-scaling batch consumers over a bounded channel

mod boost;
pub mod constants;
mod panic_guard;
mod shutdown;

pub use boost::{BoostAction, BoostController, BoostState};
pub use panic_guard::{execute_guarded_async, PanicGuardResult};
pub use shutdown::{shutdown_channel, Phase, ShutdownSender, ShutdownToken};

use crate::application::durable::DurableStore;
use crate::application::retry::{RetryDecision, RetryPolicy};
use crate::application::unique_set::UniqueSet;
use crate::domain::{Item, Payload, QueueConfig};
use crate::error::Result;
use crate::port::time_provider::MonotonicTimeProvider;
use crate::port::{Handler, TimeProvider};
use constants::*;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, timeout, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Item handed back by a push the pool could not take
#[derive(Debug)]
pub enum TryPushError<T> {
    /// Channel at capacity
    Full(Item<T>),
    /// Pool shutting down or stopped
    Closed(Item<T>),
}

impl<T> TryPushError<T> {
    pub fn into_item(self) -> Item<T> {
        match self {
            TryPushError::Full(item) | TryPushError::Closed(item) => item,
        }
    }
}

/// Live worker count and scaling state, mutated together
struct PoolState {
    live: usize,
    boost: BoostController,
}

struct PoolInner<T> {
    config: QueueConfig,
    handler: Arc<dyn Handler<T>>,
    retry: RetryPolicy,
    sender: mpsc::Sender<Item<T>>,
    receiver: tokio::sync::Mutex<mpsc::Receiver<Item<T>>>,
    state: Mutex<PoolState>,
    /// Channel + in-flight + waiting retries (+ items a caller holds a permit for)
    outstanding: AtomicUsize,
    accepting: AtomicBool,
    started: AtomicBool,
    /// Wakes the scaler on every push
    pushed: Notify,
    /// Signalled whenever a worker exits
    worker_exited: Notify,
    lifecycle: ShutdownSender,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    overflow: Option<Arc<DurableStore<T>>>,
    unique: Option<Arc<UniqueSet>>,
    time_provider: Arc<dyn TimeProvider>,
}

/// Builder for [`WorkerPool`]
pub struct WorkerPoolBuilder<T> {
    config: QueueConfig,
    handler: Arc<dyn Handler<T>>,
    overflow: Option<Arc<DurableStore<T>>>,
    unique: Option<Arc<UniqueSet>>,
    time_provider: Option<Arc<dyn TimeProvider>>,
}

impl<T: Payload> WorkerPoolBuilder<T> {
    /// Durable store that receives channel residue and pending retries at shutdown
    pub fn overflow(mut self, store: Arc<DurableStore<T>>) -> Self {
        self.overflow = Some(store);
        self
    }

    /// Key set released as items complete
    pub fn unique(mut self, set: Arc<UniqueSet>) -> Self {
        self.unique = Some(set);
        self
    }

    pub fn time_provider(mut self, time_provider: Arc<dyn TimeProvider>) -> Self {
        self.time_provider = Some(time_provider);
        self
    }

    pub fn build(self) -> Result<WorkerPool<T>> {
        self.config.validate()?;

        let (sender, receiver) = mpsc::channel(self.config.queue_length);
        let (lifecycle, _token) = shutdown_channel();
        let time_provider = self
            .time_provider
            .unwrap_or_else(|| Arc::new(MonotonicTimeProvider::new()) as Arc<dyn TimeProvider>);

        Ok(WorkerPool {
            inner: Arc::new(PoolInner {
                retry: RetryPolicy::from_config(&self.config),
                state: Mutex::new(PoolState {
                    live: 0,
                    boost: BoostController::from_config(&self.config),
                }),
                config: self.config,
                handler: self.handler,
                sender,
                receiver: tokio::sync::Mutex::new(receiver),
                outstanding: AtomicUsize::new(0),
                accepting: AtomicBool::new(true),
                started: AtomicBool::new(false),
                pushed: Notify::new(),
                worker_exited: Notify::new(),
                lifecycle,
                tasks: Mutex::new(Vec::new()),
                overflow: self.overflow,
                unique: self.unique,
                time_provider,
            }),
        })
    }
}

/// Self-scaling set of workers consuming batches from a bounded channel.
///
/// Base workers start on [`WorkerPool::start`]; the scaling task adds up to
/// `boost_workers` more while the backlog stays saturated, and workers above
/// the base count retire once idle after the boost window.
///
/// Shutdown has two modes:
/// - with an overflow store, workers finish their current batch and the
///   channel residue is written to the store
/// - without one, workers drain the channel until nothing is outstanding
pub struct WorkerPool<T> {
    inner: Arc<PoolInner<T>>,
}

impl<T> Clone for WorkerPool<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Payload> WorkerPool<T> {
    pub fn new(config: QueueConfig, handler: Arc<dyn Handler<T>>) -> Result<Self> {
        Self::builder(config, handler).build()
    }

    pub fn builder(config: QueueConfig, handler: Arc<dyn Handler<T>>) -> WorkerPoolBuilder<T> {
        WorkerPoolBuilder {
            config,
            handler,
            overflow: None,
            unique: None,
            time_provider: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.config.name
    }

    pub fn config(&self) -> &QueueConfig {
        &self.inner.config
    }

    /// Non-blocking enqueue
    pub fn try_push(&self, item: Item<T>) -> std::result::Result<(), TryPushError<T>> {
        self.inner.try_push(item)
    }

    /// Enqueue, waiting up to `wait` for channel capacity
    pub async fn push_timeout(
        &self,
        item: Item<T>,
        wait: Duration,
    ) -> std::result::Result<(), TryPushError<T>> {
        let item = match self.inner.try_push(item) {
            Err(TryPushError::Full(item)) => item,
            other => return other,
        };

        let mut token = self.inner.lifecycle.token();
        tokio::select! {
            permit = timeout(wait, self.inner.sender.reserve()) => match permit {
                Ok(Ok(permit)) => {
                    self.inner.outstanding.fetch_add(1, Ordering::SeqCst);
                    permit.send(item);
                    self.inner.pushed.notify_one();
                    Ok(())
                }
                Ok(Err(_)) => Err(TryPushError::Closed(item)),
                Err(_elapsed) => Err(TryPushError::Full(item)),
            },
            _ = token.wait_shutdown() => Err(TryPushError::Closed(item)),
        }
    }

    /// Enqueue, waiting for capacity until the pool or `stop` shuts down.
    ///
    /// Cancel safe: capacity is reserved before the item leaves the caller.
    pub async fn push_wait(
        &self,
        item: Item<T>,
        mut stop: ShutdownToken,
    ) -> std::result::Result<(), TryPushError<T>> {
        if !self.is_accepting() || stop.is_shutdown() {
            return Err(TryPushError::Closed(item));
        }
        let mut token = self.inner.lifecycle.token();
        tokio::select! {
            permit = self.inner.sender.reserve() => match permit {
                Ok(permit) => {
                    self.inner.outstanding.fetch_add(1, Ordering::SeqCst);
                    permit.send(item);
                    self.inner.pushed.notify_one();
                    Ok(())
                }
                Err(_) => Err(TryPushError::Closed(item)),
            },
            _ = token.wait_shutdown() => Err(TryPushError::Closed(item)),
            _ = stop.wait_shutdown() => Err(TryPushError::Closed(item)),
        }
    }

    /// Start base workers and the scaling task (idempotent)
    pub fn start(&self) {
        if self.inner.started.swap(true, Ordering::SeqCst) {
            return;
        }

        let base = self.inner.config.workers;
        self.inner.state().live = base;
        for _ in 0..base {
            Arc::clone(&self.inner).spawn_worker();
        }

        let scaler = tokio::spawn(Arc::clone(&self.inner).scale_loop());
        self.inner.track(scaler);

        info!(
            queue = %self.name(),
            workers = base,
            max_workers = self.inner.config.max_workers(),
            "Worker pool started"
        );
    }

    /// Start, then follow `token`: shutdown on its first phase, terminate on the second
    pub fn run(&self, token: ShutdownToken) {
        self.start();
        let pool = self.clone();
        tokio::spawn(async move {
            let mut token = token;
            token.wait_shutdown().await;
            pool.shutdown().await;
            token.wait_terminate().await;
            pool.terminate().await;
        });
    }

    /// Stop accepting work and wait for the workers to exit.
    ///
    /// With an overflow store the channel residue is persisted before this
    /// returns; callers bound the wait with their grace period.
    pub async fn shutdown(&self) {
        self.inner.accepting.store(false, Ordering::SeqCst);
        self.inner.lifecycle.shutdown();
        info!(queue = %self.name(), "Worker pool shutting down");

        self.inner.wait_workers_exited().await;

        if let Some(store) = &self.inner.overflow {
            let persisted = self.inner.persist_residue(store).await;
            if persisted > 0 {
                info!(queue = %self.name(), persisted, "Persisted channel residue");
            }
        }
        info!(queue = %self.name(), "Worker pool stopped");
    }

    /// Abort workers, in-flight handler calls and pending retries.
    ///
    /// Items still waiting in the channel go to the overflow store.
    pub async fn terminate(&self) {
        self.inner.accepting.store(false, Ordering::SeqCst);
        self.inner.lifecycle.terminate();

        let tasks = std::mem::take(&mut *self.inner.tasks());
        let aborted = tasks.iter().filter(|task| !task.is_finished()).count();
        for task in tasks {
            task.abort();
        }
        self.inner.state().live = 0;
        self.inner.worker_exited.notify_waiters();

        if let Some(store) = &self.inner.overflow {
            let persisted = self.inner.persist_residue(store).await;
            if persisted > 0 {
                info!(queue = %self.name(), persisted, "Persisted channel residue");
            }
        }

        if aborted > 0 {
            warn!(queue = %self.name(), aborted, "Worker pool terminated with running tasks");
        } else {
            info!(queue = %self.name(), "Worker pool terminated");
        }
    }

    pub fn is_accepting(&self) -> bool {
        self.inner.accepting.load(Ordering::SeqCst)
    }

    pub fn is_started(&self) -> bool {
        self.inner.started.load(Ordering::SeqCst)
    }

    pub fn live_workers(&self) -> usize {
        self.inner.state().live
    }

    pub fn is_boosted(&self) -> bool {
        self.inner.state().boost.is_boosted()
    }

    /// Items currently sitting in the channel
    pub fn channel_len(&self) -> usize {
        self.inner.channel_len()
    }

    /// Channel + in-flight + waiting retries
    pub fn outstanding(&self) -> usize {
        self.inner.outstanding.load(Ordering::SeqCst)
    }
}

impl<T: Payload> PoolInner<T> {
    fn state(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn tasks(&self) -> MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.tasks.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn track(&self, handle: JoinHandle<()>) {
        let mut tasks = self.tasks();
        tasks.retain(|task| !task.is_finished());
        tasks.push(handle);
    }

    fn channel_len(&self) -> usize {
        self.sender.max_capacity() - self.sender.capacity()
    }

    fn try_push(&self, item: Item<T>) -> std::result::Result<(), TryPushError<T>> {
        if !self.accepting.load(Ordering::SeqCst) {
            return Err(TryPushError::Closed(item));
        }

        // Count before sending so a flush never sees zero with an item queued
        self.outstanding.fetch_add(1, Ordering::SeqCst);
        match self.sender.try_send(item) {
            Ok(()) => {
                self.pushed.notify_one();
                Ok(())
            }
            Err(mpsc::error::TrySendError::Full(item)) => {
                self.outstanding.fetch_sub(1, Ordering::SeqCst);
                // A full channel is the saturation signal
                self.pushed.notify_one();
                Err(TryPushError::Full(item))
            }
            Err(mpsc::error::TrySendError::Closed(item)) => {
                self.outstanding.fetch_sub(1, Ordering::SeqCst);
                Err(TryPushError::Closed(item))
            }
        }
    }

    fn spawn_worker(self: Arc<Self>) {
        let token = self.lifecycle.token();
        let handle = tokio::spawn(Arc::clone(&self).worker_loop(token));
        self.track(handle);
    }

    async fn worker_loop(self: Arc<Self>, token: ShutdownToken) {
        debug!(queue = %self.config.name, "Worker started");
        let persist_mode = self.overflow.is_some();

        loop {
            if token.is_terminated() || (persist_mode && token.is_shutdown()) {
                break;
            }

            let batch = self.next_batch().await;
            if batch.is_empty() {
                if token.is_shutdown() {
                    if self.outstanding.load(Ordering::SeqCst) == 0 {
                        break;
                    }
                    continue;
                }
                if self.try_retire() {
                    debug!(queue = %self.config.name, "Idle worker retired");
                    self.worker_exited.notify_waiters();
                    return;
                }
                continue;
            }

            self.dispatch(batch).await;
        }

        {
            let mut state = self.state();
            state.live = state.live.saturating_sub(1);
        }
        self.worker_exited.notify_waiters();
        debug!(queue = %self.config.name, "Worker stopped");
    }

    /// Up to `batch_length` items, or empty after the idle timeout
    async fn next_batch(&self) -> Vec<Item<T>> {
        let batch_length = self.config.batch_length;
        let receive = async {
            let mut receiver = self.receiver.lock().await;
            let first = receiver.recv().await?;
            let mut batch = Vec::with_capacity(batch_length);
            batch.push(first);
            while batch.len() < batch_length {
                match receiver.try_recv() {
                    Ok(item) => batch.push(item),
                    Err(_) => break,
                }
            }
            Some(batch)
        };

        timeout(IDLE_SLEEP_DURATION, receive)
            .await
            .ok()
            .flatten()
            .unwrap_or_default()
    }

    /// Retire an idle worker above the base count unless boosted
    fn try_retire(&self) -> bool {
        let mut state = self.state();
        if state.boost.is_boosted() || state.live <= self.config.workers {
            return false;
        }
        state.live -= 1;
        true
    }

    async fn dispatch(self: &Arc<Self>, batch: Vec<Item<T>>) {
        let count = batch.len();
        let keys: Vec<String> = batch
            .iter()
            .filter_map(|item| item.key().map(str::to_string))
            .collect();

        let handler = Arc::clone(&self.handler);
        let result = execute_guarded_async(async move { handler.handle(batch).await }).await;

        match result {
            PanicGuardResult::Success(failed) => {
                let retry_keys: HashSet<&str> = failed.iter().filter_map(Item::key).collect();
                for key in keys.iter().filter(|key| !retry_keys.contains(key.as_str())) {
                    self.release(key);
                }

                // Retries stay outstanding; add them before subtracting the batch
                for item in failed {
                    self.retry_or_fail(item);
                }
                self.outstanding.fetch_sub(count, Ordering::SeqCst);
            }
            PanicGuardResult::Panicked(panic_msg) => {
                error!(
                    queue = %self.config.name,
                    items = count,
                    panic_msg = %panic_msg,
                    "Handler panicked, batch failed"
                );
                for key in &keys {
                    self.release(key);
                }
                self.outstanding.fetch_sub(count, Ordering::SeqCst);
            }
            PanicGuardResult::Cancelled => {
                self.outstanding.fetch_sub(count, Ordering::SeqCst);
            }
        }
    }

    /// Schedule a retry or record a permanent failure
    fn retry_or_fail(self: &Arc<Self>, mut item: Item<T>) {
        match self.retry.should_retry(&self.config.name, &item) {
            RetryDecision::Retry(delay_ms) => {
                self.retry.prepare_for_retry(&mut item);
                self.outstanding.fetch_add(1, Ordering::SeqCst);
                let token = self.lifecycle.token();
                let handle = tokio::spawn(Arc::clone(self).requeue(
                    item,
                    Duration::from_millis(delay_ms),
                    token,
                ));
                self.track(handle);
            }
            RetryDecision::Failed => {
                error!(
                    queue = %self.config.name,
                    key = ?item.key(),
                    attempts = item.attempts(),
                    "Item failed permanently"
                );
                if let Some(key) = item.key() {
                    self.release(key);
                }
            }
        }
    }

    /// Put a retried item back on the channel after `delay`.
    ///
    /// At shutdown the item goes to the overflow store when there is one;
    /// otherwise it rejoins the channel at once so draining workers see it.
    async fn requeue(self: Arc<Self>, item: Item<T>, delay: Duration, token: ShutdownToken) {
        if !delay.is_zero() {
            let mut shutdown = token.clone();
            tokio::select! {
                _ = sleep(delay) => {}
                _ = shutdown.wait_shutdown() => {}
            }
        }

        if token.is_shutdown() {
            if let Some(store) = &self.overflow {
                self.persist(store, item).await;
                return;
            }
        }

        let mut shutdown = token.clone();
        let mut terminate = token;
        tokio::select! {
            permit = self.sender.reserve() => match permit {
                Ok(permit) => {
                    permit.send(item);
                    self.pushed.notify_one();
                }
                Err(_) => {
                    warn!(queue = %self.config.name, key = ?item.key(), "Channel closed, retry lost");
                    if let Some(key) = item.key() {
                        self.release(key);
                    }
                    self.outstanding.fetch_sub(1, Ordering::SeqCst);
                }
            },
            _ = shutdown.wait_shutdown(), if self.overflow.is_some() => {
                if let Some(store) = &self.overflow {
                    self.persist(store, item).await;
                }
            }
            _ = terminate.wait_terminate() => {
                self.outstanding.fetch_sub(1, Ordering::SeqCst);
            }
        }
    }

    /// Move an outstanding item to the store; it stays keyed
    async fn persist(&self, store: &DurableStore<T>, item: Item<T>) {
        if let Err(e) = store.push(&item).await {
            error!(
                queue = %self.config.name,
                key = ?item.key(),
                error = %e,
                "Failed to persist item, dropping it"
            );
            if let Some(key) = item.key() {
                self.release(key);
            }
        }
        self.outstanding.fetch_sub(1, Ordering::SeqCst);
    }

    async fn persist_residue(&self, store: &DurableStore<T>) -> usize {
        let mut receiver = self.receiver.lock().await;
        let mut persisted = 0;
        while let Ok(item) = receiver.try_recv() {
            self.persist(store, item).await;
            persisted += 1;
        }
        persisted
    }

    fn release(&self, key: &str) {
        if let Some(unique) = &self.unique {
            unique.remove(key);
        }
    }

    async fn wait_workers_exited(&self) {
        loop {
            let exited = self.worker_exited.notified();
            tokio::pin!(exited);
            exited.as_mut().enable();
            if self.state().live == 0 {
                return;
            }
            exited.await;
        }
    }

    async fn scale_loop(self: Arc<Self>) {
        let mut token = self.lifecycle.token();
        let mut ticker = interval(SCALE_TICK_DURATION);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = self.pushed.notified() => {}
                _ = token.wait_shutdown() => break,
            }
            Arc::clone(&self).rescale();
        }
    }

    /// Sample the backlog and spawn workers up to the current target
    fn rescale(self: Arc<Self>) {
        let pending = self.channel_len();
        let now = self.time_provider.now_millis();

        let spawn = {
            let mut state = self.state();
            match state.boost.observe(now, pending) {
                BoostAction::Boost => info!(
                    queue = %self.config.name,
                    pending,
                    boost_workers = self.config.boost_workers,
                    "Backlog saturated, boosting workers"
                ),
                BoostAction::Expire => debug!(queue = %self.config.name, "Boost window ended"),
                BoostAction::None => {}
            }

            let mut target = if state.boost.is_boosted() {
                self.config.max_workers()
            } else {
                self.config.workers
            };
            // A pool with no base workers still needs one to make progress
            if target == 0 && pending > 0 {
                target = 1;
            }

            let spawn = target.saturating_sub(state.live);
            state.live += spawn;
            spawn
        };

        for _ in 0..spawn {
            Arc::clone(&self).spawn_worker();
        }
    }
}
