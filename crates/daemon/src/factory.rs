// Queue Factory - builds configured queues and the backends they share

use crate::config::{BackendKind, QueueSettings, StorageConfig};
use crate::handlers::LogHandler;
use anyhow::{Context, Result};
use redis::aio::ConnectionManager;
use serde_json::Value;
use sqlx::SqlitePool;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::info;
use workqueue_core::application::{ManagedQueue, Queue, UniqueQueue};
use workqueue_core::port::time_provider::SystemTimeProvider;
use workqueue_core::port::{ByteFifo, Handler, TimeProvider};
use workqueue_infra_redis::RedisByteFifo;
use workqueue_infra_sqlite::SqliteByteFifo;

/// Opens each backend on first use; every queue on a backend shares it
pub struct QueueFactory {
    storage: StorageConfig,
    sqlite: OnceCell<SqlitePool>,
    redis: OnceCell<ConnectionManager>,
    time_provider: Arc<dyn TimeProvider>,
}

impl QueueFactory {
    pub fn new(storage: StorageConfig) -> Self {
        Self {
            storage,
            sqlite: OnceCell::new(),
            redis: OnceCell::new(),
            time_provider: Arc::new(SystemTimeProvider),
        }
    }

    async fn sqlite(&self) -> Result<&SqlitePool> {
        self.sqlite
            .get_or_try_init(|| async {
                let path = self.storage.sqlite_path();
                info!(path = %path.display(), "Opening SQLite backend");
                workqueue_infra_sqlite::open(&path)
                    .await
                    .with_context(|| format!("Failed to open SQLite backend at {}", path.display()))
            })
            .await
    }

    async fn redis(&self) -> Result<&ConnectionManager> {
        self.redis
            .get_or_try_init(|| async {
                let url = self
                    .storage
                    .redis_url
                    .as_deref()
                    .context("storage.redis_url is required for redis-backed queues")?;
                workqueue_infra_redis::connect(url)
                    .await
                    .context("Failed to connect to Redis backend")
            })
            .await
    }

    async fn fifo(&self, name: &str, backend: BackendKind) -> Result<Option<Arc<dyn ByteFifo>>> {
        let fifo: Arc<dyn ByteFifo> = match backend {
            BackendKind::Memory => return Ok(None),
            BackendKind::Sqlite => Arc::new(SqliteByteFifo::new(
                self.sqlite().await?.clone(),
                name,
                Arc::clone(&self.time_provider),
            )),
            BackendKind::Redis => Arc::new(RedisByteFifo::new(
                self.redis().await?.clone(),
                &self.storage.redis_prefix,
                name,
            )),
        };
        Ok(Some(fifo))
    }

    /// Build the queue `name` with a logging handler
    pub async fn build(&self, name: &str, settings: &QueueSettings) -> Result<Arc<dyn ManagedQueue>> {
        let config = settings.to_queue_config(name);
        config
            .validate()
            .with_context(|| format!("Invalid configuration for queue '{}'", name))?;

        let handler: Arc<dyn Handler<Value>> = Arc::new(LogHandler::new(name));
        let mut builder = Queue::builder(config, handler);
        if let Some(fifo) = self.fifo(name, settings.backend()).await? {
            builder = builder.backend(fifo);
        }

        let queue: Arc<dyn ManagedQueue> = if settings.is_unique() {
            Arc::new(UniqueQueue::from_builder(builder).await?)
        } else {
            Arc::new(builder.build()?)
        };

        info!(
            queue = %name,
            backend = ?settings.backend(),
            unique = settings.is_unique(),
            "Queue built"
        );
        Ok(queue)
    }

    /// Build every configured queue, or none: the first failure aborts
    /// before any queue is handed out to run
    pub async fn build_all(&self, queues: &[(String, QueueSettings)]) -> Result<Vec<Arc<dyn ManagedQueue>>> {
        let mut built = Vec::with_capacity(queues.len());
        for (name, settings) in queues {
            built.push(self.build(name, settings).await?);
        }
        Ok(built)
    }

    /// Close shared backends (after every queue has terminated)
    pub async fn close(&self) {
        if let Some(pool) = self.sqlite.get() {
            pool.close().await;
            info!("SQLite backend closed");
        }
    }
}
