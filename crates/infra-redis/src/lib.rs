// workqueue Infrastructure - Redis Adapter
// Implements: ByteFifo over one Redis list per queue

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tracing::{debug, info};
use workqueue_core::error::{AppError, Result};
use workqueue_core::port::ByteFifo;

/// Key prefix used when none is configured
pub const DEFAULT_PREFIX: &str = "workqueue";

fn map_redis_error(err: redis::RedisError) -> AppError {
    if err.is_connection_refusal() || err.is_io_error() {
        AppError::Backend(format!("Redis unavailable: {}", err))
    } else {
        AppError::Backend(format!("Redis: {}", err))
    }
}

/// List key for a queue: `{prefix}:queue:{name}`
pub fn list_key(prefix: &str, queue: &str) -> String {
    format!("{}:queue:{}", prefix, queue)
}

/// Connect a manager that queues can share (reconnects automatically)
pub async fn connect(redis_url: &str) -> Result<ConnectionManager> {
    let client = redis::Client::open(redis_url)
        .map_err(|e| AppError::Config(format!("invalid redis url '{}': {}", redis_url, e)))?;

    let manager = ConnectionManager::new(client)
        .await
        .map_err(map_redis_error)?;
    info!(url = %redis_url, "Redis backend connected");
    Ok(manager)
}

/// Durable FIFO of byte records stored in a Redis list.
///
/// Records are appended with RPUSH and taken with LPOP, so the list head is
/// the oldest record.
pub struct RedisByteFifo {
    redis: ConnectionManager,
    key: String,
}

impl RedisByteFifo {
    /// Fifo for `queue` on a shared connection manager
    pub fn new(redis: ConnectionManager, prefix: &str, queue: &str) -> Self {
        Self {
            redis,
            key: list_key(prefix, queue),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}

#[async_trait]
impl ByteFifo for RedisByteFifo {
    async fn push(&self, data: Vec<u8>) -> Result<()> {
        let mut conn = self.redis.clone();
        conn.rpush::<_, _, ()>(&self.key, data)
            .await
            .map_err(map_redis_error)
    }

    async fn pop(&self) -> Result<Option<Vec<u8>>> {
        let mut conn = self.redis.clone();
        let record: Option<Vec<u8>> = redis::cmd("LPOP")
            .arg(&self.key)
            .query_async(&mut conn)
            .await
            .map_err(map_redis_error)?;
        Ok(record)
    }

    async fn len(&self) -> Result<usize> {
        let mut conn = self.redis.clone();
        conn.llen::<_, usize>(&self.key)
            .await
            .map_err(map_redis_error)
    }

    async fn snapshot(&self) -> Result<Vec<Vec<u8>>> {
        let mut conn = self.redis.clone();
        conn.lrange::<_, Vec<Vec<u8>>>(&self.key, 0, -1)
            .await
            .map_err(map_redis_error)
    }

    async fn close(&self) -> Result<()> {
        // ConnectionManager closes with its last clone
        debug!(key = %self.key, "Redis fifo released");
        Ok(())
    }
}
