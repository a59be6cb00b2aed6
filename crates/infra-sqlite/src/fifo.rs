// SQLite ByteFifo Implementation

use crate::error::map_sqlx_error;
use async_trait::async_trait;
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::debug;
use workqueue_core::error::Result;
use workqueue_core::port::{ByteFifo, TimeProvider};

/// Durable FIFO of byte records for one queue, stored in `queue_items`.
///
/// Several queues may share a pool; rows are partitioned by queue name and
/// ordered by the autoincrement id.
pub struct SqliteByteFifo {
    pool: SqlitePool,
    queue: String,
    time_provider: Arc<dyn TimeProvider>,
}

impl SqliteByteFifo {
    pub fn new(
        pool: SqlitePool,
        queue: impl Into<String>,
        time_provider: Arc<dyn TimeProvider>,
    ) -> Self {
        Self {
            pool,
            queue: queue.into(),
            time_provider,
        }
    }

    pub fn queue(&self) -> &str {
        &self.queue
    }
}

#[async_trait]
impl ByteFifo for SqliteByteFifo {
    async fn push(&self, data: Vec<u8>) -> Result<()> {
        let now = self.time_provider.now_millis();

        sqlx::query("INSERT INTO queue_items (queue, payload, created_at) VALUES (?, ?, ?)")
            .bind(&self.queue)
            .bind(data)
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn pop(&self) -> Result<Option<Vec<u8>>> {
        // Single statement: concurrent pops never return the same row
        let payload: Option<Vec<u8>> = sqlx::query_scalar(
            r#"
            DELETE FROM queue_items
            WHERE id = (
                SELECT id FROM queue_items
                WHERE queue = ?
                ORDER BY id ASC
                LIMIT 1
            )
            RETURNING payload
            "#,
        )
        .bind(&self.queue)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(payload)
    }

    async fn len(&self) -> Result<usize> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM queue_items WHERE queue = ?")
            .bind(&self.queue)
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        Ok(count.max(0) as usize)
    }

    async fn snapshot(&self) -> Result<Vec<Vec<u8>>> {
        let payloads: Vec<Vec<u8>> =
            sqlx::query_scalar("SELECT payload FROM queue_items WHERE queue = ? ORDER BY id ASC")
                .bind(&self.queue)
                .fetch_all(&self.pool)
                .await
                .map_err(map_sqlx_error)?;

        Ok(payloads)
    }

    async fn close(&self) -> Result<()> {
        // The pool is shared with other queues; the daemon closes it once
        debug!(queue = %self.queue, "SQLite fifo released");
        Ok(())
    }
}
