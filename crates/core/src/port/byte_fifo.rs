// Byte FIFO Port (Interface) - durable backend contract

use crate::error::{AppError, Result};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

/// Ordered byte-record store backing a queue.
///
/// Implementations:
/// - MemoryByteFifo: in-process ring (non-durable, shareable across queue instances)
/// - SqliteByteFifo: embedded on-disk store (infra-sqlite)
/// - RedisByteFifo: external list store (infra-redis)
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ByteFifo: Send + Sync {
    /// Append a record at the tail
    async fn push(&self, data: Vec<u8>) -> Result<()>;

    /// Remove and return the head record
    async fn pop(&self) -> Result<Option<Vec<u8>>>;

    /// Number of stored records
    async fn len(&self) -> Result<usize>;

    /// All stored records head-to-tail, without removing them
    async fn snapshot(&self) -> Result<Vec<Vec<u8>>>;

    /// Release resources (called once at terminate)
    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// In-memory ring with an optional capacity bound
pub struct MemoryByteFifo {
    records: Mutex<VecDeque<Vec<u8>>>,
    capacity: Option<usize>,
}

impl MemoryByteFifo {
    pub fn new() -> Self {
        Self {
            records: Mutex::new(VecDeque::new()),
            capacity: None,
        }
    }

    /// Ring that refuses pushes beyond `capacity` records
    pub fn bounded(capacity: usize) -> Self {
        Self {
            records: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity: Some(capacity),
        }
    }

    fn records(&self) -> Result<std::sync::MutexGuard<'_, VecDeque<Vec<u8>>>> {
        self.records
            .lock()
            .map_err(|_| AppError::Internal("memory fifo lock poisoned".to_string()))
    }
}

impl Default for MemoryByteFifo {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ByteFifo for MemoryByteFifo {
    async fn push(&self, data: Vec<u8>) -> Result<()> {
        let mut records = self.records()?;
        if let Some(capacity) = self.capacity {
            if records.len() >= capacity {
                return Err(AppError::Backend(format!(
                    "memory fifo full ({} records)",
                    capacity
                )));
            }
        }
        records.push_back(data);
        Ok(())
    }

    async fn pop(&self) -> Result<Option<Vec<u8>>> {
        Ok(self.records()?.pop_front())
    }

    async fn len(&self) -> Result<usize> {
        Ok(self.records()?.len())
    }

    async fn snapshot(&self) -> Result<Vec<Vec<u8>>> {
        Ok(self.records()?.iter().cloned().collect())
    }
}
