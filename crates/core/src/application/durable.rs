// Durable store - a byte FIFO plus the codec for one queue's items

use crate::application::codec::{Codec, JsonCodec};
use crate::domain::Item;
use crate::error::Result;
use crate::port::ByteFifo;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use tracing::warn;

/// Typed view over a queue's durable backend
pub struct DurableStore<T> {
    queue: String,
    fifo: Arc<dyn ByteFifo>,
    codec: Arc<dyn Codec<T>>,
}

impl<T> DurableStore<T>
where
    T: Serialize + DeserializeOwned + Send + 'static,
{
    /// Store using JSON records
    pub fn new(queue: impl Into<String>, fifo: Arc<dyn ByteFifo>) -> Self {
        Self::with_codec(queue, fifo, Arc::new(JsonCodec))
    }

    pub fn with_codec(
        queue: impl Into<String>,
        fifo: Arc<dyn ByteFifo>,
        codec: Arc<dyn Codec<T>>,
    ) -> Self {
        Self {
            queue: queue.into(),
            fifo,
            codec,
        }
    }

    pub async fn push(&self, item: &Item<T>) -> Result<()> {
        let bytes = self.codec.encode(item)?;
        self.fifo.push(bytes).await
    }

    /// Pop the head record.
    ///
    /// A record that fails to decode is consumed and reported as an error so
    /// the caller can log and move on.
    pub async fn pop(&self) -> Result<Option<Item<T>>> {
        match self.fifo.pop().await? {
            Some(bytes) => Ok(Some(self.codec.decode(&bytes)?)),
            None => Ok(None),
        }
    }

    pub async fn len(&self) -> Result<usize> {
        self.fifo.len().await
    }

    pub async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }

    /// Dedup keys of every stored record (undecodable records are skipped)
    pub async fn keys(&self) -> Result<Vec<String>> {
        let records = self.fifo.snapshot().await?;
        let mut keys = Vec::with_capacity(records.len());
        for bytes in records {
            match self.codec.decode(&bytes) {
                Ok(item) => {
                    if let Some(key) = item.key() {
                        keys.push(key.to_string());
                    }
                }
                Err(e) => warn!(queue = %self.queue, error = %e, "Skipping undecodable record"),
            }
        }
        Ok(keys)
    }

    pub async fn close(&self) -> Result<()> {
        self.fifo.close().await
    }
}
