// Data codec - typed items <-> backend byte records

use crate::domain::Item;
use crate::error::Result;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Encodes items for a byte FIFO backend.
///
/// Channel-only queues never go through a codec: the typed item moves through
/// the channel as-is.
pub trait Codec<T>: Send + Sync {
    fn encode(&self, item: &Item<T>) -> Result<Vec<u8>>;
    fn decode(&self, bytes: &[u8]) -> Result<Item<T>>;
}

/// JSON records (`{"data": ..., "key": ..., "attempts": n}`)
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl<T> Codec<T> for JsonCodec
where
    T: Serialize + DeserializeOwned,
{
    fn encode(&self, item: &Item<T>) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(item)?)
    }

    fn decode(&self, bytes: &[u8]) -> Result<Item<T>> {
        Ok(serde_json::from_slice(bytes)?)
    }
}
