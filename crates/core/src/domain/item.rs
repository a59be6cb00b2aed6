// Item Domain Model

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Bounds every queued payload type satisfies (JSON-encodable, movable
/// across worker tasks)
pub trait Payload: Serialize + DeserializeOwned + Send + Sync + 'static {}

impl<T> Payload for T where T: Serialize + DeserializeOwned + Send + Sync + 'static {}

/// One unit of work: an opaque payload plus an optional dedup key.
///
/// `attempts` counts how many times the handler has asked for a retry; it is
/// carried through the durable backend so the retry ceiling survives restarts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item<T> {
    pub data: T,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    key: Option<String>,
    #[serde(default)]
    attempts: u32,
}

impl<T> Item<T> {
    /// Item without a dedup key
    pub fn new(data: T) -> Self {
        Self {
            data,
            key: None,
            attempts: 0,
        }
    }

    /// Item carrying a dedup key
    pub fn keyed(data: T, key: impl Into<String>) -> Self {
        Self {
            data,
            key: Some(key.into()),
            attempts: 0,
        }
    }

    pub fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn into_data(self) -> T {
        self.data
    }

    pub(crate) fn record_attempt(&mut self) {
        self.attempts = self.attempts.saturating_add(1);
    }
}

/// Result of a push as seen by the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PushOutcome {
    /// Handed to the worker pool channel
    Dispatched,
    /// Written to the durable backend (overflow, not yet running, or shutting down)
    Persisted,
    /// Key already queued or in flight; nothing enqueued
    Duplicate,
    /// Channel full with the drop overflow policy
    Dropped,
}

impl PushOutcome {
    /// True when the item will eventually reach the handler
    pub fn is_accepted(&self) -> bool {
        matches!(self, PushOutcome::Dispatched | PushOutcome::Persisted)
    }
}

impl std::fmt::Display for PushOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PushOutcome::Dispatched => write!(f, "DISPATCHED"),
            PushOutcome::Persisted => write!(f, "PERSISTED"),
            PushOutcome::Duplicate => write!(f, "DUPLICATE"),
            PushOutcome::Dropped => write!(f, "DROPPED"),
        }
    }
}
