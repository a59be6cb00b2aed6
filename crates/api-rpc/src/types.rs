//! RPC Request/Response Types
//!
//! Parameters and results of the `queue.*.v1` admin methods.

use serde::{Deserialize, Serialize};
use workqueue_core::domain::{PushOutcome, QueueStats};

/// Default flush wait when the caller gives none
pub const DEFAULT_FLUSH_TIMEOUT_MS: u64 = 5_000;

/// queue.list.v1 - Registered queue names
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct ListRequest {}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListResponse {
    pub queues: Vec<String>,
}

/// queue.stats.v1 - Statistics for one queue or all of them
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct StatsRequest {
    #[serde(default)]
    pub queue: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsResponse {
    pub queues: Vec<QueueStats>,
    pub shutting_down: bool,
    pub uptime_seconds: u64,
}

/// queue.flush.v1 - Wait until one queue (or every queue) is empty
#[derive(Debug, Deserialize, Serialize)]
pub struct FlushRequest {
    #[serde(default)]
    pub queue: Option<String>,
    #[serde(default = "default_flush_timeout")]
    pub timeout_ms: u64,
}

fn default_flush_timeout() -> u64 {
    DEFAULT_FLUSH_TIMEOUT_MS
}

impl Default for FlushRequest {
    fn default() -> Self {
        Self {
            queue: None,
            timeout_ms: DEFAULT_FLUSH_TIMEOUT_MS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlushResponse {
    pub flushed: bool,
}

/// queue.push.v1 - Push a JSON payload
#[derive(Debug, Deserialize, Serialize)]
pub struct PushRequest {
    pub queue: String,
    pub payload: serde_json::Value,
    /// Required for unique queues, ignored otherwise
    #[serde(default)]
    pub key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushResponse {
    pub queue: String,
    pub outcome: PushOutcome,
}

/// queue.has.v1 - Key membership on a unique queue
#[derive(Debug, Deserialize, Serialize)]
pub struct HasRequest {
    pub queue: String,
    pub key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HasResponse {
    pub queue: String,
    pub key: String,
    pub present: bool,
}
