// Queue Domain Model

use super::error::{DomainError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Queue identifier (unique per process)
pub type QueueId = String;

pub const DEFAULT_QUEUE_LENGTH: usize = 100;
pub const DEFAULT_BATCH_LENGTH: usize = 20;
pub const DEFAULT_WORKERS: usize = 1;
pub const DEFAULT_BOOST_WORKERS: usize = 5;
pub const DEFAULT_BOOST_TIMEOUT_MS: u64 = 1000;
pub const DEFAULT_BOOST_DURATION_MS: u64 = 5 * 60 * 1000;
pub const DEFAULT_BLOCK_TIMEOUT_MS: u64 = 1000;
pub const DEFAULT_MAX_RETRIES: u32 = 5;
pub const DEFAULT_BACKOFF_FACTOR: f64 = 2.0;

/// What a queue without a durable backend does when its channel is full
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverflowPolicy {
    /// Fail fast with `AppError::ChannelFull`
    #[default]
    Reject,
    /// Wait up to `block_timeout_ms` for capacity, then fail
    Block,
    /// Discard the item and report `PushOutcome::Dropped`
    Drop,
}

/// Queue configuration, immutable for the lifetime of a queue instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    pub name: QueueId,
    /// Channel capacity
    pub queue_length: usize,
    /// Max items handed to one handler call
    pub batch_length: usize,
    /// Base worker count
    pub workers: usize,
    /// Extra workers spawned while boosted
    pub boost_workers: usize,
    /// Pending depth that counts as saturated (0 = channel full)
    pub boost_trigger: usize,
    /// How long saturation must persist before a boost
    pub boost_timeout_ms: u64,
    /// How long a boost lasts
    pub boost_duration_ms: u64,
    /// Retry ceiling for items the handler hands back (None = unbounded)
    pub max_retries: Option<u32>,
    /// Base retry delay, grown by `backoff_factor` per attempt
    pub retry_delay_ms: u64,
    pub backoff_factor: f64,
    pub overflow: OverflowPolicy,
    pub block_timeout_ms: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            queue_length: DEFAULT_QUEUE_LENGTH,
            batch_length: DEFAULT_BATCH_LENGTH,
            workers: DEFAULT_WORKERS,
            boost_workers: DEFAULT_BOOST_WORKERS,
            boost_trigger: 0,
            boost_timeout_ms: DEFAULT_BOOST_TIMEOUT_MS,
            boost_duration_ms: DEFAULT_BOOST_DURATION_MS,
            max_retries: Some(DEFAULT_MAX_RETRIES),
            retry_delay_ms: 0,
            backoff_factor: DEFAULT_BACKOFF_FACTOR,
            overflow: OverflowPolicy::Reject,
            block_timeout_ms: DEFAULT_BLOCK_TIMEOUT_MS,
        }
    }
}

impl QueueConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_queue_length(mut self, queue_length: usize) -> Self {
        self.queue_length = queue_length;
        self
    }

    pub fn with_batch_length(mut self, batch_length: usize) -> Self {
        self.batch_length = batch_length;
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Configure boosting: `workers` extra workers once the backlog has stayed
    /// at `trigger` or above for `timeout`, kept for `duration`
    pub fn with_boost(
        mut self,
        workers: usize,
        trigger: usize,
        timeout: Duration,
        duration: Duration,
    ) -> Self {
        self.boost_workers = workers;
        self.boost_trigger = trigger;
        self.boost_timeout_ms = timeout.as_millis() as u64;
        self.boost_duration_ms = duration.as_millis() as u64;
        self
    }

    pub fn without_boost(mut self) -> Self {
        self.boost_workers = 0;
        self
    }

    pub fn with_max_retries(mut self, max_retries: Option<u32>) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay_ms = delay.as_millis() as u64;
        self
    }

    pub fn with_overflow(mut self, overflow: OverflowPolicy) -> Self {
        self.overflow = overflow;
        self
    }

    pub fn with_block_timeout(mut self, timeout: Duration) -> Self {
        self.block_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Upper bound on live workers
    pub fn max_workers(&self) -> usize {
        self.workers + self.boost_workers
    }

    /// Saturation threshold with the "channel full" default resolved
    pub fn effective_boost_trigger(&self) -> usize {
        if self.boost_trigger == 0 || self.boost_trigger > self.queue_length {
            self.queue_length
        } else {
            self.boost_trigger
        }
    }

    pub fn boost_timeout(&self) -> Duration {
        Duration::from_millis(self.boost_timeout_ms)
    }

    pub fn boost_duration(&self) -> Duration {
        Duration::from_millis(self.boost_duration_ms)
    }

    pub fn block_timeout(&self) -> Duration {
        Duration::from_millis(self.block_timeout_ms)
    }

    /// Reject sizings a pool cannot run with (fatal at init)
    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: &str| DomainError::InvalidConfig {
            queue: self.name.clone(),
            reason: reason.to_string(),
        };

        if self.name.trim().is_empty() {
            return Err(invalid("name cannot be empty"));
        }
        if self.queue_length == 0 {
            return Err(invalid("queue_length must be at least 1"));
        }
        if self.batch_length == 0 {
            return Err(invalid("batch_length must be at least 1"));
        }
        if self.max_workers() == 0 {
            return Err(invalid("workers + boost_workers must be at least 1"));
        }
        if !(self.backoff_factor >= 1.0) {
            return Err(invalid("backoff_factor must be >= 1.0"));
        }
        Ok(())
    }
}

/// Lifecycle of a queue instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QueueState {
    Created,
    Running,
    ShuttingDown,
    Stopped,
    Terminated,
}

impl std::fmt::Display for QueueState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueueState::Created => write!(f, "CREATED"),
            QueueState::Running => write!(f, "RUNNING"),
            QueueState::ShuttingDown => write!(f, "SHUTTING_DOWN"),
            QueueState::Stopped => write!(f, "STOPPED"),
            QueueState::Terminated => write!(f, "TERMINATED"),
        }
    }
}

/// Point-in-time introspection of a queue (admin surface)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueStats {
    pub name: QueueId,
    pub unique: bool,
    pub state: QueueState,
    pub workers: usize,
    pub base_workers: usize,
    pub max_workers: usize,
    pub boosted: bool,
    /// Items sitting in the channel
    pub channel_len: usize,
    /// Items in the durable backend (None without a backend)
    pub backend_len: Option<usize>,
    /// Channel + in-flight + waiting retries
    pub outstanding: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = QueueConfig::new("pr_patch_checker");
        assert!(config.validate().is_ok());
        assert_eq!(config.max_workers(), 6);
        assert_eq!(config.effective_boost_trigger(), DEFAULT_QUEUE_LENGTH);
    }

    #[test]
    fn test_validate_rejects_bad_sizing() {
        let err = QueueConfig::new("q").with_queue_length(0).validate();
        assert!(err.unwrap_err().to_string().contains("queue_length"));

        let err = QueueConfig::new("q").with_batch_length(0).validate();
        assert!(err.unwrap_err().to_string().contains("batch_length"));

        let err = QueueConfig::new("q")
            .with_workers(0)
            .without_boost()
            .validate();
        assert!(err.unwrap_err().to_string().contains("workers"));

        let err = QueueConfig::new("  ").validate();
        assert!(err.unwrap_err().to_string().contains("name"));
    }

    #[test]
    fn test_zero_base_workers_allowed_with_boost() {
        let config = QueueConfig::new("q").with_workers(0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_boost_trigger_clamped_to_queue_length() {
        let config = QueueConfig::new("q").with_queue_length(10).with_boost(
            2,
            50,
            Duration::from_millis(10),
            Duration::from_secs(1),
        );
        assert_eq!(config.effective_boost_trigger(), 10);

        let config = config.with_boost(2, 4, Duration::ZERO, Duration::from_secs(1));
        assert_eq!(config.effective_boost_trigger(), 4);
    }

    #[test]
    fn test_partial_config_deserializes_with_defaults() {
        let config: QueueConfig = serde_json::from_str(
            r#"{"name":"webhook_sender","workers":3,"overflow":"block"}"#,
        )
        .unwrap();
        assert_eq!(config.workers, 3);
        assert_eq!(config.overflow, OverflowPolicy::Block);
        assert_eq!(config.queue_length, DEFAULT_QUEUE_LENGTH);
        assert_eq!(config.max_retries, Some(DEFAULT_MAX_RETRIES));
    }
}
