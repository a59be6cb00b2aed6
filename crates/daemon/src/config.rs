//! Daemon configuration
//!
//! Layered with the `config` crate: built-in defaults, then an optional
//! TOML file (`WORKQUEUE_CONFIG`, default `~/.workqueue/workqueue.toml`),
//! then `WORKQUEUE_*` environment variables using `__` between sections
//! (`WORKQUEUE_SERVER__PORT=9700`, `WORKQUEUE_QUEUES__MAIL__WORKERS=4`).

use anyhow::{Context, Result};
use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use workqueue_api_rpc::RpcServerConfig;
use workqueue_core::domain::{OverflowPolicy, QueueConfig};

pub const DEFAULT_CONFIG_PATH: &str = "~/.workqueue/workqueue.toml";
pub const DEFAULT_SQLITE_PATH: &str = "~/.workqueue/queues.db";
pub const DEFAULT_SHUTDOWN_GRACE_MS: u64 = 5_000;
/// Queue created when the configuration declares none
pub const DEFAULT_QUEUE: &str = "default";

const ENV_PREFIX: &str = "WORKQUEUE";

/// Where a queue keeps work that does not fit its channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Channel only; overflow follows the queue's overflow policy
    #[default]
    Memory,
    Sqlite,
    Redis,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_sqlite_path")]
    pub sqlite_path: String,
    #[serde(default)]
    pub redis_url: Option<String>,
    #[serde(default = "default_redis_prefix")]
    pub redis_prefix: String,
}

fn default_sqlite_path() -> String {
    DEFAULT_SQLITE_PATH.to_string()
}

fn default_redis_prefix() -> String {
    workqueue_infra_redis::DEFAULT_PREFIX.to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            sqlite_path: default_sqlite_path(),
            redis_url: None,
            redis_prefix: default_redis_prefix(),
        }
    }
}

impl StorageConfig {
    pub fn sqlite_path(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.sqlite_path).into_owned())
    }
}

/// Per-queue settings; every field is optional so `[queues.<name>]` can
/// override only what differs from `[defaults]`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct QueueSettings {
    pub queue_length: Option<usize>,
    pub batch_length: Option<usize>,
    pub workers: Option<usize>,
    pub boost_workers: Option<usize>,
    pub boost_trigger: Option<usize>,
    pub boost_timeout_ms: Option<u64>,
    pub boost_duration_ms: Option<u64>,
    /// Negative means unbounded
    pub max_retries: Option<i64>,
    pub retry_delay_ms: Option<u64>,
    pub backoff_factor: Option<f64>,
    pub overflow: Option<OverflowPolicy>,
    pub block_timeout_ms: Option<u64>,
    pub backend: Option<BackendKind>,
    pub unique: Option<bool>,
}

impl QueueSettings {
    /// `overrides` on top of `self`
    pub fn merged(&self, overrides: &QueueSettings) -> QueueSettings {
        QueueSettings {
            queue_length: overrides.queue_length.or(self.queue_length),
            batch_length: overrides.batch_length.or(self.batch_length),
            workers: overrides.workers.or(self.workers),
            boost_workers: overrides.boost_workers.or(self.boost_workers),
            boost_trigger: overrides.boost_trigger.or(self.boost_trigger),
            boost_timeout_ms: overrides.boost_timeout_ms.or(self.boost_timeout_ms),
            boost_duration_ms: overrides.boost_duration_ms.or(self.boost_duration_ms),
            max_retries: overrides.max_retries.or(self.max_retries),
            retry_delay_ms: overrides.retry_delay_ms.or(self.retry_delay_ms),
            backoff_factor: overrides.backoff_factor.or(self.backoff_factor),
            overflow: overrides.overflow.or(self.overflow),
            block_timeout_ms: overrides.block_timeout_ms.or(self.block_timeout_ms),
            backend: overrides.backend.or(self.backend),
            unique: overrides.unique.or(self.unique),
        }
    }

    pub fn backend(&self) -> BackendKind {
        self.backend.unwrap_or_default()
    }

    pub fn is_unique(&self) -> bool {
        self.unique.unwrap_or(false)
    }

    /// Queue configuration for `name`, unset fields at library defaults
    pub fn to_queue_config(&self, name: &str) -> QueueConfig {
        let base = QueueConfig::new(name);
        QueueConfig {
            queue_length: self.queue_length.unwrap_or(base.queue_length),
            batch_length: self.batch_length.unwrap_or(base.batch_length),
            workers: self.workers.unwrap_or(base.workers),
            boost_workers: self.boost_workers.unwrap_or(base.boost_workers),
            boost_trigger: self.boost_trigger.unwrap_or(base.boost_trigger),
            boost_timeout_ms: self.boost_timeout_ms.unwrap_or(base.boost_timeout_ms),
            boost_duration_ms: self.boost_duration_ms.unwrap_or(base.boost_duration_ms),
            max_retries: match self.max_retries {
                Some(n) if n < 0 => None,
                Some(n) => Some(n.min(u32::MAX as i64) as u32),
                None => base.max_retries,
            },
            retry_delay_ms: self.retry_delay_ms.unwrap_or(base.retry_delay_ms),
            backoff_factor: self.backoff_factor.unwrap_or(base.backoff_factor),
            overflow: self.overflow.unwrap_or(base.overflow),
            block_timeout_ms: self.block_timeout_ms.unwrap_or(base.block_timeout_ms),
            name: base.name,
        }
    }
}

/// Top-level daemon settings
#[derive(Debug, Clone, Deserialize)]
pub struct DaemonConfig {
    #[serde(default)]
    pub server: RpcServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub defaults: QueueSettings,
    #[serde(default)]
    pub queues: BTreeMap<String, QueueSettings>,
    #[serde(default = "default_shutdown_grace_ms")]
    pub shutdown_grace_ms: u64,
}

fn default_shutdown_grace_ms() -> u64 {
    DEFAULT_SHUTDOWN_GRACE_MS
}

impl DaemonConfig {
    /// Load file + environment
    pub fn load() -> Result<Self> {
        let path = std::env::var("WORKQUEUE_CONFIG")
            .unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        let path = shellexpand::tilde(&path).into_owned();

        let settings = Config::builder()
            .add_source(File::from(PathBuf::from(&path)).format(FileFormat::Toml).required(false))
            .add_source(env_source())
            .build()
            .with_context(|| format!("Failed to read configuration ({})", path))?;

        settings
            .try_deserialize()
            .context("Invalid daemon configuration")
    }

    /// Parse a TOML document (no environment layer)
    #[cfg(test)]
    pub fn from_toml(toml: &str) -> Result<Self> {
        Config::builder()
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()
            .context("Failed to parse configuration")?
            .try_deserialize()
            .context("Invalid daemon configuration")
    }

    /// Effective settings per queue, in name order
    pub fn resolved_queues(&self) -> Vec<(String, QueueSettings)> {
        if self.queues.is_empty() {
            return vec![(DEFAULT_QUEUE.to_string(), self.defaults.clone())];
        }
        self.queues
            .iter()
            .map(|(name, overrides)| (name.clone(), self.defaults.merged(overrides)))
            .collect()
    }

    pub fn shutdown_grace(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.shutdown_grace_ms)
    }
}

fn env_source() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
}
