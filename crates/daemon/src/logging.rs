//! Logging setup
//!
//! `RUST_LOG` filters (default `workqueue=info`), `WORKQUEUE_LOG_FORMAT`
//! picks `pretty` or `json` for stdout, and `WORKQUEUE_LOG_DIR` adds a
//! daily-rolling JSON file.

use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_FILTER: &str = "workqueue=info";
const LOG_FILE_PREFIX: &str = "workqueued.log";

/// Install the global subscriber.
///
/// The returned guard flushes the file writer on drop; keep it alive for
/// the whole process.
pub fn init() -> Result<Option<WorkerGuard>> {
    let format = std::env::var("WORKQUEUE_LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string());

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(DEFAULT_FILTER))
        .context("Failed to create env filter")?;

    let (file_layer, guard) = match std::env::var("WORKQUEUE_LOG_DIR") {
        Ok(dir) => {
            let dir = shellexpand::tilde(&dir).into_owned();
            std::fs::create_dir_all(&dir)
                .with_context(|| format!("Failed to create log directory {}", dir))?;
            let appender = tracing_appender::rolling::daily(&dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().json().with_ansi(false).with_writer(writer);
            (Some(layer), Some(guard))
        }
        Err(_) => (None, None),
    };

    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer);

    match format.as_str() {
        "json" => registry
            .with(fmt::layer().json())
            .try_init()
            .context("Failed to install JSON subscriber")?,
        _ => registry
            .with(fmt::layer().pretty())
            .try_init()
            .context("Failed to install subscriber")?,
    }

    Ok(guard)
}
