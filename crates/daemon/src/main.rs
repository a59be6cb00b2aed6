//! workqueued - hosts configured queues behind the JSON-RPC admin API

mod config;
mod factory;
mod handlers;
mod logging;

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::config::DaemonConfig;
use crate::factory::QueueFactory;
use workqueue_api_rpc::RpcServer;
use workqueue_core::application::Manager;

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Logging (guard flushes the file writer at exit)
    let _log_guard = logging::init()?;
    info!("workqueued v{} starting...", VERSION);

    // 2. Configuration
    let config = DaemonConfig::load()?;
    info!(
        queues = config.queues.len(),
        grace_ms = config.shutdown_grace_ms,
        "Configuration loaded"
    );

    // 3. Queues
    let manager = Arc::new(Manager::new());
    let factory = QueueFactory::new(config.storage.clone());

    // All queues are built before any of them runs
    let queues = factory.build_all(&config.resolved_queues()).await?;
    for queue in queues {
        let name = queue.name().to_string();
        if let Err(e) = manager.register_and_run(queue) {
            manager.shutdown(config.shutdown_grace()).await;
            factory.close().await;
            return Err(e).with_context(|| format!("Failed to register queue '{}'", name));
        }
    }

    // 4. Admin RPC
    let (addr, rpc_handle) = RpcServer::new(config.server.clone(), Arc::clone(&manager))
        .start()
        .await
        .map_err(|e| anyhow::anyhow!("RPC server start failed: {}", e))?;

    info!(rpc = %addr, queues = ?manager.names(), "System ready");
    info!("Press Ctrl+C to shutdown");

    // 5. Wait for shutdown signal
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl+C")?;
    info!("Shutdown signal received");

    // 6. Stop accepting admin calls, then two-phase queue shutdown
    if let Err(e) = rpc_handle.stop() {
        warn!(error = %e, "RPC server already stopped");
    }

    if !manager.shutdown(config.shutdown_grace()).await {
        error!(
            grace_ms = config.shutdown_grace_ms,
            "Queues did not finish within the grace period; remaining work persisted or dropped"
        );
    }
    factory.close().await;

    info!("Shutdown complete.");
    Ok(())
}
