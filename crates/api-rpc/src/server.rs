//! JSON-RPC Server
//!
//! Serves the admin methods over HTTP/WebSocket on a TCP address.

use crate::handler::RpcHandler;
use crate::rate_limiter::RateLimiter;
use crate::types::{FlushRequest, HasRequest, ListRequest, PushRequest, StatsRequest};
use jsonrpsee::server::{Server, ServerHandle};
use jsonrpsee::RpcModule;
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;
use workqueue_core::application::Manager;

pub const DEFAULT_RPC_HOST: &str = "127.0.0.1";
pub const DEFAULT_RPC_PORT: u16 = 9627;

/// RPC Server Configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RpcServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Push calls allowed in a burst
    #[serde(default = "default_burst")]
    pub rate_limit_burst: u32,
    /// Sustained push calls per second
    #[serde(default = "default_rate")]
    pub rate_limit_per_sec: u32,
}

fn default_host() -> String {
    DEFAULT_RPC_HOST.to_string()
}

fn default_port() -> u16 {
    DEFAULT_RPC_PORT
}

fn default_burst() -> u32 {
    crate::rate_limiter::DEFAULT_BURST
}

fn default_rate() -> u32 {
    crate::rate_limiter::DEFAULT_RATE
}

impl Default for RpcServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            rate_limit_burst: default_burst(),
            rate_limit_per_sec: default_rate(),
        }
    }
}

impl RpcServerConfig {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// RPC Server
pub struct RpcServer {
    config: RpcServerConfig,
    handler: Arc<RpcHandler>,
}

impl RpcServer {
    pub fn new(config: RpcServerConfig, manager: Arc<Manager>) -> Self {
        let limiter = RateLimiter::new(config.rate_limit_burst, config.rate_limit_per_sec);
        Self {
            handler: Arc::new(RpcHandler::new(manager, limiter)),
            config,
        }
    }

    /// Method table, usable without binding a socket
    pub fn into_module(self) -> Result<RpcModule<()>, String> {
        let mut module = RpcModule::new(());

        let handler = self.handler.clone();
        module
            .register_async_method("queue.list.v1", move |params, _, _| {
                let handler = handler.clone();
                async move {
                    let req: Option<ListRequest> = params.parse()?;
                    handler.list(req.unwrap_or_default()).await
                }
            })
            .map_err(|e| e.to_string())?;

        let handler = self.handler.clone();
        module
            .register_async_method("queue.stats.v1", move |params, _, _| {
                let handler = handler.clone();
                async move {
                    let req: Option<StatsRequest> = params.parse()?;
                    handler.stats(req.unwrap_or_default()).await
                }
            })
            .map_err(|e| e.to_string())?;

        let handler = self.handler.clone();
        module
            .register_async_method("queue.flush.v1", move |params, _, _| {
                let handler = handler.clone();
                async move {
                    let req: Option<FlushRequest> = params.parse()?;
                    handler.flush(req.unwrap_or_default()).await
                }
            })
            .map_err(|e| e.to_string())?;

        let handler = self.handler.clone();
        module
            .register_async_method("queue.push.v1", move |params, _, _| {
                let handler = handler.clone();
                async move {
                    let req: PushRequest = params.parse()?;
                    handler.push(req).await
                }
            })
            .map_err(|e| e.to_string())?;

        let handler = self.handler;
        module
            .register_async_method("queue.has.v1", move |params, _, _| {
                let handler = handler.clone();
                async move {
                    let req: HasRequest = params.parse()?;
                    handler.has(req).await
                }
            })
            .map_err(|e| e.to_string())?;

        Ok(module)
    }

    /// Bind and start serving; returns the bound address and the handle
    /// that stops the server
    pub async fn start(self) -> Result<(SocketAddr, ServerHandle), String> {
        let addr = self.config.addr();

        let server = Server::builder()
            .build(&addr)
            .await
            .map_err(|e| format!("Failed to build server on {}: {}", addr, e))?;
        let local_addr = server
            .local_addr()
            .map_err(|e| format!("Failed to read bound address: {}", e))?;

        let module = self.into_module()?;
        let handle = server.start(module);

        info!(addr = %local_addr, "JSON-RPC admin server started");
        Ok((local_addr, handle))
    }
}
