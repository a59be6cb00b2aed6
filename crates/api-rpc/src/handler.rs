//! RPC Method Handlers
//!
//! Each method resolves its queue through the manager and maps
//! `AppError` into JSON-RPC errors.

use crate::error::{throttled, to_rpc_error};
use crate::rate_limiter::RateLimiter;
use crate::types::{
    FlushRequest, FlushResponse, HasRequest, HasResponse, ListRequest, ListResponse, PushRequest,
    PushResponse, StatsRequest, StatsResponse,
};
use jsonrpsee::types::ErrorObjectOwned;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};
use workqueue_core::application::Manager;

/// RPC Handler with injected dependencies
pub struct RpcHandler {
    manager: Arc<Manager>,
    rate_limiter: RateLimiter,
    start_time: Instant,
}

impl RpcHandler {
    pub fn new(manager: Arc<Manager>, rate_limiter: RateLimiter) -> Self {
        Self {
            manager,
            rate_limiter,
            start_time: Instant::now(),
        }
    }

    /// queue.list.v1
    pub async fn list(&self, _params: ListRequest) -> Result<ListResponse, ErrorObjectOwned> {
        Ok(ListResponse {
            queues: self.manager.names(),
        })
    }

    /// queue.stats.v1
    pub async fn stats(&self, params: StatsRequest) -> Result<StatsResponse, ErrorObjectOwned> {
        let queues = match params.queue {
            Some(name) => {
                let queue = self.manager.require(&name).map_err(to_rpc_error)?;
                vec![queue.stats().await]
            }
            None => self.manager.stats().await,
        };

        Ok(StatsResponse {
            queues,
            shutting_down: self.manager.is_shutting_down(),
            uptime_seconds: self.start_time.elapsed().as_secs(),
        })
    }

    /// queue.flush.v1
    pub async fn flush(&self, params: FlushRequest) -> Result<FlushResponse, ErrorObjectOwned> {
        let timeout = Duration::from_millis(params.timeout_ms);

        let flushed = match params.queue {
            Some(name) => {
                let queue = self.manager.require(&name).map_err(to_rpc_error)?;
                queue.flush(timeout).await
            }
            None => self.manager.flush_all(timeout).await,
        };

        info!(flushed, timeout_ms = params.timeout_ms, "Flush requested over RPC");
        Ok(FlushResponse { flushed })
    }

    /// queue.push.v1
    pub async fn push(&self, params: PushRequest) -> Result<PushResponse, ErrorObjectOwned> {
        if !self.rate_limiter.try_acquire() {
            return Err(throttled());
        }

        let queue = self.manager.require(&params.queue).map_err(to_rpc_error)?;
        let outcome = queue
            .push_json(params.payload, params.key)
            .await
            .map_err(to_rpc_error)?;

        debug!(queue = %params.queue, outcome = %outcome, "Push over RPC");
        Ok(PushResponse {
            queue: params.queue,
            outcome,
        })
    }

    /// queue.has.v1
    pub async fn has(&self, params: HasRequest) -> Result<HasResponse, ErrorObjectOwned> {
        let queue = self.manager.require(&params.queue).map_err(to_rpc_error)?;
        let present = queue.has(&params.key).map_err(to_rpc_error)?;

        Ok(HasResponse {
            queue: params.queue,
            key: params.key,
            present,
        })
    }
}
