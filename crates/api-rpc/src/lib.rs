//! JSON-RPC Admin API
//!
//! Exposes the queue manager to operators: listing, statistics, flushing,
//! pushing JSON payloads and key lookups on unique queues.

pub mod error;
pub mod handler;
pub mod rate_limiter;
pub mod server;
pub mod types;

pub use server::{RpcServer, RpcServerConfig};
