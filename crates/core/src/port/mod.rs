// Port Layer - Interfaces for external dependencies

pub mod byte_fifo;
pub mod handler;
pub mod time_provider; // For deterministic boost tests

// Re-exports
pub use byte_fifo::{ByteFifo, MemoryByteFifo};
pub use handler::{handler_fn, Handler};
pub use time_provider::TimeProvider;
