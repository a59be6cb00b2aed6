// Application Layer - Queue services built on the ports

pub mod codec;
pub mod durable;
pub mod manager;
pub mod queue;
pub mod retry;
pub mod unique_queue;
pub mod unique_set;
pub mod worker;

// Re-exports
pub use codec::{Codec, JsonCodec};
pub use durable::DurableStore;
pub use manager::{ManagedQueue, Manager};
pub use queue::{Queue, QueueBuilder};
pub use unique_queue::UniqueQueue;
pub use unique_set::UniqueSet;
pub use worker::{
    shutdown_channel, ShutdownSender, ShutdownToken, TryPushError, WorkerPool, WorkerPoolBuilder,
};
