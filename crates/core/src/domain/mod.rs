// Domain Layer - Queue items, configuration, lifecycle

pub mod error;
pub mod item;
pub mod queue;

// Re-exports
pub use error::DomainError;
pub use item::{Item, Payload, PushOutcome};
pub use queue::{OverflowPolicy, QueueConfig, QueueId, QueueState, QueueStats};
