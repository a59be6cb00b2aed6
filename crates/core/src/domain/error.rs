// Domain Error Types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DomainError {
    #[error("Invalid queue configuration for '{queue}': {reason}")]
    InvalidConfig { queue: String, reason: String },

    #[error("Queue already registered: {0}")]
    DuplicateQueue(String),

    #[error("Queue not found: {0}")]
    QueueNotFound(String),
}

pub type Result<T> = std::result::Result<T, DomainError>;
