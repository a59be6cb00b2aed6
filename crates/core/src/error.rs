// Central Error Type for the Queue Subsystem

use thiserror::Error;

/// Application-level error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Domain error: {0}")]
    Domain(#[from] crate::domain::DomainError),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// Channel full and no durable backend to overflow into
    #[error("Queue full: {0}")]
    ChannelFull(String),

    /// Queue no longer accepts non-durable work
    #[error("Queue shut down: {0}")]
    ShutDown(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// True for conditions a caller may resolve by retrying later
    pub fn is_backpressure(&self) -> bool {
        matches!(self, AppError::ChannelFull(_))
    }
}

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;

// From implementations for infra crates (to avoid circular dependency)
impl From<String> for AppError {
    fn from(err: String) -> Self {
        AppError::Backend(err)
    }
}

// Note: sqlx::Error and redis::RedisError conversions are handled in the infra
// crates by mapping to AppError::Backend(String)
