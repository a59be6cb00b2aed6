//! RPC Error Types
//!
//! Maps application errors to JSON-RPC error codes.

use jsonrpsee::types::ErrorObjectOwned;
use workqueue_core::domain::DomainError;
use workqueue_core::error::AppError;

/// RPC Error Codes
pub mod code {
    pub const VALIDATION_ERROR: i32 = 4000;
    pub const NOT_FOUND: i32 = 4001;
    pub const CONFLICT: i32 = 4002;
    pub const THROTTLED: i32 = 4003;
    pub const QUEUE_FULL: i32 = 4004;
    pub const SHUTTING_DOWN: i32 = 4005;
    pub const INTERNAL_ERROR: i32 = 5000;
    pub const BACKEND_ERROR: i32 = 5001;
}

/// Convert AppError to JSON-RPC ErrorObject
pub fn to_rpc_error(err: AppError) -> ErrorObjectOwned {
    let code = match &err {
        AppError::Validation(_) | AppError::Serialization(_) => code::VALIDATION_ERROR,
        AppError::NotFound(_) => code::NOT_FOUND,
        AppError::Domain(DomainError::QueueNotFound(_)) => code::NOT_FOUND,
        AppError::Domain(DomainError::DuplicateQueue(_)) => code::CONFLICT,
        AppError::Domain(DomainError::InvalidConfig { .. }) => code::VALIDATION_ERROR,
        AppError::ChannelFull(_) => code::QUEUE_FULL,
        AppError::ShutDown(_) => code::SHUTTING_DOWN,
        AppError::Backend(_) | AppError::Io(_) => code::BACKEND_ERROR,
        AppError::Config(_) | AppError::Internal(_) => code::INTERNAL_ERROR,
    };
    ErrorObjectOwned::owned(code, err.to_string(), None::<()>)
}

/// Error returned when the push rate limit is exhausted
pub fn throttled() -> ErrorObjectOwned {
    ErrorObjectOwned::owned(
        code::THROTTLED,
        "Rate limit exceeded. Please slow down.",
        None::<()>,
    )
}
