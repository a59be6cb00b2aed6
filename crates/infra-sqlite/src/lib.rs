// workqueue Infrastructure - SQLite Adapter
// Implements: ByteFifo (durable queue backend)

mod connection;
mod error;
mod fifo;
mod migration;

pub use connection::{create_pool, open};
pub use fifo::SqliteByteFifo;
pub use migration::run_migrations;

// Note: sqlx::Error conversion is handled by a mapping helper (error.rs)
// due to Rust's orphan rules (cannot implement From<sqlx::Error> for AppError here)
