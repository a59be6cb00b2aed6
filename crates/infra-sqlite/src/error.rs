// sqlx -> AppError mapping

use workqueue_core::error::AppError;

/// Convert sqlx::Error to AppError with structured information
pub(crate) fn map_sqlx_error(err: sqlx::Error) -> AppError {
    match &err {
        sqlx::Error::Database(db_err) => {
            if let Some(code) = db_err.code() {
                let code_str = code.as_ref();

                // SQLite error codes: https://www.sqlite.org/rescode.html
                match code_str {
                    "5" => {
                        // SQLITE_BUSY - database is locked
                        AppError::Backend(format!(
                            "Database locked (SQLITE_BUSY): {}",
                            db_err.message()
                        ))
                    }
                    "13" => {
                        // SQLITE_FULL - database or disk is full
                        AppError::Backend(format!("Database full: {}", db_err.message()))
                    }
                    _ => AppError::Backend(format!(
                        "Database error [{}]: {}",
                        code_str,
                        db_err.message()
                    )),
                }
            } else {
                AppError::Backend(format!("Database error: {}", db_err.message()))
            }
        }
        sqlx::Error::PoolTimedOut => {
            AppError::Backend("Timed out waiting for a database connection".to_string())
        }
        sqlx::Error::PoolClosed => AppError::Backend("Database pool closed".to_string()),
        // Connection, protocol, decode errors
        _ => AppError::Backend(format!("SQLite: {}", err)),
    }
}
