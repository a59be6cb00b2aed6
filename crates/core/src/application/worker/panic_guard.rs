// Panic isolation for handler calls
use std::any::Any;
use std::future::Future;
use tokio::task::JoinHandle;
use tracing::error;

/// Result of a panic-guarded execution
#[derive(Debug)]
pub enum PanicGuardResult<T> {
    /// Execution completed successfully
    Success(T),
    /// Execution panicked
    Panicked(String),
    /// Task was aborted before finishing (terminate)
    Cancelled,
}

/// Aborts the wrapped task when dropped, so a worker aborted mid-call
/// takes its handler call down with it
struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Execute a future on its own task with panic isolation
///
/// A panic inside the future is caught at the task boundary and returned as
/// `PanicGuardResult::Panicked`, leaving the calling worker alive.
///
/// # Example
/// ```text
/// let result = execute_guarded_async(async {
///     handler.handle(batch).await
/// }).await;
/// ```
pub async fn execute_guarded_async<F, T>(future: F) -> PanicGuardResult<T>
where
    F: Future<Output = T> + Send + 'static,
    T: Send + 'static,
{
    let mut guard = AbortOnDrop(tokio::spawn(future));

    match (&mut guard.0).await {
        Ok(value) => PanicGuardResult::Success(value),
        Err(join_err) if join_err.is_panic() => {
            let panic_msg = panic_message(join_err.into_panic());
            error!(panic_msg = %panic_msg, "Handler panicked");
            PanicGuardResult::Panicked(panic_msg)
        }
        Err(_) => PanicGuardResult::Cancelled,
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic".to_string()
    }
}
