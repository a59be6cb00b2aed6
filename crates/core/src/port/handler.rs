// Handler Port - where domain logic plugs into the queue subsystem

use crate::domain::Item;
use async_trait::async_trait;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

/// Batch handler registered at queue construction.
///
/// Receives up to `batch_length` items and returns the items that failed
/// with a retryable condition. Returning an empty vector acknowledges the
/// whole batch. Timeouts are the handler's own business: the pool never
/// cancels a running call.
#[async_trait]
pub trait Handler<T>: Send + Sync {
    async fn handle(&self, batch: Vec<Item<T>>) -> Vec<Item<T>>;
}

/// Closure adapter returned by [`handler_fn`]
pub struct FnHandler<T, F> {
    f: F,
    _marker: PhantomData<fn(T)>,
}

#[async_trait]
impl<T, F, Fut> Handler<T> for FnHandler<T, F>
where
    T: Send + 'static,
    F: Fn(Vec<Item<T>>) -> Fut + Send + Sync,
    Fut: Future<Output = Vec<Item<T>>> + Send,
{
    async fn handle(&self, batch: Vec<Item<T>>) -> Vec<Item<T>> {
        (self.f)(batch).await
    }
}

/// Wrap an async closure as a handler
///
/// # Example
/// ```text
/// let handler = handler_fn(|batch: Vec<Item<String>>| async move {
///     for item in &batch {
///         tracing::info!(data = %item.data, "checking");
///     }
///     Vec::new()
/// });
/// ```
pub fn handler_fn<T, F, Fut>(f: F) -> Arc<dyn Handler<T>>
where
    T: Send + 'static,
    F: Fn(Vec<Item<T>>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Vec<Item<T>>> + Send + 'static,
{
    Arc::new(FnHandler {
        f,
        _marker: PhantomData,
    })
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::sync::Mutex;
    use tokio::sync::mpsc;

    /// Records every payload it sees and acknowledges the batch
    pub struct RecordingHandler<T> {
        seen: Mutex<Vec<T>>,
        calls: Mutex<usize>,
        notify: Option<mpsc::UnboundedSender<T>>,
    }

    impl<T: Clone> RecordingHandler<T> {
        pub fn new() -> Self {
            Self {
                seen: Mutex::new(Vec::new()),
                calls: Mutex::new(0),
                notify: None,
            }
        }

        /// Also forward each payload to a channel (for awaiting in tests)
        pub fn with_channel() -> (Self, mpsc::UnboundedReceiver<T>) {
            let (tx, rx) = mpsc::unbounded_channel();
            let handler = Self {
                seen: Mutex::new(Vec::new()),
                calls: Mutex::new(0),
                notify: Some(tx),
            };
            (handler, rx)
        }

        pub fn seen(&self) -> Vec<T> {
            self.seen.lock().unwrap().clone()
        }

        pub fn call_count(&self) -> usize {
            *self.calls.lock().unwrap()
        }
    }

    impl<T: Clone> Default for RecordingHandler<T> {
        fn default() -> Self {
            Self::new()
        }
    }

    #[async_trait]
    impl<T: Clone + Send + 'static> Handler<T> for RecordingHandler<T> {
        async fn handle(&self, batch: Vec<Item<T>>) -> Vec<Item<T>> {
            *self.calls.lock().unwrap() += 1;
            for item in batch {
                if let Some(tx) = &self.notify {
                    let _ = tx.send(item.data.clone());
                }
                self.seen.lock().unwrap().push(item.into_data());
            }
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::mocks::RecordingHandler;
    use super::*;

    #[tokio::test]
    async fn test_handler_fn_returns_retry_list() {
        let handler = handler_fn(|batch: Vec<Item<u32>>| async move {
            batch.into_iter().filter(|item| item.data % 2 == 1).collect()
        });

        let failed = handler
            .handle(vec![Item::new(1), Item::new(2), Item::new(3)])
            .await;
        let failed: Vec<u32> = failed.into_iter().map(Item::into_data).collect();
        assert_eq!(failed, vec![1, 3]);
    }

    #[tokio::test]
    async fn test_recording_handler_forwards_payloads() {
        let (handler, mut rx) = RecordingHandler::<String>::with_channel();
        let retry = handler
            .handle(vec![Item::new("a".to_string()), Item::keyed("b".to_string(), "b")])
            .await;

        assert!(retry.is_empty());
        assert_eq!(handler.call_count(), 1);
        assert_eq!(handler.seen(), vec!["a".to_string(), "b".to_string()]);
        assert_eq!(rx.recv().await.as_deref(), Some("a"));
    }
}
