// Two-phase shutdown token (shutdown, then terminate)

use tokio::sync::watch;

/// Lifecycle phase broadcast to queues and workers
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Phase {
    Running,
    /// Stop accepting non-durable work, let in-flight work finish
    Shutdown,
    /// Abandon in-flight work, release resources
    Terminate,
}

/// Shutdown signal for graceful termination
#[derive(Clone)]
pub struct ShutdownToken {
    rx: watch::Receiver<Phase>,
}

impl ShutdownToken {
    /// Check if shutdown (or terminate) was requested
    pub fn is_shutdown(&self) -> bool {
        *self.rx.borrow() >= Phase::Shutdown
    }

    /// Check if terminate was requested
    pub fn is_terminated(&self) -> bool {
        *self.rx.borrow() >= Phase::Terminate
    }

    /// Wait for the shutdown phase (returns at once if already reached)
    pub async fn wait_shutdown(&mut self) {
        self.wait_for(Phase::Shutdown).await
    }

    /// Wait for the terminate phase (returns at once if already reached)
    pub async fn wait_terminate(&mut self) {
        self.wait_for(Phase::Terminate).await
    }

    async fn wait_for(&mut self, phase: Phase) {
        // A dropped sender means nobody will ever advance the phase
        if self.rx.wait_for(|current| *current >= phase).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Shutdown sender
pub struct ShutdownSender {
    tx: watch::Sender<Phase>,
}

impl ShutdownSender {
    /// Signal shutdown to all holders of a token
    pub fn shutdown(&self) {
        self.advance(Phase::Shutdown);
    }

    /// Signal terminate to all holders of a token
    pub fn terminate(&self) {
        self.advance(Phase::Terminate);
    }

    /// Hand out another token for the same channel
    pub fn token(&self) -> ShutdownToken {
        ShutdownToken {
            rx: self.tx.subscribe(),
        }
    }

    pub fn phase(&self) -> Phase {
        *self.tx.borrow()
    }

    fn advance(&self, phase: Phase) {
        // Phases only move forward
        self.tx.send_if_modified(|current| {
            if *current < phase {
                *current = phase;
                true
            } else {
                false
            }
        });
    }
}

/// Create a shutdown channel
pub fn shutdown_channel() -> (ShutdownSender, ShutdownToken) {
    let (tx, rx) = watch::channel(Phase::Running);
    (ShutdownSender { tx }, ShutdownToken { rx })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_phases_advance_in_order() {
        let (tx, token) = shutdown_channel();
        assert!(!token.is_shutdown());

        tx.shutdown();
        assert!(token.is_shutdown());
        assert!(!token.is_terminated());

        tx.terminate();
        assert!(token.is_terminated());

        // Cannot go back
        tx.shutdown();
        assert_eq!(tx.phase(), Phase::Terminate);
    }

    #[tokio::test]
    async fn test_wait_returns_for_already_reached_phase() {
        let (tx, mut token) = shutdown_channel();
        tx.terminate();
        tokio::time::timeout(Duration::from_millis(100), token.wait_shutdown())
            .await
            .expect("shutdown already reached");
        tokio::time::timeout(Duration::from_millis(100), token.wait_terminate())
            .await
            .expect("terminate already reached");
    }

    #[tokio::test]
    async fn test_tokens_from_sender_see_broadcast() {
        let (tx, _token) = shutdown_channel();
        let mut late = tx.token();
        let waiter = tokio::spawn(async move { late.wait_shutdown().await });

        tx.shutdown();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }
}
