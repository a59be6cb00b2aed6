//! Durable queues across a process restart
//!
//! Work persisted to SQLite by one queue instance is replayed by the next
//! one opened on the same database file, and unique keys come back with it.

use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use workqueue_core::application::{shutdown_channel, Queue, UniqueQueue};
use workqueue_core::domain::{Item, PushOutcome, QueueConfig};
use workqueue_core::port::handler::mocks::RecordingHandler;
use workqueue_core::port::time_provider::SystemTimeProvider;
use workqueue_core::port::{ByteFifo, Handler};
use workqueue_infra_sqlite::{open, SqliteByteFifo};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct PatchCheck {
    pr: u64,
}

fn db_path(name: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!(
        "workqueue_it_{}_{}.db",
        name,
        std::process::id()
    ));
    cleanup(&path);
    path
}

fn cleanup(path: &PathBuf) {
    let _ = std::fs::remove_file(path);
    let _ = std::fs::remove_file(path.with_extension("db-wal"));
    let _ = std::fs::remove_file(path.with_extension("db-shm"));
}

fn fifo(pool: &SqlitePool, queue: &str) -> Arc<dyn ByteFifo> {
    Arc::new(SqliteByteFifo::new(
        pool.clone(),
        queue,
        Arc::new(SystemTimeProvider),
    ))
}

/// Handler for the first process, whose queue never runs
fn idle_handler() -> Arc<dyn Handler<PatchCheck>> {
    Arc::new(RecordingHandler::<PatchCheck>::new())
}

#[tokio::test]
async fn test_persisted_items_replay_after_restart_in_order() {
    let path = db_path("replay");
    let config = QueueConfig::new("pr_patch_checker")
        .with_workers(1)
        .with_batch_length(1)
        .without_boost();

    // Process 1: queue never runs, every push lands in SQLite
    {
        let pool = open(&path).await.unwrap();
        let queue = Queue::durable(
            config.clone(),
            idle_handler(),
            fifo(&pool, "pr_patch_checker"),
        )
        .unwrap();

        for pr in 1..=5 {
            let outcome = queue.push(Item::new(PatchCheck { pr })).await.unwrap();
            assert_eq!(outcome, PushOutcome::Persisted);
        }
        assert_eq!(queue.stats().await.backend_len, Some(5));
        pool.close().await;
    }

    // Process 2: replay drains the backend through the handler
    let pool = open(&path).await.unwrap();
    let (recorder, mut seen) = RecordingHandler::<PatchCheck>::with_channel();
    let queue = Queue::durable(config, Arc::new(recorder), fifo(&pool, "pr_patch_checker")).unwrap();
    let (_tx, token) = shutdown_channel();
    queue.run(token);

    let mut order = Vec::new();
    for _ in 0..5 {
        let check = tokio::time::timeout(Duration::from_secs(5), seen.recv())
            .await
            .expect("replayed item")
            .unwrap();
        order.push(check.pr);
    }
    assert_eq!(order, vec![1, 2, 3, 4, 5]);

    assert!(queue.flush(Duration::from_secs(2)).await);
    assert_eq!(queue.stats().await.backend_len, Some(0));

    queue.terminate().await;
    pool.close().await;
    cleanup(&path);
}

#[tokio::test]
async fn test_unique_keys_rebuilt_from_sqlite() {
    let path = db_path("unique");
    let config = QueueConfig::new("pr_patch_checker");

    {
        let pool = open(&path).await.unwrap();
        let queue = UniqueQueue::durable(
            config.clone(),
            idle_handler(),
            fifo(&pool, "pr_patch_checker"),
        )
        .await
        .unwrap();

        assert_eq!(
            queue.push(PatchCheck { pr: 2 }, "2").await.unwrap(),
            PushOutcome::Persisted
        );
        assert_eq!(
            queue.push(PatchCheck { pr: 2 }, "2").await.unwrap(),
            PushOutcome::Duplicate
        );
        assert_eq!(
            queue.push(PatchCheck { pr: 3 }, "3").await.unwrap(),
            PushOutcome::Persisted
        );
        pool.close().await;
    }

    let pool = open(&path).await.unwrap();
    let recorder = Arc::new(RecordingHandler::<PatchCheck>::new());
    let queue = UniqueQueue::durable(
        config,
        Arc::clone(&recorder) as Arc<dyn Handler<PatchCheck>>,
        fifo(&pool, "pr_patch_checker"),
    )
    .await
    .unwrap();

    // Keys of stored records are outstanding before the queue even runs
    assert!(queue.has("2"));
    assert!(queue.has("3"));
    assert_eq!(
        queue.push(PatchCheck { pr: 2 }, "2").await.unwrap(),
        PushOutcome::Duplicate
    );

    let (_tx, token) = shutdown_channel();
    queue.run(token);
    assert!(queue.flush(Duration::from_secs(5)).await);

    assert!(!queue.has("2"));
    assert!(!queue.has("3"));
    let mut prs: Vec<u64> = recorder.seen().into_iter().map(|c| c.pr).collect();
    prs.sort();
    assert_eq!(prs, vec![2, 3]);

    queue.terminate().await;
    pool.close().await;
    cleanup(&path);
}

#[tokio::test]
async fn test_queues_sharing_a_database_stay_separate() {
    let path = db_path("shared");
    let pool = open(&path).await.unwrap();

    let mail = Queue::durable(
        QueueConfig::new("mail"),
        Arc::new(RecordingHandler::<u32>::new()),
        fifo(&pool, "mail"),
    )
    .unwrap();
    let hooks = Queue::durable(
        QueueConfig::new("webhooks"),
        Arc::new(RecordingHandler::<u32>::new()),
        fifo(&pool, "webhooks"),
    )
    .unwrap();

    mail.push(Item::new(1)).await.unwrap();
    hooks.push(Item::new(2)).await.unwrap();
    hooks.push(Item::new(3)).await.unwrap();

    assert_eq!(mail.stats().await.backend_len, Some(1));
    assert_eq!(hooks.stats().await.backend_len, Some(2));

    pool.close().await;
    cleanup(&path);
}
