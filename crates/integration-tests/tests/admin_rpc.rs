//! Admin RPC over a real socket
//!
//! Starts the JSON-RPC server on an ephemeral port and drives it with the
//! jsonrpsee HTTP client, the way the CLI talks to the daemon.

use jsonrpsee::core::client::ClientT;
use jsonrpsee::core::params::ObjectParams;
use jsonrpsee::core::ClientError;
use jsonrpsee::http_client::{HttpClient, HttpClientBuilder};
use jsonrpsee::server::ServerHandle;
use serde_json::{json, Value};
use std::sync::Arc;

use workqueue_api_rpc::error::code;
use workqueue_api_rpc::types::{FlushResponse, HasResponse, ListResponse, PushResponse, StatsResponse};
use workqueue_api_rpc::{RpcServer, RpcServerConfig};
use workqueue_core::application::{Manager, Queue, UniqueQueue};
use workqueue_core::domain::{PushOutcome, QueueConfig};
use workqueue_core::port::handler::mocks::RecordingHandler;

async fn start() -> (HttpClient, ServerHandle, Arc<Manager>) {
    let manager = Arc::new(Manager::new());

    let mail = Queue::new(
        QueueConfig::new("mail"),
        Arc::new(RecordingHandler::<Value>::new()),
    )
    .unwrap();
    manager.register_and_run(Arc::new(mail)).unwrap();

    let checks = UniqueQueue::new(
        QueueConfig::new("pr_patch_checker"),
        Arc::new(RecordingHandler::<Value>::new()),
    )
    .await
    .unwrap();
    manager.register_and_run(Arc::new(checks)).unwrap();

    let config = RpcServerConfig {
        port: 0,
        ..Default::default()
    };
    let (addr, handle) = RpcServer::new(config, Arc::clone(&manager))
        .start()
        .await
        .unwrap();

    let client = HttpClientBuilder::default()
        .build(format!("http://{}", addr))
        .unwrap();
    (client, handle, manager)
}

fn params(value: Value) -> ObjectParams {
    let mut params = ObjectParams::new();
    if let Value::Object(map) = value {
        for (name, value) in map {
            params.insert(&name, value).unwrap();
        }
    }
    params
}

#[tokio::test]
async fn test_list_push_flush_stats() {
    let (client, handle, _manager) = start().await;

    let list: ListResponse = client
        .request("queue.list.v1", ObjectParams::new())
        .await
        .unwrap();
    assert_eq!(list.queues, vec!["mail", "pr_patch_checker"]);

    let pushed: PushResponse = client
        .request(
            "queue.push.v1",
            params(json!({"queue": "mail", "payload": {"to": "ops"}})),
        )
        .await
        .unwrap();
    assert_eq!(pushed.outcome, PushOutcome::Dispatched);

    let flushed: FlushResponse = client
        .request("queue.flush.v1", params(json!({"timeout_ms": 2000})))
        .await
        .unwrap();
    assert!(flushed.flushed);

    let stats: StatsResponse = client
        .request("queue.stats.v1", params(json!({"queue": "pr_patch_checker"})))
        .await
        .unwrap();
    assert_eq!(stats.queues.len(), 1);
    assert!(stats.queues[0].unique);
    assert_eq!(stats.queues[0].outstanding, 0);

    handle.stop().unwrap();
}

#[tokio::test]
async fn test_unique_push_and_has() {
    let (client, handle, manager) = start().await;

    let first: PushResponse = client
        .request(
            "queue.push.v1",
            params(json!({"queue": "pr_patch_checker", "payload": 2, "key": "2"})),
        )
        .await
        .unwrap();
    assert!(first.outcome.is_accepted());

    let flushed: FlushResponse = client
        .request(
            "queue.flush.v1",
            params(json!({"queue": "pr_patch_checker", "timeout_ms": 2000})),
        )
        .await
        .unwrap();
    assert!(flushed.flushed);

    let has: HasResponse = client
        .request(
            "queue.has.v1",
            params(json!({"queue": "pr_patch_checker", "key": "2"})),
        )
        .await
        .unwrap();
    assert!(!has.present);

    assert!(manager.shutdown(std::time::Duration::from_secs(1)).await);
    handle.stop().unwrap();
}

#[tokio::test]
async fn test_errors_carry_admin_codes() {
    let (client, handle, _manager) = start().await;

    let missing = client
        .request::<HasResponse, _>("queue.has.v1", params(json!({"queue": "nope", "key": "k"})))
        .await;
    match missing {
        Err(ClientError::Call(err)) => assert_eq!(err.code(), code::NOT_FOUND),
        other => panic!("expected call error, got {:?}", other),
    }

    let no_key = client
        .request::<PushResponse, _>(
            "queue.push.v1",
            params(json!({"queue": "pr_patch_checker", "payload": 1})),
        )
        .await;
    match no_key {
        Err(ClientError::Call(err)) => assert_eq!(err.code(), code::VALIDATION_ERROR),
        other => panic!("expected call error, got {:?}", other),
    }

    handle.stop().unwrap();
}
