//! Integration tests for the listener loop
//!
//! These tests run the full worker pool against the in-memory and spool
//! brokers and check what reaches the next pipeline stage.

mod common;

use common::{executor, gunzip, scenario_message, RefusingStore, ScriptedRenderer};
use grid_loader::listener::{Broker, MemoryBroker, SpoolBroker};
use grid_loader::message::JobMessage;
use grid_loader::storage::{AssetStore, SqliteAssetStore};
use grid_loader::{ActionResult, FailureReason, Listener};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn page_server() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/page"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>plain</html>"))
        .mount(&server)
        .await;
    server
}

#[tokio::test]
async fn test_successful_message_forwards_child_unchanged() {
    let server = page_server().await;
    let broker = Arc::new(MemoryBroker::new());
    let store = Arc::new(SqliteAssetStore::new_in_memory().unwrap());
    let executor = Arc::new(executor(ScriptedRenderer::faulting(), store.clone(), false));

    let id = broker
        .submit(scenario_message(&format!("{}/page", server.uri())).into_bytes())
        .await
        .unwrap();
    broker.close().await;

    let listener = Listener::new(broker.clone(), executor, 2);
    listener.run().await.unwrap();

    assert_eq!(
        broker.acknowledged().await,
        vec![(id, ActionResult::Success)]
    );
    assert!(store.load("a/b.warc.gz").await.unwrap().is_some());

    let published = broker.published().await;
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].0, "yacyparser");

    let next = JobMessage::from_slice(&published[0].1).unwrap();
    assert_eq!(next.actions.len(), 1);
    assert_eq!(next.actions[0].sourceasset.as_deref(), Some("a/b.warc.gz"));
    assert_eq!(next.actions[0].target_asset(), Some("a/b.jsonlist"));
    assert!(next.actions[0].assets.is_empty());
    assert_eq!(next.data[0].id, "c1");
    assert_eq!(next.data[0].extra.get("collection"), Some(&serde_json::Value::from("test")));
    assert_eq!(next.metadata.process, "yacy_grid_loader");

    let stats = listener.stats();
    assert_eq!(stats.processed(), 1);
    assert_eq!(stats.succeeded(), 1);
    assert_eq!(stats.published(), 1);
}

#[tokio::test]
async fn test_store_failure_forwards_embedded_payload() {
    let server = page_server().await;
    let broker = Arc::new(MemoryBroker::new());
    let executor = Arc::new(executor(
        ScriptedRenderer::faulting(),
        Arc::new(RefusingStore::default()),
        false,
    ));

    broker
        .submit(scenario_message(&format!("{}/page", server.uri())).into_bytes())
        .await
        .unwrap();
    broker.close().await;

    Listener::new(broker.clone(), executor, 1).run().await.unwrap();

    let published = broker.published().await;
    assert_eq!(published.len(), 1);
    let next = JobMessage::from_slice(&published[0].1).unwrap();
    let embedded = next.actions[0].binary_asset("a/b.warc.gz").unwrap().unwrap();
    assert!(gunzip(&embedded).contains("<html>plain</html>"));
}

#[tokio::test]
async fn test_malformed_message_is_rejected() {
    let broker = Arc::new(MemoryBroker::new());
    let executor = Arc::new(executor(
        ScriptedRenderer::rendering("<html/>"),
        Arc::new(SqliteAssetStore::new_in_memory().unwrap()),
        false,
    ));

    broker.submit(b"not json".to_vec()).await.unwrap();
    broker
        .submit(br#"{"data": [{"id": "c1", "crawlingDepth": 1}, {"id": "c1", "crawlingDepth": 2}], "actions": []}"#.to_vec())
        .await
        .unwrap();
    broker.close().await;

    let listener = Listener::new(broker.clone(), executor, 1);
    listener.run().await.unwrap();

    let acknowledged = broker.acknowledged().await;
    assert_eq!(acknowledged.len(), 2);
    for (_, result) in &acknowledged {
        assert!(matches!(
            result,
            ActionResult::FailIrreversible(FailureReason::MalformedMessage(_))
        ));
    }
    assert!(broker.published().await.is_empty());
    assert_eq!(listener.stats().failed(), 2);
}

#[tokio::test]
async fn test_failed_action_forwards_nothing() {
    let broker = Arc::new(MemoryBroker::new());
    let renderer = ScriptedRenderer::rendering("<html/>");
    let executor = Arc::new(executor(
        Arc::clone(&renderer),
        Arc::new(SqliteAssetStore::new_in_memory().unwrap()),
        false,
    ));

    let message = scenario_message("http://unused.example/").replace("\"id\": \"c1\",\n", "");
    broker.submit(message.into_bytes()).await.unwrap();
    broker.close().await;

    Listener::new(broker.clone(), executor, 1).run().await.unwrap();

    assert_eq!(
        broker.acknowledged().await[0].1,
        ActionResult::FailIrreversible(FailureReason::MissingIdentifier)
    );
    assert!(broker.published().await.is_empty());
    assert_eq!(renderer.calls(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_worker_pool_handles_each_message_once() {
    const MESSAGES: usize = 40;

    let broker = Arc::new(MemoryBroker::new());
    let renderer =
        ScriptedRenderer::rendering_slowly("<html>rendered</html>", Duration::from_millis(20));
    let store = Arc::new(SqliteAssetStore::new_in_memory().unwrap());
    let executor = Arc::new(executor(Arc::clone(&renderer), store.clone(), false));

    let mut submitted = HashSet::new();
    for i in 0..MESSAGES {
        let message = scenario_message(&format!("http://site{}.example/", i));
        submitted.insert(broker.submit(message.into_bytes()).await.unwrap());
    }
    broker.close().await;

    let listener = Listener::new(broker.clone(), executor, 4);
    tokio::time::timeout(Duration::from_secs(30), listener.run())
        .await
        .expect("listener did not drain the broker")
        .unwrap();

    let acknowledged = broker.acknowledged().await;
    assert_eq!(acknowledged.len(), MESSAGES);
    let settled: HashSet<_> = acknowledged.iter().map(|(id, _)| id.clone()).collect();
    assert_eq!(settled, submitted);
    assert!(acknowledged
        .iter()
        .all(|(_, result)| *result == ActionResult::Success));

    assert_eq!(broker.published().await.len(), MESSAGES);
    assert_eq!(renderer.calls(), MESSAGES);
    assert!(renderer.peak_concurrency() > 1);
    assert!(renderer.peak_concurrency() <= 4);

    let stats = listener.stats();
    assert_eq!(stats.processed(), MESSAGES as u64);
    assert_eq!(stats.succeeded(), MESSAGES as u64);
    assert_eq!(stats.published(), MESSAGES as u64);
}

#[tokio::test]
async fn test_shutdown_stops_idle_workers() {
    let broker = Arc::new(MemoryBroker::new());
    let executor = Arc::new(executor(
        ScriptedRenderer::rendering("<html/>"),
        Arc::new(SqliteAssetStore::new_in_memory().unwrap()),
        false,
    ));

    let listener = Listener::new(broker.clone(), executor, 3);
    let shutdown = listener.shutdown_token();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        shutdown.cancel();
    });

    tokio::time::timeout(Duration::from_secs(5), listener.run())
        .await
        .expect("listener did not stop")
        .unwrap();
    assert_eq!(listener.stats().processed(), 0);
}

#[tokio::test]
async fn test_render_cache_is_released_when_listener_stops() {
    let broker = Arc::new(MemoryBroker::new());
    let executor = Arc::new(executor(
        ScriptedRenderer::rendering("<html>rendered</html>"),
        Arc::new(SqliteAssetStore::new_in_memory().unwrap()),
        false,
    ));
    let render = Arc::clone(executor.retriever().render_client());

    broker
        .submit(scenario_message("http://rendered.example/").into_bytes())
        .await
        .unwrap();
    broker.close().await;

    Listener::new(broker.clone(), executor, 1).run().await.unwrap();

    assert_eq!(broker.acknowledged().await[0].1, ActionResult::Success);
    assert_eq!(render.cache_len().await, 0);
}

#[tokio::test]
async fn test_spool_round_trip() {
    let server = page_server().await;
    let spool_dir = TempDir::new().unwrap();
    let db_dir = TempDir::new().unwrap();

    let broker = SpoolBroker::open(spool_dir.path(), Duration::from_millis(10))
        .await
        .unwrap()
        .draining();
    std::fs::write(
        spool_dir.path().join("inbox/job-1.json"),
        scenario_message(&format!("{}/page", server.uri())),
    )
    .unwrap();

    let store = Arc::new(SqliteAssetStore::new(&db_dir.path().join("assets.db")).unwrap());
    let executor = Arc::new(executor(ScriptedRenderer::faulting(), store.clone(), false));
    let broker: Arc<dyn Broker> = Arc::new(broker);

    Listener::new(broker, executor, 2).run().await.unwrap();

    assert!(spool_dir.path().join("done/job-1.json").exists());
    assert!(!spool_dir.path().join("inbox/job-1.json").exists());
    assert!(store.load("a/b.warc.gz").await.unwrap().is_some());

    let outbox: Vec<_> = std::fs::read_dir(spool_dir.path().join("outbox/yacyparser"))
        .unwrap()
        .map(|entry| entry.unwrap().path())
        .collect();
    assert_eq!(outbox.len(), 1);
    let next = JobMessage::from_slice(&std::fs::read(&outbox[0]).unwrap()).unwrap();
    assert_eq!(next.actions[0].sourceasset.as_deref(), Some("a/b.warc.gz"));
}
