//! End-to-end flows through the gateway: offline queueing, reconnect
//! drains, failure classification, stale fallback, and restart survival.

use std::sync::Arc;
use std::time::Duration;

use outpost_domain::{EngineConfig, EngineError, MutationKind, MutationStatus};
use outpost_engine::{EngineContext, OfflineGateway};
use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("outpost_engine=debug,outpost_infra=debug")
        .with_test_writer()
        .try_init();
}

fn test_config(dir: &TempDir, base_url: &str) -> EngineConfig {
    let mut config = EngineConfig::default();
    config.database.path = dir.path().join("engine.db").to_string_lossy().into_owned();
    config.remote.base_url = base_url.to_string();
    config.connectivity.debounce_ms = 10;
    // Periodic timers stay quiet; tests drive sync explicitly.
    config.sync.interval_secs = 0;
    config.sync.call_timeout_ms = 2_000;
    // Long enough that timed retries never race a test's assertions;
    // explicit triggers still run immediately.
    config.sync.backoff_base_ms = 5_000;
    config
}

async fn engine(dir: &TempDir, base_url: &str) -> (Arc<EngineContext>, OfflineGateway) {
    init_tracing();
    let ctx = Arc::new(EngineContext::new(test_config(dir, base_url)).expect("context wires"));
    ctx.start().await.expect("engine starts");
    (ctx.clone(), OfflineGateway::new(ctx))
}

async fn go_offline(ctx: &EngineContext) {
    let mut rx = ctx.subscribe_connectivity();
    ctx.connectivity_handle().report(false);
    while ctx.connectivity().is_online {
        tokio::time::timeout(Duration::from_secs(2), rx.changed())
            .await
            .expect("offline settles")
            .expect("channel open");
    }
}

async fn go_online(ctx: &EngineContext) {
    let mut rx = ctx.subscribe_connectivity();
    ctx.connectivity_handle().report(true);
    while !ctx.connectivity().is_online {
        tokio::time::timeout(Duration::from_secs(2), rx.changed())
            .await
            .expect("online settles")
            .expect("channel open");
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn offline_write_drains_on_reconnect() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/notes"))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().expect("temp dir");
    let (ctx, gateway) = engine(&dir, &server.uri()).await;
    go_offline(&ctx).await;

    let receipt = gateway
        .write("notes", MutationKind::Insert, json!({"id": "n1", "body": "hi"}), Some("n1".into()))
        .await
        .expect("write queues");
    assert!(receipt.queued);
    assert!(!receipt.sync_triggered, "no trigger while offline");
    assert_eq!(ctx.pending_count().await.expect("count"), 1);

    let mut cycles = ctx.subscribe_cycles().await;
    go_online(&ctx).await;

    let result = tokio::time::timeout(Duration::from_secs(5), cycles.recv())
        .await
        .expect("cycle completes")
        .expect("channel open");
    assert_eq!(result.succeeded, 1);
    assert_eq!(result.failed, 0);
    assert_eq!(ctx.pending_count().await.expect("count"), 0);

    ctx.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn transient_failure_keeps_mutation_pending() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/notes"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let dir = TempDir::new().expect("temp dir");
    let (ctx, gateway) = engine(&dir, &server.uri()).await;

    let mut cycles = ctx.subscribe_cycles().await;
    let receipt = gateway
        .write("notes", MutationKind::Insert, json!({"id": "n1"}), None)
        .await
        .expect("write queues");
    assert!(receipt.sync_triggered);

    let result = tokio::time::timeout(Duration::from_secs(5), cycles.recv())
        .await
        .expect("cycle completes")
        .expect("channel open");
    assert_eq!(result.failed, 1);
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors[0].mutation_id, receipt.mutation_id);

    // Still pending, will retry after backoff.
    assert_eq!(ctx.pending_count().await.expect("count"), 1);
    assert!(ctx.dead_lettered().await.expect("dlq").is_empty());

    ctx.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn transient_failure_recovers_on_next_cycle() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/notes"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/notes"))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().expect("temp dir");
    let (ctx, gateway) = engine(&dir, &server.uri()).await;

    let mut cycles = ctx.subscribe_cycles().await;
    gateway
        .write("notes", MutationKind::Insert, json!({"id": "n1"}), None)
        .await
        .expect("write queues");

    let first = tokio::time::timeout(Duration::from_secs(5), cycles.recv())
        .await
        .expect("cycle completes")
        .expect("channel open");
    assert_eq!(first.failed, 1);
    assert_eq!(ctx.pending_count().await.expect("count"), 1);

    // The next cycle retries the same record and the remote accepts it.
    ctx.trigger_sync().await;
    let second = tokio::time::timeout(Duration::from_secs(5), cycles.recv())
        .await
        .expect("cycle completes")
        .expect("channel open");
    assert_eq!(second.succeeded, 1);
    assert_eq!(second.failed, 0);
    assert_eq!(ctx.pending_count().await.expect("count"), 0);
    assert!(ctx.dead_lettered().await.expect("dlq").is_empty());

    ctx.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn concurrent_triggers_coalesce_into_one_cycle() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/notes"))
        .respond_with(ResponseTemplate::new(201).set_delay(Duration::from_millis(300)))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().expect("temp dir");
    let (ctx, gateway) = engine(&dir, &server.uri()).await;

    let mut cycles = ctx.subscribe_cycles().await;
    gateway
        .write("notes", MutationKind::Insert, json!({"id": "n1"}), None)
        .await
        .expect("write queues");

    // Fire extra triggers while the first cycle is still applying.
    tokio::time::sleep(Duration::from_millis(100)).await;
    ctx.trigger_sync().await;
    ctx.trigger_sync().await;

    let result = tokio::time::timeout(Duration::from_secs(5), cycles.recv())
        .await
        .expect("cycle completes")
        .expect("channel open");
    assert_eq!(result.succeeded, 1);

    // The in-flight cycle satisfies the coalesced triggers; no extra
    // cycle runs.
    assert!(
        tokio::time::timeout(Duration::from_millis(400), cycles.recv()).await.is_err(),
        "no further cycle expected"
    );

    ctx.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn write_is_rejected_when_storage_is_full() {
    init_tracing();
    let dir = TempDir::new().expect("temp dir");
    let mut config = test_config(&dir, "http://localhost:1");
    // A single connection so the page limit below applies to all store
    // access.
    config.database.pool_size = 1;

    let ctx = Arc::new(EngineContext::new(config).expect("context wires"));
    let gateway = OfflineGateway::new(ctx.clone());

    {
        let conn = ctx.store_manager().get_connection().expect("connection acquired");
        let pages: i64 =
            conn.query_row("PRAGMA page_count", [], |row| row.get(0)).expect("page count");
        conn.pragma_update(None, "max_page_count", pages).expect("page limit set");
    }

    let blob = "x".repeat(512 * 1024);
    let err = gateway
        .write("notes", MutationKind::Insert, json!({"id": "n1", "blob": blob}), None)
        .await
        .expect_err("write must be rejected");

    assert!(matches!(err, EngineError::StorageQuotaExceeded(_)), "got {err:?}");
    assert_eq!(ctx.pending_count().await.expect("count"), 0, "prior state untouched");
}

#[tokio::test(flavor = "multi_thread")]
async fn permanent_rejection_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/notes"))
        .respond_with(ResponseTemplate::new(422).set_body_string("bad payload"))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().expect("temp dir");
    let (ctx, gateway) = engine(&dir, &server.uri()).await;

    let mut cycles = ctx.subscribe_cycles().await;
    gateway
        .write("notes", MutationKind::Insert, json!({"id": "n1"}), None)
        .await
        .expect("write queues");

    let result = tokio::time::timeout(Duration::from_secs(5), cycles.recv())
        .await
        .expect("cycle completes")
        .expect("channel open");
    assert_eq!(result.failed, 1);

    // Rejected permanently: neither pending nor dead-lettered.
    assert_eq!(ctx.pending_count().await.expect("count"), 0);
    assert!(ctx.dead_lettered().await.expect("dlq").is_empty());

    ctx.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn read_serves_stale_when_fetch_fails() {
    let dir = TempDir::new().expect("temp dir");
    let (ctx, gateway) = engine(&dir, "http://localhost:1").await;

    let lookup = gateway
        .read("colleges:all", "colleges", Some(50), || async {
            Ok(json!([{"id": 1, "name": "Stanford"}]))
        })
        .await
        .expect("read succeeds");
    assert!(!lookup.stale);

    // Let the entry expire, then fail the live fetch.
    tokio::time::sleep(Duration::from_millis(80)).await;

    let lookup = gateway
        .read("colleges:all", "colleges", Some(50), || async {
            Err(EngineError::Network("connection refused".into()))
        })
        .await
        .expect("stale fallback");
    assert!(lookup.stale);
    assert_eq!(lookup.value, json!([{"id": 1, "name": "Stanford"}]));

    ctx.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn offline_read_without_cache_is_an_error() {
    let dir = TempDir::new().expect("temp dir");
    let (ctx, gateway) = engine(&dir, "http://localhost:1").await;
    go_offline(&ctx).await;

    let result = gateway
        .read("colleges:all", "colleges", None, || async {
            panic!("fetcher must not run while offline");
        })
        .await;

    assert!(matches!(result, Err(EngineError::NotAvailableOffline(_))));

    ctx.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn offline_read_with_expired_cache_serves_stale() {
    let dir = TempDir::new().expect("temp dir");
    let (ctx, gateway) = engine(&dir, "http://localhost:1").await;

    gateway
        .read("colleges:all", "colleges", Some(30), || async { Ok(json!({"cached": true})) })
        .await
        .expect("read succeeds");

    tokio::time::sleep(Duration::from_millis(60)).await;
    go_offline(&ctx).await;

    let lookup = gateway
        .read("colleges:all", "colleges", Some(30), || async {
            panic!("fetcher must not run while offline");
        })
        .await
        .expect("stale fallback");
    assert!(lookup.stale);
    assert_eq!(lookup.value, json!({"cached": true}));

    ctx.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn queued_mutations_survive_restart() {
    let dir = TempDir::new().expect("temp dir");

    {
        let (ctx, gateway) = engine(&dir, "http://localhost:1").await;
        go_offline(&ctx).await;
        gateway
            .write("notes", MutationKind::Update, json!({"id": "n1", "body": "edited"}), None)
            .await
            .expect("write queues");
        ctx.shutdown().await;
    }

    let config = test_config(&dir, "http://localhost:1");
    let ctx = Arc::new(EngineContext::new(config).expect("context rewires"));
    assert_eq!(ctx.pending_count().await.expect("count"), 1);
    assert!(ctx.dead_lettered().await.expect("dlq").is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn synced_write_invalidates_cached_reads() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/notes"))
        .respond_with(ResponseTemplate::new(201))
        .mount(&server)
        .await;

    let dir = TempDir::new().expect("temp dir");
    let (ctx, gateway) = engine(&dir, &server.uri()).await;

    gateway
        .read("notes:all", "notes", Some(60_000), || async { Ok(json!(["old"])) })
        .await
        .expect("read succeeds");

    let mut cycles = ctx.subscribe_cycles().await;
    gateway
        .write("notes", MutationKind::Insert, json!({"id": "n2"}), None)
        .await
        .expect("write queues");
    tokio::time::timeout(Duration::from_secs(5), cycles.recv())
        .await
        .expect("cycle completes")
        .expect("channel open");

    // Cache for the written resource type was invalidated; the next read
    // goes live again.
    let lookup = gateway
        .read("notes:all", "notes", Some(60_000), || async { Ok(json!(["fresh"])) })
        .await
        .expect("read succeeds");
    assert_eq!(lookup.value, json!(["fresh"]));
    assert!(!lookup.stale);

    ctx.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn same_entity_updates_apply_in_order() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/notes"))
        .respond_with(ResponseTemplate::new(201))
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/notes/n1"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let dir = TempDir::new().expect("temp dir");
    let (ctx, gateway) = engine(&dir, &server.uri()).await;
    go_offline(&ctx).await;

    gateway
        .write("notes", MutationKind::Insert, json!({"id": "n1", "body": "a"}), Some("n1".into()))
        .await
        .expect("write queues");
    gateway
        .write("notes", MutationKind::Update, json!({"id": "n1", "body": "b"}), Some("n1".into()))
        .await
        .expect("write queues");

    let mut cycles = ctx.subscribe_cycles().await;
    go_online(&ctx).await;

    let result = tokio::time::timeout(Duration::from_secs(5), cycles.recv())
        .await
        .expect("cycle completes")
        .expect("channel open");
    assert_eq!(result.succeeded, 2);

    let requests = server.received_requests().await.expect("requests recorded");
    let methods: Vec<&str> = requests.iter().map(|r| r.method.as_str()).collect();
    assert_eq!(methods, vec!["POST", "PATCH"], "creation order preserved");

    ctx.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn requeued_dead_letter_is_pending_again() {
    let dir = TempDir::new().expect("temp dir");
    let mut config = test_config(&dir, "http://localhost:1");
    config.queue.max_attempts = 1;

    let ctx = Arc::new(EngineContext::new(config).expect("context wires"));
    let gateway = OfflineGateway::new(ctx.clone());
    ctx.start().await.expect("engine starts");

    let mut cycles = ctx.subscribe_cycles().await;
    let receipt = gateway
        .write("notes", MutationKind::Insert, json!({"id": "n1"}), None)
        .await
        .expect("write queues");

    // Two failing cycles exhaust a budget of one attempt.
    for _ in 0..2 {
        tokio::time::timeout(Duration::from_secs(5), cycles.recv())
            .await
            .expect("cycle completes")
            .expect("channel open");
        ctx.trigger_sync().await;
    }

    // Wait for the record to land in the dead letter queue.
    let mut dead = Vec::new();
    for _ in 0..50 {
        dead = ctx.dead_lettered().await.expect("dlq");
        if !dead.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    assert_eq!(dead.len(), 1);
    assert_eq!(dead[0].id, receipt.mutation_id);
    assert_eq!(dead[0].status, MutationStatus::DeadLettered);
    assert_eq!(ctx.pending_count().await.expect("count"), 0);

    ctx.requeue_dead_lettered(&receipt.mutation_id).await.expect("requeue succeeds");
    assert_eq!(ctx.pending_count().await.expect("count"), 1);

    ctx.shutdown().await;
}
