use std::sync::Arc;
use std::time::Duration;

use mockall::Sequence;
use serde_json::json;
use serde_json::Value;
use tokio::sync::watch;
use tokio::time::sleep;

use crate::backend::MockSyncBackend;
use crate::backend::SyncBackend;
use crate::constants::SYNC_LOCK_KEY;
use crate::db::epoch_seconds;
use crate::db::Database;
use crate::db::EventKind;
use crate::db::NewEvent;
use crate::db::Transaction;
use crate::errors::BackendError;
use crate::outbox::CommitNotifier;
use crate::outbox::OutboxDatabase;
use crate::pump::SyncPump;
use crate::test_utils::resource;
use crate::test_utils::test_registry;
use crate::test_utils::MemoryBackend;
use crate::test_utils::MemoryDatabase;

struct Harness {
    db: Arc<MemoryDatabase>,
    backend: Arc<MemoryBackend>,
    outbox: OutboxDatabase,
    notifier: CommitNotifier,
    pump: Option<SyncPump>,
    shutdown_tx: watch::Sender<()>,
}

fn harness() -> Harness {
    let registry = test_registry();
    let db = Arc::new(MemoryDatabase::new(registry.clone()));
    let backend = Arc::new(MemoryBackend::new());
    let (notifier, signal) = CommitNotifier::channel();
    let outbox = OutboxDatabase::new(db.clone(), registry.clone(), notifier.clone());
    let (shutdown_tx, shutdown_rx) = watch::channel(());
    let pump = SyncPump::new(db.clone(), backend.clone(), registry, signal, shutdown_rx);
    Harness {
        db,
        backend,
        outbox,
        notifier,
        pump: Some(pump),
        shutdown_tx,
    }
}

async fn create(h: &Harness, schema_id: &str, id: &str, body: Value) {
    let tx = h.outbox.begin().await.unwrap();
    tx.create(&resource(schema_id, id, body)).await.unwrap();
    tx.commit().await.unwrap();
}

async fn wait_for<F: Fn() -> bool>(condition: F) -> bool {
    for _ in 0..250 {
        if condition() {
            return true;
        }
        sleep(Duration::from_millis(10)).await;
    }
    false
}

#[tokio::test]
async fn create_event_lands_under_config_prefix() {
    let h = harness();
    create(&h, "networks", "a", json!({"id": "a", "name": "n1"})).await;

    h.pump.unwrap().drain().await.unwrap();

    let entry = h.backend.entry("/config/nets/a").unwrap();
    let value: Value = serde_json::from_str(&entry).unwrap();
    assert_eq!(value["version"], json!(1));
    assert_eq!(
        serde_json::from_str::<Value>(value["body"].as_str().unwrap()).unwrap(),
        json!({"id": "a", "name": "n1"})
    );
    assert!(h.db.event_rows().is_empty());
}

#[tokio::test]
async fn raw_path_is_used_without_a_template() {
    let h = harness();
    create(&h, "servers", "s1", json!({"id": "s1"})).await;

    h.pump.unwrap().drain().await.unwrap();

    assert!(h.backend.entry("/config/v1.0/servers/s1").is_some());
    assert!(h.db.event_rows().is_empty());
}

#[tokio::test]
async fn update_event_overwrites_with_new_version() {
    let h = harness();
    create(&h, "networks", "a", json!({"id": "a", "name": "n1"})).await;

    let tx = h.outbox.begin().await.unwrap();
    tx.update(&resource("networks", "a", json!({"id": "a", "name": "n2"})))
        .await
        .unwrap();
    tx.commit().await.unwrap();

    h.pump.unwrap().drain().await.unwrap();

    let entry = h.backend.entry("/config/nets/a").unwrap();
    let value: Value = serde_json::from_str(&entry).unwrap();
    assert_eq!(value["version"], json!(2));
}

#[tokio::test]
async fn delete_event_removes_config_and_both_twins() {
    let h = harness();
    create(&h, "networks", "a", json!({"id": "a", "name": "n1"})).await;
    h.pump.as_ref().unwrap().drain().await.unwrap();

    // Simulate agent reports living beside the config entry.
    h.backend
        .update("/state/nets/a", r#"{"version": 1, "state": "up"}"#)
        .await
        .unwrap();
    h.backend
        .update("/monitoring/nets/a", r#"{"version": 1, "monitoring": "ok"}"#)
        .await
        .unwrap();

    let tx = h.outbox.begin().await.unwrap();
    tx.delete("networks", "a").await.unwrap();
    tx.commit().await.unwrap();

    h.pump.unwrap().drain().await.unwrap();

    assert!(h.backend.entry("/config/nets/a").is_none());
    assert!(h.backend.entry("/state/nets/a").is_none());
    assert!(h.backend.entry("/monitoring/nets/a").is_none());
    assert!(h.db.event_rows().is_empty());
}

#[tokio::test]
async fn unmatched_path_falls_back_to_raw_key() {
    let h = harness();

    // A row whose path maps to no registered schema, as left behind by a
    // since-removed schema.
    let tx = h.db.begin().await.unwrap();
    tx.log_event(&NewEvent {
        kind: EventKind::Create,
        path: "/v9.0/relics/r1".to_string(),
        version: 1,
        body: r#"{"id":"r1"}"#.to_string(),
        timestamp: epoch_seconds(),
    })
    .await
    .unwrap();
    tx.commit().await.unwrap();

    h.pump.unwrap().drain().await.unwrap();

    assert!(h.backend.entry("/config/v9.0/relics/r1").is_some());
}

#[tokio::test]
async fn malformed_body_falls_back_to_raw_key() {
    let h = harness();

    let tx = h.db.begin().await.unwrap();
    tx.log_event(&NewEvent {
        kind: EventKind::Create,
        path: "/v1.0/networks/a".to_string(),
        version: 1,
        body: "not json".to_string(),
        timestamp: epoch_seconds(),
    })
    .await
    .unwrap();
    tx.commit().await.unwrap();

    h.pump.unwrap().drain().await.unwrap();

    assert!(h.backend.entry("/config/v1.0/networks/a").is_some());
    assert!(h.backend.entry("/config/nets/a").is_none());
}

#[tokio::test]
async fn drain_stops_at_first_error_and_keeps_rows() {
    let registry = test_registry();
    let db = Arc::new(MemoryDatabase::new(registry.clone()));
    let (notifier, signal) = CommitNotifier::channel();
    let outbox = OutboxDatabase::new(db.clone(), registry.clone(), notifier);

    let tx = outbox.begin().await.unwrap();
    tx.create(&resource("networks", "a", json!({"id": "a"})))
        .await
        .unwrap();
    tx.create(&resource("networks", "b", json!({"id": "b"})))
        .await
        .unwrap();
    tx.commit().await.unwrap();

    let mut backend = MockSyncBackend::new();
    backend
        .expect_update()
        .returning(|_, _| Err(BackendError::Unavailable("etcd down".into())));

    let (_shutdown_tx, shutdown_rx) = watch::channel(());
    let pump = SyncPump::new(db.clone(), Arc::new(backend), registry, signal, shutdown_rx);

    assert!(pump.drain().await.is_err());
    // Nothing was acknowledged; the next leader replays both rows.
    assert_eq!(db.event_rows().len(), 2);
}

#[tokio::test]
async fn events_are_applied_in_id_order() {
    let registry = test_registry();
    let db = Arc::new(MemoryDatabase::new(registry.clone()));
    let (notifier, signal) = CommitNotifier::channel();
    let outbox = OutboxDatabase::new(db.clone(), registry.clone(), notifier);

    let tx = outbox.begin().await.unwrap();
    tx.create(&resource("networks", "a", json!({"id": "a"})))
        .await
        .unwrap();
    tx.create(&resource("networks", "b", json!({"id": "b"})))
        .await
        .unwrap();
    tx.commit().await.unwrap();

    let mut backend = MockSyncBackend::new();
    let mut seq = Sequence::new();
    backend
        .expect_update()
        .withf(|key, _| key == "/config/nets/a")
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_, _| Ok(()));
    backend
        .expect_update()
        .withf(|key, _| key == "/config/nets/b")
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_, _| Ok(()));

    let (_shutdown_tx, shutdown_rx) = watch::channel(());
    let pump = SyncPump::new(db.clone(), Arc::new(backend), registry, signal, shutdown_rx);

    pump.drain().await.unwrap();
    assert!(db.event_rows().is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn run_wakes_on_commit_signal() {
    let mut h = harness();
    let pump = h.pump.take().unwrap();
    let handle = tokio::spawn(pump.run());

    create(&h, "networks", "a", json!({"id": "a", "name": "n1"})).await;

    let backend = h.backend.clone();
    assert!(wait_for(move || backend.entry("/config/nets/a").is_some()).await);

    h.shutdown_tx.send(()).unwrap();
    handle.await.unwrap();

    // The lease is released on shutdown.
    assert!(!h.backend.is_locked(SYNC_LOCK_KEY));
}

#[tokio::test(flavor = "multi_thread")]
async fn run_iterates_while_lease_is_contended() {
    let mut h = harness();
    h.backend.hold_lock(SYNC_LOCK_KEY);

    let pump = h.pump.take().unwrap();
    let handle = tokio::spawn(pump.run());

    create(&h, "networks", "a", json!({"id": "a"})).await;
    sleep(Duration::from_millis(200)).await;
    assert!(h.backend.entry("/config/nets/a").is_none());

    // Lease freed; the next commit signal drains the backlog.
    h.backend.release_lock(SYNC_LOCK_KEY);
    h.notifier.notify();

    let backend = h.backend.clone();
    assert!(wait_for(move || backend.entry("/config/nets/a").is_some()).await);

    h.shutdown_tx.send(()).unwrap();
    handle.await.unwrap();
}
