//! End-to-end scenarios: the propagation paths driven through the real
//! pump and reconcilers over in-memory collaborators.

mod common;

use std::sync::Arc;

use serde_json::json;
use serde_json::Value;

use gantry::epoch_seconds;
use gantry::extension::EnvironmentRegistry;
use gantry::monitoring_update;
use gantry::state_update;
use gantry::Database;
use gantry::EventKind;
use gantry::MemoryBackend;
use gantry::MemoryDatabase;
use gantry::NewEvent;
use gantry::RecordingEnvironment;
use gantry::ResourceState;
use gantry::ServiceDependencies;
use gantry::StaticIdentity;
use gantry::SyncBackend;
use gantry::SyncConfig;
use gantry::SyncService;
use gantry::Transaction;
use gantry::WatchAction;
use gantry::WatchEvent;

use common::cluster;
use common::create;
use common::delete;
use common::registry;
use common::update;
use common::wait_for;

fn report(key: &str, data: Value) -> WatchEvent {
    let Value::Object(data) = data else {
        panic!("report payload must be an object");
    };
    WatchEvent {
        action: WatchAction::Set,
        key: key.to_string(),
        data,
    }
}

// Scenario: create then propagate.
#[tokio::test]
async fn create_propagates_to_the_sync_backend() {
    let c = cluster();
    create(&c, "networks", "a", json!({"id": "a", "name": "n1"})).await;

    let rows = c.db.event_rows();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].kind, EventKind::Create);
    assert_eq!(rows[0].version, 1);
    assert_eq!(rows[0].path, "/v1.0/networks/a");
    assert_eq!(
        serde_json::from_str::<Value>(&rows[0].body).unwrap(),
        json!({"id": "a", "name": "n1"})
    );

    c.pump.drain().await.unwrap();

    let entry = c.backend.entry("/config/nets/a").unwrap();
    let value: Value = serde_json::from_str(&entry).unwrap();
    assert_eq!(value["version"], json!(1));
    assert_eq!(
        serde_json::from_str::<Value>(value["body"].as_str().unwrap()).unwrap(),
        json!({"id": "a", "name": "n1"})
    );
    assert!(c.db.event_rows().is_empty());
}

// Scenario: delete of a versioned resource cleans config and both twins.
#[tokio::test]
async fn versioned_delete_cleans_all_three_keys() {
    let c = cluster();
    create(&c, "networks", "a", json!({"id": "a", "name": "n1"})).await;
    update(&c, "networks", "a", json!({"id": "a", "name": "n2"})).await;
    update(&c, "networks", "a", json!({"id": "a", "name": "n3"})).await;
    c.pump.drain().await.unwrap();
    assert_eq!(c.db.state("networks", "a").unwrap().config_version, 3);

    // Agent reports already live beside the config entry.
    c.backend
        .update("/state/nets/a", r#"{"version": 3, "state": "up"}"#)
        .await
        .unwrap();
    c.backend
        .update("/monitoring/nets/a", r#"{"version": 3, "monitoring": "ok"}"#)
        .await
        .unwrap();

    delete(&c, "networks", "a").await;

    let rows = c.db.event_rows();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].kind, EventKind::Delete);
    assert_eq!(rows[0].version, 4);
    assert_eq!(
        serde_json::from_str::<Value>(&rows[0].body).unwrap(),
        json!({"id": "a", "name": "n3"})
    );

    c.pump.drain().await.unwrap();

    assert!(c.backend.entry("/config/nets/a").is_none());
    assert!(c.backend.entry("/state/nets/a").is_none());
    assert!(c.backend.entry("/monitoring/nets/a").is_none());
    assert!(c.db.event_rows().is_empty());
}

// Scenario: stale state report.
#[tokio::test]
async fn stale_state_report_changes_nothing() {
    let c = cluster();
    create(&c, "servers", "s1", json!({"id": "s1"})).await;
    c.db.put_state(
        "servers",
        "s1",
        ResourceState {
            config_version: 5,
            state_version: 5,
            state: "active".to_string(),
            ..ResourceState::default()
        },
    );
    let env = Arc::new(RecordingEnvironment::new());
    c.environments.register("servers", env.clone());

    state_update(
        &c.deps,
        &report("/state/v1.0/servers/s1", json!({"version": 3, "state": "old"})),
    )
    .await
    .unwrap();

    let state = c.db.state("servers", "s1").unwrap();
    assert_eq!(state.state_version, 5);
    assert_eq!(state.state, "active");
    assert!(env.calls().is_empty());
}

// Scenario: catch-up state report, driven through the full service.
#[tokio::test(flavor = "multi_thread")]
async fn catch_up_state_report_applies_through_the_service() {
    let registry = registry();
    let db = Arc::new(MemoryDatabase::new(registry.clone()));
    let backend = Arc::new(MemoryBackend::new());
    let environments = Arc::new(EnvironmentRegistry::new());
    let env = Arc::new(RecordingEnvironment::new());
    environments.register("servers", env.clone());

    let service = SyncService::start(
        SyncConfig::default(),
        ServiceDependencies {
            db: db.clone(),
            backend: backend.clone(),
            schemas: registry,
            environments,
            identity: Arc::new(StaticIdentity),
            environment_factory: None,
        },
    )
    .await
    .unwrap();

    // Mutations go through the decorated handle and are pumped out.
    let tx = service.database().begin().await.unwrap();
    tx.create(&common::resource("servers", "s1", json!({"id": "s1"})))
        .await
        .unwrap();
    tx.commit().await.unwrap();

    let b = backend.clone();
    assert!(wait_for(move || b.entry("/config/v1.0/servers/s1").is_some()).await);
    // Wait for the pump's row deletion to commit before seeding state, so
    // the seed is not overwritten by the in-flight drain transaction.
    let d = db.clone();
    assert!(wait_for(move || d.event_rows().is_empty()).await);

    db.put_state(
        "servers",
        "s1",
        ResourceState {
            config_version: 5,
            state_version: 2,
            ..ResourceState::default()
        },
    );

    let b = backend.clone();
    assert!(wait_for(move || b.watcher_count() >= 2).await);
    backend
        .update(
            "/state/v1.0/servers/s1",
            r#"{"version": 5, "state": "active"}"#,
        )
        .await
        .unwrap();

    let d = db.clone();
    assert!(
        wait_for(move || {
            d.state("servers", "s1")
                .map(|s| s.state_version == 5 && s.state == "active")
                .unwrap_or(false)
        })
        .await
    );

    let hooks = env.handler_names();
    assert_eq!(
        hooks,
        vec![
            "pre_state_update_in_transaction".to_string(),
            "post_state_update_in_transaction".to_string()
        ]
    );

    service.shutdown().await;
}

// Scenario: monitoring gated on state convergence, then replayed.
#[tokio::test]
async fn monitoring_waits_for_state_then_applies() {
    let c = cluster();
    create(&c, "servers", "s1", json!({"id": "s1"})).await;
    c.db.put_state(
        "servers",
        "s1",
        ResourceState {
            config_version: 5,
            state_version: 3,
            ..ResourceState::default()
        },
    );

    let monitoring = report(
        "/monitoring/v1.0/servers/s1",
        json!({"version": 5, "monitoring": "ok"}),
    );
    monitoring_update(&c.deps, &monitoring).await.unwrap();
    assert_eq!(c.db.state("servers", "s1").unwrap().monitoring, "");

    // State converges, the replayed report lands.
    state_update(
        &c.deps,
        &report("/state/v1.0/servers/s1", json!({"version": 5, "state": "active"})),
    )
    .await
    .unwrap();
    monitoring_update(&c.deps, &monitoring).await.unwrap();
    assert_eq!(c.db.state("servers", "s1").unwrap().monitoring, "ok");
}

// Scenario: nosync schema.
#[tokio::test]
async fn nosync_schema_never_reaches_the_backend() {
    let c = cluster();
    create(&c, "internal", "i1", json!({"id": "i1"})).await;
    update(&c, "internal", "i1", json!({"id": "i1", "step": 2})).await;

    assert!(c.db.event_rows().is_empty());

    c.pump.drain().await.unwrap();
    assert!(c.backend.entries().is_empty());
    assert!(c.db.resource("internal", "i1").is_some());
}

// Invariant: after quiescence every live versioned resource is published
// at its current config version and the outbox is empty.
#[tokio::test]
async fn quiescent_backend_matches_database_versions() {
    let c = cluster();
    create(&c, "networks", "a", json!({"id": "a", "name": "n1"})).await;
    create(&c, "networks", "b", json!({"id": "b", "name": "n2"})).await;
    create(&c, "servers", "s1", json!({"id": "s1"})).await;
    update(&c, "networks", "a", json!({"id": "a", "name": "n1b"})).await;
    update(&c, "servers", "s1", json!({"id": "s1", "flavor": "m1"})).await;

    c.pump.drain().await.unwrap();

    assert!(c.db.event_rows().is_empty());
    for (schema_id, id, key) in [
        ("networks", "a", "/config/nets/a"),
        ("networks", "b", "/config/nets/b"),
        ("servers", "s1", "/config/v1.0/servers/s1"),
    ] {
        let expected = c.db.state(schema_id, id).unwrap().config_version;
        let entry: Value = serde_json::from_str(&c.backend.entry(key).unwrap()).unwrap();
        assert_eq!(entry["version"], json!(expected), "key {key}");
    }
}

// Invariant: state_version is monotone across any report sequence.
#[tokio::test]
async fn state_version_is_monotone_across_reports() {
    let c = cluster();
    create(&c, "servers", "s1", json!({"id": "s1"})).await;
    c.db.put_state(
        "servers",
        "s1",
        ResourceState {
            config_version: 6,
            ..ResourceState::default()
        },
    );

    let mut last = 0;
    for version in [3, 2, 5, 4] {
        state_update(
            &c.deps,
            &report("/state/v1.0/servers/s1", json!({"version": version})),
        )
        .await
        .unwrap();
        let current = c.db.state("servers", "s1").unwrap().state_version;
        assert!(current >= last, "state_version went backwards: {current} < {last}");
        last = current;
    }
    assert_eq!(last, 5);
}

// Invariant: replaying already-applied events leaves the end state
// untouched, which is what makes split-brain pumping safe.
#[tokio::test]
async fn replayed_events_are_idempotent() {
    let c = cluster();
    create(&c, "networks", "a", json!({"id": "a", "name": "n1"})).await;
    c.pump.drain().await.unwrap();
    let first = c.backend.entry("/config/nets/a").unwrap();

    // A lagging peer re-applies the same create after the fact.
    let tx = c.db.begin().await.unwrap();
    tx.log_event(&NewEvent {
        kind: EventKind::Create,
        path: "/v1.0/networks/a".to_string(),
        version: 1,
        body: r#"{"id":"a","name":"n1"}"#.to_string(),
        timestamp: epoch_seconds(),
    })
    .await
    .unwrap();
    tx.commit().await.unwrap();
    c.pump.drain().await.unwrap();

    let replayed: Value = serde_json::from_str(&c.backend.entry("/config/nets/a").unwrap()).unwrap();
    let original: Value = serde_json::from_str(&first).unwrap();
    assert_eq!(replayed["version"], original["version"]);

    // Deletes of absent keys are tolerated the same way.
    delete(&c, "networks", "a").await;
    c.pump.drain().await.unwrap();
    assert!(c.backend.entry("/config/nets/a").is_none());

    let tx = c.db.begin().await.unwrap();
    tx.log_event(&NewEvent {
        kind: EventKind::Delete,
        path: "/v1.0/networks/a".to_string(),
        version: 2,
        body: r#"{"id":"a","name":"n1"}"#.to_string(),
        timestamp: epoch_seconds(),
    })
    .await
    .unwrap();
    tx.commit().await.unwrap();

    c.pump.drain().await.unwrap();
    assert!(c.backend.entry("/config/nets/a").is_none());
    assert!(c.db.event_rows().is_empty());
}
