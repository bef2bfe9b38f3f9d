//! Shared harness for the end-to-end scenarios.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::watch;
use tokio::time::sleep;

use gantry::extension::EnvironmentRegistry;
use gantry::CommitNotifier;
use gantry::Database;
use gantry::MemoryBackend;
use gantry::MemoryDatabase;
use gantry::OutboxDatabase;
use gantry::ReconcilerDependencies;
use gantry::Resource;
use gantry::Schema;
use gantry::SchemaRegistry;
use gantry::StaticIdentity;
use gantry::SyncPump;
use gantry::Transaction;

/// One in-process "cluster member": memory-backed collaborators wired the
/// way the hosting server wires the real ones.
pub struct Cluster {
    pub db: Arc<MemoryDatabase>,
    pub backend: Arc<MemoryBackend>,
    pub environments: Arc<EnvironmentRegistry>,
    pub outbox: OutboxDatabase,
    pub pump: SyncPump,
    pub deps: ReconcilerDependencies,
    /// Keeps the pump's shutdown channel open for the harness lifetime.
    #[allow(dead_code)]
    pub shutdown_tx: watch::Sender<()>,
}

pub fn registry() -> Arc<SchemaRegistry> {
    Arc::new(SchemaRegistry::new(vec![
        Schema::new("networks", "/v1.0/networks")
            .with_state_versioning(true)
            .with_sync_key_template("/nets/{{id}}")
            .expect("fixture template"),
        Schema::new("servers", "/v1.0/servers").with_state_versioning(true),
        Schema::new("internal", "/v1.0/internal").with_nosync(true),
    ]))
}

pub fn cluster() -> Cluster {
    let registry = registry();
    let db = Arc::new(MemoryDatabase::new(registry.clone()));
    let backend = Arc::new(MemoryBackend::new());
    let environments = Arc::new(EnvironmentRegistry::new());
    let (notifier, signal) = CommitNotifier::channel();
    let outbox = OutboxDatabase::new(db.clone(), registry.clone(), notifier);
    let (shutdown_tx, shutdown_rx) = watch::channel(());
    let pump = SyncPump::new(
        db.clone(),
        backend.clone(),
        registry.clone(),
        signal,
        shutdown_rx,
    );
    let deps = ReconcilerDependencies {
        db: db.clone(),
        schemas: registry.clone(),
        environments: environments.clone(),
        identity: Arc::new(StaticIdentity),
    };
    Cluster {
        db,
        backend,
        environments,
        outbox,
        pump,
        deps,
        shutdown_tx,
    }
}

pub fn resource(schema_id: &str, id: &str, body: Value) -> Resource {
    let Value::Object(data) = body else {
        panic!("resource body must be a JSON object");
    };
    Resource::new(schema_id, id, data)
}

pub async fn create(cluster: &Cluster, schema_id: &str, id: &str, body: Value) {
    let tx = cluster.outbox.begin().await.unwrap();
    tx.create(&resource(schema_id, id, body)).await.unwrap();
    tx.commit().await.unwrap();
}

pub async fn update(cluster: &Cluster, schema_id: &str, id: &str, body: Value) {
    let tx = cluster.outbox.begin().await.unwrap();
    tx.update(&resource(schema_id, id, body)).await.unwrap();
    tx.commit().await.unwrap();
}

pub async fn delete(cluster: &Cluster, schema_id: &str, id: &str) {
    let tx = cluster.outbox.begin().await.unwrap();
    tx.delete(schema_id, id).await.unwrap();
    tx.commit().await.unwrap();
}

pub async fn wait_for<F: Fn() -> bool>(condition: F) -> bool {
    for _ in 0..1000 {
        if condition() {
            return true;
        }
        sleep(Duration::from_millis(10)).await;
    }
    false
}
