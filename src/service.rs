//! Engine assembly and lifecycle.
//!
//! [`SyncService`] wires the collaborators together and owns every
//! long-lived task: the pump, the watch loops and their consumers, and
//! the extension worker queue. All spawns happen in [`SyncService::start`]
//! so the resource footprint of the engine is visible in one place.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::error;
use tracing::info;
use tracing::warn;

use crate::backend::SyncBackend;
use crate::config::SyncConfig;
use crate::db::Database;
use crate::errors::Result;
use crate::extension::EnvironmentFactory;
use crate::extension::EnvironmentRegistry;
use crate::extension::Identity;
use crate::outbox::CommitNotifier;
use crate::outbox::OutboxDatabase;
use crate::pump::SyncPump;
use crate::reconciler::ReconcilerDependencies;
use crate::schema::SchemaRegistry;
use crate::watch::ExtensionDispatcher;
use crate::watch::JobQueue;
use crate::watch::WatchSupervisor;

/// External collaborators the engine is built from.
pub struct ServiceDependencies {
    /// Undecorated database handle.
    pub db: Arc<dyn Database>,
    pub backend: Arc<dyn SyncBackend>,
    pub schemas: Arc<SchemaRegistry>,
    /// Per-schema environments for the state/monitoring hooks.
    pub environments: Arc<EnvironmentRegistry>,
    pub identity: Arc<dyn Identity>,
    /// Builds the `sync.<event>` environments for user watches. `None`
    /// disables user watches regardless of configuration.
    pub environment_factory: Option<Arc<dyn EnvironmentFactory>>,
}

/// The running synchronization engine.
pub struct SyncService {
    database: Arc<dyn Database>,
    shutdown_tx: watch::Sender<()>,
    handles: Vec<JoinHandle<()>>,
    queue: Option<Arc<JobQueue>>,
}

impl SyncService {
    /// Build every component and spawn the long-lived tasks.
    ///
    /// Fails only on startup-fatal conditions: an extension environment
    /// that cannot be built, or a report-prefix bootstrap write that the
    /// backend rejects.
    pub async fn start(config: SyncConfig, deps: ServiceDependencies) -> Result<Self> {
        let (notifier, commit_signal) = CommitNotifier::channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(());
        let database: Arc<dyn Database> = Arc::new(OutboxDatabase::new(
            deps.db.clone(),
            deps.schemas.clone(),
            notifier,
        ));

        let mut handles = Vec::new();

        let pump = SyncPump::new(
            deps.db.clone(),
            deps.backend.clone(),
            deps.schemas.clone(),
            commit_signal,
            shutdown_rx.clone(),
        );
        handles.push(tokio::spawn(pump.run()));

        let dispatcher = match &deps.environment_factory {
            Some(factory) if !config.watch.events.is_empty() => Some(Arc::new(
                ExtensionDispatcher::from_events(&config.watch.events, factory.as_ref()).await?,
            )),
            _ => None,
        };
        let queue = Arc::new(JobQueue::start(config.watch.worker_count));

        let supervisor = WatchSupervisor::new(
            deps.backend.clone(),
            ReconcilerDependencies {
                db: deps.db.clone(),
                schemas: deps.schemas.clone(),
                environments: deps.environments.clone(),
                identity: deps.identity.clone(),
            },
            dispatcher,
            queue.clone(),
            config.watch.keys.clone(),
            shutdown_rx,
        );
        if let Err(e) = supervisor.bootstrap().await {
            warn!(error = %e, "report prefix bootstrap failed");
        }
        handles.extend(supervisor.spawn());

        info!("synchronization engine started");
        Ok(Self {
            database,
            shutdown_tx,
            handles,
            queue: Some(queue),
        })
    }

    /// Outbox-decorated database handle; all request-side mutations must
    /// go through this so they are captured in the outbox.
    pub fn database(&self) -> Arc<dyn Database> {
        self.database.clone()
    }

    /// Signal every loop, wait for them to stop, then drain the worker
    /// queue. In-flight transactions run to completion; outbox rows that
    /// were not drained simply persist for the next leader.
    pub async fn shutdown(mut self) {
        // No receivers just means every loop already exited.
        let _ = self.shutdown_tx.send(());
        for handle in self.handles.drain(..) {
            if let Err(e) = handle.await {
                error!(error = %e, "engine task failed");
            }
        }
        if let Some(queue) = self.queue.take().and_then(Arc::into_inner) {
            queue.shutdown().await;
        }
        info!("synchronization engine stopped");
    }
}
