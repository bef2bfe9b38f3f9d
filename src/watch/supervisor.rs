use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use crate::backend::SyncBackend;
use crate::backend::WatchEvent;
use crate::constants::LOCK_RETRY_DELAY;
use crate::constants::MONITORING_PREFIX;
use crate::constants::STATE_PREFIX;
use crate::constants::WATCH_CHANNEL_CAPACITY;
use crate::constants::WATCH_LOCK_PREFIX;
use crate::errors::Result;
use crate::reconciler;
use crate::reconciler::ReconcilerDependencies;

use super::ExtensionDispatcher;
use super::JobQueue;

/// Owns the three watch loop families: state, monitoring and the
/// user-configured prefixes.
pub struct WatchSupervisor {
    backend: Arc<dyn SyncBackend>,
    deps: ReconcilerDependencies,
    dispatcher: Option<Arc<ExtensionDispatcher>>,
    queue: Arc<JobQueue>,
    watch_keys: Vec<String>,
    shutdown: watch::Receiver<()>,
}

impl WatchSupervisor {
    pub fn new(
        backend: Arc<dyn SyncBackend>,
        deps: ReconcilerDependencies,
        dispatcher: Option<Arc<ExtensionDispatcher>>,
        queue: Arc<JobQueue>,
        watch_keys: Vec<String>,
        shutdown: watch::Receiver<()>,
    ) -> Self {
        Self {
            backend,
            deps,
            dispatcher,
            queue,
            watch_keys,
            shutdown,
        }
    }

    /// Ensure the report prefixes exist so watches have a root to attach
    /// to on backends that require one.
    pub async fn bootstrap(&self) -> Result<()> {
        for prefix in [STATE_PREFIX, MONITORING_PREFIX] {
            let missing = match self.backend.fetch(prefix).await {
                Ok(value) => value.is_none(),
                Err(_) => true,
            };
            if missing {
                self.backend.update(prefix, "").await?;
            }
        }
        Ok(())
    }

    /// Spawn every watch loop and consumer task; all spawns happen here so
    /// the resource allocation of the engine stays visible in one place.
    pub fn spawn(self) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::new();

        let (state_tx, state_rx) = mpsc::channel(WATCH_CHANNEL_CAPACITY);
        handles.push(tokio::spawn(watch_loop(
            self.backend.clone(),
            "state",
            STATE_PREFIX.to_string(),
            state_tx,
            self.shutdown.clone(),
        )));
        handles.push(tokio::spawn(consume_state(
            state_rx,
            self.deps.clone(),
            self.shutdown.clone(),
        )));

        let (monitoring_tx, monitoring_rx) = mpsc::channel(WATCH_CHANNEL_CAPACITY);
        handles.push(tokio::spawn(watch_loop(
            self.backend.clone(),
            "monitoring",
            MONITORING_PREFIX.to_string(),
            monitoring_tx,
            self.shutdown.clone(),
        )));
        handles.push(tokio::spawn(consume_monitoring(
            monitoring_rx,
            self.deps.clone(),
            self.shutdown.clone(),
        )));

        // User watches only run when both prefixes and handlers exist.
        if let Some(dispatcher) = self.dispatcher.filter(|d| !d.is_empty()) {
            if !self.watch_keys.is_empty() {
                let (user_tx, user_rx) = mpsc::channel(WATCH_CHANNEL_CAPACITY);
                for prefix in self.watch_keys {
                    handles.push(tokio::spawn(watch_loop(
                        self.backend.clone(),
                        "watch",
                        prefix,
                        user_tx.clone(),
                        self.shutdown.clone(),
                    )));
                }
                handles.push(tokio::spawn(consume_user(
                    user_rx,
                    dispatcher,
                    self.queue.clone(),
                    self.shutdown.clone(),
                )));
            }
        }

        handles
    }
}

/// One lease-gated watch loop. Acquires the per-purpose cluster lock,
/// runs the watch until it terminates, then re-acquires; a contended
/// lease is retried after a delay.
async fn watch_loop(
    backend: Arc<dyn SyncBackend>,
    purpose: &'static str,
    prefix: String,
    events: mpsc::Sender<WatchEvent>,
    mut shutdown: watch::Receiver<()>,
) {
    let lock_key = format!("{WATCH_LOCK_PREFIX}{purpose}");
    info!(prefix = %prefix, "watch loop started");
    loop {
        if shutdown.has_changed().unwrap_or(true) {
            break;
        }
        if let Err(e) = backend.lock(&lock_key, true).await {
            warn!(key = %lock_key, error = %e, "cannot start watch; lease unavailable");
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = sleep(LOCK_RETRY_DELAY) => {}
            }
            continue;
        }
        match backend.watch(&prefix, events.clone(), shutdown.clone()).await {
            Ok(()) => debug!(prefix = %prefix, "watch ended"),
            Err(e) => error!(prefix = %prefix, error = %e, "sync watch error"),
        }
    }
    if let Err(e) = backend.unlock(&lock_key).await {
        warn!(key = %lock_key, error = %e, "releasing watch lease failed");
    }
    info!(prefix = %prefix, "watch loop stopped");
}

async fn consume_state(
    mut events: mpsc::Receiver<WatchEvent>,
    deps: ReconcilerDependencies,
    mut shutdown: watch::Receiver<()>,
) {
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            received = events.recv() => {
                let Some(event) = received else { break };
                let deps = deps.clone();
                // Each reconciliation is independent; version gates keep
                // per-resource correctness without cross-event ordering.
                tokio::spawn(async move {
                    if let Err(e) = reconciler::state_update(&deps, &event).await {
                        warn!(key = %event.key, error = %e, "state update failed");
                    } else {
                        info!(key = %event.key, "completed state update");
                    }
                });
            }
        }
    }
}

async fn consume_monitoring(
    mut events: mpsc::Receiver<WatchEvent>,
    deps: ReconcilerDependencies,
    mut shutdown: watch::Receiver<()>,
) {
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            received = events.recv() => {
                let Some(event) = received else { break };
                let deps = deps.clone();
                tokio::spawn(async move {
                    if let Err(e) = reconciler::monitoring_update(&deps, &event).await {
                        warn!(key = %event.key, error = %e, "monitoring update failed");
                    } else {
                        info!(key = %event.key, "completed monitoring update");
                    }
                });
            }
        }
    }
}

async fn consume_user(
    mut events: mpsc::Receiver<WatchEvent>,
    dispatcher: Arc<ExtensionDispatcher>,
    queue: Arc<JobQueue>,
    mut shutdown: watch::Receiver<()>,
) {
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            received = events.recv() => {
                let Some(event) = received else { break };
                let dispatcher = dispatcher.clone();
                queue
                    .enqueue(async move { dispatcher.dispatch(&event).await })
                    .await;
            }
        }
    }
}
