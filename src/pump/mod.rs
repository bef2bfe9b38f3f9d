//! Leader-elected outbox pump.
//!
//! A single long-lived task per process drains the transactional outbox
//! into the sync backend:
//!
//! ```text
//! commit signal ──┐
//!                 ├─> acquire cluster lease ─> list batch ─> per event:
//! 30 s poll ──────┘                                          render key,
//!                                                            write/delete,
//!                                                            delete row,
//!                                                            commit
//! ```
//!
//! Cluster-wide, at most one pump makes progress at a time: every
//! iteration re-acquires the `gohan/cluster/sync` lease and peers that
//! fail to get it simply try again next wake-up. Writes carry the event
//! version and deletes tolerate absent keys, so a former leaseholder
//! finishing a write after handover cannot corrupt the end state.

use std::sync::Arc;

use serde_json::json;
use serde_json::Value;
use tokio::sync::watch;
use tokio::time::interval_at;
use tokio::time::Instant;
use tokio::time::MissedTickBehavior;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use crate::backend::SyncBackend;
use crate::constants::CONFIG_PREFIX;
use crate::constants::EVENT_BATCH_LIMIT;
use crate::constants::EVENT_POLL_INTERVAL;
use crate::constants::MONITORING_PREFIX;
use crate::constants::STATE_PREFIX;
use crate::constants::SYNC_LOCK_KEY;
use crate::db::Database;
use crate::db::EventKind;
use crate::db::EventRow;
use crate::db::Transaction;
use crate::errors::Result;
use crate::outbox::CommitSignal;
use crate::schema::SchemaRegistry;

#[cfg(test)]
mod pump_test;

/// Drains the outbox into the sync backend, in id order, exactly once per
/// row on the happy path and at least once under retries.
pub struct SyncPump {
    db: Arc<dyn Database>,
    backend: Arc<dyn SyncBackend>,
    schemas: Arc<SchemaRegistry>,
    commit_signal: CommitSignal,
    shutdown: watch::Receiver<()>,
}

impl SyncPump {
    /// `db` must be the undecorated database handle; draining must not
    /// log events of its own.
    pub fn new(
        db: Arc<dyn Database>,
        backend: Arc<dyn SyncBackend>,
        schemas: Arc<SchemaRegistry>,
        commit_signal: CommitSignal,
        shutdown: watch::Receiver<()>,
    ) -> Self {
        Self {
            db,
            backend,
            schemas,
            commit_signal,
            shutdown,
        }
    }

    /// Pump loop. Wakes on the commit signal or the poll tick, skipping
    /// the tick right after a signal-triggered drain so a burst of commits
    /// costs one drain, not two.
    pub async fn run(mut self) {
        info!("sync pump started");

        let mut poll = interval_at(
            Instant::now() + EVENT_POLL_INTERVAL,
            EVENT_POLL_INTERVAL,
        );
        poll.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut recently_synced = false;

        loop {
            tokio::select! {
                _ = self.shutdown.changed() => break,

                _ = poll.tick() => {
                    if recently_synced {
                        recently_synced = false;
                        continue;
                    }
                }

                Some(_) = self.commit_signal.recv() => {
                    recently_synced = true;
                }
            }

            if let Err(e) = self.backend.lock(SYNC_LOCK_KEY, true).await {
                debug!(error = %e, "cluster sync lease unavailable");
                continue;
            }
            if let Err(e) = self.drain().await {
                error!(error = %e, "outbox drain failed");
            }
        }

        if let Err(e) = self.backend.unlock(SYNC_LOCK_KEY).await {
            warn!(error = %e, "releasing cluster sync lease failed");
        }
        info!("sync pump stopped");
    }

    /// One drain pass: read a batch, apply each event in its own
    /// transaction, stop at the first failure. Also the embedding point
    /// for hosts that want to run the pump to quiescence themselves.
    pub async fn drain(&self) -> Result<()> {
        let events = self.pending_events().await?;
        if events.is_empty() {
            return Ok(());
        }
        debug!(count = events.len(), "draining outbox batch");
        for event in &events {
            self.sync_event(event).await?;
        }
        Ok(())
    }

    async fn pending_events(&self) -> Result<Vec<EventRow>> {
        let tx = self.db.begin().await?;
        let events = tx.list_events(EVENT_BATCH_LIMIT).await;
        tx.close().await;
        Ok(events?)
    }

    async fn sync_event(&self, event: &EventRow) -> Result<()> {
        let tx = self.db.begin().await?;
        let result = self.apply_event(tx.as_ref(), event).await;
        tx.close().await;
        result
    }

    async fn apply_event(&self, tx: &dyn Transaction, event: &EventRow) -> Result<()> {
        debug!(id = event.id, kind = %event.kind, path = %event.path, "processing event");
        match event.kind {
            EventKind::Create | EventKind::Update => {
                let key = prefixed(CONFIG_PREFIX, &self.sync_suffix(event));
                let content = json!({
                    "body": event.body,
                    "version": event.version,
                })
                .to_string();
                debug!(key = %key, "set on sync backend");
                self.backend.update(&key, &content).await?;
            }
            EventKind::Delete => {
                let suffix = self.sync_suffix(event);
                // State and monitoring twins go first; their absence (or a
                // transient failure) must not block the config delete.
                for prefix in [STATE_PREFIX, MONITORING_PREFIX] {
                    let twin = prefixed(prefix, &suffix);
                    debug!(key = %twin, "delete on sync backend");
                    if let Err(e) = self.backend.delete(&twin).await {
                        warn!(key = %twin, error = %e, "deleting sync twin failed");
                    }
                }
                let key = prefixed(CONFIG_PREFIX, &suffix);
                debug!(key = %key, "delete on sync backend");
                self.backend.delete(&key).await?;
            }
        }
        tx.delete_event(event.id).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Sync key suffix for an event: the schema's rendered template when
    /// one is declared, the raw resource path otherwise. Render failures
    /// fall back to the raw path.
    fn sync_suffix(&self, event: &EventRow) -> String {
        let Some(schema) = self.schemas.schema_by_url_path(&event.path) else {
            return event.path.clone();
        };
        let Some(template) = schema.sync_key_template() else {
            return event.path.clone();
        };
        let body = match serde_json::from_str::<Value>(&event.body) {
            Ok(Value::Object(map)) => map,
            _ => {
                error!(path = %event.path, "event body is not a JSON object");
                return event.path.clone();
            }
        };
        match template.render(&body) {
            Ok(suffix) => suffix,
            Err(e) => {
                error!(path = %event.path, error = %e, "sync key rendering failed");
                event.path.clone()
            }
        }
    }
}

/// Join a key prefix ending in `/` with a suffix that may or may not
/// carry a leading `/`.
fn prefixed(prefix: &str, suffix: &str) -> String {
    format!("{}{}", prefix, suffix.trim_start_matches('/'))
}
