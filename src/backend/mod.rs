//! Sync-backend collaborator interface.
//!
//! The sync backend is a hierarchical, watchable key-value store used as
//! the cluster bulletin board. The engine is handed a [`SyncBackend`]
//! trait object; the concrete client (etcd or otherwise) lives outside
//! this crate.

use async_trait::async_trait;
#[cfg(any(test, feature = "test-utils"))]
use mockall::automock;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::sync::watch;

use crate::errors::BackendError;

/// What a watch observed at a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WatchAction {
    Set,
    Delete,
}

impl WatchAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            WatchAction::Set => "set",
            WatchAction::Delete => "delete",
        }
    }
}

/// One inbound change delivered by a prefix watch.
#[derive(Debug, Clone)]
pub struct WatchEvent {
    pub action: WatchAction,
    pub key: String,
    /// Decoded JSON payload of the key. Empty for deletes and for values
    /// that are not JSON objects.
    pub data: Map<String, Value>,
}

/// Hierarchical KV store with prefix watches and leased locks.
///
/// # Contract
///
/// - `update` and `delete` are idempotent; deleting an absent key succeeds.
/// - `lock` with `blocking = true` waits for the lease; either way a
///   failure leaves the lock unheld. Re-locking a key the caller already
///   holds succeeds.
/// - `watch` delivers events into `events` until the watch terminates or
///   `shutdown` fires, then returns. Transport failures are the `Err`
///   case; the caller decides whether to re-establish.
#[cfg_attr(any(test, feature = "test-utils"), automock)]
#[async_trait]
pub trait SyncBackend: Send + Sync + 'static {
    async fn update(&self, key: &str, value: &str) -> Result<(), BackendError>;

    async fn delete(&self, key: &str) -> Result<(), BackendError>;

    async fn fetch(&self, key: &str) -> Result<Option<String>, BackendError>;

    async fn lock(&self, key: &str, blocking: bool) -> Result<(), BackendError>;

    async fn unlock(&self, key: &str) -> Result<(), BackendError>;

    async fn watch(
        &self,
        prefix: &str,
        events: mpsc::Sender<WatchEvent>,
        shutdown: watch::Receiver<()>,
    ) -> Result<(), BackendError>;
}
