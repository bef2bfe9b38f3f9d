use std::collections::BTreeMap;
use std::collections::HashSet;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Mutex;
use std::sync::MutexGuard;

use async_trait::async_trait;
use serde_json::Map;
use serde_json::Value;
use tokio::sync::broadcast;
use tokio::sync::mpsc;
use tokio::sync::watch;

use crate::backend::SyncBackend;
use crate::backend::WatchAction;
use crate::backend::WatchEvent;
use crate::errors::BackendError;

/// In-memory [`SyncBackend`] fake.
///
/// Writes are immediately visible and fan out to active watches through a
/// broadcast channel; there is no event replay, so tests should establish
/// watches (see [`MemoryBackend::watcher_count`]) before writing. Locks
/// are plain named flags: re-locking succeeds, and tests can simulate a
/// peer holding a lease with [`MemoryBackend::hold_lock`].
pub struct MemoryBackend {
    entries: Mutex<BTreeMap<String, String>>,
    locks: Mutex<HashSet<String>>,
    held_elsewhere: Mutex<HashSet<String>>,
    events_tx: broadcast::Sender<WatchEvent>,
    watcher_count: AtomicUsize,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        let (events_tx, _) = broadcast::channel(256);
        Self {
            entries: Mutex::new(BTreeMap::new()),
            locks: Mutex::new(HashSet::new()),
            held_elsewhere: Mutex::new(HashSet::new()),
            events_tx,
            watcher_count: AtomicUsize::new(0),
        }
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every stored key and raw value.
    pub fn entries(&self) -> BTreeMap<String, String> {
        self.guard(&self.entries).clone()
    }

    pub fn entry(&self, key: &str) -> Option<String> {
        self.guard(&self.entries).get(key).cloned()
    }

    pub fn is_locked(&self, key: &str) -> bool {
        self.guard(&self.locks).contains(key)
    }

    /// Mark a lease as held by a (simulated) peer; `lock` on it fails
    /// until [`MemoryBackend::release_lock`].
    pub fn hold_lock(&self, key: &str) {
        self.guard(&self.held_elsewhere).insert(key.to_string());
    }

    pub fn release_lock(&self, key: &str) {
        self.guard(&self.held_elsewhere).remove(key);
    }

    /// Number of active watches; tests wait on this before writing.
    pub fn watcher_count(&self) -> usize {
        self.watcher_count.load(Ordering::SeqCst)
    }

    fn guard<'a, T>(&self, mutex: &'a Mutex<T>) -> MutexGuard<'a, T> {
        mutex.lock().expect("memory backend poisoned")
    }

    fn publish(&self, action: WatchAction, key: &str, data: Map<String, Value>) {
        // No receivers is fine; broadcast just drops the event.
        let _ = self.events_tx.send(WatchEvent {
            action,
            key: key.to_string(),
            data,
        });
    }
}

#[async_trait]
impl SyncBackend for MemoryBackend {
    async fn update(&self, key: &str, value: &str) -> Result<(), BackendError> {
        self.guard(&self.entries)
            .insert(key.to_string(), value.to_string());
        let data = match serde_json::from_str::<Value>(value) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        };
        self.publish(WatchAction::Set, key, data);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), BackendError> {
        let removed = self.guard(&self.entries).remove(key);
        if removed.is_some() {
            self.publish(WatchAction::Delete, key, Map::new());
        }
        Ok(())
    }

    async fn fetch(&self, key: &str) -> Result<Option<String>, BackendError> {
        Ok(self.guard(&self.entries).get(key).cloned())
    }

    async fn lock(&self, key: &str, _blocking: bool) -> Result<(), BackendError> {
        if self.guard(&self.held_elsewhere).contains(key) {
            return Err(BackendError::LockContended {
                key: key.to_string(),
            });
        }
        self.guard(&self.locks).insert(key.to_string());
        Ok(())
    }

    async fn unlock(&self, key: &str) -> Result<(), BackendError> {
        self.guard(&self.locks).remove(key);
        Ok(())
    }

    async fn watch(
        &self,
        prefix: &str,
        events: mpsc::Sender<WatchEvent>,
        mut shutdown: watch::Receiver<()>,
    ) -> Result<(), BackendError> {
        let mut rx = self.events_tx.subscribe();
        self.watcher_count.fetch_add(1, Ordering::SeqCst);
        let result = loop {
            tokio::select! {
                _ = shutdown.changed() => break Ok(()),
                received = rx.recv() => match received {
                    Ok(event) => {
                        if !event.key.starts_with(prefix) {
                            continue;
                        }
                        if events.send(event).await.is_err() {
                            // Consumer is gone; treat as a normal stop.
                            break Ok(());
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break Ok(()),
                },
            }
        };
        self.watcher_count.fetch_sub(1, Ordering::SeqCst);
        result
    }
}
