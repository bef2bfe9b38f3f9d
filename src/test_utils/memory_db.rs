use std::collections::BTreeMap;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicI64;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;

use async_trait::async_trait;

use crate::db::epoch_seconds;
use crate::db::Database;
use crate::db::EventRow;
use crate::db::IsolationLevel;
use crate::db::NewEvent;
use crate::db::Resource;
use crate::db::ResourceState;
use crate::db::Transaction;
use crate::errors::DbError;
use crate::schema::SchemaRegistry;

type Key = (String, String);

#[derive(Debug, Default, Clone)]
struct Tables {
    resources: BTreeMap<Key, Resource>,
    states: BTreeMap<Key, ResourceState>,
    events: BTreeMap<i64, EventRow>,
}

/// In-memory [`Database`] fake.
///
/// Transactions work on a snapshot and publish it wholesale on commit, so
/// an uncommitted transaction never leaks writes. Tests drive transactions
/// sequentially; there is no conflict detection. Event ids come from a
/// shared counter, monotonic in log order, and the store bumps
/// `config_version` on create/update of state-versioned schemas the way a
/// real persistence layer would.
pub struct MemoryDatabase {
    schemas: Arc<SchemaRegistry>,
    tables: Arc<Mutex<Tables>>,
    next_event_id: Arc<AtomicI64>,
    isolation_calls: Arc<Mutex<Vec<IsolationLevel>>>,
}

impl MemoryDatabase {
    pub fn new(schemas: Arc<SchemaRegistry>) -> Self {
        Self {
            schemas,
            tables: Arc::new(Mutex::new(Tables::default())),
            next_event_id: Arc::new(AtomicI64::new(1)),
            isolation_calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Committed outbox rows, ascending by id.
    pub fn event_rows(&self) -> Vec<EventRow> {
        self.lock_tables().events.values().cloned().collect()
    }

    pub fn resource(&self, schema_id: &str, resource_id: &str) -> Option<Resource> {
        self.lock_tables()
            .resources
            .get(&key(schema_id, resource_id))
            .cloned()
    }

    pub fn state(&self, schema_id: &str, resource_id: &str) -> Option<ResourceState> {
        self.lock_tables()
            .states
            .get(&key(schema_id, resource_id))
            .cloned()
    }

    /// Seed or overwrite a state record directly, bypassing transactions.
    pub fn put_state(&self, schema_id: &str, resource_id: &str, state: ResourceState) {
        self.lock_tables()
            .states
            .insert(key(schema_id, resource_id), state);
    }

    /// Isolation levels requested across all transactions, in call order.
    pub fn isolation_levels(&self) -> Vec<IsolationLevel> {
        self.isolation_calls
            .lock()
            .expect("isolation log poisoned")
            .clone()
    }

    fn lock_tables(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().expect("tables poisoned")
    }
}

#[async_trait]
impl Database for MemoryDatabase {
    async fn begin(&self) -> Result<Box<dyn Transaction>, DbError> {
        let snapshot = self.lock_tables().clone();
        Ok(Box::new(MemoryTransaction {
            schemas: self.schemas.clone(),
            shared: self.tables.clone(),
            next_event_id: self.next_event_id.clone(),
            isolation_calls: self.isolation_calls.clone(),
            working: Mutex::new(snapshot),
            finished: AtomicBool::new(false),
        }))
    }
}

pub struct MemoryTransaction {
    schemas: Arc<SchemaRegistry>,
    shared: Arc<Mutex<Tables>>,
    next_event_id: Arc<AtomicI64>,
    isolation_calls: Arc<Mutex<Vec<IsolationLevel>>>,
    working: Mutex<Tables>,
    finished: AtomicBool,
}

impl MemoryTransaction {
    fn working(&self) -> Result<MutexGuard<'_, Tables>, DbError> {
        if self.finished.load(Ordering::Relaxed) {
            return Err(DbError::Closed);
        }
        Ok(self.working.lock().expect("working tables poisoned"))
    }

    fn not_found(schema_id: &str, resource_id: &str) -> DbError {
        DbError::NotFound {
            schema_id: schema_id.to_string(),
            resource_id: resource_id.to_string(),
        }
    }

    fn state_versioned(&self, schema_id: &str) -> bool {
        self.schemas
            .schema(schema_id)
            .map(|s| s.state_versioning())
            .unwrap_or(false)
    }
}

#[async_trait]
impl Transaction for MemoryTransaction {
    async fn create(&self, resource: &Resource) -> Result<(), DbError> {
        let versioned = self.state_versioned(resource.schema_id());
        let mut tables = self.working()?;
        let key = key(resource.schema_id(), resource.id());
        if tables.resources.contains_key(&key) {
            return Err(DbError::AlreadyExists {
                schema_id: resource.schema_id().to_string(),
                resource_id: resource.id().to_string(),
            });
        }
        tables.resources.insert(key.clone(), resource.clone());
        if versioned {
            tables.states.insert(
                key,
                ResourceState {
                    config_version: 1,
                    ..ResourceState::default()
                },
            );
        }
        Ok(())
    }

    async fn update(&self, resource: &Resource) -> Result<(), DbError> {
        let versioned = self.state_versioned(resource.schema_id());
        let mut tables = self.working()?;
        let key = key(resource.schema_id(), resource.id());
        if !tables.resources.contains_key(&key) {
            return Err(Self::not_found(resource.schema_id(), resource.id()));
        }
        tables.resources.insert(key.clone(), resource.clone());
        if versioned {
            tables.states.entry(key).or_default().config_version += 1;
        }
        Ok(())
    }

    async fn delete(&self, schema_id: &str, resource_id: &str) -> Result<(), DbError> {
        let mut tables = self.working()?;
        let key = key(schema_id, resource_id);
        if tables.resources.remove(&key).is_none() {
            return Err(Self::not_found(schema_id, resource_id));
        }
        tables.states.remove(&key);
        Ok(())
    }

    async fn fetch(&self, schema_id: &str, resource_id: &str) -> Result<Resource, DbError> {
        self.working()?
            .resources
            .get(&key(schema_id, resource_id))
            .cloned()
            .ok_or_else(|| Self::not_found(schema_id, resource_id))
    }

    async fn state_fetch(
        &self,
        schema_id: &str,
        resource_id: &str,
    ) -> Result<ResourceState, DbError> {
        self.working()?
            .states
            .get(&key(schema_id, resource_id))
            .cloned()
            .ok_or_else(|| Self::not_found(schema_id, resource_id))
    }

    async fn state_update(
        &self,
        resource: &Resource,
        state: &ResourceState,
    ) -> Result<(), DbError> {
        self.working()?
            .states
            .insert(key(resource.schema_id(), resource.id()), state.clone());
        Ok(())
    }

    async fn log_event(&self, event: &NewEvent) -> Result<(), DbError> {
        let id = self.next_event_id.fetch_add(1, Ordering::SeqCst);
        let row = EventRow {
            id,
            kind: event.kind,
            path: event.path.clone(),
            version: event.version,
            body: event.body.clone(),
            timestamp: if event.timestamp > 0 {
                event.timestamp
            } else {
                epoch_seconds()
            },
        };
        self.working()?.events.insert(id, row);
        Ok(())
    }

    async fn list_events(&self, limit: usize) -> Result<Vec<EventRow>, DbError> {
        Ok(self
            .working()?
            .events
            .values()
            .take(limit)
            .cloned()
            .collect())
    }

    async fn delete_event(&self, id: i64) -> Result<(), DbError> {
        if self.working()?.events.remove(&id).is_none() {
            return Err(DbError::Storage(format!("event row {id} does not exist")));
        }
        Ok(())
    }

    async fn set_isolation_level(&self, level: IsolationLevel) -> Result<(), DbError> {
        if self.finished.load(Ordering::Relaxed) {
            return Err(DbError::Closed);
        }
        self.isolation_calls
            .lock()
            .expect("isolation log poisoned")
            .push(level);
        Ok(())
    }

    async fn commit(&self) -> Result<(), DbError> {
        let snapshot = self.working()?.clone();
        self.finished.store(true, Ordering::Relaxed);
        *self.shared.lock().expect("tables poisoned") = snapshot;
        Ok(())
    }

    async fn close(&self) {
        self.finished.store(true, Ordering::Relaxed);
    }
}

fn key(schema_id: &str, resource_id: &str) -> Key {
    (schema_id.to_string(), resource_id.to_string())
}
