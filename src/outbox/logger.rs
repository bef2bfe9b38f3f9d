use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::db::epoch_seconds;
use crate::db::Database;
use crate::db::EventKind;
use crate::db::EventRow;
use crate::db::IsolationLevel;
use crate::db::NewEvent;
use crate::db::Resource;
use crate::db::ResourceState;
use crate::db::Transaction;
use crate::errors::DbError;
use crate::outbox::CommitNotifier;
use crate::schema::Schema;
use crate::schema::SchemaRegistry;

/// Database decorator that wraps every transaction in an [`EventLogger`].
///
/// The hosting server uses this handle for all request-side work; the pump
/// keeps the undecorated inner handle, since draining the outbox must not
/// log events of its own.
pub struct OutboxDatabase {
    inner: Arc<dyn Database>,
    schemas: Arc<SchemaRegistry>,
    notifier: CommitNotifier,
}

impl OutboxDatabase {
    pub fn new(
        inner: Arc<dyn Database>,
        schemas: Arc<SchemaRegistry>,
        notifier: CommitNotifier,
    ) -> Self {
        Self {
            inner,
            schemas,
            notifier,
        }
    }
}

#[async_trait]
impl Database for OutboxDatabase {
    async fn begin(&self) -> Result<Box<dyn Transaction>, DbError> {
        let tx = self.inner.begin().await?;
        Ok(Box::new(EventLogger::wrap(
            tx,
            self.schemas.clone(),
            self.notifier.clone(),
        )))
    }
}

/// Transaction decorator appending one event row per resource mutation.
///
/// The captured `version` follows the outbox rules: 1 on create, 0 for
/// mutations of non-versioned schemas, the post-mutation `config_version`
/// for versioned updates and the pre-mutation `config_version + 1` for
/// versioned deletes (whose body is the pre-delete row). Schemas flagged
/// `nosync` mutate without logging.
pub struct EventLogger {
    inner: Box<dyn Transaction>,
    schemas: Arc<SchemaRegistry>,
    notifier: CommitNotifier,
    event_logged: AtomicBool,
}

impl EventLogger {
    pub fn wrap(
        inner: Box<dyn Transaction>,
        schemas: Arc<SchemaRegistry>,
        notifier: CommitNotifier,
    ) -> Self {
        Self {
            inner,
            schemas,
            notifier,
            event_logged: AtomicBool::new(false),
        }
    }

    /// Whether any mutation in this transaction produced an event row.
    pub fn event_logged(&self) -> bool {
        self.event_logged.load(Ordering::Relaxed)
    }

    fn schema(&self, schema_id: &str) -> Result<Arc<Schema>, DbError> {
        self.schemas
            .schema(schema_id)
            .ok_or_else(|| DbError::UnknownSchema {
                schema_id: schema_id.to_string(),
            })
    }

    async fn log_event(
        &self,
        kind: EventKind,
        schema: &Schema,
        resource: &Resource,
        version: i64,
    ) -> Result<(), DbError> {
        if schema.nosync() {
            debug!(schema_id = schema.id(), "skipping event logging");
            return Ok(());
        }
        let body = serde_json::to_string(resource.data())?;
        let event = NewEvent {
            kind,
            path: schema.resource_path(resource.id()),
            version,
            body,
            timestamp: epoch_seconds(),
        };
        self.inner.log_event(&event).await?;
        self.event_logged.store(true, Ordering::Relaxed);
        Ok(())
    }
}

#[async_trait]
impl Transaction for EventLogger {
    async fn create(&self, resource: &Resource) -> Result<(), DbError> {
        let schema = self.schema(resource.schema_id())?;
        self.inner.create(resource).await?;
        self.log_event(EventKind::Create, &schema, resource, 1).await
    }

    async fn update(&self, resource: &Resource) -> Result<(), DbError> {
        let schema = self.schema(resource.schema_id())?;
        self.inner.update(resource).await?;
        if !schema.state_versioning() {
            return self.log_event(EventKind::Update, &schema, resource, 0).await;
        }
        // The mutation already bumped config_version; capture it fresh.
        let state = self
            .inner
            .state_fetch(resource.schema_id(), resource.id())
            .await?;
        self.log_event(EventKind::Update, &schema, resource, state.config_version)
            .await
    }

    async fn delete(&self, schema_id: &str, resource_id: &str) -> Result<(), DbError> {
        let schema = self.schema(schema_id)?;
        // Capture the row before it is gone; the event body is the
        // pre-delete JSON.
        let resource = self.inner.fetch(schema_id, resource_id).await?;
        let version = if schema.state_versioning() {
            let state = self.inner.state_fetch(schema_id, resource_id).await?;
            state.config_version + 1
        } else {
            0
        };
        self.inner.delete(schema_id, resource_id).await?;
        self.log_event(EventKind::Delete, &schema, &resource, version)
            .await
    }

    async fn fetch(&self, schema_id: &str, resource_id: &str) -> Result<Resource, DbError> {
        self.inner.fetch(schema_id, resource_id).await
    }

    async fn state_fetch(
        &self,
        schema_id: &str,
        resource_id: &str,
    ) -> Result<ResourceState, DbError> {
        self.inner.state_fetch(schema_id, resource_id).await
    }

    async fn state_update(
        &self,
        resource: &Resource,
        state: &ResourceState,
    ) -> Result<(), DbError> {
        self.inner.state_update(resource, state).await
    }

    async fn log_event(&self, event: &NewEvent) -> Result<(), DbError> {
        self.inner.log_event(event).await
    }

    async fn list_events(&self, limit: usize) -> Result<Vec<EventRow>, DbError> {
        self.inner.list_events(limit).await
    }

    async fn delete_event(&self, id: i64) -> Result<(), DbError> {
        self.inner.delete_event(id).await
    }

    async fn set_isolation_level(&self, level: IsolationLevel) -> Result<(), DbError> {
        self.inner.set_isolation_level(level).await
    }

    async fn commit(&self) -> Result<(), DbError> {
        self.inner.commit().await?;
        if self.event_logged() {
            self.notifier.notify();
        }
        Ok(())
    }

    async fn close(&self) {
        self.inner.close().await;
    }
}
