use async_trait::async_trait;
#[cfg(any(test, feature = "test-utils"))]
use mockall::automock;

use super::EventRow;
use super::IsolationLevel;
use super::NewEvent;
use super::Resource;
use super::ResourceState;
use crate::errors::DbError;

/// Handle to the relational store.
///
/// Implementations wrap a concrete driver (or an in-memory fake under
/// `test-utils`). The engine only ever begins transactions; all work
/// happens through [`Transaction`].
#[cfg_attr(any(test, feature = "test-utils"), automock)]
#[async_trait]
pub trait Database: Send + Sync + 'static {
    async fn begin(&self) -> Result<Box<dyn Transaction>, DbError>;
}

/// A single database transaction.
///
/// Methods take `&self`; implementations use interior mutability so that a
/// transaction handle can be lent into an extension context while the
/// reconciler keeps using it.
///
/// # Contract
///
/// - After `commit` or `close`, every other method returns
///   [`DbError::Closed`].
/// - `close` without a prior `commit` discards all buffered work. Calling
///   it after `commit` is a no-op, so callers may close unconditionally.
/// - `list_events` returns rows in ascending id order.
#[cfg_attr(any(test, feature = "test-utils"), automock)]
#[async_trait]
pub trait Transaction: Send + Sync {
    async fn create(&self, resource: &Resource) -> Result<(), DbError>;

    async fn update(&self, resource: &Resource) -> Result<(), DbError>;

    async fn delete(&self, schema_id: &str, resource_id: &str) -> Result<(), DbError>;

    async fn fetch(&self, schema_id: &str, resource_id: &str) -> Result<Resource, DbError>;

    /// Fetch the state record of a versioned resource.
    async fn state_fetch(
        &self,
        schema_id: &str,
        resource_id: &str,
    ) -> Result<ResourceState, DbError>;

    /// Overwrite the state record of a versioned resource.
    async fn state_update(
        &self,
        resource: &Resource,
        state: &ResourceState,
    ) -> Result<(), DbError>;

    /// Append an outbox row in this transaction. The id is assigned by the
    /// store at commit visibility, monotonic within a single writer.
    async fn log_event(&self, event: &NewEvent) -> Result<(), DbError>;

    /// Read up to `limit` outbox rows in ascending id order.
    async fn list_events(&self, limit: usize) -> Result<Vec<EventRow>, DbError>;

    /// Remove a single outbox row by id. Unknown ids are an error.
    async fn delete_event(&self, id: i64) -> Result<(), DbError>;

    /// Must be called before the first read or write to take effect.
    async fn set_isolation_level(&self, level: IsolationLevel) -> Result<(), DbError>;

    async fn commit(&self) -> Result<(), DbError>;

    /// Release the transaction. Safe to call after `commit`.
    async fn close(&self);
}
