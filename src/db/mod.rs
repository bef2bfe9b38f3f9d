//! Database collaborator interface and the domain records that cross it.
//!
//! The engine never talks to a concrete database. It is handed a
//! [`Database`] trait object whose transactions expose the narrow set of
//! operations the synchronization core needs: resource CRUD, state record
//! access and the typed outbox surface (`log_event` / `list_events` /
//! `delete_event`).

mod event;
mod resource;
mod transaction;

pub use event::EventKind;
pub use event::EventRow;
pub use event::NewEvent;
pub use event::epoch_seconds;
pub use resource::IsolationLevel;
pub use resource::Resource;
pub use resource::ResourceState;
pub use transaction::Database;
pub use transaction::Transaction;

#[cfg(any(test, feature = "test-utils"))]
pub use transaction::MockDatabase;
#[cfg(any(test, feature = "test-utils"))]
pub use transaction::MockTransaction;
