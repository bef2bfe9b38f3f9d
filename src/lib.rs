//! # gantry
//!
//! Cluster synchronization core for schema-driven resource servers: a
//! transactional outbox, a leader-elected pump into a watchable
//! hierarchical KV store, version-disciplined state/monitoring
//! reconciliation and extension-aware watch fan-out.
//!
//! ## Guarantees
//! - **Capture**: every committed mutation of a non-`nosync` schema leaves
//!   exactly one event row in the outbox, in the same transaction.
//! - **Delivery**: a leader-elected pump drains the outbox into the sync
//!   backend in id order; rows are deleted only after the write is
//!   acknowledged, so delivery is at-least-once and writes are idempotent.
//! - **Reconciliation**: state and monitoring reports flow back under a
//!   version discipline that makes out-of-order and duplicate delivery
//!   harmless.
//!
//! ## Data flow
//! ```text
//! outbound:  API mutation -> EventLogger (same txn) -> CommitNotifier
//!              -> SyncPump -> /config/<key> in the sync backend
//! inbound:   sync backend watch -> WatchSupervisor
//!              -> state/monitoring reconcilers  (version-gated DB update)
//!              -> extension dispatcher          (user-configured prefixes)
//! ```
//!
//! ## Quick start
//! ```rust,ignore
//! use gantry::{ServiceDependencies, SyncConfig, SyncService};
//!
//! #[tokio::main]
//! async fn main() -> gantry::Result<()> {
//!     let config = SyncConfig::new()?.validate()?;
//!     let service = SyncService::start(config, ServiceDependencies {
//!         db,                        // your database driver
//!         backend,                   // your sync-backend client
//!         schemas,                   // parsed schema set
//!         environments,              // per-schema extension hooks
//!         identity,                  // service authorization source
//!         environment_factory: None, // or Some(..) for user watches
//!     })
//!     .await?;
//!
//!     // Route all mutating requests through the decorated handle.
//!     let db = service.database();
//!
//!     // ... serve traffic ...
//!     service.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! Storage drivers, the sync-backend client and extension runtimes are
//! **your responsibility**; this crate holds only the propagation engine
//! and the trait seams it talks through.

pub mod backend;
pub mod config;
pub mod constants;
pub mod db;
pub mod extension;
pub mod schema;

mod errors;
mod outbox;
mod pump;
mod reconciler;
mod service;
mod watch;

pub use backend::*;
pub use config::*;
pub use db::*;
pub use errors::*;
pub use extension::*;
pub use outbox::*;
pub use pump::*;
pub use reconciler::*;
pub use schema::*;
pub use service::*;
pub use watch::*;


#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

#[cfg(any(test, feature = "test-utils"))]
pub use test_utils::*;
