//! Watch fan-out: inbound events from the sync backend to their handlers.
//!
//! ```text
//! SyncBackend watch(prefix)
//!        │ lease-gated loop per prefix family
//!        ▼
//! mpsc channel ──> consumer task
//!                    ├─ /state/       -> reconciler::state_update   (spawned per event)
//!                    ├─ /monitoring/  -> reconciler::monitoring_update (spawned per event)
//!                    └─ user prefixes -> JobQueue -> ExtensionDispatcher
//! ```
//!
//! Each watch family holds its own cluster lease, so across the cluster a
//! single member consumes each family at a time. Reconciliations run as
//! independent tasks; ordering across resources is not preserved and per
//! resource correctness comes from the reconcilers' version gates.
//! Extension notifications go through the worker queue so a slow handler
//! never blocks watch delivery.

mod dispatcher;
mod queue;
mod supervisor;

pub use dispatcher::ExtensionDispatcher;
pub use queue::JobQueue;
pub use supervisor::WatchSupervisor;
