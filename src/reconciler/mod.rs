//! Inbound report reconciliation.
//!
//! Agents report convergence under `/state/` and health under
//! `/monitoring/`. Reconciliation applies those reports to the state
//! records in the database under the version discipline: `state_version`
//! never moves backwards, and monitoring only lands once state has caught
//! up with configuration. Reports failing a gate are discarded silently;
//! that is the mechanism that makes out-of-order delivery safe.

mod monitoring;
mod state;

pub use monitoring::monitoring_update;
pub use state::state_update;


use std::sync::Arc;

use serde_json::Map;
use serde_json::Value;

use crate::db::Database;
use crate::extension::EnvironmentRegistry;
use crate::extension::Identity;
use crate::schema::SchemaRegistry;

/// Collaborators shared by both reconcilers and the watch consumers.
#[derive(Clone)]
pub struct ReconcilerDependencies {
    pub db: Arc<dyn Database>,
    pub schemas: Arc<SchemaRegistry>,
    pub environments: Arc<EnvironmentRegistry>,
    pub identity: Arc<dyn Identity>,
}

/// Re-root an inbound key under `/`: `/state/v1.0/networks/a` becomes
/// `/v1.0/networks/a`.
pub(crate) fn schema_path(key: &str, prefix: &str) -> String {
    format!("/{}", key.strip_prefix(prefix).unwrap_or(key))
}

/// Numeric `version` from a report payload. Agents send integers, but
/// anything numeric is accepted and truncated.
pub(crate) fn numeric_version(data: &Map<String, Value>) -> Option<i64> {
    match data.get("version") {
        Some(Value::Number(n)) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        _ => None,
    }
}
