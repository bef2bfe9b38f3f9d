//! Extension environment collaborator interface.
//!
//! Extension environments are polymorphic: scripting runtimes, compiled
//! handlers or anything else that can answer `handle_event`. The core
//! looks environments up by schema id (state and monitoring hooks) or
//! builds them per configured watch event name through the factory, and
//! clones them per invocation to isolate mutable handler state.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
#[cfg(any(test, feature = "test-utils"))]
use mockall::automock;
use serde_json::Map;
use serde_json::Value;

use crate::db::Transaction;
use crate::errors::ExtensionError;

/// Context handed to an extension handler.
///
/// A JSON value map plus, for the in-transaction hooks, a borrow of the
/// live transaction so handlers can read and write within the same commit.
pub struct ExtensionContext<'a> {
    values: Map<String, Value>,
    transaction: Option<&'a dyn Transaction>,
}

impl<'a> ExtensionContext<'a> {
    pub fn new() -> Self {
        Self {
            values: Map::new(),
            transaction: None,
        }
    }

    pub fn with_transaction(transaction: &'a dyn Transaction) -> Self {
        Self {
            values: Map::new(),
            transaction: Some(transaction),
        }
    }

    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.values.insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn values(&self) -> &Map<String, Value> {
        &self.values
    }

    pub fn transaction(&self) -> Option<&'a dyn Transaction> {
        self.transaction
    }
}

impl Default for ExtensionContext<'_> {
    fn default() -> Self {
        Self::new()
    }
}

/// One extension environment. `handle_event` is the single entry point.
#[async_trait]
pub trait Environment: Send + Sync {
    async fn handle_event(
        &self,
        name: &str,
        context: &mut ExtensionContext<'_>,
    ) -> Result<(), ExtensionError>;

    /// A fresh environment sharing code but not per-invocation state.
    fn clone_env(&self) -> Box<dyn Environment>;
}

/// Builds named environments for configured watch events at startup.
#[cfg_attr(any(test, feature = "test-utils"), automock)]
#[async_trait]
pub trait EnvironmentFactory: Send + Sync + 'static {
    /// `name` is the environment name (`sync.<event>`); `source` the code
    /// location it is loaded from (`sync://<event>`).
    async fn create(&self, name: &str, source: &str)
        -> Result<Box<dyn Environment>, ExtensionError>;
}

/// Registry of environments keyed by schema id.
///
/// Populated by the hosting server at startup; read concurrently by the
/// reconcilers.
#[derive(Default)]
pub struct EnvironmentRegistry {
    environments: DashMap<String, Arc<dyn Environment>>,
}

impl EnvironmentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, schema_id: impl Into<String>, environment: Arc<dyn Environment>) {
        self.environments.insert(schema_id.into(), environment);
    }

    pub fn environment(&self, schema_id: &str) -> Option<Arc<dyn Environment>> {
        self.environments.get(schema_id).map(|e| e.value().clone())
    }
}

/// Catalog and token under which extension hooks act on behalf of the
/// service.
#[derive(Debug, Clone)]
pub struct ServiceAuthorization {
    pub catalog: Value,
    pub auth_token: String,
}

/// Identity collaborator providing service authorization for hook
/// contexts.
#[cfg_attr(any(test, feature = "test-utils"), automock)]
#[async_trait]
pub trait Identity: Send + Sync + 'static {
    async fn service_authorization(&self) -> Result<ServiceAuthorization, ExtensionError>;
}
