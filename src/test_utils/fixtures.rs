use std::sync::Arc;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::json;
use serde_json::Map;
use serde_json::Value;

use crate::db::Resource;
use crate::extension::Environment;
use crate::extension::EnvironmentFactory;
use crate::extension::ExtensionContext;
use crate::extension::Identity;
use crate::extension::ServiceAuthorization;
use crate::errors::ExtensionError;
use crate::schema::Schema;
use crate::schema::SchemaRegistry;

/// Versioned schema with a sync key template, as in the propagation
/// scenarios.
pub fn networks_schema() -> Schema {
    Schema::new("networks", "/v1.0/networks")
        .with_state_versioning(true)
        .with_sync_key_template("/nets/{{id}}")
        .expect("fixture template is valid")
}

/// Versioned schema without a template; reports land on the raw URL path,
/// which is what the reconcilers resolve schemas from.
pub fn servers_schema() -> Schema {
    Schema::new("servers", "/v1.0/servers").with_state_versioning(true)
}

/// Schema whose mutations must never reach the outbox.
pub fn nosync_schema() -> Schema {
    Schema::new("internal", "/v1.0/internal").with_nosync(true)
}

/// Non-versioned schema without a template.
fn logs_schema() -> Schema {
    Schema::new("logs", "/v1.0/logs")
}

pub fn test_registry() -> Arc<SchemaRegistry> {
    Arc::new(SchemaRegistry::new(vec![
        networks_schema(),
        servers_schema(),
        nosync_schema(),
        logs_schema(),
    ]))
}

/// Build a resource from a JSON object literal. Panics on non-objects, so
/// fixture mistakes surface at the call site.
pub fn resource(schema_id: &str, id: &str, body: Value) -> Resource {
    let Value::Object(data) = body else {
        panic!("resource body must be a JSON object, got {body}");
    };
    Resource::new(schema_id, id, data)
}

/// Identity collaborator returning a fixed catalog and token.
pub struct StaticIdentity;

#[async_trait]
impl Identity for StaticIdentity {
    async fn service_authorization(&self) -> Result<ServiceAuthorization, ExtensionError> {
        Ok(ServiceAuthorization {
            catalog: json!([{"type": "identity", "endpoint": "http://localhost:5000"}]),
            auth_token: "service-token".to_string(),
        })
    }
}

/// Extension environment that records every invocation.
///
/// Clones share the call log, so invocations through `clone_env` stay
/// observable from the test.
pub struct RecordingEnvironment {
    calls: Arc<Mutex<Vec<(String, Map<String, Value>)>>>,
    fail_on: Option<String>,
}

impl RecordingEnvironment {
    pub fn new() -> Self {
        Self {
            calls: Arc::new(Mutex::new(Vec::new())),
            fail_on: None,
        }
    }

    /// Fail whenever `handler` is invoked.
    pub fn failing_on(handler: &str) -> Self {
        Self {
            fail_on: Some(handler.to_string()),
            ..Self::new()
        }
    }

    /// `(handler name, context values)` per invocation, in order.
    pub fn calls(&self) -> Vec<(String, Map<String, Value>)> {
        self.calls.lock().expect("call log poisoned").clone()
    }

    pub fn handler_names(&self) -> Vec<String> {
        self.calls().into_iter().map(|(name, _)| name).collect()
    }
}

impl Default for RecordingEnvironment {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Environment for RecordingEnvironment {
    async fn handle_event(
        &self,
        name: &str,
        context: &mut ExtensionContext<'_>,
    ) -> Result<(), ExtensionError> {
        self.calls
            .lock()
            .expect("call log poisoned")
            .push((name.to_string(), context.values().clone()));
        if self.fail_on.as_deref() == Some(name) {
            return Err(ExtensionError::Handler {
                handler: name.to_string(),
                message: "instructed to fail".to_string(),
            });
        }
        Ok(())
    }

    fn clone_env(&self) -> Box<dyn Environment> {
        Box::new(Self {
            calls: self.calls.clone(),
            fail_on: self.fail_on.clone(),
        })
    }
}

/// Factory handing out [`RecordingEnvironment`]s that share one call log.
pub struct StaticEnvironmentFactory {
    calls: Arc<Mutex<Vec<(String, Map<String, Value>)>>>,
    created: Arc<Mutex<Vec<(String, String)>>>,
    fail: bool,
}

impl StaticEnvironmentFactory {
    pub fn new() -> Self {
        Self {
            calls: Arc::new(Mutex::new(Vec::new())),
            created: Arc::new(Mutex::new(Vec::new())),
            fail: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new()
        }
    }

    /// `(name, source)` pairs for every environment built.
    pub fn created(&self) -> Vec<(String, String)> {
        self.created.lock().expect("created log poisoned").clone()
    }

    /// Invocations across every environment this factory handed out.
    pub fn calls(&self) -> Vec<(String, Map<String, Value>)> {
        self.calls.lock().expect("call log poisoned").clone()
    }
}

impl Default for StaticEnvironmentFactory {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EnvironmentFactory for StaticEnvironmentFactory {
    async fn create(
        &self,
        name: &str,
        source: &str,
    ) -> Result<Box<dyn Environment>, ExtensionError> {
        if self.fail {
            return Err(ExtensionError::Environment {
                name: name.to_string(),
                message: "instructed to fail".to_string(),
            });
        }
        self.created
            .lock()
            .expect("created log poisoned")
            .push((name.to_string(), source.to_string()));
        Ok(Box::new(RecordingEnvironment {
            calls: self.calls.clone(),
            fail_on: None,
        }))
    }
}
