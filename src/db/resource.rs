use serde::Deserialize;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;

/// A domain object belonging to a schema.
///
/// Carries the user-authored configuration document (the body). Versioned
/// schemas additionally track a [`ResourceState`] record beside it.
#[derive(Debug, Clone, PartialEq)]
pub struct Resource {
    schema_id: String,
    id: String,
    data: Map<String, Value>,
}

impl Resource {
    pub fn new(
        schema_id: impl Into<String>,
        id: impl Into<String>,
        data: Map<String, Value>,
    ) -> Self {
        Self {
            schema_id: schema_id.into(),
            id: id.into(),
            data,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn schema_id(&self) -> &str {
        &self.schema_id
    }

    pub fn data(&self) -> &Map<String, Value> {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut Map<String, Value> {
        &mut self.data
    }
}

/// Per-resource version bookkeeping for schemas with state versioning.
///
/// `config_version` is bumped by the persistence layer on every successful
/// configuration mutation. `state_version` trails it, advanced only by
/// acknowledged agent reports. The invariant `state_version <=
/// config_version` is maintained by the reconcilers' version gates.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceState {
    pub config_version: i64,
    pub state_version: i64,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub error: String,
    #[serde(default)]
    pub monitoring: String,
}

/// Transaction isolation levels a schema may declare per operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IsolationLevel {
    #[default]
    ReadCommitted,
    RepeatableRead,
    Serializable,
}
