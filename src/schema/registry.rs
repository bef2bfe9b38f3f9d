use std::collections::HashMap;
use std::sync::Arc;

use crate::db::IsolationLevel;
use crate::errors::TemplateError;

use super::SyncKeyTemplate;

/// Metadata for one resource kind, as the synchronization core sees it.
///
/// Built from the parsed schema set by the hosting server. Only the
/// attributes the propagation engine consults are carried here.
#[derive(Debug, Clone)]
pub struct Schema {
    id: String,
    prefix: String,
    state_versioning: bool,
    nosync: bool,
    sync_key_template: Option<SyncKeyTemplate>,
    isolation: HashMap<String, IsolationLevel>,
}

impl Schema {
    /// `prefix` is the URL-path prefix of the resource kind, e.g.
    /// `/v1.0/networks`. Trailing slashes are stripped.
    pub fn new(id: impl Into<String>, prefix: impl Into<String>) -> Self {
        let prefix: String = prefix.into();
        Self {
            id: id.into(),
            prefix: prefix.trim_end_matches('/').to_string(),
            state_versioning: false,
            nosync: false,
            sync_key_template: None,
            isolation: HashMap::new(),
        }
    }

    pub fn with_state_versioning(mut self, enabled: bool) -> Self {
        self.state_versioning = enabled;
        self
    }

    pub fn with_nosync(mut self, enabled: bool) -> Self {
        self.nosync = enabled;
        self
    }

    pub fn with_sync_key_template(mut self, template: &str) -> Result<Self, TemplateError> {
        self.sync_key_template = Some(SyncKeyTemplate::parse(template)?);
        Ok(self)
    }

    pub fn with_isolation_level(
        mut self,
        operation: impl Into<String>,
        level: IsolationLevel,
    ) -> Self {
        self.isolation.insert(operation.into(), level);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn state_versioning(&self) -> bool {
        self.state_versioning
    }

    pub fn nosync(&self) -> bool {
        self.nosync
    }

    pub fn sync_key_template(&self) -> Option<&SyncKeyTemplate> {
        self.sync_key_template.as_ref()
    }

    /// Isolation level declared for `operation`, or the store default.
    pub fn isolation_level(&self, operation: &str) -> IsolationLevel {
        self.isolation
            .get(operation)
            .copied()
            .unwrap_or_default()
    }

    /// Canonical URL path of a resource of this schema.
    pub fn resource_path(&self, resource_id: &str) -> String {
        format!("{}/{}", self.prefix, resource_id)
    }

    /// Extract the resource id from a canonical URL path, if the path
    /// belongs to this schema and names a single resource.
    pub fn resource_id_from_path<'a>(&self, path: &'a str) -> Option<&'a str> {
        let rest = path.strip_prefix(self.prefix.as_str())?;
        let rest = rest.strip_prefix('/')?;
        if rest.is_empty() || rest.contains('/') {
            return None;
        }
        Some(rest)
    }
}

/// Read-only lookup over the schema set.
///
/// Shared behind an `Arc` by the outbox decorator, the pump and the
/// reconcilers.
#[derive(Debug, Default)]
pub struct SchemaRegistry {
    by_id: HashMap<String, Arc<Schema>>,
    // Sorted by prefix length descending so the first match is the longest.
    by_prefix: Vec<Arc<Schema>>,
}

impl SchemaRegistry {
    pub fn new(schemas: Vec<Schema>) -> Self {
        let mut by_id = HashMap::with_capacity(schemas.len());
        let mut by_prefix: Vec<Arc<Schema>> = Vec::with_capacity(schemas.len());
        for schema in schemas {
            let schema = Arc::new(schema);
            by_id.insert(schema.id().to_string(), schema.clone());
            by_prefix.push(schema);
        }
        by_prefix.sort_by_key(|s| std::cmp::Reverse(s.prefix().len()));
        Self { by_id, by_prefix }
    }

    pub fn schema(&self, id: &str) -> Option<Arc<Schema>> {
        self.by_id.get(id).cloned()
    }

    /// Resolve a schema by URL path. The longest matching prefix wins, and
    /// the prefix must end on a path segment boundary.
    pub fn schema_by_url_path(&self, path: &str) -> Option<Arc<Schema>> {
        self.by_prefix
            .iter()
            .find(|schema| {
                path.strip_prefix(schema.prefix())
                    .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
            })
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}
