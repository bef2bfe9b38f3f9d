use std::fmt;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use serde::Deserialize;
use serde::Serialize;

/// The kind of mutation an outbox row captures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Create,
    Update,
    Delete,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Create => "create",
            EventKind::Update => "update",
            EventKind::Delete => "delete",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An outbox row about to be appended, before the database assigns an id.
#[derive(Debug, Clone, PartialEq)]
pub struct NewEvent {
    pub kind: EventKind,
    /// Canonical URL path of the affected resource.
    pub path: String,
    /// Config version at capture time. 1 on create, 0 for non-versioned
    /// mutations, `config_version + 1` for deletes of versioned resources.
    pub version: i64,
    /// JSON serialization of the resource at event time. For deletes, the
    /// row as it existed before removal.
    pub body: String,
    /// Epoch seconds at capture time.
    pub timestamp: i64,
}

/// A persisted outbox row. Ids are monotonic within a writer; rows are
/// drained in ascending id order and deleted exactly once.
#[derive(Debug, Clone, PartialEq)]
pub struct EventRow {
    pub id: i64,
    pub kind: EventKind,
    pub path: String,
    pub version: i64,
    pub body: String,
    pub timestamp: i64,
}

/// Seconds since the Unix epoch, saturating at zero on clock skew.
pub fn epoch_seconds() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
