//! Error hierarchy for the synchronization engine.
//!
//! Errors are categorized by the collaborator or stage they originate from.
//! The watch consumers and the pump decide per category whether a failure is
//! retried, skipped or surfaced; see the helpers on [`Error`].

use config::ConfigError;

#[doc(hidden)]
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Database collaborator failures (transactions, fetches, outbox rows)
    #[error(transparent)]
    Db(#[from] DbError),

    /// Sync-backend collaborator failures (writes, leases, watches)
    #[error(transparent)]
    Backend(#[from] BackendError),

    /// Sync key template parsing or rendering failures
    #[error(transparent)]
    Template(#[from] TemplateError),

    /// Malformed inbound state or monitoring reports
    #[error(transparent)]
    Reconcile(#[from] ReconcileError),

    /// Extension environment failures
    #[error(transparent)]
    Extension(#[from] ExtensionError),

    /// Configuration loading or validation failures
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Unrecoverable failures requiring operator attention
    #[error("Fatal error: {0}")]
    Fatal(String),
}

impl Error {
    /// True for failures that the next pump or watch iteration may clear
    /// on its own (transient I/O against a collaborator).
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Db(_) | Error::Backend(_))
    }
}

/// Failures raised by the database collaborator.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// Resource or state record does not exist
    #[error("resource '{resource_id}' not found in schema '{schema_id}'")]
    NotFound {
        schema_id: String,
        resource_id: String,
    },

    /// Mutation against a schema the registry does not know
    #[error("unknown schema '{schema_id}'")]
    UnknownSchema { schema_id: String },

    /// A second resource with the same id in the same schema
    #[error("resource '{resource_id}' already exists in schema '{schema_id}'")]
    AlreadyExists {
        schema_id: String,
        resource_id: String,
    },

    /// Resource body could not be serialized for event capture
    #[error("event body serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Operation on a transaction that was already committed or closed
    #[error("transaction is no longer usable")]
    Closed,

    /// Driver-level failure (connection, statement, commit)
    #[error("database failure: {0}")]
    Storage(String),
}

/// Failures raised by the sync-backend collaborator.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// Lease held by another cluster member
    #[error("lock '{key}' is held elsewhere")]
    LockContended { key: String },

    /// A watch ended abnormally and must be re-established
    #[error("watch on '{prefix}' terminated: {reason}")]
    WatchTerminated { prefix: String, reason: String },

    /// RPC-level failure against the backend
    #[error("sync backend unavailable: {0}")]
    Unavailable(String),
}

/// Failures while parsing or rendering a sync key template.
#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    /// A `{{` without its closing `}}`
    #[error("unterminated placeholder in template '{template}'")]
    Unterminated { template: String },

    /// A placeholder with an empty name
    #[error("empty placeholder in template '{template}'")]
    EmptyPlaceholder { template: String },

    /// Placeholder names a top-level field the body does not carry
    #[error("template field '{field}' missing from body")]
    MissingField { field: String },

    /// Placeholder resolved to an array, object or null
    #[error("template field '{field}' is not a scalar value")]
    NonScalarField { field: String },

    /// Event body was not a JSON object
    #[error("event body is not a JSON object")]
    BodyNotObject,

    /// Event body could not be parsed at all
    #[error("malformed event body: {0}")]
    BodyParse(#[from] serde_json::Error),
}

/// Malformed inbound reports. Stale reports are not errors; they are
/// silently discarded by the version gates in the reconcilers.
#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    /// State or monitoring report without a numeric `version`
    #[error("no version in report for '{key}'")]
    MissingVersion { key: String },

    /// Monitoring report without a `monitoring` string
    #[error("no monitoring payload in report for '{key}'")]
    MissingMonitoring { key: String },
}

/// Failures raised by extension environments and their collaborators.
#[derive(Debug, thiserror::Error)]
pub enum ExtensionError {
    /// A handler reported failure; aborts the enclosing transaction
    #[error("extension handler '{handler}' failed: {message}")]
    Handler { handler: String, message: String },

    /// Environment construction failed at startup
    #[error("building environment '{name}' failed: {message}")]
    Environment { name: String, message: String },

    /// Service authorization for the extension context is unavailable
    #[error("service authorization unavailable: {0}")]
    Authorization(String),
}
