//! Schema metadata and sync key templates.
//!
//! The registry is built once at startup from the parsed schema set and is
//! read-only afterwards. Lookups happen on the hot path of the pump and
//! both reconcilers.

mod registry;
mod template;

pub use registry::Schema;
pub use registry::SchemaRegistry;
pub use template::SyncKeyTemplate;
