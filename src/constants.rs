//! Design constants shared across the engine.
//!
//! The lock keys and key prefixes below are part of the persisted cluster
//! layout in the sync backend. Every peer in a cluster must agree on them,
//! so they are constants rather than configuration.

use std::time::Duration;

/// Cluster-wide lease gating the outbox drain. Exactly one pump in the
/// cluster holds this at a time.
pub const SYNC_LOCK_KEY: &str = "gohan/cluster/sync";

/// Prefix for the per-purpose watch leases. The purpose name
/// (`state`, `monitoring`, `watch`) is appended verbatim.
pub const WATCH_LOCK_PREFIX: &str = "gohan/cluster/lock";

/// Key prefix under which resource configuration is published.
pub const CONFIG_PREFIX: &str = "/config/";

/// Key prefix under which agents report resource state.
pub const STATE_PREFIX: &str = "/state/";

/// Key prefix under which agents report monitoring data.
pub const MONITORING_PREFIX: &str = "/monitoring/";

/// How long the pump sleeps between polls when no commit arrives.
pub const EVENT_POLL_INTERVAL: Duration = Duration::from_secs(30);

/// Maximum number of event rows read per drain iteration.
pub const EVENT_BATCH_LIMIT: usize = 10_000;

/// Back-off before retrying a contended watch lease.
pub const LOCK_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Buffered jobs on the extension worker queue before enqueue blocks.
pub const WORKER_QUEUE_CAPACITY: usize = 256;

/// Buffered events on each watch delivery channel.
pub const WATCH_CHANNEL_CAPACITY: usize = 64;

/// Operation name used to look up the isolation level for state updates.
pub const STATE_UPDATE_OPERATION: &str = "state_update";

/// Operation name used to look up the isolation level for monitoring updates.
pub const MONITORING_UPDATE_OPERATION: &str = "monitoring_update";

/// Extension hook invoked before a state record update is applied.
pub const PRE_STATE_UPDATE_HOOK: &str = "pre_state_update_in_transaction";

/// Extension hook invoked after a state record update is applied.
pub const POST_STATE_UPDATE_HOOK: &str = "post_state_update_in_transaction";

/// Extension hook invoked before a monitoring update is applied.
pub const PRE_MONITORING_UPDATE_HOOK: &str = "pre_monitoring_update_in_transaction";

/// Extension hook invoked after a monitoring update is applied.
pub const POST_MONITORING_UPDATE_HOOK: &str = "post_monitoring_update_in_transaction";

/// Handler name invoked on user-configured watch notifications.
pub const NOTIFICATION_HANDLER: &str = "notification";
