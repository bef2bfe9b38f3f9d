use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::Result;

fn default_worker_count() -> usize {
    4
}

/// User-configured watch prefixes and the extension events bound to them.
///
/// ```toml
/// [watch]
/// keys = ["/notifications"]
/// events = ["notifications/alarm"]
/// worker_count = 4
/// ```
///
/// Each inbound event under a watched key is matched against `events` in
/// order; the first event name whose `/<name>` prefixes the key wins and
/// its `sync.<name>` environment handles the notification.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct WatchConfig {
    /// Sync-backend prefixes to watch for user-defined notifications.
    /// Empty disables the user watch loops entirely.
    #[serde(default)]
    pub keys: Vec<String>,

    /// Extension event names, matched against inbound keys in order.
    #[serde(default)]
    pub events: Vec<String>,

    /// Parallelism of the extension worker queue.
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            keys: Vec::new(),
            events: Vec::new(),
            worker_count: default_worker_count(),
        }
    }
}

impl WatchConfig {
    pub fn validate(&self) -> Result<()> {
        if self.worker_count == 0 {
            return Err(ConfigError::Message(
                "watch.worker_count must be at least 1".to_string(),
            )
            .into());
        }
        for key in &self.keys {
            if !key.starts_with('/') {
                return Err(ConfigError::Message(format!(
                    "watch key '{key}' must be an absolute sync path"
                ))
                .into());
            }
        }
        for event in &self.events {
            if event.is_empty() {
                return Err(
                    ConfigError::Message("watch.events entries must not be empty".to_string())
                        .into(),
                );
            }
        }
        Ok(())
    }
}
