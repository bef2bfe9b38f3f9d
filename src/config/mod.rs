//! Configuration for the synchronization engine.
//!
//! Provides hierarchical configuration loading and validation with:
//! - Default values as code base
//! - Configuration file support
//! - Environment variable overrides
mod watch;
pub use watch::*;


use std::env;

use config::Config;
use config::Environment;
use config::File;
use serde::Deserialize;
use serde::Serialize;

use crate::Result;

/// Main configuration container for the synchronization engine.
///
/// Combines all subsystem configurations with hierarchical override support:
/// 1. Default values from code implementation
/// 2. Configuration file specified by `CONFIG_PATH`
/// 3. Environment variables (highest priority)
///
/// The pump tunables (poll interval, batch limit, lock retry delay) are
/// design constants, not configuration; see [`crate::constants`].
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct SyncConfig {
    /// User-configured watch prefixes and extension event bindings
    #[serde(default)]
    pub watch: WatchConfig,
}

impl SyncConfig {
    /// Loads configuration from hierarchical sources without validation.
    ///
    /// Sources are merged in order (later overrides earlier):
    /// 1. Type defaults (lowest priority)
    /// 2. Configuration file from `CONFIG_PATH` environment variable (if set)
    /// 3. Environment variables with `GANTRY__` prefix (highest priority)
    ///
    /// Validation is deferred so callers can layer further overrides;
    /// call [`SyncConfig::validate`] before using the result.
    pub fn new() -> Result<Self> {
        let mut builder = Config::builder().add_source(Config::try_from(&Self::default())?);

        if let Ok(config_path) = env::var("CONFIG_PATH") {
            builder = builder.add_source(File::with_name(&config_path).required(true));
        }

        builder = builder.add_source(
            Environment::with_prefix("GANTRY")
                .separator("__")
                .ignore_empty(true)
                .try_parsing(true),
        );

        let config: Self = builder.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Applies additional overrides from a file without validation.
    pub fn with_override_config(self, path: &str) -> Result<Self> {
        let config: Self = Config::builder()
            .add_source(Config::try_from(&self)?)
            .add_source(File::with_name(path).required(true))
            .build()?
            .try_deserialize()?;
        Ok(config)
    }

    /// Validates every component, consuming and returning the config so it
    /// chains after [`SyncConfig::new`].
    pub fn validate(self) -> Result<Self> {
        self.watch.validate()?;
        Ok(self)
    }
}
