//! Configuration file for `adopet`.
//!
//! Every key is optional; a missing file means defaults.
//!
//! # Example
//!
//! ```toml
//! [lifecycle]
//! confirmation_window_secs = 172800   # 48h
//!
//! [scheduler]
//! interval_secs = 3600
//! run_on_start = true
//!
//! [store]
//! state_path = "adopet-state.json"
//!
//! [log]
//! filter = "info,adopet_service=debug"
//! json = false
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("could not read '{path}': {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("could not parse '{path}': {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Upper bound for `lifecycle.confirmation_window_secs`.
pub const MAX_CONFIRMATION_WINDOW_SECS: u64 = 10 * 365 * 24 * 60 * 60;

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AdopetConfig {
    pub lifecycle: LifecycleSettings,
    pub scheduler: SchedulerSettings,
    pub store: StoreSettings,
    pub log: LogSettings,
}

/// `[lifecycle]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LifecycleSettings {
    /// How long a self-confirmed nomination or an unconfirmed adoption
    /// waits before the scheduler advances it.
    pub confirmation_window_secs: u64,
}

impl Default for LifecycleSettings {
    fn default() -> Self {
        Self {
            confirmation_window_secs: 48 * 60 * 60,
        }
    }
}

/// `[scheduler]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SchedulerSettings {
    pub interval_secs: u64,
    /// Reconcile once as soon as `adopet run` starts.
    pub run_on_start: bool,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            interval_secs: 60 * 60,
            run_on_start: true,
        }
    }
}

/// `[store]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreSettings {
    pub state_path: PathBuf,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            state_path: PathBuf::from("adopet-state.json"),
        }
    }
}

/// `[log]` section. `RUST_LOG` overrides `filter` when set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LogSettings {
    pub filter: String,
    pub json: bool,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            json: false,
        }
    }
}

impl AdopetConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml(content: &str, origin: &Path) -> Result<Self, ConfigError> {
        let config: AdopetConfig = toml::from_str(content).map_err(|source| ConfigError::Parse {
            path: origin.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load `path`. When `required` is false a missing file yields defaults.
    pub fn load(path: &Path, required: bool) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => Self::from_toml(&content, path),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound && !required => {
                Ok(Self::default())
            }
            Err(source) => Err(ConfigError::Read {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.lifecycle.confirmation_window_secs == 0 {
            return Err(ConfigError::Invalid(
                "lifecycle.confirmation_window_secs must be greater than zero".to_string(),
            ));
        }
        if self.lifecycle.confirmation_window_secs > MAX_CONFIRMATION_WINDOW_SECS {
            return Err(ConfigError::Invalid(format!(
                "lifecycle.confirmation_window_secs must be at most {MAX_CONFIRMATION_WINDOW_SECS} (10 years)"
            )));
        }
        if self.scheduler.interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "scheduler.interval_secs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn confirmation_window(&self) -> time::Duration {
        // Range checked in `validate`.
        time::Duration::seconds(self.lifecycle.confirmation_window_secs as i64)
    }

    pub fn scheduler_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.scheduler.interval_secs)
    }

    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}
