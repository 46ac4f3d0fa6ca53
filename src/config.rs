//! Driver settings
//!
//! Loaded from `<config dir>/vrbridge/driver.toml`. A missing or unreadable file never
//! stops the driver from loading: [`DriverSettings::load`] falls back to defaults and
//! logs why.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

const CONFIG_DIR_NAME: &str = "vrbridge";
const CONFIG_FILE_NAME: &str = "driver.toml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Invalid setting: {0}")]
    InvalidSetting(String),
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct DriverSettings {
    /// Upper bound on one `read_event` wait; also bounds how long shutdown waits
    pub poll_timeout_ms: u64,

    /// Interval between dispatcher throughput log lines
    pub stats_interval_secs: u64,

    /// Reason string sent with host restart requests
    pub restart_reason: String,

    /// Used by the in-process host: refuse a second HMD like a host with one attached
    pub reject_competing_hmd: bool,
}

impl Default for DriverSettings {
    fn default() -> Self {
        Self {
            poll_timeout_ms: 100,
            stats_interval_secs: 10,
            restart_reason: "vrbridge requested a runtime restart".to_string(),
            reject_competing_hmd: false,
        }
    }
}

impl DriverSettings {
    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }

    pub fn stats_interval(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.stats_interval_secs as i64)
    }

    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
    }

    /// Settings from the default location, or defaults
    pub fn load() -> Self {
        let Some(path) = Self::default_path() else {
            warn!("No config directory on this platform, using default settings");
            return Self::default();
        };

        if !path.exists() {
            info!("No settings at {}, using defaults", path.display());
            return Self::default();
        }

        match Self::load_from(&path) {
            Ok(settings) => settings,
            Err(e) => {
                warn!("Ignoring settings file: {}", e);
                Self::default()
            }
        }
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        debug!("Loading settings from {}", path.display());
        let content = fs::read_to_string(path).map_err(|source| ConfigError::ReadError {
            path: path.to_path_buf(),
            source,
        })?;
        let settings: DriverSettings =
            toml::from_str(&content).map_err(|source| ConfigError::ParseError {
                path: path.to_path_buf(),
                source,
            })?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_timeout_ms == 0 {
            return Err(ConfigError::InvalidSetting(
                "poll_timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.stats_interval_secs == 0 {
            return Err(ConfigError::InvalidSetting(
                "stats_interval_secs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
