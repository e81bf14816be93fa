//! Combined configuration: storage, idle scheduler and logging

use crate::error::{LatticeError, LatticeResult};
use lattice_history::HistoryConfig;
use lattice_idle::IdleConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const ENV_DATA_DIR: &str = "LATTICE_DATA_DIR";
pub const ENV_LOG_LEVEL: &str = "LATTICE_LOG_LEVEL";
pub const ENV_IDLE_CHECK_INTERVAL: &str = "LATTICE_IDLE_CHECK_INTERVAL";

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level or filter directive (trace, debug, info, warn, error)
    pub level: String,
    /// Log format (pretty, compact, json)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl LoggingConfig {
    /// Merge with another logging config; empty fields do not override
    pub fn merge(&mut self, other: LoggingConfig) {
        if !other.level.is_empty() {
            self.level = other.level;
        }
        if !other.format.is_empty() {
            self.format = other.format;
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LatticeConfig {
    pub history: HistoryConfig,
    pub idle: IdleConfig,
    pub logging: LoggingConfig,
}

impl LatticeConfig {
    /// Load configuration from a file
    ///
    /// TOML for `.toml`, JSON otherwise. Returns the defaults if the file
    /// doesn't exist.
    pub fn load_from_file(path: &Path) -> LatticeResult<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).map_err(|e| {
            LatticeError::config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;

        let config: Self = match path.extension().and_then(|s| s.to_str()) {
            Some("toml") => toml::from_str(&content).map_err(|e| {
                LatticeError::config(format!(
                    "Failed to parse TOML config '{}': {}",
                    path.display(),
                    e
                ))
            })?,
            _ => serde_json::from_str(&content).map_err(|e| {
                LatticeError::config(format!(
                    "Failed to parse JSON config '{}': {}",
                    path.display(),
                    e
                ))
            })?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Apply `LATTICE_*` environment variables on top of this config
    pub fn apply_env_overrides(&mut self) -> LatticeResult<()> {
        self.apply_env_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides read through `lookup`
    pub fn apply_env_overrides_from<F>(&mut self, lookup: F) -> LatticeResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(data_dir) = lookup(ENV_DATA_DIR) {
            self.history.data_dir = PathBuf::from(data_dir);
        }

        if let Some(level) = lookup(ENV_LOG_LEVEL) {
            self.logging.level = level;
        }

        if let Some(interval) = lookup(ENV_IDLE_CHECK_INTERVAL) {
            self.idle.check_interval = humantime::parse_duration(interval.trim()).map_err(|e| {
                LatticeError::config(format!(
                    "Invalid {} value '{}': {}",
                    ENV_IDLE_CHECK_INTERVAL, interval, e
                ))
            })?;
        }

        self.validate()
    }

    pub fn validate(&self) -> LatticeResult<()> {
        self.history.validate()?;
        self.idle.validate()?;
        Ok(())
    }
}
