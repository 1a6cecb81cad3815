//! Configuration management for the remediation engine.
//!
//! Handles loading configuration from TOML files and environment overrides.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Local config file name, looked up in the current directory.
pub const LOCAL_CONFIG_FILE: &str = ".remediator.toml";

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file could not be read.
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Config file is not valid TOML for this schema.
    #[error("Invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Executor settings
    pub engine: EngineConfig,

    /// Execution history settings
    pub store: StoreConfig,

    /// Logging settings
    pub logging: LoggingConfig,
}

/// Executor settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Directory holding runbook definitions
    pub runbooks_dir: PathBuf,

    /// Default dry-run mode for executions that don't specify one
    pub dry_run: bool,

    /// Step deadline when a step declares none
    pub default_timeout_seconds: u64,

    /// Upper bound on a step's `retry_count`
    pub max_retries: u32,
}

/// Execution history settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Maximum number of executions retained
    pub history_limit: usize,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive (trace, debug, info, warn, error)
    pub level: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            runbooks_dir: PathBuf::from("runbooks"),
            dry_run: false,
            default_timeout_seconds: 300,
            max_retries: 5,
        }
    }
}

impl EngineConfig {
    /// Default step deadline.
    pub fn default_timeout(&self) -> Duration {
        Duration::from_secs(self.default_timeout_seconds)
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self { history_limit: crate::runbook::DEFAULT_HISTORY_LIMIT }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "warn".to_string() }
    }
}

impl Config {
    /// Load configuration from the default location.
    ///
    /// Looks for config in:
    /// 1. `.remediator.toml` in current directory
    /// 2. `~/.config/remediator/config.toml`
    /// 3. Falls back to defaults
    ///
    /// Environment overrides are applied on top.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::load_file_or_default()?;
        config.apply_env_overrides();
        Ok(config)
    }

    fn load_file_or_default() -> Result<Self, ConfigError> {
        // Try local config first
        let local_config = PathBuf::from(LOCAL_CONFIG_FILE);
        if local_config.exists() {
            return Self::load_from_file(&local_config);
        }

        // Try global config
        if let Some(config_dir) = Self::config_dir() {
            let global_config = config_dir.join("config.toml");
            if global_config.exists() {
                return Self::load_from_file(&global_config);
            }
        }

        Ok(Self::default())
    }

    /// Load configuration from a specific file, then apply environment overrides.
    pub fn load_path(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load_from_file(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::Io { path: path.to_path_buf(), source })?;
        let config: Self = toml::from_str(&content)
            .map_err(|source| ConfigError::Parse { path: path.to_path_buf(), source })?;
        tracing::debug!(path = %path.display(), "Loaded config");
        Ok(config)
    }

    /// Apply `REMEDIATOR_*` environment overrides. Invalid values are ignored.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(dir) = std::env::var("REMEDIATOR_RUNBOOKS_DIR") {
            if !dir.trim().is_empty() {
                self.engine.runbooks_dir = PathBuf::from(dir);
            }
        }

        if let Ok(value) = std::env::var("REMEDIATOR_DRY_RUN") {
            match parse_bool(&value) {
                Some(dry_run) => self.engine.dry_run = dry_run,
                None => tracing::warn!(value, "Ignoring invalid REMEDIATOR_DRY_RUN"),
            }
        }

        if let Ok(value) = std::env::var("REMEDIATOR_HISTORY_LIMIT") {
            match value.trim().parse::<usize>() {
                Ok(limit) if limit > 0 => self.store.history_limit = limit,
                _ => tracing::warn!(value, "Ignoring invalid REMEDIATOR_HISTORY_LIMIT"),
            }
        }

        if let Ok(level) = std::env::var("REMEDIATOR_LOG_LEVEL") {
            if !level.trim().is_empty() {
                self.logging.level = level.trim().to_string();
            }
        }
    }

    /// Get the config directory path.
    pub fn config_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("remediator"))
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
