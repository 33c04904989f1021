//! Configuration management for coachsync
//!
//! Defaults, a TOML file, or `COACHSYNC_<SECTION>_<KEY>` environment
//! variables. Every loader validates before returning.

use crate::logging::LogLevel;
use crate::sync::{SyncSettings, TerminalPolicy};
use chrono::FixedOffset;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

mod error;

pub use error::ConfigError;

/// Prefix of every environment variable read by [`Config::from_env`]
pub const ENV_PREFIX: &str = "COACHSYNC";

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub store: StoreConfig,
    pub sync: SyncConfig,
    pub network: NetworkConfig,
    pub logging: LoggingConfig,
}

/// Local queue storage
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub data_dir: PathBuf,
    /// SQLite file name inside `data_dir`
    pub database_file: String,
}

/// Drain behaviour
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Upper bound on one handler call
    #[serde(with = "humantime_serde")]
    pub handler_timeout: Duration,

    pub terminal_policy: TerminalPolicy,

    /// UTC offset, in minutes, used to bucket meal logs into days
    pub day_offset_minutes: i32,
}

/// Reachability probe
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// `host:port` the probe connects to
    pub probe_address: String,

    #[serde(with = "humantime_serde")]
    pub probe_interval: Duration,

    #[serde(with = "humantime_serde")]
    pub probe_timeout: Duration,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    pub json_format: bool,
    pub with_timestamp: bool,
    pub with_target: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            database_file: "queue.db".to_string(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            handler_timeout: Duration::from_secs(30),
            terminal_policy: TerminalPolicy::Quarantine,
            day_offset_minutes: 0,
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            probe_address: "1.1.1.1:443".to_string(),
            probe_interval: Duration::from_secs(15),
            probe_timeout: Duration::from_secs(3),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
            with_timestamp: true,
            with_target: true,
        }
    }
}

impl StoreConfig {
    /// Full path of the queue database
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(&self.database_file)
    }
}

impl SyncConfig {
    pub fn settings(&self) -> SyncSettings {
        SyncSettings {
            handler_timeout: self.handler_timeout,
            terminal_policy: self.terminal_policy,
        }
    }

    /// Offset used to derive meal log days
    pub fn day_offset(&self) -> Result<FixedOffset, ConfigError> {
        FixedOffset::east_opt(self.day_offset_minutes * 60).ok_or_else(|| {
            ConfigError::ValidationFailed(format!(
                "day_offset_minutes out of range: {}",
                self.day_offset_minutes
            ))
        })
    }
}

fn env_var(section: &str, key: &str) -> Option<String> {
    env::var(format!("{}_{}_{}", ENV_PREFIX, section, key)).ok()
}

fn parse_duration(name: &str, value: &str) -> Result<Duration, ConfigError> {
    humantime_serde::re::humantime::parse_duration(value)
        .map_err(|e| ConfigError::InvalidValue(format!("Invalid {}: {}", name, e)))
}

fn parse_bool(name: &str, value: &str) -> Result<bool, ConfigError> {
    value
        .parse()
        .map_err(|e| ConfigError::InvalidValue(format!("Invalid {}: {}", name, e)))
}

impl Config {
    /// Load configuration from environment variables
    ///
    /// Variables follow the pattern `COACHSYNC_<SECTION>_<KEY>`, for example
    /// `COACHSYNC_SYNC_HANDLER_TIMEOUT=10s`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file; missing keys take defaults
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::FileReadError(e.to_string()))?;

        let config: Self =
            toml::from_str(&contents).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Overlay environment variables onto this configuration
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Some(dir) = env_var("STORE", "DATA_DIR") {
            self.store.data_dir = PathBuf::from(dir);
        }
        if let Some(file) = env_var("STORE", "DATABASE_FILE") {
            self.store.database_file = file;
        }

        if let Some(timeout) = env_var("SYNC", "HANDLER_TIMEOUT") {
            self.sync.handler_timeout = parse_duration("handler timeout", &timeout)?;
        }
        if let Some(policy) = env_var("SYNC", "TERMINAL_POLICY") {
            self.sync.terminal_policy = TerminalPolicy::from_str(&policy).ok_or_else(|| {
                ConfigError::InvalidValue(format!("Invalid terminal policy: {}", policy))
            })?;
        }
        if let Some(offset) = env_var("SYNC", "DAY_OFFSET_MINUTES") {
            self.sync.day_offset_minutes = offset
                .parse()
                .map_err(|e| ConfigError::InvalidValue(format!("Invalid day offset: {}", e)))?;
        }

        if let Some(addr) = env_var("NETWORK", "PROBE_ADDRESS") {
            self.network.probe_address = addr;
        }
        if let Some(interval) = env_var("NETWORK", "PROBE_INTERVAL") {
            self.network.probe_interval = parse_duration("probe interval", &interval)?;
        }
        if let Some(timeout) = env_var("NETWORK", "PROBE_TIMEOUT") {
            self.network.probe_timeout = parse_duration("probe timeout", &timeout)?;
        }

        if let Some(level) = env_var("LOG", "LEVEL") {
            self.logging.level = level;
        }
        if let Some(json) = env_var("LOG", "JSON") {
            self.logging.json_format = parse_bool("JSON flag", &json)?;
        }

        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.store.database_file.trim().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "database_file must not be empty".to_string(),
            ));
        }

        if self.sync.handler_timeout.is_zero() {
            return Err(ConfigError::ValidationFailed(
                "handler_timeout must be greater than 0".to_string(),
            ));
        }
        self.sync.day_offset()?;

        if !self.network.probe_address.contains(':') {
            return Err(ConfigError::ValidationFailed(format!(
                "probe_address must be host:port, got '{}'",
                self.network.probe_address
            )));
        }
        if self.network.probe_interval.is_zero() || self.network.probe_timeout.is_zero() {
            return Err(ConfigError::ValidationFailed(
                "probe interval and timeout must be greater than 0".to_string(),
            ));
        }

        if LogLevel::from_str(&self.logging.level).is_none() {
            return Err(ConfigError::ValidationFailed(format!(
                "Invalid log level: {}",
                self.logging.level
            )));
        }

        Ok(())
    }

    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let contents =
            toml::to_string_pretty(self).map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(path, contents).map_err(|e| ConfigError::FileWriteError(e.to_string()))?;

        Ok(())
    }
}
