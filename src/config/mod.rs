//! Configuration management for dbdump
//!
//! This module handles loading, parsing, and validating configuration:
//! - Configuration file (TOML format)
//! - Named datasources
//! - Command-line overrides (applied by the CLI layer)
//!
//! Configuration precedence (highest to lowest):
//! 1. Command-line arguments
//! 2. Configuration file
//! 3. Default values

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{ConfigError, Result};
use crate::sink::SinkFormat;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Dump run configuration
    #[serde(default)]
    pub dump: DumpConfig,

    /// Connection configuration
    #[serde(default)]
    pub connection: ConnectionConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Named connection strings
    #[serde(default)]
    pub datasources: BTreeMap<String, String>,
}

/// Dump run configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DumpConfig {
    /// Maximum records requested per fetch
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Maximum number of units exported at the same time
    #[serde(default = "default_max_concurrent_units")]
    pub max_concurrent_units: usize,

    /// Wrap the output in a gzip stream
    #[serde(default)]
    pub compress: bool,

    /// Units skipped entirely
    #[serde(default)]
    pub exclude: Vec<String>,

    /// Output encoding
    #[serde(default)]
    pub format: SinkFormat,
}

/// Connection-related configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Connection establishment timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: u64,

    /// Maximum SQL pool size
    #[serde(default = "default_max_pool_size")]
    pub max_pool_size: u32,

    /// Minimum SQL pool size
    #[serde(default)]
    pub min_pool_size: u32,

    /// Maximum lifetime of a pooled connection in seconds
    #[serde(default = "default_max_lifetime")]
    pub max_lifetime: u64,

    /// Connection idle timeout in seconds
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout: u64,

    /// Server-side time limit for one MongoDB cursor batch, in seconds
    #[serde(default = "default_cursor_max_time")]
    pub cursor_max_time: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub level: LogLevel,

    /// Enable timestamps in logs
    #[serde(default = "default_log_timestamps")]
    pub timestamps: bool,
}

/// Log level options
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

// Default value functions
fn default_batch_size() -> usize {
    5000
}

fn default_max_concurrent_units() -> usize {
    5
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_max_pool_size() -> u32 {
    50
}

fn default_max_lifetime() -> u64 {
    300
}

fn default_idle_timeout() -> u64 {
    60
}

fn default_cursor_max_time() -> u64 {
    30
}

fn default_log_level() -> LogLevel {
    LogLevel::Warn
}

fn default_log_timestamps() -> bool {
    true
}

impl Default for DumpConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            max_concurrent_units: default_max_concurrent_units(),
            compress: false,
            exclude: Vec::new(),
            format: SinkFormat::default(),
        }
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            connect_timeout: default_connect_timeout(),
            max_pool_size: default_max_pool_size(),
            min_pool_size: 0,
            max_lifetime: default_max_lifetime(),
            idle_timeout: default_idle_timeout(),
            cursor_max_time: default_cursor_max_time(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            timestamps: default_log_timestamps(),
        }
    }
}

impl Config {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from a file
    ///
    /// An explicitly given path must exist. When no path is given the default
    /// location is tried and a missing file yields the default configuration.
    ///
    /// # Arguments
    /// * `path` - Optional path to the configuration file (TOML format)
    ///
    /// # Returns
    /// * `Result<Config>` - Loaded configuration or error
    pub fn load_from_file(path: Option<&Path>) -> Result<Self> {
        let (path, required) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => (Self::default_path(), false),
        };

        if !path.exists() {
            if required {
                return Err(ConfigError::FileNotFound(path.display().to_string()).into());
            }
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path)?;
        Self::from_toml(&content)
    }

    /// Parse configuration from TOML text
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| ConfigError::InvalidFormat(e.to_string()).into())
    }

    /// Render the configuration as TOML
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::InvalidFormat(e.to_string()).into())
    }

    /// Get the default configuration file path
    ///
    /// # Returns
    /// * `PathBuf` - Path to default configuration file
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".dbdump")
            .join("config.toml")
    }

    /// Validate the configuration
    ///
    /// # Returns
    /// * `Result<()>` - Ok if valid, error otherwise
    pub fn validate(&self) -> Result<()> {
        self.dump.validate()?;

        if self.connection.connect_timeout == 0 {
            return Err(invalid("connection.connect_timeout", 0).into());
        }
        if self.connection.max_pool_size == 0 {
            return Err(invalid("connection.max_pool_size", 0).into());
        }
        if self.connection.min_pool_size > self.connection.max_pool_size {
            return Err(invalid("connection.min_pool_size", self.connection.min_pool_size).into());
        }

        Ok(())
    }

    /// Look up a named datasource
    pub fn datasource(&self, name: &str) -> Option<&str> {
        self.datasources.get(name).map(String::as_str)
    }
}

impl DumpConfig {
    /// Validate run settings
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(invalid("dump.batch_size", 0).into());
        }
        if self.max_concurrent_units == 0 {
            return Err(invalid("dump.max_concurrent_units", 0).into());
        }
        Ok(())
    }
}

impl ConnectionConfig {
    /// Get connection timeout as Duration
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout)
    }

    /// Get max connection lifetime as Duration
    pub fn max_lifetime(&self) -> Duration {
        Duration::from_secs(self.max_lifetime)
    }

    /// Get idle timeout as Duration
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout)
    }

    /// Get the MongoDB cursor max time as Duration
    pub fn cursor_max_time(&self) -> Duration {
        Duration::from_secs(self.cursor_max_time)
    }
}

impl LogLevel {
    /// Convert to tracing::Level
    pub fn to_tracing_level(&self) -> tracing::Level {
        match self {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}

fn invalid(field: &str, value: impl ToString) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.dump.batch_size, 5000);
        assert_eq!(config.dump.max_concurrent_units, 5);
        assert!(!config.dump.compress);
        assert_eq!(config.connection.connect_timeout(), Duration::from_secs(10));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = Config::from_toml(
            r#"
            [dump]
            batch_size = 100
            exclude = ["audit_log"]

            [datasources]
            local = "postgres://localhost/app"
            "#,
        )
        .unwrap();

        assert_eq!(config.dump.batch_size, 100);
        assert_eq!(config.dump.max_concurrent_units, 5);
        assert_eq!(config.dump.exclude, vec!["audit_log".to_string()]);
        assert_eq!(config.datasource("local"), Some("postgres://localhost/app"));
        assert_eq!(config.connection.max_pool_size, 50);
        assert_eq!(config.logging.level, LogLevel::Warn);
    }

    #[test]
    fn test_validate_rejects_zero_concurrency() {
        let mut config = Config::default();
        config.dump.max_concurrent_units = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_batch_size() {
        let mut config = Config::default();
        config.dump.batch_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_inverted_pool_bounds() {
        let mut config = Config::default();
        config.connection.min_pool_size = 60;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_toml() {
        assert!(Config::from_toml("[dump\nbatch_size = ").is_err());
    }

    #[test]
    fn test_missing_explicit_file() {
        let result = Config::load_from_file(Some(Path::new("/nonexistent/dbdump.toml")));
        assert!(matches!(
            result,
            Err(crate::error::DumpError::Config(ConfigError::FileNotFound(_)))
        ));
    }

    #[test]
    fn test_toml_roundtrip_of_defaults() {
        let text = Config::default().to_toml().unwrap();
        let parsed = Config::from_toml(&text).unwrap();
        assert_eq!(parsed.dump.batch_size, 5000);
    }
}
