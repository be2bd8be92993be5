//! Configuration management for mongo-scroll-extract
//!
//! This module handles loading, parsing, and validating run configuration:
//! - Configuration files (TOML format)
//! - Command-line arguments (applied on top by the CLI layer)
//!
//! Configuration precedence (highest to lowest):
//! 1. Command-line arguments
//! 2. Configuration file
//! 3. Default values

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{ConfigError, Result};
use crate::extract::ExtractionFilter;

/// Largest accepted cursor page size
pub const MAX_PAGE_SIZE: u32 = 100_000;

/// Largest accepted decode worker pool
pub const MAX_WORKER_COUNT: usize = 1_024;

/// Largest accepted pipeline channel capacity
pub const MAX_CHANNEL_CAPACITY: usize = 1_000_000;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Connection configuration
    #[serde(default)]
    pub connection: ConnectionConfig,

    /// Extraction pipeline configuration
    #[serde(default)]
    pub extraction: ExtractionConfig,

    /// Output artifact configuration
    #[serde(default)]
    pub output: OutputConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Connection-related configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// MongoDB connection URI
    #[serde(default = "default_uri")]
    pub uri: String,

    /// Database holding the collection to extract
    #[serde(default)]
    pub database: Option<String>,

    /// Collection to extract from
    #[serde(default)]
    pub collection: Option<String>,

    /// Connection and server selection timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// Application name reported to the server
    #[serde(default = "default_app_name")]
    pub app_name: String,
}

/// Pipeline tuning and the record filter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionConfig {
    /// Field the equality filter applies to
    #[serde(default = "default_filter_field")]
    pub filter_field: String,

    /// Value the filter field must equal
    #[serde(default)]
    pub filter_value: Option<String>,

    /// Documents requested per cursor page
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// Number of concurrent decode workers
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,

    /// Capacity of the record and result channels (defaults to page size)
    #[serde(default)]
    pub channel_capacity: Option<usize>,
}

/// Output artifact configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Path of the JSON artifact
    #[serde(default = "default_output_path")]
    pub path: PathBuf,

    /// Pretty-print the JSON artifact
    #[serde(default)]
    pub pretty: bool,

    /// Show a progress bar on stderr
    #[serde(default = "default_progress")]
    pub progress: bool,
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
fn default_uri() -> String {
    "mongodb://localhost:27017".to_string()
}

fn default_timeout() -> u64 {
    30
}

fn default_app_name() -> String {
    env!("CARGO_PKG_NAME").to_string()
}

fn default_filter_field() -> String {
    "code".to_string()
}

fn default_page_size() -> u32 {
    100
}

fn default_worker_count() -> usize {
    10
}

fn default_output_path() -> PathBuf {
    PathBuf::from("data.json")
}

fn default_progress() -> bool {
    true
}

fn default_log_level() -> LogLevel {
    LogLevel::Warn
}

fn default_log_timestamps() -> bool {
    true
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            uri: default_uri(),
            database: None,
            collection: None,
            timeout: default_timeout(),
            app_name: default_app_name(),
        }
    }
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            filter_field: default_filter_field(),
            filter_value: None,
            page_size: default_page_size(),
            worker_count: default_worker_count(),
            channel_capacity: None,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            path: default_output_path(),
            pretty: false,
            progress: default_progress(),
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
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::FileNotFound(path.display().to_string())
            } else {
                ConfigError::InvalidFormat(format!("{}: {e}", path.display()))
            }
        })?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| ConfigError::InvalidFormat(e.to_string()).into())
    }

    /// Load configuration from an explicit path, or from the default
    /// location when it exists, or fall back to defaults.
    ///
    /// An explicit path that does not exist is an error; a missing default
    /// file is not.
    pub fn load_from_file(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::from_file(p),
            None => {
                let default_path = Self::default_path();
                if default_path.exists() {
                    Self::from_file(default_path)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    /// Get the default configuration file path
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".mongo-scroll-extract")
            .join("config.toml")
    }

    /// Render the effective configuration as TOML
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::InvalidFormat(e.to_string()).into())
    }

    /// Validate the configuration
    ///
    /// A configuration is runnable only when the database, collection and
    /// filter value are known and every size is non-zero.
    pub fn validate(&self) -> Result<()> {
        if self.connection.uri.trim().is_empty() {
            return Err(ConfigError::MissingField("connection.uri".to_string()).into());
        }
        require(&self.connection.database, "connection.database")?;
        require(&self.connection.collection, "connection.collection")?;

        let extraction = &self.extraction;
        if extraction.filter_field.trim().is_empty() {
            return Err(ConfigError::MissingField("extraction.filter_field".to_string()).into());
        }
        if extraction.filter_value.is_none() {
            return Err(ConfigError::MissingField("extraction.filter_value".to_string()).into());
        }
        if extraction.page_size == 0 || extraction.page_size > MAX_PAGE_SIZE {
            return Err(invalid("extraction.page_size", extraction.page_size));
        }
        if extraction.worker_count == 0 || extraction.worker_count > MAX_WORKER_COUNT {
            return Err(invalid("extraction.worker_count", extraction.worker_count));
        }
        if let Some(capacity) = extraction.channel_capacity {
            if capacity == 0 || capacity > MAX_CHANNEL_CAPACITY {
                return Err(invalid("extraction.channel_capacity", capacity));
            }
        }
        if self.connection.timeout == 0 {
            return Err(invalid("connection.timeout", 0));
        }

        Ok(())
    }

    /// Build the record filter; requires a validated configuration
    pub fn filter(&self) -> Result<ExtractionFilter> {
        let value = self
            .extraction
            .filter_value
            .clone()
            .ok_or_else(|| ConfigError::MissingField("extraction.filter_value".to_string()))?;
        Ok(ExtractionFilter::new(
            self.extraction.filter_field.clone(),
            value,
        ))
    }

}

impl ConnectionConfig {
    /// Connection and server selection timeout as a Duration
    pub fn timeout_duration(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }
}

impl ExtractionConfig {
    /// Capacity used for both pipeline channels
    pub fn effective_channel_capacity(&self) -> usize {
        self.channel_capacity
            .unwrap_or(self.page_size as usize)
            .max(1)
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

fn require(value: &Option<String>, field: &str) -> Result<()> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(()),
        _ => Err(ConfigError::MissingField(field.to_string()).into()),
    }
}

fn invalid(field: &str, value: impl ToString) -> crate::error::ExtractError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
    }
    .into()
}
