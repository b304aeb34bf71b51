//! Configuration management for the log monitor
//!
//! TOML file support, environment variable overrides and defaults for
//! every field. A missing `[[alerts]]` list yields the default
//! `high_traffic` alert; an explicit empty list disables alerting.
//!
//! ```toml
//! [source]
//! log_file = "/tmp/access.log"
//!
//! [reporting]
//! stats_interval_secs = 10
//!
//! [[alerts]]
//! name = "high_traffic"
//! label = "host"
//! pattern = ".*"
//! window_secs = 120
//! check_interval_secs = 10
//! threshold = 10.0
//! ```

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::alerting::AlertConfig;
use crate::engine::MemoryStoreConfig;
use crate::error::ConfigError;
use crate::ingestion::{ParserConfig, TailerConfig};
use crate::monitor::MonitorConfig;
use crate::services::ServiceConfig;
use crate::types::HOST_LABEL;

/// Environment variable overriding `source.log_file`
pub const ENV_LOG_FILE: &str = "LOGMON_LOG_FILE";
/// Environment variable overriding `reporting.stats_interval_secs`
pub const ENV_STATS_INTERVAL: &str = "LOGMON_STATS_INTERVAL_SECS";

/// Main configuration structure
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Config {
    /// Log source
    #[serde(default)]
    pub source: SourceConfig,

    /// Periodic traffic summary
    #[serde(default)]
    pub reporting: ReportingConfig,

    /// In-memory store
    #[serde(default)]
    pub store: StoreConfig,

    /// Logging
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Alert definitions
    #[serde(default = "default_alerts")]
    pub alerts: Vec<AlertRuleConfig>,
}

/// Log source configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SourceConfig {
    /// File to follow
    #[serde(default = "default_log_file")]
    pub log_file: PathBuf,

    /// Poll interval at end of file, in milliseconds
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Skip content already in the file at startup
    #[serde(default)]
    pub start_at_end: bool,

    /// Longest accepted line in bytes
    #[serde(default = "default_max_line_length")]
    pub max_line_length: usize,
}

/// Reporting configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ReportingConfig {
    /// Summary interval (and window), in seconds
    #[serde(default = "default_stats_interval_secs")]
    pub stats_interval_secs: u64,
}

/// Store configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct StoreConfig {
    /// Retention behind the newest point, in seconds (0 = keep everything)
    #[serde(default = "default_retention_secs")]
    pub retention_secs: u64,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Log filter (error, warn, info, debug, trace or an EnvFilter directive)
    #[serde(default = "default_log_level")]
    pub level: String,
}

/// One `[[alerts]]` entry
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct AlertRuleConfig {
    /// Unique alert name
    pub name: String,

    /// Seconds between evaluations
    #[serde(default = "default_check_interval_secs")]
    pub check_interval_secs: u64,

    /// Trailing window length in seconds
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,

    /// Requests per second that trigger the alert
    #[serde(default = "default_threshold")]
    pub threshold: f64,

    /// Label the pattern applies to
    #[serde(default = "default_alert_label")]
    pub label: String,

    /// Regular expression over the full label value
    #[serde(default = "default_alert_pattern")]
    pub pattern: String,
}

// Default value functions
fn default_log_file() -> PathBuf { PathBuf::from("/tmp/access.log") }
fn default_poll_interval_ms() -> u64 { 250 }
fn default_max_line_length() -> usize { ParserConfig::default().max_line_length }
fn default_stats_interval_secs() -> u64 { 10 }
fn default_retention_secs() -> u64 { 3600 }
fn default_log_level() -> String { "info".to_string() }
fn default_check_interval_secs() -> u64 { 10 }
fn default_window_secs() -> u64 { 120 }
fn default_threshold() -> f64 { 10.0 }
fn default_alert_label() -> String { HOST_LABEL.to_string() }
fn default_alert_pattern() -> String { ".*".to_string() }

fn default_alerts() -> Vec<AlertRuleConfig> {
    vec![AlertRuleConfig {
        name: "high_traffic".to_string(),
        check_interval_secs: default_check_interval_secs(),
        window_secs: default_window_secs(),
        threshold: default_threshold(),
        label: default_alert_label(),
        pattern: default_alert_pattern(),
    }]
}

impl Default for Config {
    fn default() -> Self {
        Self {
            source: SourceConfig::default(),
            reporting: ReportingConfig::default(),
            store: StoreConfig::default(),
            logging: LoggingConfig::default(),
            alerts: default_alerts(),
        }
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            log_file: default_log_file(),
            poll_interval_ms: default_poll_interval_ms(),
            start_at_end: false,
            max_line_length: default_max_line_length(),
        }
    }
}

impl Default for ReportingConfig {
    fn default() -> Self {
        Self {
            stats_interval_secs: default_stats_interval_secs(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            retention_secs: default_retention_secs(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl AlertRuleConfig {
    /// Convert to the runtime alert definition
    pub fn to_alert_config(&self) -> AlertConfig {
        AlertConfig {
            name: self.name.clone(),
            check_interval: Duration::from_secs(self.check_interval_secs),
            window: Duration::from_secs(self.window_secs),
            threshold: self.threshold,
            label: self.label.clone(),
            pattern: self.pattern.clone(),
        }
    }
}

impl Config {
    /// Load configuration from TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let load_error = |message: String| ConfigError::Load {
            path: path.display().to_string(),
            message,
        };

        let contents = std::fs::read_to_string(path).map_err(|e| load_error(e.to_string()))?;
        Self::from_toml(&contents).map_err(|e| match e {
            ConfigError::Load { message, .. } => load_error(message),
            other => other,
        })
    }

    /// Parse configuration from a TOML string
    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        toml::from_str(contents).map_err(|e| ConfigError::Load {
            path: "<inline>".to_string(),
            message: e.to_string(),
        })
    }

    /// Load configuration with environment variable overrides
    pub fn from_file_with_env(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let mut config = Self::from_file(path)?;
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Defaults plus environment variable overrides
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Apply environment variable overrides
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Ok(log_file) = std::env::var(ENV_LOG_FILE) {
            self.source.log_file = PathBuf::from(log_file);
        }
        if let Ok(secs) = std::env::var(ENV_STATS_INTERVAL) {
            self.reporting.stats_interval_secs = secs.trim().parse().map_err(|_| {
                ConfigError::invalid(ENV_STATS_INTERVAL, format!("not a number: '{}'", secs))
            })?;
        }
        if let Ok(level) = std::env::var("RUST_LOG") {
            self.logging.level = level;
        }
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.source.log_file.as_os_str().is_empty() {
            return Err(ConfigError::invalid("source.log_file", "must not be empty"));
        }
        if self.source.poll_interval_ms == 0 {
            return Err(ConfigError::invalid("source.poll_interval_ms", "must be > 0"));
        }
        if self.source.max_line_length == 0 {
            return Err(ConfigError::invalid("source.max_line_length", "must be > 0"));
        }
        if self.reporting.stats_interval_secs == 0 {
            return Err(ConfigError::invalid(
                "reporting.stats_interval_secs",
                "must be > 0",
            ));
        }
        if self.logging.level.trim().is_empty() {
            return Err(ConfigError::invalid("logging.level", "must not be empty"));
        }

        let mut names = HashSet::new();
        for alert in &self.alerts {
            if !names.insert(alert.name.as_str()) {
                return Err(ConfigError::DuplicateAlert(alert.name.clone()));
            }
            alert.to_alert_config().validate()?;
        }

        Ok(())
    }

    /// Runtime configuration for the monitor
    pub fn monitor_config(&self) -> MonitorConfig {
        MonitorConfig {
            stats_interval: Duration::from_secs(self.reporting.stats_interval_secs),
            alerts: self.alerts.iter().map(AlertRuleConfig::to_alert_config).collect(),
            parser: ParserConfig {
                max_line_length: self.source.max_line_length,
            },
            services: ServiceConfig::default(),
        }
    }

    /// File tailer settings
    pub fn tailer_config(&self) -> TailerConfig {
        TailerConfig {
            poll_interval: Duration::from_millis(self.source.poll_interval_ms),
            start_at_end: self.source.start_at_end,
        }
    }

    /// Store settings
    pub fn store_config(&self) -> MemoryStoreConfig {
        MemoryStoreConfig {
            retention: (self.store.retention_secs > 0)
                .then(|| Duration::from_secs(self.store.retention_secs)),
        }
    }

    /// Serialize to TOML
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self)
            .map_err(|e| ConfigError::invalid("config", format!("failed to serialize: {}", e)))
    }

    /// Save configuration to TOML file
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        std::fs::write(path, self.to_toml()?).map_err(|e| ConfigError::Load {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    }
}
