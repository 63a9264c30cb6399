//! Autoscaler configuration.
//!
//! The configuration is read once from a YAML file at startup, validated, and
//! then handed by reference to the scaling loop and the probe server. Nothing
//! mutates it afterwards; picking up changes requires a restart.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

use crate::task::ScalingTasks;

/// Name prefix of the task that fetches the target's status.
pub const STATUS_TASK_PREFIX: &str = "auto_scaler_get_status";

/// Name prefix of the task that submits a new replica count.
pub const UPDATE_TASK_PREFIX: &str = "auto_scaler_update_replicas";

const DEFAULT_PROBE_PORT: u16 = 8080;
const DEFAULT_ALERT_AFTER_INVALID_CYCLES: u32 = 5;

/// Configuration errors. All of them are fatal at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The config file is not valid YAML or is missing required keys.
    #[error("invalid config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("base_url must not be empty")]
    EmptyBaseUrl,

    #[error("invalid cpu_threshold {0}: must be in (0, 1]")]
    CpuThreshold(f64),

    #[error("scale steps must be >= 1 (scale_up_step={up}, scale_down_step={down})")]
    ScaleStep { up: u32, down: u32 },

    #[error("invalid poll_interval {0}: must be a positive number of seconds")]
    PollInterval(f64),

    #[error("invalid logging.level {0:?}")]
    LogLevel(String),

    #[error("logging.retention_days must be >= 1")]
    LogRetention,

    /// No task name equals or starts with the prefix.
    #[error("task with prefix {0} not found in config")]
    TaskNotFound(String),

    #[error("task {task}: invalid HTTP method {method:?}")]
    InvalidMethod { task: String, method: String },

    #[error("task {task}: invalid header {name:?}")]
    InvalidHeader { task: String, name: String },
}

/// Autoscaler configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Base URL of the scaled service's API (example: http://localhost:9000).
    pub base_url: String,

    /// Target high-priority CPU utilization, a fraction in (0, 1].
    pub cpu_threshold: f64,

    /// Replicas added when utilization is above the threshold.
    pub scale_up_step: u32,

    /// Replicas removed when utilization is below the threshold.
    pub scale_down_step: u32,

    /// Seconds between poll cycles. Fractional values are allowed.
    pub poll_interval: f64,

    /// Port of the liveness/readiness probe server.
    #[serde(default = "default_probe_port")]
    pub probe_port: u16,

    /// Consecutive invalid status payloads before an error is raised in the
    /// logs. Zero disables the alert.
    #[serde(default = "default_alert_after_invalid_cycles")]
    pub alert_after_invalid_cycles: u32,

    #[serde(default)]
    pub logging: LoggingConfig,

    /// Request templates, looked up by name prefix.
    #[serde(default)]
    pub tasks: Vec<TaskDefinition>,
}

/// Logging settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error). `RUST_LOG` takes precedence.
    pub level: String,

    pub format: LogFormat,

    /// Directory for the daily-rotated log files.
    pub directory: PathBuf,

    /// Number of log files kept, the current one included.
    pub retention_days: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::default(),
            directory: PathBuf::from("logs"),
            retention_days: 3,
        }
    }
}

impl LoggingConfig {
    /// Parse the configured level. Accepts the usual aliases (`WARNING`,
    /// `CRITICAL`) in any case.
    pub fn level_filter(&self) -> Option<LevelFilter> {
        match self.level.trim().to_ascii_lowercase().as_str() {
            "trace" => Some(LevelFilter::TRACE),
            "debug" => Some(LevelFilter::DEBUG),
            "info" => Some(LevelFilter::INFO),
            "warn" | "warning" => Some(LevelFilter::WARN),
            "error" | "critical" | "fatal" => Some(LevelFilter::ERROR),
            "off" => Some(LevelFilter::OFF),
            _ => None,
        }
    }
}

/// Log line format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Compact,
    Json,
}

/// A named HTTP request template.
#[derive(Debug, Clone, Deserialize)]
pub struct TaskDefinition {
    pub name: String,
    pub request: RequestTemplate,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RequestTemplate {
    pub method: String,

    /// Path appended to `base_url`.
    pub endpoint: String,

    /// Static headers sent with every request.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

fn default_probe_port() -> u16 {
    DEFAULT_PROBE_PORT
}

fn default_alert_after_invalid_cycles() -> u32 {
    DEFAULT_ALERT_AFTER_INVALID_CYCLES
}

impl Config {
    /// Read, parse and validate a config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&raw)
    }

    /// Parse and validate a config document.
    pub fn from_yaml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_yaml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Check every invariant the scaling loop relies on, including that both
    /// required tasks are present and resolvable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.base_url.trim().is_empty() {
            return Err(ConfigError::EmptyBaseUrl);
        }

        if !(self.cpu_threshold > 0.0 && self.cpu_threshold <= 1.0) {
            return Err(ConfigError::CpuThreshold(self.cpu_threshold));
        }

        if self.scale_up_step < 1 || self.scale_down_step < 1 {
            return Err(ConfigError::ScaleStep {
                up: self.scale_up_step,
                down: self.scale_down_step,
            });
        }

        if poll_duration(self.poll_interval).is_none() {
            return Err(ConfigError::PollInterval(self.poll_interval));
        }

        if self.logging.level_filter().is_none() {
            return Err(ConfigError::LogLevel(self.logging.level.clone()));
        }

        if self.logging.retention_days < 1 {
            return Err(ConfigError::LogRetention);
        }

        ScalingTasks::resolve(self)?;

        Ok(())
    }

    /// Return the first task whose name equals or starts with `prefix`.
    pub fn find_task(&self, prefix: &str) -> Result<&TaskDefinition, ConfigError> {
        self.tasks
            .iter()
            .find(|task| task.name.starts_with(prefix))
            .ok_or_else(|| ConfigError::TaskNotFound(prefix.to_string()))
    }

    /// The poll interval as a `Duration`.
    ///
    /// Only meaningful on a validated config; an out-of-range value falls back
    /// to one second.
    pub fn poll_interval(&self) -> Duration {
        poll_duration(self.poll_interval).unwrap_or(Duration::from_secs(1))
    }
}

fn poll_duration(secs: f64) -> Option<Duration> {
    Duration::try_from_secs_f64(secs)
        .ok()
        .filter(|interval| !interval.is_zero())
}
