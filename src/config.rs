//! Configuration management for filemetrics
//!
//! Parses TOML configuration files and provides typed access to settings.
//! Every section is optional; a missing file section falls back to defaults.

use crate::error::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Log levels accepted by `observability.log_level`
const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub files: FilesConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    9000
}

/// File serving configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct FilesConfig {
    /// Directory served to clients
    #[serde(default = "default_root")]
    pub root: PathBuf,
    /// Route prefix the files are mounted under; also their metrics label
    #[serde(default = "default_mount")]
    pub mount: String,
}

impl Default for FilesConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            mount: default_mount(),
        }
    }
}

fn default_root() -> PathBuf {
    PathBuf::from(".")
}

fn default_mount() -> String {
    "/".to_string()
}

/// Metrics exposition configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct MetricsConfig {
    /// Path the Prometheus text exposition is served on
    #[serde(default = "default_metrics_path")]
    pub path: String,
    /// Upper bounds of the `response_duration_seconds` buckets
    #[serde(default = "default_buckets")]
    pub buckets: Vec<f64>,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            path: default_metrics_path(),
            buckets: default_buckets(),
        }
    }
}

fn default_metrics_path() -> String {
    "/metrics".to_string()
}

fn default_buckets() -> Vec<f64> {
    prometheus::DEFAULT_BUCKETS.to_vec()
}

/// Observability configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ObservabilityConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        let path_display = path.as_ref().display().to_string();

        let content =
            std::fs::read_to_string(path.as_ref()).map_err(|source| AppError::ConfigFileRead {
                path: path_display.clone(),
                source,
            })?;

        let config: Self = toml::from_str(&content).map_err(|source| {
            AppError::ConfigParseFailed {
                path: path_display.clone(),
                source,
            }
        })?;

        config
            .validate()
            .map_err(|e| AppError::ConfigValidationFailed {
                path: path_display,
                reason: e.to_string(),
            })?;

        Ok(config)
    }

    /// Validate configuration after parsing
    ///
    /// Called by `from_file()` and `from_str()`; call it explicitly after
    /// building or modifying a `Config` in code.
    pub fn validate(&self) -> AppResult<()> {
        if !self.metrics.path.starts_with('/') || self.metrics.path.ends_with('/') {
            return Err(AppError::Config(format!(
                "metrics.path must start with '/' and must not end with '/', got '{}'",
                self.metrics.path
            )));
        }

        if !self.files.mount.starts_with('/') || !self.files.mount.ends_with('/') {
            return Err(AppError::Config(format!(
                "files.mount must start and end with '/', got '{}'",
                self.files.mount
            )));
        }

        if self.metrics.buckets.is_empty() {
            return Err(AppError::Config(
                "metrics.buckets must contain at least one bucket".to_string(),
            ));
        }
        if let Some(bad) = self.metrics.buckets.iter().find(|b| !b.is_finite()) {
            return Err(AppError::Config(format!(
                "metrics.buckets must be finite numbers, got {}",
                bad
            )));
        }
        if self.metrics.buckets.windows(2).any(|pair| pair[0] >= pair[1]) {
            return Err(AppError::Config(format!(
                "metrics.buckets must be strictly increasing, got {:?}",
                self.metrics.buckets
            )));
        }

        if !LOG_LEVELS.contains(&self.observability.log_level.as_str()) {
            return Err(AppError::Config(format!(
                "observability.log_level must be one of {:?}, got '{}'",
                LOG_LEVELS, self.observability.log_level
            )));
        }

        Ok(())
    }
}

impl FromStr for Config {
    type Err = AppError;

    fn from_str(toml_str: &str) -> Result<Self, Self::Err> {
        let config: Config =
            toml::from_str(toml_str).map_err(|source| AppError::ConfigParseFailed {
                path: "<string>".to_string(),
                source,
            })?;

        config.validate()?;
        Ok(config)
    }
}
