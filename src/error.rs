//! Error types for filemetrics
//!
//! Everything here is a startup failure. Request handling never produces an
//! `AppError`: handlers express failures only through the status code they write.

use thiserror::Error;

/// Main error type for the application
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to read config file {path}: {source}")]
    ConfigFileRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse TOML config {path}: {source}")]
    ConfigParseFailed {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid configuration in {path}: {reason}")]
    ConfigValidationFailed { path: String, reason: String },

    #[error("Failed to register metrics: {0}")]
    MetricsRegistration(#[from] prometheus::Error),

    #[error("Invalid route template '{template}': {reason}")]
    InvalidRoute { template: String, reason: String },

    #[error("File root {path} is not usable: {source}")]
    FileRoot {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Server error: {0}")]
    Server(#[source] std::io::Error),
}

/// Convenience type alias for Results
pub type AppResult<T> = Result<T, AppError>;
