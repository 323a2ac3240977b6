//! Error types for logkeep

use std::path::PathBuf;

/// logkeep error type
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Workload not found: {0}")]
    WorkloadNotFound(String),

    #[error("Invalid workload identity: {0}")]
    InvalidWorkload(String),

    #[error("Invalid timestamp '{value}': {reason}")]
    InvalidTimestamp { value: String, reason: String },

    #[error("Invalid range: start {start} is after end {end}")]
    InvalidRange { start: String, end: String },

    #[error("Runtime error: {0}")]
    RuntimeError(String),

    #[error("Log stream error: {0}")]
    StreamError(String),

    #[error("Config error: {0}")]
    ConfigError(String),

    #[error("Config file not found: {0}")]
    ConfigNotFound(PathBuf),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("YAML parse error: {0}")]
    YamlError(#[from] serde_yaml::Error),
}

/// Result type alias for logkeep
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Error::ConfigError(msg.into())
    }

    pub fn runtime<S: Into<String>>(msg: S) -> Self {
        Error::RuntimeError(msg.into())
    }

    pub fn stream<S: Into<String>>(msg: S) -> Self {
        Error::StreamError(msg.into())
    }

    pub fn timestamp<V: Into<String>, R: ToString>(value: V, reason: R) -> Self {
        Error::InvalidTimestamp {
            value: value.into(),
            reason: reason.to_string(),
        }
    }

    /// Whether the error was caused by the caller's input rather than the archive
    pub fn is_bad_request(&self) -> bool {
        matches!(
            self,
            Error::InvalidWorkload(_) | Error::InvalidTimestamp { .. } | Error::InvalidRange { .. }
        )
    }
}
