//! Error types for configuration loading.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while resolving or loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Filesystem error on a configuration path.
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Settings file is not valid YAML for the settings schema.
    #[error("failed to parse {path}: {message}")]
    Parse { path: PathBuf, message: String },

    /// An environment override holds an unusable value.
    #[error("invalid value for {key}: {value}")]
    InvalidOverride { key: String, value: String },

    /// Settings are internally inconsistent.
    #[error("invalid settings: {0}")]
    Invalid(String),
}

/// Result type for configuration operations.
pub type Result<T> = std::result::Result<T, ConfigError>;
