//! Error types for the warden server

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for server operations
pub type Result<T> = std::result::Result<T, ServerError>;

/// Server error types
#[derive(Error, Debug)]
pub enum ServerError {
    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: PathBuf },

    /// Configuration file read error
    #[error("Failed to read configuration file {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Configuration parse error
    #[error("Failed to parse configuration file {path}: {message}")]
    ConfigParse { path: PathBuf, message: String },

    /// Invalid configuration value
    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    /// Environment or merged configuration rejected
    #[error("Configuration error: {0}")]
    Config(#[from] warden::ConfigError),

    /// Logging could not be initialized
    #[error(transparent)]
    Observability(#[from] warden::observability::ObservabilityError),

    /// Listener could not be bound
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// Storage backend could not be prepared
    #[error("Storage error: {0}")]
    Store(#[from] warden::StoreError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ServerError {
    /// Create an invalid value error
    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            message: message.into(),
        }
    }
}
