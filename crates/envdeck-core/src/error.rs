//! Core error types for envdeck-core.
//!
//! Source adapters and the brightness controller catch these at their own
//! boundary; only the CLI host and the one-shot fetch paths see them.

use std::path::PathBuf;
use thiserror::Error;

/// Core error type for envdeck-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Weather source errors (transport, credentials, payload)
    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    /// Light sensor or backlight errors
    #[error("Sensor error: {0}")]
    Sensor(#[from] SensorError),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors raised while talking to an external weather source.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SourceError {
    /// Connection failure, timeout or unreadable body
    #[error("Network error: {0}")]
    Network(String),

    /// Non-success HTTP status
    #[error("HTTP {status} from {url}")]
    Http { status: u16, url: String },

    /// Rejected credentials or expired refresh token
    #[error("Authentication rejected: {0}")]
    Auth(String),

    /// Missing or malformed field in the payload
    #[error("Failed to parse payload: {0}")]
    Parse(String),

    /// The credentialed source has no valid access token yet
    #[error("Not authenticated with {service}")]
    NotAuthenticated { service: String },
}

/// Errors raised by the brightness feedback loop.
#[derive(Error, Debug)]
pub enum SensorError {
    /// Bus communication failure
    #[error("Sensor bus error: {0}")]
    Bus(String),

    /// Backlight sink could not be written
    #[error("Failed to write brightness to {path}: {source}")]
    Sink {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to save configuration
    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Missing required configuration key
    #[error("Missing required configuration key: {0}")]
    MissingKey(String),

    /// Failed to parse configuration
    #[error("Failed to parse configuration: {0}")]
    ParseFailed(String),
}

impl From<serde_json::Error> for SourceError {
    fn from(err: serde_json::Error) -> Self {
        SourceError::Parse(err.to_string())
    }
}

impl SourceError {
    /// The provider rejected the credentials or the access token.
    pub fn is_auth(&self) -> bool {
        matches!(self, SourceError::Auth(_))
    }
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;
