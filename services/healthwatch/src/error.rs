//! Error types for the healthwatch service

use std::time::Duration;

/// Errors that can occur in the healthwatch service
#[derive(Debug, thiserror::Error)]
pub enum HealthwatchError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Notifier error: {0}")]
    Notifier(String),

    #[error("API server error: {0}")]
    Api(String),
}

/// Result type alias for healthwatch operations
pub type Result<T> = std::result::Result<T, HealthwatchError>;
