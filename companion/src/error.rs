//! Error types for the Cadwatch Companion.

use thiserror::Error;

use crate::config::ConfigError;
use crate::watcher::WatcherError;

/// Errors that can occur during companion operations.
///
/// This is the umbrella error type for the crate. Most runtime failures
/// are degraded and logged rather than propagated (a file that cannot be
/// watched simply stays unmonitored); this type covers the paths that do
/// surface to callers, chiefly startup.
#[derive(Error, Debug)]
pub enum MonitorError {
    /// Configuration-related error.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// File system I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing or serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// File watching error.
    #[error("file watch error: {0}")]
    Watch(#[from] WatcherError),

    /// HTTP client error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Failed to subscribe to the document event source.
    #[error("event source error: {0}")]
    EventSource(String),
}

/// A specialized `Result` type for companion operations.
pub type Result<T> = std::result::Result<T, MonitorError>;
