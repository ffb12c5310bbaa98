//! Error types for the parley control layer.

/// Top-level error type for sessions and backends.
#[derive(Debug, thiserror::Error)]
pub enum ParleyError {
    /// Completion or punctuation backend failure (request, HTTP status, payload).
    #[error("backend error: {0}")]
    Backend(String),

    /// Reply stream broke mid-flight.
    #[error("stream error: {0}")]
    Stream(String),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// Channel send/receive error.
    #[error("channel error: {0}")]
    Channel(String),

    /// JSON encode/decode error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, ParleyError>;
