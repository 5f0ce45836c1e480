//! Client error types.

use pulsefeed_streaming::StreamError;
use thiserror::Error;

/// Errors raised by the notification client.
#[derive(Error, Debug)]
pub enum FeedError {
    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Server answered with a non-success status
    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    /// Response body had an unexpected shape
    #[error("Malformed response: {0}")]
    MalformedBody(String),

    /// Push transport error
    #[error("Stream error: {0}")]
    Stream(#[from] StreamError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl FeedError {
    /// Check if a later attempt could succeed without any change on our side.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Http(_) | Self::Stream(_) => true,
            Self::Api { status, .. } => *status >= 500 || *status == 429 || *status == 408,
            Self::Json(_) | Self::MalformedBody(_) | Self::Config(_) => false,
        }
    }
}

/// Result type for client operations.
pub type FeedResult<T> = Result<T, FeedError>;
