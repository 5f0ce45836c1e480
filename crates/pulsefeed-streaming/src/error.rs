//! Streaming error types.

use std::time::Duration;

/// Errors raised while opening or reading an event stream.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    /// The stream could not be set up (bad URL, bad header, client build failure).
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Server answered with a non-success status.
    #[error("HTTP error: {status} - {message}")]
    HttpError {
        /// HTTP status code.
        status: u16,
        /// Response body or reason phrase.
        message: String,
    },

    /// Server answered, but not with `text/event-stream`.
    #[error("Unexpected content type: {0}")]
    UnexpectedContentType(String),

    /// Response headers did not arrive in time.
    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    /// A single frame grew past the configured limit.
    #[error("Buffer overflow: {size} bytes exceeds limit of {limit}")]
    BufferOverflow {
        /// Current size.
        size: usize,
        /// Maximum allowed size.
        limit: usize,
    },

    /// HTTP client error.
    #[error("HTTP client error: {0}")]
    ReqwestError(#[from] reqwest::Error),
}

/// Result type for streaming operations.
pub type StreamResult<T> = Result<T, StreamError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_failed_display() {
        let e = StreamError::ConnectionFailed("relative URL without a base".into());
        assert_eq!(
            e.to_string(),
            "Connection failed: relative URL without a base"
        );
    }

    #[test]
    fn http_error_display() {
        let e = StreamError::HttpError {
            status: 401,
            message: "Unauthorized".into(),
        };
        assert_eq!(e.to_string(), "HTTP error: 401 - Unauthorized");
    }

    #[test]
    fn content_type_display() {
        let e = StreamError::UnexpectedContentType("text/html".into());
        assert_eq!(e.to_string(), "Unexpected content type: text/html");
    }

    #[test]
    fn timeout_display() {
        let e = StreamError::Timeout(Duration::from_secs(10));
        assert_eq!(e.to_string(), "Timeout after 10s");
    }

    #[test]
    fn buffer_overflow_display() {
        let e = StreamError::BufferOverflow {
            size: 2048,
            limit: 1024,
        };
        assert_eq!(
            e.to_string(),
            "Buffer overflow: 2048 bytes exceeds limit of 1024"
        );
    }
}
