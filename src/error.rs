//! # Error Types
//!
//! Custom error types for Fix Relay using `thiserror`.

use thiserror::Error;

/// Main error type for Fix Relay
#[derive(Debug, Error)]
pub enum RelayError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP transport-level errors (connect, TLS, body)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Collector answered with a non-2xx status
    #[error("Collector rejected fix with HTTP status {0}")]
    HttpStatus(u16),

    /// JSON encoding or decoding errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Malformed collector host or port
    #[error("Invalid collector address: {0}")]
    InvalidAddress(String),

    /// Stream send attempted without a usable connection
    #[error("Stream transport is not connected")]
    NotConnected,

    /// A connect, write or request deadline elapsed
    #[error("Timed out during {0}")]
    Timeout(&'static str),

    /// Device identifier could not be read
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Non-blocking enqueue on a full queue
    #[error("Event queue is full")]
    QueueFull,

    /// Queue has been torn down
    #[error("Event queue is closed")]
    QueueClosed,

    /// Binary record errors
    #[error("Record codec error: {0}")]
    Codec(String),
}

impl RelayError {
    /// Whether a connect attempt failing with this error should be retried.
    ///
    /// Only a malformed target address is fatal; every other failure is
    /// treated as transient.
    pub fn is_fatal(&self) -> bool {
        matches!(self, RelayError::InvalidAddress(_))
    }
}

/// Result type alias for Fix Relay
pub type Result<T> = std::result::Result<T, RelayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_invalid_address_is_fatal() {
        assert!(RelayError::InvalidAddress("port 0".to_string()).is_fatal());
        assert!(!RelayError::NotConnected.is_fatal());
        assert!(!RelayError::Timeout("connect").is_fatal());
        assert!(!RelayError::HttpStatus(503).is_fatal());
        assert!(!RelayError::Io(std::io::Error::from(std::io::ErrorKind::ConnectionRefused)).is_fatal());
    }

    #[test]
    fn test_error_messages() {
        assert_eq!(
            RelayError::HttpStatus(500).to_string(),
            "Collector rejected fix with HTTP status 500"
        );
        assert_eq!(RelayError::Timeout("write").to_string(), "Timed out during write");
    }
}
