//! Error types for the event-stream reader

use thiserror::Error;

/// Result type alias for reader construction and configuration
pub type Result<T> = std::result::Result<T, ReaderError>;

/// Errors raised synchronously while building a reader or loading its config
#[derive(Error, Debug)]
pub enum ReaderError {
    /// A required argument was missing or empty
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Configuration values are out of range
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Connecting requires a tokio runtime on the current thread
    #[error("No tokio runtime available to drive the connection")]
    NoRuntime,

    /// Default HTTP client could not be built
    #[error("Failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// YAML config could not be parsed
    #[error("Failed to parse YAML config: {0}")]
    YamlError(#[from] serde_yaml::Error),

    /// TOML config could not be parsed
    #[error("Failed to parse TOML config: {0}")]
    TomlError(#[from] toml::de::Error),
}

impl ReaderError {
    /// Create an invalid-argument error
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }
}

/// Failure of a single connection attempt
///
/// This is the payload of `error` events. Cancellation is represented so the
/// transport can report it, but the connection manager never surfaces it.
#[derive(Error, Debug)]
pub enum TransportError {
    /// HTTP/connection error
    #[error("Connection error: {0}")]
    Http(#[from] reqwest::Error),

    /// Server answered with a non-success status
    #[error("Server error ({status}): {message}")]
    Server { status: u16, message: String },

    /// Response body was not valid text
    #[error("Decode error: {0}")]
    Decode(String),

    /// The request was cancelled through its cancellation handle
    #[error("Request canceled")]
    Canceled,

    /// Any other transport-specific failure
    #[error("{0}")]
    Other(String),
}

impl TransportError {
    /// Create a server error from status code and message
    pub fn server_error(status: u16, message: impl Into<String>) -> Self {
        Self::Server {
            status,
            message: message.into(),
        }
    }

    /// Whether this failure was caused by deliberate cancellation
    pub fn is_canceled(&self) -> bool {
        matches!(self, Self::Canceled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canceled_is_distinguishable() {
        assert!(TransportError::Canceled.is_canceled());
        assert!(!TransportError::server_error(500, "boom").is_canceled());
        assert!(!TransportError::Other("reset".into()).is_canceled());
    }

    #[test]
    fn test_server_error_display() {
        let err = TransportError::server_error(503, "unavailable");
        assert_eq!(err.to_string(), "Server error (503): unavailable");
    }
}
