//! Error types for the capture/stream pipeline

use thiserror::Error;

/// Result type alias using StreamError
pub type Result<T> = std::result::Result<T, StreamError>;

#[derive(Debug, Error)]
pub enum StreamError {
    /// Capture device could not be opened or read
    #[error("Device error: {0}")]
    Device(String),

    /// JPEG encoding failed
    #[error("Encode error: {0}")]
    Encode(String),

    /// Writing a frame to the connection failed
    #[error("Send error: {0}")]
    Send(#[from] tokio_tungstenite::tungstenite::Error),

    /// Invalid configuration value
    #[error("Configuration error: {0}")]
    Config(String),

    /// Capture source not compiled into this build
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// Session lifecycle misuse (e.g. starting twice)
    #[error("Session error: {0}")]
    Session(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StreamError {
    pub fn device(msg: impl Into<String>) -> Self {
        Self::Device(msg.into())
    }

    pub fn encode(msg: impl Into<String>) -> Self {
        Self::Encode(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::Unsupported(msg.into())
    }

    pub fn session(msg: impl Into<String>) -> Self {
        Self::Session(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(
            StreamError::device("no camera").to_string(),
            "Device error: no camera"
        );
        assert_eq!(
            StreamError::config("quality out of range").to_string(),
            "Configuration error: quality out of range"
        );
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: StreamError = io.into();
        assert!(matches!(err, StreamError::Io(_)));
    }
}
