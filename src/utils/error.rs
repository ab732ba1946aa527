//! Error types for fluxplayer
//!
//! Library code returns [`FluxError`] through the [`Result`] alias; the
//! binary wraps it in `anyhow` at the top level.

use thiserror::Error;

/// Main error type for fluxplayer
#[derive(Error, Debug)]
pub enum FluxError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Key-value store errors
    #[error("Storage error: {0}")]
    Storage(String),

    /// JSON encoding/decoding errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// File I/O errors
    #[error("File error: {0}")]
    FileIO(#[from] std::io::Error),

    /// Malformed embed URLs or origins
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),

    /// Invalid input errors
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Session runtime stopped or unreachable
    #[error("Session error: {0}")]
    Session(String),

    /// Resource not found
    #[error("Resource not found: {0}")]
    NotFound(String),
}

/// Convenience type alias for Results in fluxplayer
pub type Result<T> = std::result::Result<T, FluxError>;

/// Extension trait for converting other errors to FluxError
pub trait IntoFluxError<T> {
    /// Convert this error into a [`FluxError::Config`] with the given context
    fn config_err(self, context: &str) -> Result<T>;
    /// Convert this error into a [`FluxError::Storage`] with the given context
    fn storage_err(self, context: &str) -> Result<T>;
}

impl<T, E: std::fmt::Display> IntoFluxError<T> for std::result::Result<T, E> {
    fn config_err(self, context: &str) -> Result<T> {
        self.map_err(|e| FluxError::Config(format!("{}: {}", context, e)))
    }

    fn storage_err(self, context: &str) -> Result<T> {
        self.map_err(|e| FluxError::Storage(format!("{}: {}", context, e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = FluxError::Storage("quota exceeded".to_string());
        assert_eq!(err.to_string(), "Storage error: quota exceeded");

        let err = FluxError::InvalidInput("season 0".to_string());
        assert_eq!(err.to_string(), "Invalid input: season 0");
    }

    #[test]
    fn test_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only");
        let flux_err: FluxError = io_err.into();
        assert!(matches!(flux_err, FluxError::FileIO(_)));

        let json_err = serde_json::from_str::<u32>("nope").unwrap_err();
        let flux_err: FluxError = json_err.into();
        assert!(matches!(flux_err, FluxError::Serialization(_)));
    }

    #[test]
    fn test_into_flux_error_trait() {
        let result: std::result::Result<(), &str> = Err("disk full");
        match result.storage_err("Writing store") {
            Err(FluxError::Storage(msg)) => assert_eq!(msg, "Writing store: disk full"),
            _ => panic!("Expected Storage error"),
        }
    }
}
