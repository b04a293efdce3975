//! Error types for filedrop.

use std::io;

use thiserror::Error;

/// Common error type for filedrop.
#[derive(Error, Debug)]
pub enum FiledropError {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Resource not found.
    #[error("{0} not found")]
    NotFound(String),

    /// Permission denied error.
    #[error("permission denied: {0}")]
    Permission(String),

    /// Validation error for user input.
    #[error("validation error: {0}")]
    Validation(String),

    /// Request body over the configured limit.
    #[error("payload too large: {0}")]
    TooLarge(String),

    /// Metadata (de)serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

impl FiledropError {
    /// Classify a filesystem error for the given subject.
    ///
    /// `NotFound` and `PermissionDenied` get their own variants so callers
    /// can map them to 404/403 without looking at the raw error.
    pub fn from_io(err: io::Error, subject: &str) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => FiledropError::NotFound(subject.to_string()),
            io::ErrorKind::PermissionDenied => FiledropError::Permission(subject.to_string()),
            _ => FiledropError::Io(err),
        }
    }
}

/// Result type alias for filedrop operations.
pub type Result<T> = std::result::Result<T, FiledropError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_error_display() {
        let err = FiledropError::NotFound("report.pdf".to_string());
        assert_eq!(err.to_string(), "report.pdf not found");
    }

    #[test]
    fn test_validation_error_display() {
        let err = FiledropError::Validation("filename is empty".to_string());
        assert_eq!(err.to_string(), "validation error: filename is empty");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = io::Error::new(io::ErrorKind::Other, "disk on fire");
        let err: FiledropError = io_err.into();
        assert!(matches!(err, FiledropError::Io(_)));
        assert!(err.to_string().contains("disk on fire"));
    }

    #[test]
    fn test_from_io_classifies_kinds() {
        let err = FiledropError::from_io(io::Error::from(io::ErrorKind::NotFound), "a.txt");
        assert!(matches!(err, FiledropError::NotFound(ref s) if s == "a.txt"));

        let err =
            FiledropError::from_io(io::Error::from(io::ErrorKind::PermissionDenied), "a.txt");
        assert!(matches!(err, FiledropError::Permission(_)));

        let err = FiledropError::from_io(io::Error::from(io::ErrorKind::WriteZero), "a.txt");
        assert!(matches!(err, FiledropError::Io(_)));
    }
}
