//! Error Handling Module
//!
//! Defines custom error types for the pneumonia classifier library.
//! Uses thiserror for ergonomic error definitions.

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for the pneumonia classifier
#[derive(Error, Debug)]
pub enum PneumoniaError {
    /// Image file could not be opened or decoded
    #[error("Failed to decode image at '{0}': {1}")]
    Decode(PathBuf, String),

    /// Error with dataset operations
    #[error("Dataset error: {0}")]
    Dataset(String),

    /// Missing or corrupt zip archive
    #[error("Archive error: {0}")]
    Archive(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Error with model operations
    #[error("Model error: {0}")]
    Model(String),

    /// Error with training
    #[error("Training error: {0}")]
    Training(String),

    /// Error with inference
    #[error("Inference error: {0}")]
    Inference(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Path not found
    #[error("Path not found: {0}")]
    PathNotFound(PathBuf),
}

impl From<serde_json::Error> for PneumoniaError {
    fn from(err: serde_json::Error) -> Self {
        PneumoniaError::Serialization(err.to_string())
    }
}

/// Convenience Result type for the pneumonia classifier
pub type Result<T> = std::result::Result<T, PneumoniaError>;

/// Extension trait for adding context to errors
pub trait ResultExt<T> {
    /// Add context to an error
    fn context(self, msg: &str) -> Result<T>;

    /// Add context with a closure (lazy evaluation)
    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T>;
}

impl<T, E: std::error::Error> ResultExt<T> for std::result::Result<T, E> {
    fn context(self, msg: &str) -> Result<T> {
        self.map_err(|e| PneumoniaError::InvalidInput(format!("{}: {}", msg, e)))
    }

    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T> {
        self.map_err(|e| PneumoniaError::InvalidInput(format!("{}: {}", f(), e)))
    }
}

impl<T> ResultExt<T> for Option<T> {
    fn context(self, msg: &str) -> Result<T> {
        self.ok_or_else(|| PneumoniaError::InvalidInput(msg.to_string()))
    }

    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T> {
        self.ok_or_else(|| PneumoniaError::InvalidInput(f()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PneumoniaError::Dataset("test error".to_string());
        assert_eq!(format!("{}", err), "Dataset error: test error");
    }

    #[test]
    fn test_decode_error() {
        let path = PathBuf::from("/path/to/xray.jpeg");
        let err = PneumoniaError::Decode(path, "unexpected EOF".to_string());
        assert!(format!("{}", err).contains("xray.jpeg"));
    }

    #[test]
    fn test_config_error_message() {
        let err = PneumoniaError::Config("k_neighbors (5) must be smaller".to_string());
        assert!(err.to_string().starts_with("Configuration error"));
    }

    #[test]
    fn test_option_context() {
        let opt: Option<i32> = None;
        let with_context = opt.context("Value was None");
        assert!(matches!(with_context, Err(PneumoniaError::InvalidInput(_))));
    }
}
