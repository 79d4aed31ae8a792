//! Error types for the discovery engine.
//!
//! Scan-time I/O problems are recovered locally and never surface here; the
//! variants below are the failures callers actually have to handle.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for engine operations.
#[derive(Debug, Error)]
pub enum ScoutError {
    // File system errors
    #[error("IO error at {path:?}: {message}")]
    Io {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<std::io::Error>,
    },

    // Serialization errors
    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    // Registry errors
    #[error("Model not found: {path}")]
    ModelNotFound { path: String },

    #[error("Model {path} exceeds device budget: {size_bytes} bytes > {budget_bytes} bytes")]
    Capacity {
        path: String,
        size_bytes: u64,
        budget_bytes: u64,
    },

    // Scan coordination
    #[error("A scan is already in flight")]
    ScanInProgress,

    #[error("Scan was cancelled")]
    ScanCancelled,

    // Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },
}

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, ScoutError>;

impl From<std::io::Error> for ScoutError {
    fn from(err: std::io::Error) -> Self {
        ScoutError::Io {
            message: err.to_string(),
            path: None,
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for ScoutError {
    fn from(err: serde_json::Error) -> Self {
        ScoutError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl ScoutError {
    /// Create an IO error with path context.
    pub fn io_with_path(err: std::io::Error, path: impl Into<PathBuf>) -> Self {
        ScoutError::Io {
            message: err.to_string(),
            path: Some(path.into()),
            source: Some(err),
        }
    }

    /// Whether this error indicates a transient condition worth retrying.
    ///
    /// Persistence failures are retried on the next debounce tick; capacity
    /// and not-found errors are stable until the world changes.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ScoutError::Io { .. } | ScoutError::ScanInProgress)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ScoutError::ModelNotFound {
            path: "/sdcard/models/x.gguf".into(),
        };
        assert_eq!(err.to_string(), "Model not found: /sdcard/models/x.gguf");
    }

    #[test]
    fn test_capacity_display_carries_figures() {
        let err = ScoutError::Capacity {
            path: "/m/big.gguf".into(),
            size_bytes: 9,
            budget_bytes: 6,
        };
        let msg = err.to_string();
        assert!(msg.contains("9 bytes"));
        assert!(msg.contains("6 bytes"));
    }

    #[test]
    fn test_retryable_errors() {
        assert!(ScoutError::ScanInProgress.is_retryable());
        assert!(!ScoutError::ModelNotFound { path: "x".into() }.is_retryable());
        assert!(!ScoutError::ScanCancelled.is_retryable());
    }
}
