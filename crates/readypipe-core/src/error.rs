//! Error types for readypipe.
//!
//! Transport failures are normally absorbed by the client state machine and
//! only show up here when an API call surfaces them directly. Synchronization
//! and bind failures indicate an environment problem and are returned to the
//! process bootstrap.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the readypipe library.
#[derive(Debug, Error)]
pub enum ReadyPipeError {
    // Cross-process synchronization errors
    #[error("Synchronization error during {operation}: {source}")]
    Sync {
        operation: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("Another instance of {instance} is already running")]
    AlreadyRunning { instance: String },

    // Transport errors
    #[error("Transport error on {endpoint}: {message}")]
    Transport {
        endpoint: String,
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("Failed to bind {endpoint}: {source}")]
    Bind {
        endpoint: String,
        #[source]
        source: std::io::Error,
    },

    // File system errors
    #[error("IO error at {path:?}: {message}")]
    Io {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("Validation error for {field}: {message}")]
    Validation { field: String, message: String },

    #[error("{component} thread panicked")]
    ThreadPanicked { component: &'static str },
}

/// Result type alias for readypipe operations.
pub type Result<T> = std::result::Result<T, ReadyPipeError>;

impl From<std::io::Error> for ReadyPipeError {
    fn from(err: std::io::Error) -> Self {
        ReadyPipeError::Io {
            message: err.to_string(),
            path: None,
            source: Some(err),
        }
    }
}

impl ReadyPipeError {
    /// Create an IO error with path context.
    pub fn io_with_path(err: std::io::Error, path: impl Into<PathBuf>) -> Self {
        ReadyPipeError::Io {
            message: err.to_string(),
            path: Some(path.into()),
            source: Some(err),
        }
    }

    /// Wrap an OS error raised by a lock or signal primitive.
    pub fn sync(operation: &'static str, source: std::io::Error) -> Self {
        ReadyPipeError::Sync { operation, source }
    }

    /// Wrap a transport-level I/O failure for the given endpoint.
    pub fn transport(endpoint: impl Into<String>, source: std::io::Error) -> Self {
        ReadyPipeError::Transport {
            endpoint: endpoint.into(),
            message: source.to_string(),
            source: Some(source),
        }
    }

    /// Check whether the state machine may recover from this error by
    /// reconnecting.
    ///
    /// Transport failures are transient peer issues. Everything else points at
    /// the local environment and is not retried.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, ReadyPipeError::Transport { .. })
    }
}
