//! Error types for persistence operations.

use thiserror::Error;

/// Errors that can occur while saving or loading an artifact.
#[derive(Debug, Error)]
pub enum PersistenceError {
    /// I/O error (file operations, disk I/O)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Format error (short read, implausible length prefix, out-of-range id)
    #[error("format error: {0}")]
    Format(String),

    /// Artifact file does not exist or cannot be opened.
    #[error("resource not found: {0}")]
    NotFound(String),
}

impl PersistenceError {
    /// Whether this error indicates a malformed artifact rather than an I/O failure.
    pub fn is_format(&self) -> bool {
        matches!(self, Self::Format(_))
    }
}

/// Result type for persistence operations.
pub type PersistenceResult<T> = Result<T, PersistenceError>;
