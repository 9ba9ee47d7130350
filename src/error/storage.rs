//! Persistent key-value storage errors.

use thiserror::Error;

use super::ErrorCategory;

/// Failure of a persistent storage operation.
///
/// Storage failures are never fatal for the credential cache: they are logged
/// and the in-memory state stays authoritative.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    /// Reading or writing the backing file failed.
    #[error("IO error: {0}")]
    Io(String),

    /// The stored document could not be (de)serialized.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// No storage location could be determined.
    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

impl StorageError {
    pub fn category(&self) -> ErrorCategory {
        ErrorCategory::System
    }
}

impl From<std::io::Error> for StorageError {
    fn from(e: std::io::Error) -> Self {
        StorageError::Io(e.to_string())
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(e: serde_json::Error) -> Self {
        StorageError::Serialization(e.to_string())
    }
}
