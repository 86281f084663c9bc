//! Error types for stationsync

use thiserror::Error;

/// Result type alias for stationsync operations
pub type Result<T> = std::result::Result<T, SyncError>;

/// Native error raised by a storage backend, kept intact as the cause of a
/// [`SyncError::Storage`].
pub type BackendError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Unified error type for all stationsync operations
#[derive(Error, Debug)]
pub enum SyncError {
    /// Invalid or missing configuration input (e.g. an absent CA file).
    #[error("Config error: {0}")]
    Config(String),

    /// The backing service could not be reached.
    #[error("Connection error: {0}")]
    Connection(String),

    /// A backend operation (query, insert, update, delete) failed.
    #[error("Storage error during {operation}: {source}")]
    Storage {
        operation: &'static str,
        #[source]
        source: BackendError,
    },

    /// Caller defect, such as a document without an identity field.
    #[error("Usage error: {0}")]
    Usage(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl SyncError {
    /// Wraps a backend failure raised while running `operation`.
    pub fn storage(operation: &'static str, source: impl Into<BackendError>) -> Self {
        SyncError::Storage {
            operation,
            source: source.into(),
        }
    }

    /// Returns true if a caller-level retry policy may reasonably retry this error.
    ///
    /// Only backend operation failures qualify; nothing is retried internally.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SyncError::Storage { .. })
    }

    /// Returns true if the error signals a programming or configuration defect
    pub fn is_caller_defect(&self) -> bool {
        matches!(self, SyncError::Usage(_) | SyncError::Config(_))
    }

    /// Name of the failed backend operation, if this is a storage failure
    pub fn operation(&self) -> Option<&'static str> {
        match self {
            SyncError::Storage { operation, .. } => Some(operation),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::Serialization(err.to_string())
    }
}

#[cfg(feature = "bson-errors")]
impl From<bson::ser::Error> for SyncError {
    fn from(err: bson::ser::Error) -> Self {
        SyncError::Serialization(format!("BSON serialization error: {}", err))
    }
}

#[cfg(feature = "bson-errors")]
impl From<bson::de::Error> for SyncError {
    fn from(err: bson::de::Error) -> Self {
        SyncError::Serialization(format!("BSON deserialization error: {}", err))
    }
}
