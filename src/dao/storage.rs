//! Backend-independent storage errors.

use std::error::Error;

use thiserror::Error;

/// Result of a snapshot store call.
pub type StorageResult<T> = Result<T, StorageError>;

/// Failure reported by any [`SnapshotStore`](crate::dao::snapshot_store::SnapshotStore).
#[derive(Debug, Error)]
pub enum StorageError {
    /// The backend could not be reached or refused the request.
    #[error("storage unavailable: {message}")]
    Unavailable {
        /// Human readable context.
        message: String,
        /// Backend failure.
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
    /// A stored snapshot could not be encoded or decoded.
    #[error("snapshot for room `{room}` is not valid JSON")]
    Corrupt {
        /// Room whose snapshot failed.
        room: String,
        /// Decoding failure.
        #[source]
        source: serde_json::Error,
    },
}

impl StorageError {
    /// Whether trying the same operation later can succeed.
    ///
    /// A corrupt snapshot stays corrupt until it is overwritten.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StorageError::Unavailable { .. })
    }

    /// Wrap a backend failure.
    pub fn unavailable(message: String, source: impl Error + Send + Sync + 'static) -> Self {
        StorageError::Unavailable {
            message,
            source: Box::new(source),
        }
    }
}
