use std::error::Error;
use thiserror::Error;

/// Result alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Error raised by storage backends regardless of the underlying database.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The backend cannot be reached.
    #[error("storage unavailable: {message}")]
    Unavailable {
        /// What was being attempted.
        message: String,
        /// Backend failure.
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
    /// A conditional write observed a value different from the expected one.
    #[error("precondition failed on `{path}`")]
    PreconditionFailed {
        /// First path whose value differed.
        path: String,
    },
    /// The write batch cannot be applied as a single update.
    #[error("invalid write batch: {0}")]
    InvalidBatch(String),
    /// The stored document cannot be decoded.
    #[error("corrupted document `{id}`")]
    Corrupted {
        /// Session id of the document.
        id: String,
        /// Decoding failure.
        #[source]
        source: serde_json::Error,
    },
}

impl StorageError {
    /// Construct an unavailable error from any backend failure.
    pub fn unavailable(message: String, source: impl Error + Send + Sync + 'static) -> Self {
        StorageError::Unavailable {
            message,
            source: Box::new(source),
        }
    }
}
