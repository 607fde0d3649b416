//! Error types shared by the CouchDB storage implementation.

use reqwest::StatusCode;
use thiserror::Error;

use crate::dao::storage::StorageError;

/// Convenient result alias returning [`CouchDaoError`] failures.
pub type CouchResult<T> = Result<T, CouchDaoError>;

/// Failures that can occur while interacting with CouchDB.
#[derive(Debug, Error)]
pub enum CouchDaoError {
    /// Required environment variable is missing.
    #[error("missing CouchDB environment variable `{var}`")]
    MissingEnvVar {
        /// Name of the variable.
        var: &'static str,
    },
    /// The HTTP client could not be built.
    #[error("failed to build CouchDB client")]
    ClientBuilder {
        /// Client builder failure.
        #[source]
        source: reqwest::Error,
    },
    /// A database-level request could not be sent.
    #[error("failed to {action} CouchDB database `{database}`")]
    Database {
        /// Database name.
        database: String,
        /// `query` or `create`.
        action: &'static str,
        /// Transport failure.
        #[source]
        source: reqwest::Error,
    },
    /// CouchDB answered a database-level request with an unexpected status.
    #[error("unexpected CouchDB status {status} while preparing `{database}`")]
    DatabaseStatus {
        /// Database name.
        database: String,
        /// Status returned by CouchDB.
        status: StatusCode,
    },
    /// A session document request could not be sent.
    #[error("failed to reach CouchDB for `{path}`")]
    RequestSend {
        /// Document id.
        path: String,
        /// Transport failure.
        #[source]
        source: reqwest::Error,
    },
    /// CouchDB answered a session document request with an unexpected status.
    #[error("unexpected CouchDB status {status} for `{path}`")]
    RequestStatus {
        /// Document id.
        path: String,
        /// Status returned by CouchDB.
        status: StatusCode,
    },
    /// A session document body was not valid JSON.
    #[error("failed to decode session document `{path}`")]
    DecodeResponse {
        /// Document id.
        path: String,
        /// Decoding failure.
        #[source]
        source: reqwest::Error,
    },
    /// Another writer updated the document between our read and our write.
    #[error("revision conflict on `{path}`")]
    Conflict {
        /// Document id.
        path: String,
    },
    /// Batch evaluation failed before anything was sent to CouchDB.
    #[error(transparent)]
    Storage(StorageError),
}

impl From<StorageError> for CouchDaoError {
    fn from(err: StorageError) -> Self {
        CouchDaoError::Storage(err)
    }
}
