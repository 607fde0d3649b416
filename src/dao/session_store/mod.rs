/// CouchDB backend.
#[cfg(feature = "couch-store")]
pub mod couchdb;
/// In-process backend.
pub mod memory;

use crate::dao::batch::{Precondition, WriteBatch};
use crate::dao::storage::StorageResult;
use futures::future::BoxFuture;
use serde_json::Value;

/// Abstraction over the durable store holding session documents.
///
/// Documents are plain JSON trees; callers address fields with slash-separated
/// paths. `commit` must either apply the whole batch or nothing, and must fail
/// with [`StorageError::PreconditionFailed`](crate::dao::storage::StorageError)
/// when any precondition no longer holds at write time.
pub trait SessionStore: Send + Sync {
    /// Raw session document, `None` when the session does not exist.
    fn fetch(&self, id: &str) -> BoxFuture<'static, StorageResult<Option<Value>>>;
    /// Apply `batch` atomically if every precondition still holds.
    fn commit(
        &self,
        id: &str,
        preconditions: Vec<Precondition>,
        batch: WriteBatch,
    ) -> BoxFuture<'static, StorageResult<()>>;
    /// Create or replace a whole session document.
    fn insert(&self, id: &str, document: Value) -> BoxFuture<'static, StorageResult<()>>;
    /// Cheap reachability probe.
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
    /// Attempt to revive the backend in place.
    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>>;
}
