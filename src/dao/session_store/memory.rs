//! In-process session store used when no external backend is configured and in tests.

use std::sync::Arc;

use dashmap::DashMap;
use futures::future::BoxFuture;
use serde_json::Value;

use crate::dao::{
    batch::{Precondition, WriteBatch, apply_batch, check_preconditions, now_millis},
    session_store::SessionStore,
    storage::{StorageError, StorageResult},
};

/// Session documents kept in a concurrent map.
///
/// Each commit holds the map entry lock while it checks preconditions and
/// applies the batch, so two commits on one session never interleave.
#[derive(Clone, Default)]
pub struct MemorySessionStore {
    documents: Arc<DashMap<String, Value>>,
}

impl MemorySessionStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn commit_now(
        &self,
        id: &str,
        preconditions: &[Precondition],
        batch: &WriteBatch,
    ) -> StorageResult<()> {
        let mut entry = self
            .documents
            .get_mut(id)
            .ok_or_else(|| StorageError::PreconditionFailed {
                path: format!("{id} (missing session)"),
            })?;

        check_preconditions(entry.value(), preconditions)?;
        apply_batch(entry.value_mut(), batch, now_millis())
    }
}

impl SessionStore for MemorySessionStore {
    fn fetch(&self, id: &str) -> BoxFuture<'static, StorageResult<Option<Value>>> {
        let snapshot = self.documents.get(id).map(|entry| entry.value().clone());
        Box::pin(async move { Ok(snapshot) })
    }

    fn commit(
        &self,
        id: &str,
        preconditions: Vec<Precondition>,
        batch: WriteBatch,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let result = self.commit_now(id, &preconditions, &batch);
        Box::pin(async move { result })
    }

    fn insert(&self, id: &str, document: Value) -> BoxFuture<'static, StorageResult<()>> {
        self.documents.insert(id.to_string(), document);
        Box::pin(async { Ok(()) })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }
}
