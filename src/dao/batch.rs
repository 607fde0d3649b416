//! Path-addressed write batches applied atomically to a session document.
//!
//! A batch maps slash-separated paths (`rounds/2/state`) to write values. The
//! backend either applies every entry or none of them, after checking the
//! batch preconditions against the document it is about to modify.

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::{Map, Value};
use time::OffsetDateTime;

use crate::dao::storage::{StorageError, StorageResult};

/// Value written at a single path of a batch.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteValue {
    /// Replace the value at the path.
    Set(Value),
    /// Remove the value at the path (missing paths are ignored).
    Delete,
    /// Add the delta to the integer stored at the path (missing counts as zero).
    Increment(i64),
    /// Store the backend clock as Unix milliseconds.
    ServerTimestamp,
}

/// Expected value that must be present at `path` when the batch is committed.
#[derive(Debug, Clone, PartialEq)]
pub struct Precondition {
    /// Slash-separated path inside the session document.
    pub path: String,
    /// Expected value; `Value::Null` matches a missing entry.
    pub expected: Value,
}

impl Precondition {
    /// Build a precondition from any JSON-convertible value.
    pub fn new(path: impl Into<String>, expected: impl Into<Value>) -> Self {
        Self {
            path: path.into(),
            expected: expected.into(),
        }
    }
}

/// Ordered set of writes committed as one update.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteBatch {
    writes: IndexMap<String, WriteValue>,
}

impl WriteBatch {
    /// Create an empty batch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a JSON value at `path`.
    pub fn set(&mut self, path: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.writes.insert(path.into(), WriteValue::Set(value.into()));
        self
    }

    /// Serialize `value` and set it at `path`.
    pub fn set_serialized<T: Serialize + ?Sized>(
        &mut self,
        path: impl Into<String>,
        value: &T,
    ) -> Result<&mut Self, serde_json::Error> {
        let value = serde_json::to_value(value)?;
        Ok(self.set(path, value))
    }

    /// Remove the value at `path`.
    pub fn delete(&mut self, path: impl Into<String>) -> &mut Self {
        self.writes.insert(path.into(), WriteValue::Delete);
        self
    }

    /// Atomically add `delta` to the integer at `path`.
    pub fn increment(&mut self, path: impl Into<String>, delta: i64) -> &mut Self {
        self.writes
            .insert(path.into(), WriteValue::Increment(delta));
        self
    }

    /// Stamp `path` with the backend clock.
    pub fn server_timestamp(&mut self, path: impl Into<String>) -> &mut Self {
        self.writes
            .insert(path.into(), WriteValue::ServerTimestamp);
        self
    }

    /// Look up the write registered for `path`.
    pub fn get(&self, path: &str) -> Option<&WriteValue> {
        self.writes.get(path)
    }

    /// Iterate over the writes in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &WriteValue)> {
        self.writes.iter()
    }

    /// Number of writes in the batch.
    pub fn len(&self) -> usize {
        self.writes.len()
    }

    /// Whether the batch contains no writes.
    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    /// Reject empty paths and entries where one path is an ancestor of another.
    pub fn validate(&self) -> StorageResult<()> {
        let paths: Vec<Vec<&str>> = self.writes.keys().map(|path| segments(path)).collect();

        for (index, path) in paths.iter().enumerate() {
            if path.is_empty() {
                return Err(StorageError::InvalidBatch("empty write path".into()));
            }
            for other in paths.iter().skip(index + 1) {
                if other.starts_with(path) || path.starts_with(other) {
                    return Err(StorageError::InvalidBatch(format!(
                        "overlapping paths `{}` and `{}`",
                        path.join("/"),
                        other.join("/")
                    )));
                }
            }
        }

        Ok(())
    }
}

fn segments(path: &str) -> Vec<&str> {
    path.split('/').filter(|segment| !segment.is_empty()).collect()
}

/// Current backend clock in Unix milliseconds.
pub fn now_millis() -> i64 {
    (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}

/// Resolve the value stored at `path`, if any.
pub fn lookup<'a>(document: &'a Value, path: &str) -> Option<&'a Value> {
    segments(path)
        .into_iter()
        .try_fold(document, |node, segment| node.get(segment))
}

/// Verify every precondition against `document`.
pub fn check_preconditions(document: &Value, preconditions: &[Precondition]) -> StorageResult<()> {
    for precondition in preconditions {
        let actual = lookup(document, &precondition.path).unwrap_or(&Value::Null);
        if *actual != precondition.expected {
            return Err(StorageError::PreconditionFailed {
                path: precondition.path.clone(),
            });
        }
    }
    Ok(())
}

/// Apply the batch to `document`, leaving it untouched when any write fails.
pub fn apply_batch(document: &mut Value, batch: &WriteBatch, now_ms: i64) -> StorageResult<()> {
    batch.validate()?;

    let mut next = document.clone();
    for (path, write) in batch.iter() {
        apply_write(&mut next, path, write, now_ms)?;
    }

    *document = next;
    Ok(())
}

fn apply_write(document: &mut Value, path: &str, write: &WriteValue, now_ms: i64) -> StorageResult<()> {
    let parts = segments(path);
    let Some((leaf, parents)) = parts.split_last() else {
        return Err(StorageError::InvalidBatch("empty write path".into()));
    };

    if matches!(write, WriteValue::Delete | WriteValue::Set(Value::Null)) {
        let parent = parents
            .iter()
            .try_fold(&mut *document, |node, segment| node.get_mut(*segment));
        if let Some(Value::Object(map)) = parent {
            map.remove(*leaf);
        }
        return Ok(());
    }

    let mut node = document;
    for segment in parents {
        node = object_mut(node)
            .entry((*segment).to_string())
            .or_insert_with(|| Value::Object(Map::new()));
    }
    let map = object_mut(node);

    let value = match write {
        WriteValue::Set(value) => value.clone(),
        WriteValue::ServerTimestamp => Value::from(now_ms),
        WriteValue::Increment(delta) => {
            let current = match map.get(*leaf) {
                None | Some(Value::Null) => 0,
                Some(value) => value.as_i64().ok_or_else(|| {
                    StorageError::InvalidBatch(format!("cannot increment non-integer `{path}`"))
                })?,
            };
            Value::from(current + delta)
        }
        WriteValue::Delete => unreachable!("deletes are handled above"),
    };

    map.insert((*leaf).to_string(), value);
    Ok(())
}

/// Coerce `node` into an object, replacing scalars the way a tree store does.
fn object_mut(node: &mut Value) -> &mut Map<String, Value> {
    if !node.is_object() {
        *node = Value::Object(Map::new());
    }
    match node {
        Value::Object(map) => map,
        _ => unreachable!("node was just coerced into an object"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn set_creates_intermediate_objects() {
        let mut doc = json!({});
        let mut batch = WriteBatch::new();
        batch.set("rounds/2/state", "SELECT");

        apply_batch(&mut doc, &batch, 0).unwrap();
        assert_eq!(doc, json!({"rounds": {"2": {"state": "SELECT"}}}));
    }

    #[test]
    fn delete_and_null_remove_entries() {
        let mut doc = json!({"scoreboard": {"P1": 3, "P2": 1}, "kicked": {"P3": "P1"}});
        let mut batch = WriteBatch::new();
        batch.delete("scoreboard/P2").set("kicked/P3", Value::Null);

        apply_batch(&mut doc, &batch, 0).unwrap();
        assert_eq!(doc, json!({"scoreboard": {"P1": 3}, "kicked": {}}));
    }

    #[test]
    fn increment_and_timestamp_resolve_special_values() {
        let mut doc = json!({"current": 1});
        let mut batch = WriteBatch::new();
        batch
            .increment("current", 1)
            .increment("counter", 5)
            .server_timestamp("updatedAt");

        apply_batch(&mut doc, &batch, 1_700_000_000_000).unwrap();
        assert_eq!(doc["current"], json!(2));
        assert_eq!(doc["counter"], json!(5));
        assert_eq!(doc["updatedAt"], json!(1_700_000_000_000_i64));
    }

    #[test]
    fn failed_write_leaves_document_untouched() {
        let mut doc = json!({"state": "STARTED", "current": "oops"});
        let mut batch = WriteBatch::new();
        batch.set("state", "FINISHED").increment("current", 1);

        assert!(matches!(
            apply_batch(&mut doc, &batch, 0),
            Err(StorageError::InvalidBatch(_))
        ));
        assert_eq!(doc, json!({"state": "STARTED", "current": "oops"}));
    }

    #[test]
    fn overlapping_paths_are_rejected() {
        let mut batch = WriteBatch::new();
        batch.set("rounds/1", json!({})).set("rounds/1/state", "TALLY");
        assert!(batch.validate().is_err());

        let mut batch = WriteBatch::new();
        batch.set("rounds/1/state", "TALLY").set("rounds/10/state", "SELECT");
        assert!(batch.validate().is_ok());
    }

    #[test]
    fn preconditions_compare_current_values() {
        let doc = json!({"current": 2, "rounds": {"2": {"state": "GROUP"}}});

        assert!(check_preconditions(
            &doc,
            &[
                Precondition::new("current", 2),
                Precondition::new("rounds/2/state", "GROUP"),
                Precondition::new("rounds/3", Value::Null),
            ]
        )
        .is_ok());

        let err = check_preconditions(&doc, &[Precondition::new("rounds/2/state", "READ")])
            .unwrap_err();
        assert!(matches!(err, StorageError::PreconditionFailed { path } if path == "rounds/2/state"));
    }
}
