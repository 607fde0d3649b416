use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Prefix of every session document id.
pub const SESSION_PREFIX: &str = "session::";

/// Raw CouchDB document wrapping a session tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouchSessionDocument {
    /// CouchDB document id.
    #[serde(rename = "_id")]
    pub id: String,
    /// Current revision, absent for new documents.
    #[serde(rename = "_rev", skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,
    /// Session fields stored next to the CouchDB metadata.
    #[serde(flatten)]
    pub body: Map<String, Value>,
}

impl CouchSessionDocument {
    /// Wrap a session tree; non-object values are stored as an empty document.
    pub fn new(session_id: &str, rev: Option<String>, body: Value) -> Self {
        let body = match body {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self {
            id: session_doc_id(session_id),
            rev,
            body,
        }
    }

    /// Session tree without the CouchDB bookkeeping fields.
    pub fn into_body(self) -> Value {
        Value::Object(self.body)
    }
}

/// Document id of `session_id`.
pub fn session_doc_id(session_id: &str) -> String {
    format!("{SESSION_PREFIX}{session_id}")
}
