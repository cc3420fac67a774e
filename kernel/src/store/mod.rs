// Document Store Abstraction
//
// Defines the contract the undo layer expects from a revisioned
// document store. Implementations own revision generation, tombstones
// and per-document optimistic concurrency.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub mod memory;

pub use memory::MemoryStore;

/// Stable identifier for a document.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocId(pub String);

impl DocId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DocId {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}

/// Opaque revision token of one document version.
///
/// Tokens are `{generation}-{suffix}`; only the store interprets them.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Rev(pub String);

impl Rev {
    /// Generation prefix of the token, `0` when the token is not well formed.
    pub fn generation(&self) -> u64 {
        self.0
            .split_once('-')
            .and_then(|(generation, _)| generation.parse().ok())
            .unwrap_or(0)
    }
}

impl fmt::Display for Rev {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Rev {
    fn from(rev: &str) -> Self {
        Self(rev.to_owned())
    }
}

/// A document as exchanged with the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    #[serde(rename = "_id")]
    pub id: DocId,

    /// Revision this document was read at, or the expected predecessor on write.
    #[serde(rename = "_rev", default, skip_serializing_if = "Option::is_none")]
    pub rev: Option<Rev>,

    #[serde(rename = "_deleted", default, skip_serializing_if = "is_false")]
    pub deleted: bool,

    #[serde(flatten)]
    pub body: Map<String, Value>,
}

fn is_false(value: &bool) -> bool {
    !*value
}

impl Document {
    pub fn new(id: impl Into<String>, body: Map<String, Value>) -> Self {
        Self {
            id: DocId(id.into()),
            rev: None,
            deleted: false,
            body,
        }
    }

    /// Deletion marker for `id` with no content.
    pub fn tombstone(id: DocId) -> Self {
        Self {
            id,
            rev: None,
            deleted: true,
            body: Map::new(),
        }
    }

    pub fn with_rev(mut self, rev: Rev) -> Self {
        self.rev = Some(rev);
        self
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.body.get(field)
    }
}

/// Which version of a document to read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RevSelector {
    /// The winning revision; absent when the winner is a tombstone.
    Latest,
    /// A specific historical revision, tombstones included.
    At(Rev),
}

/// Error shape shared by the store and the undo layer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
#[error("{error} ({status}): {reason}")]
pub struct StoreError {
    pub status: u16,
    pub error: String,
    pub reason: String,
}

impl StoreError {
    pub fn new(status: u16, error: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            status,
            error: error.into(),
            reason: reason.into(),
        }
    }

    pub fn not_found(reason: impl Into<String>) -> Self {
        Self::new(404, "not_found", reason)
    }

    pub fn conflict(reason: impl Into<String>) -> Self {
        Self::new(409, "conflict", reason)
    }

    pub fn is_not_found(&self) -> bool {
        self.status == 404
    }

    pub fn is_conflict(&self) -> bool {
        self.status == 409
    }
}

/// Per-document outcome of a bulk write.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum WriteResult {
    Ok { id: DocId, rev: Rev },
    Error { id: DocId, error: StoreError },
}

impl WriteResult {
    pub fn is_ok(&self) -> bool {
        matches!(self, WriteResult::Ok { .. })
    }

    pub fn id(&self) -> &DocId {
        match self {
            WriteResult::Ok { id, .. } | WriteResult::Error { id, .. } => id,
        }
    }

    /// Revision produced by a successful write.
    pub fn rev(&self) -> Option<&Rev> {
        match self {
            WriteResult::Ok { rev, .. } => Some(rev),
            WriteResult::Error { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&StoreError> {
        match self {
            WriteResult::Ok { .. } => None,
            WriteResult::Error { error, .. } => Some(error),
        }
    }
}

/// Revisioned document store.
///
/// Properties required from implementations:
/// - Every stored version gets a unique revision token
/// - A write naming a revision that is not a current leaf is rejected with 409
/// - Historical revisions stay readable
/// - Deletion writes a tombstone instead of removing the document
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Read one version of a document; 404 when absent.
    async fn get(&self, id: &DocId, selector: RevSelector) -> Result<Document, StoreError>;

    /// All leaf revisions of a document, winning leaf first; 404 for unknown ids.
    async fn leaves(&self, id: &DocId) -> Result<Vec<Document>, StoreError>;

    /// Write documents, returning one result per input in input order.
    ///
    /// A document without a revision is a create. Failure of one member
    /// does not stop the others; `Err` is reserved for whole-call failures.
    async fn bulk_write(&self, docs: Vec<Document>) -> Result<Vec<WriteResult>, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn document_json_uses_reserved_fields() {
        let doc: Document = serde_json::from_value(json!({
            "_id": "doc1",
            "_rev": "2-abc",
            "message": "Hello"
        }))
        .unwrap();

        assert_eq!(doc.id, DocId::from("doc1"));
        assert_eq!(doc.rev, Some(Rev::from("2-abc")));
        assert!(!doc.deleted);
        assert_eq!(doc.get("message"), Some(&json!("Hello")));

        let tombstone = serde_json::to_value(Document::tombstone(DocId::from("doc1"))).unwrap();
        assert_eq!(tombstone, json!({ "_id": "doc1", "_deleted": true }));
    }

    #[test]
    fn revision_generation_is_parsed_from_prefix() {
        assert_eq!(Rev::from("12-ff00").generation(), 12);
        assert_eq!(Rev::from("garbage").generation(), 0);
    }
}
