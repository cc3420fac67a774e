// Undo Log
//
// The bounded history of recorded batches. The log is a versioned
// aggregate: it carries the revision of the document it was loaded
// from, and that revision is the concurrency token used on save.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fmt;
use uuid::Uuid;

use crate::store::{DocId, Rev};

pub mod repository;
pub mod trim;

pub use repository::LogRepository;
pub use trim::trim_history;

/// Fixed identifier of the undo log document.
pub const UNDO_LOG_ID: &str = "_local/_undo";

/// Identifier shared by every document written in one batch.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BatchId(pub String);

impl BatchId {
    /// Fresh, globally unique identifier.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for BatchId {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}

/// How one document changed in a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UndoEntry {
    pub id: DocId,

    /// Revision before the batch; `None` when the batch created the document.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_rev: Option<Rev>,

    /// Revision written by the batch.
    pub new_rev: Rev,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UndoLog {
    /// Revision of the stored log document, `None` until first saved.
    #[serde(skip)]
    rev: Option<Rev>,

    /// Batch ids, oldest first.
    history: VecDeque<BatchId>,

    undos: BTreeMap<BatchId, Vec<UndoEntry>>,
}

impl UndoLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_rev(mut self, rev: Option<Rev>) -> Self {
        self.rev = rev;
        self
    }

    pub fn rev(&self) -> Option<&Rev> {
        self.rev.as_ref()
    }

    /// Append a batch at the tail of the history.
    pub fn record(&mut self, batch_id: BatchId, entries: Vec<UndoEntry>) {
        self.history.push_back(batch_id.clone());
        self.undos.insert(batch_id, entries);
    }

    pub fn entries(&self, batch_id: &BatchId) -> Option<&[UndoEntry]> {
        self.undos.get(batch_id).map(Vec::as_slice)
    }

    /// Drop a batch from both the history and the entry map.
    pub fn forget(&mut self, batch_id: &BatchId) -> Option<Vec<UndoEntry>> {
        self.history.retain(|id| id != batch_id);
        self.undos.remove(batch_id)
    }

    /// Drop history ids without entries and entries missing from the history.
    ///
    /// Logs written by other tools may keep reverted ids in the history.
    /// Returns the number of ids dropped.
    pub fn reconcile(&mut self) -> usize {
        let before = self.history.len() + self.undos.len();

        let mut seen = BTreeSet::new();
        let undos = &self.undos;
        self.history.retain(|id| undos.contains_key(id) && seen.insert(id.clone()));
        self.undos.retain(|id, _| seen.contains(id));

        before - self.history.len() - self.undos.len()
    }

    /// Evict the oldest batch.
    pub(crate) fn pop_oldest(&mut self) -> Option<BatchId> {
        let oldest = self.history.pop_front()?;
        self.undos.remove(&oldest);
        Some(oldest)
    }

    pub fn history(&self) -> impl Iterator<Item = &BatchId> {
        self.history.iter()
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    pub(crate) fn undo_ids(&self) -> impl Iterator<Item = &BatchId> {
        self.undos.keys()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entry(id: &str, old: Option<&str>, new: &str) -> UndoEntry {
        UndoEntry {
            id: DocId::from(id),
            old_rev: old.map(Rev::from),
            new_rev: Rev::from(new),
        }
    }

    #[test]
    fn record_and_forget() {
        let mut log = UndoLog::new();
        let first = BatchId::generate();
        let second = BatchId::generate();

        log.record(first.clone(), vec![entry("a", None, "1-a")]);
        log.record(second.clone(), vec![entry("a", Some("1-a"), "2-a")]);

        assert_eq!(log.len(), 2);
        assert_eq!(log.history().collect::<Vec<_>>(), vec![&first, &second]);

        let forgotten = log.forget(&first).unwrap();
        assert_eq!(forgotten, vec![entry("a", None, "1-a")]);
        assert!(log.entries(&first).is_none());
        assert_eq!(log.history().collect::<Vec<_>>(), vec![&second]);
    }

    #[test]
    fn reconcile_drops_dangling_ids() {
        let mut log: UndoLog = serde_json::from_value(json!({
            "history": ["u1", "u2", "u2"],
            "undos": {
                "u2": [{ "id": "doc1", "newRev": "1-a" }],
                "u3": [{ "id": "doc2", "newRev": "1-b" }]
            }
        }))
        .unwrap();

        assert_eq!(log.reconcile(), 3);

        assert_eq!(log.history().collect::<Vec<_>>(), vec![&BatchId::from("u2")]);
        assert!(log.entries(&BatchId::from("u3")).is_none());
        assert_eq!(log.reconcile(), 0);
    }

    #[test]
    fn stored_body_omits_revision_and_absent_old_rev() {
        let mut log = UndoLog::new().with_rev(Some(Rev::from("3-x")));
        log.record(BatchId::from("u1"), vec![entry("doc1", None, "1-a")]);

        let body = serde_json::to_value(&log).unwrap();
        assert_eq!(
            body,
            json!({
                "history": ["u1"],
                "undos": { "u1": [{ "id": "doc1", "newRev": "1-a" }] }
            })
        );

        let decoded: UndoLog = serde_json::from_value(body).unwrap();
        assert_eq!(decoded.rev(), None);
        assert_eq!(decoded.entries(&BatchId::from("u1")).unwrap().len(), 1);
    }
}
