// In-Memory Document Store
//
// Reference `DocumentStore` keeping the full revision tree of every
// document. Used by the CLI and by tests.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use serde_json::{Map, Value};
use uuid::Uuid;

use super::{DocId, Document, DocumentStore, Rev, RevSelector, StoreError, WriteResult};

const LOCAL_PREFIX: &str = "_local/";

#[derive(Debug, Clone)]
struct RevisionNode {
    deleted: bool,
    body: Map<String, Value>,
}

/// Every revision of one document plus its current leaves.
#[derive(Debug, Default)]
struct RevisionTree {
    revisions: HashMap<Rev, RevisionNode>,
    leaves: Vec<Rev>,
}

impl RevisionTree {
    /// Leaves ordered winner first: live before deleted, then highest
    /// generation, then highest token.
    fn ranked_leaves(&self) -> Vec<&Rev> {
        let mut leaves: Vec<&Rev> = self.leaves.iter().collect();
        leaves.sort_by_key(|rev| {
            let deleted = self.revisions.get(*rev).map(|n| n.deleted).unwrap_or(true);
            std::cmp::Reverse((!deleted, rev.generation(), (*rev).clone()))
        });
        leaves
    }

    fn winner(&self) -> Option<&Rev> {
        self.ranked_leaves().into_iter().next()
    }

    fn is_deleted(&self, rev: &Rev) -> bool {
        self.revisions.get(rev).map(|n| n.deleted).unwrap_or(true)
    }

    fn document(&self, id: &DocId, rev: &Rev) -> Option<Document> {
        self.revisions.get(rev).map(|node| Document {
            id: id.clone(),
            rev: Some(rev.clone()),
            deleted: node.deleted,
            body: node.body.clone(),
        })
    }

    /// Append a child of `parent` (a root when `None`) and make it a leaf.
    fn extend(&mut self, parent: Option<&Rev>, deleted: bool, body: Map<String, Value>) -> Rev {
        let generation = parent.map(|p| p.generation()).unwrap_or(0) + 1;
        let rev = Rev(format!("{generation}-{}", Uuid::new_v4().simple()));

        if let Some(parent) = parent {
            self.leaves.retain(|leaf| leaf != parent);
        }
        self.revisions
            .insert(rev.clone(), RevisionNode { deleted, body });
        self.leaves.push(rev.clone());
        rev
    }
}

/// Process-local revisioned document store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    docs: Mutex<BTreeMap<DocId, RevisionTree>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, BTreeMap<DocId, RevisionTree>>, StoreError> {
        self.docs
            .lock()
            .map_err(|_| StoreError::new(500, "internal", "memory store lock poisoned"))
    }

    /// Live documents at their winning revision, ordered by id.
    ///
    /// `_local/` documents are never listed.
    pub fn all_docs(&self, prefix: Option<&str>) -> Result<Vec<Document>, StoreError> {
        let docs = self.lock()?;
        Ok(docs
            .iter()
            .filter(|(id, _)| !id.as_str().starts_with(LOCAL_PREFIX))
            .filter(|(id, _)| prefix.map_or(true, |p| id.as_str().starts_with(p)))
            .filter_map(|(id, tree)| {
                let winner = tree.winner()?;
                if tree.is_deleted(winner) {
                    return None;
                }
                tree.document(id, winner)
            })
            .collect())
    }

    /// Write a new revision as a child of `parent` without checking that
    /// `parent` is a leaf, the way a replicated edit lands. Grafting onto
    /// an inner revision leaves the document with several leaves.
    pub fn graft(
        &self,
        id: &DocId,
        parent: Option<&Rev>,
        body: Map<String, Value>,
    ) -> Result<Rev, StoreError> {
        let mut docs = self.lock()?;
        if let Some(parent) = parent {
            let known = docs
                .get(id)
                .is_some_and(|tree| tree.revisions.contains_key(parent));
            if !known {
                return Err(StoreError::not_found(format!("missing revision {parent} of {id}")));
            }
        }
        Ok(docs.entry(id.clone()).or_default().extend(parent, false, body))
    }

    fn write_one(docs: &mut BTreeMap<DocId, RevisionTree>, doc: Document) -> WriteResult {
        let Document {
            id,
            rev,
            deleted,
            body,
        } = doc;

        let Some(tree) = docs.get_mut(&id) else {
            if let Some(rev) = rev {
                return WriteResult::Error {
                    error: StoreError::conflict(format!("{id} does not exist at {rev}")),
                    id,
                };
            }
            let mut tree = RevisionTree::default();
            let rev = tree.extend(None, deleted, body);
            docs.insert(id.clone(), tree);
            return WriteResult::Ok { id, rev };
        };

        let parent = match rev {
            Some(rev) if tree.leaves.contains(&rev) => rev,
            Some(_) => {
                return WriteResult::Error {
                    id,
                    error: StoreError::conflict("Document update conflict"),
                }
            }
            None => match tree.winner() {
                Some(winner) if tree.is_deleted(winner) => winner.clone(),
                _ => {
                    return WriteResult::Error {
                        id,
                        error: StoreError::conflict("Document update conflict"),
                    }
                }
            },
        };

        let rev = tree.extend(Some(&parent), deleted, body);
        WriteResult::Ok { id, rev }
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, id: &DocId, selector: RevSelector) -> Result<Document, StoreError> {
        let docs = self.lock()?;
        let tree = docs
            .get(id)
            .ok_or_else(|| StoreError::not_found("missing"))?;

        match selector {
            RevSelector::Latest => {
                let winner = tree.winner().ok_or_else(|| StoreError::not_found("missing"))?;
                if tree.is_deleted(winner) {
                    return Err(StoreError::not_found("deleted"));
                }
                tree.document(id, winner)
                    .ok_or_else(|| StoreError::not_found("missing"))
            }
            RevSelector::At(rev) => tree
                .document(id, &rev)
                .ok_or_else(|| StoreError::not_found(format!("missing revision {rev}"))),
        }
    }

    async fn leaves(&self, id: &DocId) -> Result<Vec<Document>, StoreError> {
        let docs = self.lock()?;
        let tree = docs
            .get(id)
            .ok_or_else(|| StoreError::not_found("missing"))?;

        Ok(tree
            .ranked_leaves()
            .into_iter()
            .filter_map(|rev| tree.document(id, rev))
            .collect())
    }

    async fn bulk_write(&self, docs: Vec<Document>) -> Result<Vec<WriteResult>, StoreError> {
        let mut stored = self.lock()?;
        Ok(docs
            .into_iter()
            .map(|doc| Self::write_one(&mut stored, doc))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn body(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    async fn write(store: &MemoryStore, doc: Document) -> WriteResult {
        store.bulk_write(vec![doc]).await.unwrap().remove(0)
    }

    #[tokio::test]
    async fn create_update_and_read_history() {
        let store = MemoryStore::new();
        let id = DocId::from("doc1");

        let r1 = write(&store, Document::new("doc1", body(json!({ "n": 1 }))))
            .await
            .rev()
            .cloned()
            .unwrap();
        assert_eq!(r1.generation(), 1);

        let r2 = write(
            &store,
            Document::new("doc1", body(json!({ "n": 2 }))).with_rev(r1.clone()),
        )
        .await
        .rev()
        .cloned()
        .unwrap();
        assert_eq!(r2.generation(), 2);

        let latest = store.get(&id, RevSelector::Latest).await.unwrap();
        assert_eq!(latest.rev, Some(r2));
        assert_eq!(latest.get("n"), Some(&json!(2)));

        let old = store.get(&id, RevSelector::At(r1)).await.unwrap();
        assert_eq!(old.get("n"), Some(&json!(1)));
    }

    #[tokio::test]
    async fn stale_revision_is_rejected() {
        let store = MemoryStore::new();
        let r1 = write(&store, Document::new("doc1", Map::new()))
            .await
            .rev()
            .cloned()
            .unwrap();
        write(&store, Document::new("doc1", Map::new()).with_rev(r1.clone())).await;

        let result = write(&store, Document::new("doc1", Map::new()).with_rev(r1)).await;
        assert!(result.error().unwrap().is_conflict());

        let result = write(&store, Document::new("doc1", Map::new())).await;
        assert!(result.error().unwrap().is_conflict());
    }

    #[tokio::test]
    async fn deleted_documents_read_as_absent_but_keep_history() {
        let store = MemoryStore::new();
        let id = DocId::from("doc1");
        let r1 = write(&store, Document::new("doc1", Map::new()))
            .await
            .rev()
            .cloned()
            .unwrap();
        let r2 = write(&store, Document::tombstone(id.clone()).with_rev(r1.clone()))
            .await
            .rev()
            .cloned()
            .unwrap();

        let err = store.get(&id, RevSelector::Latest).await.unwrap_err();
        assert!(err.is_not_found());

        let tombstone = store.get(&id, RevSelector::At(r2.clone())).await.unwrap();
        assert!(tombstone.deleted);

        let leaves = store.leaves(&id).await.unwrap();
        assert_eq!(leaves.len(), 1);
        assert_eq!(leaves[0].rev, Some(r2.clone()));

        // recreating without a revision extends the deleted leaf
        let r3 = write(&store, Document::new("doc1", Map::new()))
            .await
            .rev()
            .cloned()
            .unwrap();
        assert_eq!(r3.generation(), 3);
        assert_eq!(store.all_docs(None).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn graft_creates_competing_leaves() {
        let store = MemoryStore::new();
        let id = DocId::from("doc1");
        let r1 = write(&store, Document::new("doc1", Map::new()))
            .await
            .rev()
            .cloned()
            .unwrap();
        write(&store, Document::new("doc1", Map::new()).with_rev(r1.clone())).await;

        store.graft(&id, Some(&r1), Map::new()).unwrap();

        let leaves = store.leaves(&id).await.unwrap();
        assert_eq!(leaves.len(), 2);
        let latest = store.get(&id, RevSelector::Latest).await.unwrap();
        assert_eq!(latest.rev, leaves[0].rev);
    }

    #[tokio::test]
    async fn listing_skips_local_and_deleted_documents() {
        let store = MemoryStore::new();
        store
            .bulk_write(vec![
                Document::new("a1", Map::new()),
                Document::new("a2", Map::new()),
                Document::new("b1", Map::new()),
                Document::new("_local/meta", Map::new()),
            ])
            .await
            .unwrap();

        assert_eq!(store.all_docs(None).unwrap().len(), 3);
        assert_eq!(store.all_docs(Some("a")).unwrap().len(), 2);
    }
}
