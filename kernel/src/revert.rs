// Batch Reverter
//
// Writes the compensating documents for a recorded batch. Every entry is
// checked against the store before anything is written, so a conflict on
// one document leaves the whole batch untouched.

use std::sync::Arc;

use futures::future::try_join_all;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::LeafPolicy;
use crate::error::UndoError;
use crate::log::{BatchId, LogRepository, UndoEntry};
use crate::store::{DocId, Document, DocumentStore, Rev, RevSelector, WriteResult};

/// Outcome of a successful revert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RevertResult {
    pub id: BatchId,
    pub ok: bool,
}

pub struct Reverter<S> {
    store: Arc<S>,
    repository: LogRepository<S>,
    leaf_policy: LeafPolicy,
}

impl<S> Clone for Reverter<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            repository: self.repository.clone(),
            leaf_policy: self.leaf_policy,
        }
    }
}

impl<S: DocumentStore> Reverter<S> {
    pub fn new(store: Arc<S>, repository: LogRepository<S>, leaf_policy: LeafPolicy) -> Self {
        Self {
            store,
            repository,
            leaf_policy,
        }
    }

    /// Restore every document of `batch_id` to its state before the batch.
    ///
    /// Fails with `NotFound` for unknown batches and `Conflict` when any
    /// document was written since. On a commit-time conflict the batch
    /// stays in the log.
    pub async fn revert(&self, batch_id: &BatchId) -> Result<RevertResult, UndoError> {
        let mut log = self.repository.load().await?;
        let entries = log
            .entries(batch_id)
            .ok_or_else(|| UndoError::NotFound("Undo with that ID not found".into()))?
            .to_vec();

        let compensating = try_join_all(entries.iter().map(|entry| self.compensate(entry))).await?;

        if !compensating.is_empty() {
            let results = self.store.bulk_write(compensating).await?;
            if let Some(rejected) = results.iter().find(|result| !result.is_ok()) {
                warn!("revert of batch {batch_id} rejected at commit for {}", rejected.id());
                return Err(commit_error(rejected));
            }
        }

        log.forget(batch_id);
        self.repository.save(log).await?;
        info!("reverted batch {batch_id} ({} document(s))", entries.len());

        Ok(RevertResult {
            id: batch_id.clone(),
            ok: true,
        })
    }

    /// Revision the document currently holds, per the leaf policy.
    async fn current_rev(&self, id: &DocId) -> Result<Rev, UndoError> {
        let leaves = self.store.leaves(id).await?;
        if self.leaf_policy == LeafPolicy::Reject && leaves.len() > 1 {
            return Err(UndoError::Conflict(format!(
                "{id} has {} unresolved conflicting revisions",
                leaves.len()
            )));
        }

        leaves
            .into_iter()
            .next()
            .and_then(|doc| doc.rev)
            .ok_or_else(|| UndoError::NotFound(format!("{id} has no revisions")))
    }

    /// The document that undoes `entry`, stamped to replace `entry.new_rev`.
    async fn compensate(&self, entry: &UndoEntry) -> Result<Document, UndoError> {
        let current = self.current_rev(&entry.id).await?;
        if current != entry.new_rev {
            debug!(
                "{} moved from {} to {current} since the batch",
                entry.id, entry.new_rev
            );
            return Err(UndoError::Conflict(
                "The document has changed since this undo id was issued".into(),
            ));
        }

        let mut doc = match &entry.old_rev {
            Some(old_rev) => {
                self.store
                    .get(&entry.id, RevSelector::At(old_rev.clone()))
                    .await?
            }
            None => Document::tombstone(entry.id.clone()),
        };
        doc.rev = Some(entry.new_rev.clone());
        Ok(doc)
    }
}

fn commit_error(rejected: &WriteResult) -> UndoError {
    match rejected.error() {
        Some(error) if error.is_conflict() => UndoError::Conflict(format!(
            "{} changed before the revert was committed",
            rejected.id()
        )),
        Some(error) => error.clone().into(),
        None => UndoError::Conflict(format!("{} was not reverted", rejected.id())),
    }
}
