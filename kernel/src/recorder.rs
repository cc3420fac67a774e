// Batch Recorder
//
// Runs a caller's batch write, then records how each successfully
// written document changed so the batch can be reverted later.

use std::future::Future;

use serde::Serialize;
use tracing::{debug, warn};

use crate::error::UndoError;
use crate::log::{BatchId, LogRepository, UndoEntry};
use crate::store::{Document, DocumentStore, StoreError, WriteResult};

/// A store write result tagged with the batch it belongs to.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchResult {
    #[serde(flatten)]
    pub result: WriteResult,
    pub undo_id: BatchId,
}

pub struct BatchRecorder<S> {
    repository: LogRepository<S>,
}

impl<S> Clone for BatchRecorder<S> {
    fn clone(&self) -> Self {
        Self {
            repository: self.repository.clone(),
        }
    }
}

/// Undo entries for the successful writes of a batch.
///
/// `requested[i]` is the document that produced `results[i]`; its revision
/// is the one the document held before the write.
pub fn diff(requested: &[Document], results: &[WriteResult]) -> Vec<UndoEntry> {
    requested
        .iter()
        .zip(results)
        .filter_map(|(doc, result)| match result {
            WriteResult::Ok { id, rev } => Some(UndoEntry {
                id: id.clone(),
                old_rev: doc.rev.clone(),
                new_rev: rev.clone(),
            }),
            WriteResult::Error { .. } => None,
        })
        .collect()
}

impl<S: DocumentStore> BatchRecorder<S> {
    pub fn new(repository: LogRepository<S>) -> Self {
        Self { repository }
    }

    /// Execute `perform_write` and record the resulting batch.
    ///
    /// A failed write is returned as is and nothing is recorded. Once the
    /// write succeeds it stays committed even if recording fails; see
    /// [`UndoError::Unrecorded`].
    pub async fn record_batch<F, Fut>(
        &self,
        requested: &[Document],
        perform_write: F,
    ) -> Result<Vec<BatchResult>, UndoError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<WriteResult>, StoreError>>,
    {
        let results = perform_write().await?;
        self.record(requested, results).await
    }

    /// Record an already executed batch under a fresh batch id.
    pub async fn record(
        &self,
        requested: &[Document],
        results: Vec<WriteResult>,
    ) -> Result<Vec<BatchResult>, UndoError> {
        let batch_id = BatchId::generate();
        let entries = diff(requested, &results);
        let touched = entries.len();

        if let Err(source) = self.append(batch_id.clone(), entries).await {
            warn!("batch {batch_id} was written but not recorded: {source}");
            return Err(UndoError::Unrecorded {
                results,
                source: Box::new(source),
            });
        }

        debug!(
            "recorded batch {batch_id}: {touched} of {} document(s) written",
            results.len()
        );
        Ok(results
            .into_iter()
            .map(|result| BatchResult {
                result,
                undo_id: batch_id.clone(),
            })
            .collect())
    }

    async fn append(&self, batch_id: BatchId, entries: Vec<UndoEntry>) -> Result<(), UndoError> {
        let mut log = self.repository.load().await?;
        log.record(batch_id, entries);
        self.repository.save(log).await?;
        Ok(())
    }
}
