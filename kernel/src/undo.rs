// Undo-Enabled Store
//
// Decorator composing a document store with the batch recorder and the
// reverter. Writes made through it are recorded; writes made directly
// against the inner store are not.

use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::info;
use uuid::Uuid;

use crate::config::UndoConfig;
use crate::error::UndoError;
use crate::log::{BatchId, LogRepository};
use crate::recorder::{BatchRecorder, BatchResult};
use crate::revert::{RevertResult, Reverter};
use crate::store::{DocId, Document, DocumentStore, Rev, RevSelector, StoreError, WriteResult};

/// A document store whose writes can be undone.
pub struct UndoStore<S> {
    store: Arc<S>,
    repository: LogRepository<S>,
    recorder: BatchRecorder<S>,
    reverter: Reverter<S>,
}

impl<S> Clone for UndoStore<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            repository: self.repository.clone(),
            recorder: self.recorder.clone(),
            reverter: self.reverter.clone(),
        }
    }
}

/// Attach undo support to any document store.
pub trait EnableUndo: DocumentStore + Sized {
    fn enable_undo(self, config: UndoConfig) -> Result<UndoStore<Self>, UndoError> {
        UndoStore::new(Arc::new(self), config)
    }
}

impl<S: DocumentStore> EnableUndo for S {}

impl<S: DocumentStore> UndoStore<S> {
    pub fn new(store: Arc<S>, config: UndoConfig) -> Result<Self, UndoError> {
        config.validate()?;

        let repository = LogRepository::new(Arc::clone(&store), config.limit);
        let recorder = BatchRecorder::new(repository.clone());
        let reverter = Reverter::new(Arc::clone(&store), repository.clone(), config.leaf_policy);
        info!("undo enabled, keeping {} batch(es)", config.limit);

        Ok(Self {
            store,
            repository,
            recorder,
            reverter,
        })
    }

    /// The wrapped store. Writes made through it are not recorded.
    pub fn inner(&self) -> &Arc<S> {
        &self.store
    }

    /// Write `docs` as one batch; every result carries the batch's undo id.
    pub async fn bulk_write(&self, docs: Vec<Document>) -> Result<Vec<BatchResult>, UndoError> {
        let store = Arc::clone(&self.store);
        let requested = docs.clone();
        self.recorder
            .record_batch(&requested, move || async move { store.bulk_write(docs).await })
            .await
    }

    /// Write a single document, failing when the store rejects it.
    pub async fn put(&self, doc: Document) -> Result<BatchResult, UndoError> {
        let mut results = self.bulk_write(vec![doc]).await?;
        let result = results
            .pop()
            .ok_or_else(|| StoreError::new(500, "internal", "store returned no write result"))?;
        match &result.result {
            WriteResult::Ok { .. } => Ok(result),
            WriteResult::Error { error, .. } => Err(error.clone().into()),
        }
    }

    /// Create a document under a generated id.
    pub async fn post(&self, body: Map<String, Value>) -> Result<BatchResult, UndoError> {
        self.put(Document::new(Uuid::new_v4().to_string(), body)).await
    }

    /// Delete the document at `rev`.
    pub async fn remove(&self, id: DocId, rev: Rev) -> Result<BatchResult, UndoError> {
        self.put(Document::tombstone(id).with_rev(rev)).await
    }

    pub async fn get(&self, id: &DocId) -> Result<Document, UndoError> {
        Ok(self.store.get(id, RevSelector::Latest).await?)
    }

    /// Revert a recorded batch.
    pub async fn undo(&self, batch_id: &BatchId) -> Result<RevertResult, UndoError> {
        self.reverter.revert(batch_id).await
    }

    /// Forget every recorded batch.
    pub async fn clear_undo(&self) -> Result<(), UndoError> {
        self.repository.clear().await
    }

    /// Batch ids that can still be reverted, oldest first.
    pub async fn history(&self) -> Result<Vec<BatchId>, UndoError> {
        let log = self.repository.load().await?;
        Ok(log.history().cloned().collect())
    }
}
