// Undo Log Repository
//
// Loads and persists the undo log document through the store. Every
// call takes or returns the aggregate; nothing is cached here.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info};

use super::{trim_history, UndoLog, UNDO_LOG_ID};
use crate::error::UndoError;
use crate::invariants::InvariantEngine;
use crate::store::{DocId, Document, DocumentStore, Rev, RevSelector, StoreError, WriteResult};

/// Persistence of the undo log.
///
/// Saves carry the aggregate's revision, so a stale log is rejected by
/// the store's own concurrency check. Conflicts are returned, never retried.
pub struct LogRepository<S> {
    store: Arc<S>,
    limit: usize,
    invariants: Arc<InvariantEngine>,
}

impl<S> Clone for LogRepository<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            limit: self.limit,
            invariants: Arc::clone(&self.invariants),
        }
    }
}

impl<S: DocumentStore> LogRepository<S> {
    pub fn new(store: Arc<S>, limit: usize) -> Self {
        Self::with_invariants(store, limit, InvariantEngine::standard())
    }

    pub fn with_invariants(store: Arc<S>, limit: usize, invariants: InvariantEngine) -> Self {
        Self {
            store,
            limit,
            invariants: Arc::new(invariants),
        }
    }

    fn log_id() -> DocId {
        DocId::from(UNDO_LOG_ID)
    }

    /// Current log, or an empty unsaved log when none exists.
    pub async fn load(&self) -> Result<UndoLog, UndoError> {
        match self.store.get(&Self::log_id(), RevSelector::Latest).await {
            Ok(doc) => {
                let mut log: UndoLog = serde_json::from_value(Value::Object(doc.body))?;
                let dropped = log.reconcile();
                if dropped > 0 {
                    debug!("dropped {dropped} dangling id(s) from the undo log");
                }
                Ok(log.with_rev(doc.rev))
            }
            Err(err) if err.is_not_found() => Ok(UndoLog::new()),
            Err(err) => Err(err.into()),
        }
    }

    /// Trim, check and persist the log, returning it at its new revision.
    pub async fn save(&self, mut log: UndoLog) -> Result<UndoLog, UndoError> {
        trim_history(&mut log, self.limit);
        self.invariants.evaluate(&log, self.limit)?;

        let body = match serde_json::to_value(&log)? {
            Value::Object(body) => body,
            _ => {
                let err = StoreError::new(500, "internal", "undo log must encode as an object");
                return Err(err.into());
            }
        };
        let doc = Document {
            id: Self::log_id(),
            rev: log.rev().cloned(),
            deleted: false,
            body,
        };

        let rev = self.write_log(doc).await?;
        debug!("saved undo log at {rev} with {} batch(es)", log.len());
        Ok(log.with_rev(Some(rev)))
    }

    /// Tombstone the log. Clearing an absent log succeeds.
    pub async fn clear(&self) -> Result<(), UndoError> {
        let doc = match self.store.get(&Self::log_id(), RevSelector::Latest).await {
            Ok(doc) => doc,
            Err(err) if err.is_not_found() => {
                debug!("undo log already absent");
                return Ok(());
            }
            Err(err) => return Err(err.into()),
        };

        let mut tombstone = Document::tombstone(doc.id);
        tombstone.rev = doc.rev;
        self.write_log(tombstone).await?;
        info!("undo log cleared");
        Ok(())
    }

    async fn write_log(&self, doc: Document) -> Result<Rev, UndoError> {
        let mut results = self.store.bulk_write(vec![doc]).await?;
        match results.pop() {
            Some(WriteResult::Ok { rev, .. }) => Ok(rev),
            Some(WriteResult::Error { error, .. }) => Err(error.into()),
            None => Err(StoreError::new(500, "internal", "no write result for undo log").into()),
        }
    }
}
