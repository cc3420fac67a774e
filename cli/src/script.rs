// Scenario Scripts
//
// A script is a JSON array of steps run in order against one
// undo-enabled store. Step failures are reported, not fatal.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use rewind_kernel::store::{DocId, Document, DocumentStore, StoreError};
use rewind_kernel::{BatchId, BatchResult, UndoError, UndoStore};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    /// Write a document as given.
    Put(Document),
    /// Write a document on top of its current revision.
    Update(Document),
    Bulk(Vec<Document>),
    /// Delete the current revision of a document.
    Remove(DocId),
    /// Revert the batch written by an earlier step (zero-based index).
    Undo(usize),
    Clear,
    Get(DocId),
    History,
}

impl Step {
    fn name(&self) -> &'static str {
        match self {
            Step::Put(_) => "put",
            Step::Update(_) => "update",
            Step::Bulk(_) => "bulk",
            Step::Remove(_) => "remove",
            Step::Undo(_) => "undo",
            Step::Clear => "clear",
            Step::Get(_) => "get",
            Step::History => "history",
        }
    }
}

#[derive(Debug, Serialize)]
pub struct StepOutput {
    pub step: usize,
    pub op: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<StoreError>,
}

/// Runs steps and remembers the undo id each step produced.
pub struct Runner<S> {
    db: UndoStore<S>,
    undo_ids: Vec<Option<BatchId>>,
}

impl<S: DocumentStore> Runner<S> {
    pub fn new(db: UndoStore<S>) -> Self {
        Self {
            db,
            undo_ids: Vec::new(),
        }
    }

    pub async fn run(&mut self, steps: Vec<Step>) -> Vec<StepOutput> {
        let mut outputs = Vec::with_capacity(steps.len());
        for (index, step) in steps.into_iter().enumerate() {
            let op = step.name();
            let (undo_id, result, error) = match self.execute(step).await {
                Ok((undo_id, value)) => (undo_id, Some(value), None),
                Err(err) => (None, None, Some(error_response(&err))),
            };
            self.undo_ids.push(undo_id);
            outputs.push(StepOutput {
                step: index,
                op,
                result,
                error,
            });
        }
        outputs
    }

    async fn execute(&self, step: Step) -> Result<(Option<BatchId>, Value)> {
        match step {
            Step::Put(doc) => tagged(self.db.put(doc).await?),
            Step::Update(mut doc) => {
                let current = self.db.get(&doc.id).await?;
                doc.rev = current.rev;
                tagged(self.db.put(doc).await?)
            }
            Step::Bulk(docs) => {
                let results = self.db.bulk_write(docs).await?;
                let undo_id = results.first().map(|r| r.undo_id.clone());
                Ok((undo_id, encode(results)?))
            }
            Step::Remove(id) => {
                let current = self.db.get(&id).await?;
                let rev = current
                    .rev
                    .ok_or_else(|| UndoError::NotFound(format!("{id} has no revision")))?;
                tagged(self.db.remove(id, rev).await?)
            }
            Step::Undo(target) => {
                let batch_id = self
                    .undo_ids
                    .get(target)
                    .cloned()
                    .flatten()
                    .ok_or_else(|| {
                        UndoError::NotFound(format!("step {target} recorded no batch"))
                    })?;
                let result = self.db.undo(&batch_id).await?;
                Ok((None, encode(result)?))
            }
            Step::Clear => {
                self.db.clear_undo().await?;
                Ok((None, Value::Bool(true)))
            }
            Step::Get(id) => Ok((None, encode(self.db.get(&id).await?)?)),
            Step::History => Ok((None, encode(self.db.history().await?)?)),
        }
    }
}

fn tagged(result: BatchResult) -> Result<(Option<BatchId>, Value)> {
    let undo_id = result.undo_id.clone();
    Ok((Some(undo_id), encode(result)?))
}

fn encode<T: Serialize>(value: T) -> Result<Value> {
    serde_json::to_value(value).context("failed to encode step output")
}

/// Undo errors keep their own shape; anything else is an internal failure.
fn error_response(err: &anyhow::Error) -> StoreError {
    match err.downcast_ref::<UndoError>() {
        Some(err) => err.to_response(),
        None => StoreError::new(500, "internal", format!("{err:#}")),
    }
}
