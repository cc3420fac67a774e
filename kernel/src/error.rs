// Undo Errors
//
// Failures surfaced by the undo layer. Every variant maps onto the
// store's own `{ status, error, reason }` shape so callers can handle
// both uniformly.

use crate::invariants::InvariantViolation;
use crate::store::{StoreError, WriteResult};

#[derive(Debug, thiserror::Error)]
pub enum UndoError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("invalid configuration: {0}")]
    Validation(String),

    #[error("store error: {0}")]
    Store(StoreError),

    #[error("malformed undo log: {0}")]
    Corrupt(#[from] serde_json::Error),

    #[error("undo log rejected: {0}")]
    Invariant(#[from] InvariantViolation),

    /// The batch was written but its undo record could not be saved.
    ///
    /// `results` are the untagged write results; pass them back to
    /// `BatchRecorder::record` to retry recording without rewriting.
    #[error("batch written but not recorded: {source}")]
    Unrecorded {
        results: Vec<WriteResult>,
        #[source]
        source: Box<UndoError>,
    },
}

impl From<StoreError> for UndoError {
    fn from(err: StoreError) -> Self {
        if err.is_not_found() {
            UndoError::NotFound(err.reason)
        } else if err.is_conflict() {
            UndoError::Conflict(err.reason)
        } else {
            UndoError::Store(err)
        }
    }
}

impl UndoError {
    pub fn status(&self) -> u16 {
        match self {
            UndoError::NotFound(_) => 404,
            UndoError::Conflict(_) => 409,
            UndoError::Validation(_) => 400,
            UndoError::Store(err) => err.status,
            UndoError::Corrupt(_) | UndoError::Invariant(_) => 500,
            UndoError::Unrecorded { source, .. } => source.status(),
        }
    }

    /// Short machine-readable code.
    pub fn code(&self) -> &str {
        match self {
            UndoError::NotFound(_) => "not_found",
            UndoError::Conflict(_) => "conflict",
            UndoError::Validation(_) => "bad_request",
            UndoError::Store(err) => &err.error,
            UndoError::Corrupt(_) | UndoError::Invariant(_) => "internal",
            UndoError::Unrecorded { source, .. } => source.code(),
        }
    }

    pub fn reason(&self) -> String {
        match self {
            UndoError::NotFound(reason)
            | UndoError::Conflict(reason)
            | UndoError::Validation(reason) => reason.clone(),
            UndoError::Store(err) => err.reason.clone(),
            other => other.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == 404
    }

    pub fn is_conflict(&self) -> bool {
        self.status() == 409
    }

    /// The error in the store's response shape.
    pub fn to_response(&self) -> StoreError {
        StoreError::new(self.status(), self.code(), self.reason())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_errors_map_onto_taxonomy() {
        let err = UndoError::from(StoreError::not_found("missing"));
        assert!(matches!(err, UndoError::NotFound(ref r) if r == "missing"));

        let err = UndoError::from(StoreError::conflict("Document update conflict"));
        assert_eq!(err.status(), 409);

        let err = UndoError::from(StoreError::new(503, "unavailable", "offline"));
        assert!(matches!(err, UndoError::Store(_)));
        assert_eq!(err.code(), "unavailable");
    }

    #[test]
    fn unrecorded_reports_its_cause() {
        let err = UndoError::Unrecorded {
            results: vec![],
            source: Box::new(UndoError::Conflict("stale undo log".into())),
        };

        let response = err.to_response();
        assert_eq!(response.status, 409);
        assert_eq!(response.error, "conflict");
        assert!(response.reason.contains("stale undo log"));
    }
}
