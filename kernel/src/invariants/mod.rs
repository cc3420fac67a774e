// Undo Log Invariants
//
// Invariants are pure rules the undo log must satisfy before it is
// persisted. Violations are detected *before* a bad log is written.

use std::collections::BTreeSet;

use crate::log::UndoLog;

/// Result of invariant evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvariantResult {
    Pass,
    Fail(String),
}

/// Trait implemented by all log invariants.
///
/// Invariants must be:
/// - Pure
/// - Deterministic
/// - Side-effect free
pub trait LogInvariant: Send + Sync {
    fn name(&self) -> &'static str;

    fn validate(&self, log: &UndoLog, limit: usize) -> InvariantResult;
}

/// Every batch in the history has entries, and every entry set is in the history.
pub struct HistoryMatchesUndos;

impl LogInvariant for HistoryMatchesUndos {
    fn name(&self) -> &'static str {
        "history-matches-undos"
    }

    fn validate(&self, log: &UndoLog, _limit: usize) -> InvariantResult {
        let history: BTreeSet<_> = log.history().collect();
        let undos: BTreeSet<_> = log.undo_ids().collect();
        if history == undos {
            InvariantResult::Pass
        } else {
            InvariantResult::Fail(format!(
                "{} history ids vs {} undo entries",
                history.len(),
                undos.len()
            ))
        }
    }
}

pub struct HistoryWithinLimit;

impl LogInvariant for HistoryWithinLimit {
    fn name(&self) -> &'static str {
        "history-within-limit"
    }

    fn validate(&self, log: &UndoLog, limit: usize) -> InvariantResult {
        if log.len() <= limit {
            InvariantResult::Pass
        } else {
            InvariantResult::Fail(format!("{} batches retained, limit is {limit}", log.len()))
        }
    }
}

pub struct UniqueHistory;

impl LogInvariant for UniqueHistory {
    fn name(&self) -> &'static str {
        "unique-history"
    }

    fn validate(&self, log: &UndoLog, _limit: usize) -> InvariantResult {
        let distinct: BTreeSet<_> = log.history().collect();
        if distinct.len() == log.len() {
            InvariantResult::Pass
        } else {
            InvariantResult::Fail("batch id recorded twice".into())
        }
    }
}

/// Invariant engine that evaluates a set of invariants.
#[derive(Default)]
pub struct InvariantEngine {
    invariants: Vec<Box<dyn LogInvariant>>,
}

impl InvariantEngine {
    /// Create an engine with no invariants.
    pub fn new() -> Self {
        Self {
            invariants: Vec::new(),
        }
    }

    /// Engine with the built-in log invariants registered.
    pub fn standard() -> Self {
        let mut engine = Self::new();
        engine.register(HistoryMatchesUndos);
        engine.register(HistoryWithinLimit);
        engine.register(UniqueHistory);
        engine
    }

    /// Register an invariant.
    pub fn register<I: LogInvariant + 'static>(&mut self, invariant: I) {
        self.invariants.push(Box::new(invariant));
    }

    /// Evaluate all invariants.
    ///
    /// Stops at the first failure.
    pub fn evaluate(&self, log: &UndoLog, limit: usize) -> Result<(), InvariantViolation> {
        for invariant in &self.invariants {
            match invariant.validate(log, limit) {
                InvariantResult::Pass => continue,
                InvariantResult::Fail(reason) => {
                    return Err(InvariantViolation {
                        invariant: invariant.name(),
                        reason,
                    })
                }
            }
        }
        Ok(())
    }
}

/// Returned when an invariant is violated.
#[derive(Debug, thiserror::Error)]
#[error("invariant `{invariant}` violated: {reason}")]
pub struct InvariantViolation {
    pub invariant: &'static str,
    pub reason: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::{BatchId, UndoEntry};
    use crate::store::{DocId, Rev};

    fn entries() -> Vec<UndoEntry> {
        vec![UndoEntry {
            id: DocId::from("doc"),
            old_rev: None,
            new_rev: Rev::from("1-a"),
        }]
    }

    #[test]
    fn standard_invariants_accept_consistent_log() {
        let mut log = UndoLog::new();
        log.record(BatchId::generate(), entries());
        log.record(BatchId::generate(), entries());

        InvariantEngine::standard().evaluate(&log, 2).unwrap();
    }

    #[test]
    fn over_limit_log_is_rejected() {
        let mut log = UndoLog::new();
        log.record(BatchId::generate(), entries());
        log.record(BatchId::generate(), entries());

        let err = InvariantEngine::standard().evaluate(&log, 1).unwrap_err();

        assert!(err.to_string().contains("history-within-limit"));
    }

    #[test]
    fn duplicate_history_is_rejected() {
        let mut log = UndoLog::new();
        let id = BatchId::generate();
        log.record(id.clone(), entries());
        log.record(id, entries());

        let err = InvariantEngine::standard().evaluate(&log, 10).unwrap_err();

        assert_eq!(err.invariant, "unique-history");
    }

    struct NeverEmpty;

    impl LogInvariant for NeverEmpty {
        fn name(&self) -> &'static str {
            "never-empty"
        }

        fn validate(&self, log: &UndoLog, _limit: usize) -> InvariantResult {
            if log.is_empty() {
                InvariantResult::Fail("empty log".into())
            } else {
                InvariantResult::Pass
            }
        }
    }

    #[test]
    fn custom_invariants_can_be_registered() {
        let mut engine = InvariantEngine::new();
        engine.register(NeverEmpty);

        let err = engine.evaluate(&UndoLog::new(), 10).unwrap_err();

        assert!(err.to_string().contains("never-empty"));
    }
}
