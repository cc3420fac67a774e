// History Trimming
//
// Keeps the undo log inside its retention window. Eviction is FIFO:
// the oldest batch goes first, whether or not it was already reverted.

use tracing::debug;

use super::{BatchId, UndoLog};

/// Evict the oldest batches until at most `limit` remain.
///
/// Returns the evicted ids, oldest first.
pub fn trim_history(log: &mut UndoLog, limit: usize) -> Vec<BatchId> {
    let mut evicted = Vec::new();
    while log.len() > limit {
        match log.pop_oldest() {
            Some(id) => evicted.push(id),
            None => break,
        }
    }

    if !evicted.is_empty() {
        debug!("trimmed {} batch(es) from undo history", evicted.len());
    }
    evicted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::UndoEntry;
    use crate::store::{DocId, Rev};

    fn log_with(count: usize) -> (UndoLog, Vec<BatchId>) {
        let mut log = UndoLog::new();
        let ids: Vec<_> = (0..count).map(|_| BatchId::generate()).collect();
        for id in &ids {
            log.record(
                id.clone(),
                vec![UndoEntry {
                    id: DocId::from("doc"),
                    old_rev: None,
                    new_rev: Rev::from("1-a"),
                }],
            );
        }
        (log, ids)
    }

    #[test]
    fn evicts_oldest_first() {
        let (mut log, ids) = log_with(5);

        let evicted = trim_history(&mut log, 3);

        assert_eq!(evicted, ids[..2].to_vec());
        assert_eq!(log.len(), 3);
        assert_eq!(log.history().cloned().collect::<Vec<_>>(), ids[2..].to_vec());
        for id in &evicted {
            assert!(log.entries(id).is_none());
        }
    }

    #[test]
    fn within_limit_is_untouched() {
        let (mut log, _) = log_with(2);

        assert!(trim_history(&mut log, 2).is_empty());
        assert_eq!(log.len(), 2);
    }
}
