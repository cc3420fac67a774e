// Undo Configuration
//
// Retention window and revert behaviour for an undo-enabled store.

use serde::{Deserialize, Serialize};

use crate::error::UndoError;

/// Default number of batches kept in the undo history.
pub const DEFAULT_LIMIT: usize = 100;

/// How revert picks the current revision of a document with several leaves.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeafPolicy {
    /// Compare against the winning leaf and ignore the others.
    #[default]
    FirstLeaf,

    /// Refuse to revert documents with unresolved conflicts.
    Reject,
}

/// Configuration loaded from JSON, every field optional.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UndoConfig {
    /// Maximum number of batches retained.
    pub limit: usize,
    pub leaf_policy: LeafPolicy,
}

impl Default for UndoConfig {
    fn default() -> Self {
        Self {
            limit: DEFAULT_LIMIT,
            leaf_policy: LeafPolicy::default(),
        }
    }
}

impl UndoConfig {
    pub fn with_limit(limit: usize) -> Self {
        Self {
            limit,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), UndoError> {
        if self.limit == 0 {
            return Err(UndoError::Validation(
                "limit must retain at least one batch".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_take_defaults() {
        let config: UndoConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, UndoConfig::default());
        assert_eq!(config.limit, 100);

        let config: UndoConfig =
            serde_json::from_str(r#"{ "limit": 5, "leaf_policy": "reject" }"#).unwrap();
        assert_eq!(config.limit, 5);
        assert_eq!(config.leaf_policy, LeafPolicy::Reject);
    }

    #[test]
    fn zero_limit_is_invalid() {
        let err = UndoConfig::with_limit(0).validate().unwrap_err();
        assert_eq!(err.status(), 400);
        assert!(UndoConfig::with_limit(1).validate().is_ok());
    }
}
