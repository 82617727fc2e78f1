//! Error types for legion-state

use thiserror::Error;

use crate::resource::ResourceKind;

/// Errors returned by a [`ResourceStore`](crate::ResourceStore).
///
/// Absence on reads is not an error (`get` returns `Ok(None)`); `NotFound`
/// is only produced by writes against an object that does not exist.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// Write targeted an object that does not exist
    #[error("{kind} {namespace}/{name} not found")]
    NotFound {
        kind: ResourceKind,
        namespace: String,
        name: String,
    },

    /// Create targeted an object that already exists
    #[error("{kind} {namespace}/{name} already exists")]
    AlreadyExists {
        kind: ResourceKind,
        namespace: String,
        name: String,
    },

    /// Update carried a stale resource version
    #[error("{kind} {namespace}/{name} was modified: expected version {expected}, stored {actual}")]
    Conflict {
        kind: ResourceKind,
        namespace: String,
        name: String,
        expected: u64,
        actual: u64,
    },

    /// Backend temporarily unavailable (I/O, timeouts)
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// Object rejected by the store
    #[error("invalid object: {0}")]
    InvalidObject(String),
}

impl StorageError {
    pub fn not_found(kind: ResourceKind, namespace: &str, name: &str) -> Self {
        StorageError::NotFound {
            kind,
            namespace: namespace.to_string(),
            name: name.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound { .. })
    }

    /// Stale write or lost create race; the caller should refetch and retry.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            StorageError::Conflict { .. } | StorageError::AlreadyExists { .. }
        )
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, StorageError::Unavailable(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflict_display_names_versions() {
        let err = StorageError::Conflict {
            kind: ResourceKind::ModelRoute,
            namespace: "team-a".to_string(),
            name: "wine".to_string(),
            expected: 3,
            actual: 5,
        };
        let msg = err.to_string();
        assert!(msg.contains("ModelRoute team-a/wine"));
        assert!(msg.contains("expected version 3"));
        assert!(err.is_conflict());
        assert!(!err.is_transient());
    }

    #[test]
    fn already_exists_counts_as_conflict() {
        let err = StorageError::AlreadyExists {
            kind: ResourceKind::AuthPolicy,
            namespace: "ns".to_string(),
            name: "m".to_string(),
        };
        assert!(err.is_conflict());
        assert!(!err.is_not_found());
    }

    #[test]
    fn not_found_helper() {
        let err = StorageError::not_found(ResourceKind::Workload, "legion", "rev-1-deployment");
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "Workload legion/rev-1-deployment not found");
    }
}
