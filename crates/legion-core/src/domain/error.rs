//! Domain-level error taxonomy for the reconciliation engine.

use legion_state::StorageError;

/// Structural problems in a `ModelDeployment` spec.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("{field} must not be empty")]
    Empty { field: &'static str },

    #[error("{field} must not be negative, got {value}")]
    Negative { field: &'static str, value: i32 },

    #[error("maxReplicas must be at least 1, got {0}")]
    MaxReplicasTooLow(i32),

    #[error("minReplicas ({min}) exceeds maxReplicas ({max})")]
    ReplicaBounds { min: i32, max: i32 },
}

/// Reconciliation errors.
///
/// Benign absence never reaches this type: reads return `Option` and the
/// reconciler interprets `None` as "create" or "already gone".
#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    /// Stale write or lost create race; refetch and rerun the whole cycle.
    #[error("conflict: {0}")]
    Conflict(StorageError),

    /// Store temporarily unavailable.
    #[error("transient storage failure: {0}")]
    Transient(StorageError),

    /// Programming error, e.g. an access policy built without a revision.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    #[error("malformed resource: {0}")]
    MalformedResource(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("storage error: {0}")]
    Storage(StorageError),
}

impl From<StorageError> for ReconcileError {
    fn from(err: StorageError) -> Self {
        if err.is_conflict() {
            ReconcileError::Conflict(err)
        } else if err.is_transient() {
            ReconcileError::Transient(err)
        } else {
            ReconcileError::Storage(err)
        }
    }
}

impl ReconcileError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, ReconcileError::Conflict(_))
    }

    /// Store `NotFound` surfaced from a write.
    pub fn is_not_found(&self) -> bool {
        matches!(self, ReconcileError::Storage(e) if e.is_not_found())
    }
}

/// Result type for reconciliation operations.
pub type Result<T> = std::result::Result<T, ReconcileError>;
