//! Structured lifecycle events for reconcile cycles.
//!
//! Every cycle runs inside a `legion.reconcile` span carrying the
//! deployment's namespace and name; the `emit_*` helpers below log the
//! points where the cycle touched the store.

use legion_state::{ObjectKey, ResourceKind};
use tracing::{debug, info, warn};

/// Span a single reconcile cycle is instrumented with.
///
/// Returned un-entered: cycles are async, so attach it with
/// `tracing::Instrument::instrument` rather than holding an entered guard
/// across `.await`.
pub fn reconcile_span(key: &ObjectKey) -> tracing::Span {
    tracing::info_span!(
        "legion.reconcile",
        namespace = %key.namespace,
        name = %key.name,
    )
}

pub fn emit_resource_created(kind: ResourceKind, key: &ObjectKey, hash: &str) {
    info!(event = "resource.created", kind = %kind, key = %key, hash = %hash);
}

pub fn emit_resource_updated(kind: ResourceKind, key: &ObjectKey, hash: &str) {
    info!(event = "resource.updated", kind = %kind, key = %key, hash = %hash);
}

pub fn emit_resource_unchanged(kind: ResourceKind, key: &ObjectKey) {
    debug!(event = "resource.unchanged", kind = %kind, key = %key);
}

/// Emit event: deployment status written with its new phase.
pub fn emit_status_persisted(key: &ObjectKey, phase: &str) {
    info!(event = "status.persisted", key = %key, phase = %phase);
}

pub fn emit_requeue(key: &ObjectKey, stage: &str, delay_ms: u64) {
    info!(event = "reconcile.requeue", key = %key, stage = %stage, delay_ms = delay_ms);
}

/// Emit event: cycle aborted (warning level).
pub fn emit_reconcile_error(key: &ObjectKey, error: &dyn std::fmt::Display) {
    warn!(event = "reconcile.error", key = %key, error = %error);
}
