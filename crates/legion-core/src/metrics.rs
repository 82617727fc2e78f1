//! Atomic counters for the reconciler.
//!
//! Counters are bumped silently at the call site. [`Metrics::flush`] emits
//! the current values as one `tracing::info!` event; `legiond` calls it on
//! shutdown.

use std::sync::atomic::{AtomicU64, Ordering};

/// Lock-free counters owned by one reconciler (share via `Arc`).
#[derive(Debug)]
pub struct Metrics {
    reconciles: AtomicU64,
    requeues: AtomicU64,
    resources_created: AtomicU64,
    resources_updated: AtomicU64,
    status_writes: AtomicU64,
    errors: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            reconciles: AtomicU64::new(0),
            requeues: AtomicU64::new(0),
            resources_created: AtomicU64::new(0),
            resources_updated: AtomicU64::new(0),
            status_writes: AtomicU64::new(0),
            errors: AtomicU64::new(0),
        }
    }

    pub fn inc_reconciles(&self) {
        self.reconciles.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "reconciles", "counter incremented");
    }

    pub fn inc_requeues(&self) {
        self.requeues.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "requeues", "counter incremented");
    }

    pub fn inc_resources_created(&self) {
        self.resources_created.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "resources_created", "counter incremented");
    }

    pub fn inc_resources_updated(&self) {
        self.resources_updated.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "resources_updated", "counter incremented");
    }

    pub fn inc_status_writes(&self) {
        self.status_writes.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "status_writes", "counter incremented");
    }

    pub fn inc_errors(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "errors", "counter incremented");
    }

    /// Emit all current counter values as a single `info!` event.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            reconciles = self.reconciles(),
            requeues = self.requeues(),
            resources_created = self.resources_created(),
            resources_updated = self.resources_updated(),
            status_writes = self.status_writes(),
            errors = self.errors(),
        );
    }

    pub fn reconciles(&self) -> u64 {
        self.reconciles.load(Ordering::Relaxed)
    }

    pub fn requeues(&self) -> u64 {
        self.requeues.load(Ordering::Relaxed)
    }

    pub fn resources_created(&self) -> u64 {
        self.resources_created.load(Ordering::Relaxed)
    }

    pub fn resources_updated(&self) -> u64 {
        self.resources_updated.load(Ordering::Relaxed)
    }

    pub fn status_writes(&self) -> u64 {
        self.status_writes.load(Ordering::Relaxed)
    }

    pub fn errors(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }
}
