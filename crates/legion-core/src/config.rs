//! Operator configuration.
//!
//! Values are passed explicitly into the reconciler and scheduler
//! constructors; nothing here is read from process-wide state.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Fixed delay before re-checking a deployment that is still converging.
pub const DEFAULT_REQUEUE_DELAY_SECS: u64 = 10;

pub const DEFAULT_CLUSTER_DOMAIN: &str = "cluster.local";
pub const DEFAULT_JWT_ISSUER: &str = "testing@secure.istio.io";
pub const DEFAULT_JWKS_URI: &str =
    "https://raw.githubusercontent.com/istio/istio/release-1.2/security/tools/jwt/samples/jwks.json";

/// Settings consumed by the reconciler and the desired-state builder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OperatorConfig {
    /// Delay returned with every "still converging" outcome
    pub requeue_delay_secs: u64,
    /// Namespace holding workload instances; `None` means the deployment's own
    pub workload_namespace: Option<String>,
    /// Suffix of in-cluster service addresses
    pub cluster_domain: String,
    /// Default for route feedback capture
    pub feedback_enabled: bool,
    pub jwt_issuer: String,
    pub jwks_uri: String,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            requeue_delay_secs: DEFAULT_REQUEUE_DELAY_SECS,
            workload_namespace: None,
            cluster_domain: DEFAULT_CLUSTER_DOMAIN.to_string(),
            feedback_enabled: false,
            jwt_issuer: DEFAULT_JWT_ISSUER.to_string(),
            jwks_uri: DEFAULT_JWKS_URI.to_string(),
        }
    }
}

impl OperatorConfig {
    /// Never zero, so a converging deployment cannot spin.
    pub fn requeue_delay(&self) -> Duration {
        Duration::from_secs(self.requeue_delay_secs.max(1))
    }

    /// Namespace to look up workloads for a deployment living in `namespace`.
    pub fn workload_namespace_for<'a>(&'a self, namespace: &'a str) -> &'a str {
        self.workload_namespace.as_deref().unwrap_or(namespace)
    }
}

/// Settings for the requeue scheduler's work queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Upper bound on cycles running at once (distinct keys only)
    pub max_concurrent_reconciles: usize,
    /// Delay before rerunning a cycle that hit a stale write
    pub conflict_retry_ms: u64,
    /// First backoff step after a failed cycle
    pub error_backoff_base_ms: u64,
    pub error_backoff_max_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_reconciles: 4,
            conflict_retry_ms: 500,
            error_backoff_base_ms: 1_000,
            error_backoff_max_ms: 300_000,
        }
    }
}

impl SchedulerConfig {
    pub fn conflict_retry(&self) -> Duration {
        Duration::from_millis(self.conflict_retry_ms)
    }

    /// Backoff after `failures` consecutive failed cycles (1-based), doubling
    /// from the base and capped at the max.
    pub fn error_backoff(&self, failures: u32) -> Duration {
        let exponent = failures.saturating_sub(1).min(32);
        let millis = self
            .error_backoff_base_ms
            .saturating_mul(1u64 << exponent)
            .min(self.error_backoff_max_ms);
        Duration::from_millis(millis)
    }
}
