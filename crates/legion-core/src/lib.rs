//! Legion Core: reconciliation engine for model deployments.
//!
//! Turns a `ModelDeployment` into its dependent resources (serving
//! configuration, route, access policy), keeps them converged through the
//! [`legion_state::ResourceStore`] contract and projects progress back onto
//! the deployment's status.
//!
//! ## Layer 1 - Reconciliation
//!
//! - `builder`: pure desired-state mapping
//! - `domain::digest`: content hashing for drift detection
//! - `status`: pure status projection
//! - `reconciler`: one forward-progress attempt per key
//! - `scheduler`: work queue with single flight and delayed requeue

pub mod builder;
pub mod config;
pub mod domain;
pub mod metrics;
pub mod obs;
pub mod reconciler;
pub mod scheduler;
pub mod status;
pub mod telemetry;

pub use builder::{validate_deployment, DesiredStateBuilder};
pub use config::{OperatorConfig, SchedulerConfig};
pub use domain::{
    ContentHash, DependentResource, DesiredObject, ModelDeployment, ModelDeploymentSpec,
    ModelDeploymentStatus, Phase, ReconcileError, Result, RevisionHandle, ValidationError,
    HASH_ANNOTATION,
};
pub use metrics::Metrics;
pub use reconciler::{Reconcile, ReconcileOutcome, Reconciler, Stage};
pub use scheduler::{key_for_event, RequeueScheduler};
pub use status::{Checkpoint, WorkloadObservation};
pub use telemetry::init_tracing;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
