//! Domain models for the deployment operator.
//!
//! Canonical definitions for the core entities:
//! - `ModelDeployment`: desired state of a served model, plus its status
//! - `DesiredObject`: a dependent resource the builder wants to exist
//! - `RevisionHandle`: latest ready revision of the serving resource
//! - `ContentHash`: digest used for drift detection

pub mod dependents;
pub mod deployment;
pub mod digest;
pub mod error;
pub mod revision;

// Re-export main types and errors
pub use dependents::{
    AuthPolicySpec, DependentResource, DesiredObject, ModelRouteSpec, ServingConfigurationSpec,
    ServingConfigurationStatus, WorkloadStatus,
};
pub use deployment::{
    ModelDeployment, ModelDeploymentSpec, ModelDeploymentStatus, Phase, ResourceRequirements,
};
pub use digest::{ContentHash, HASH_ANNOTATION};
pub use error::{ReconcileError, Result, ValidationError};
pub use revision::RevisionHandle;
