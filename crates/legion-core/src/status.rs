//! Status projector.
//!
//! Pure function from "how far the cycle got" to the aggregate deployment
//! status. No I/O and no clock: identical inputs give identical output, which
//! is what lets the reconciler skip status writes on a converged cycle.

use crate::domain::{ModelDeploymentStatus, Phase, RevisionHandle};

/// Replica counts read from a workload instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkloadObservation {
    pub name: String,
    pub desired_replicas: i32,
    pub available_replicas: i32,
}

/// Last checkpoint a reconcile cycle reached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Checkpoint {
    /// Serving resource has no ready revision yet
    AwaitingRevision,
    /// Revision is known but its workload instance is not visible
    AwaitingWorkload { revision: RevisionHandle },
    /// Workload instance observed
    WorkloadObserved {
        revision: RevisionHandle,
        workload: WorkloadObservation,
    },
    /// Deployment spec is structurally invalid
    Rejected { reason: String },
}

/// Project `checkpoint` onto a new status.
///
/// Fields the checkpoint says nothing about (replica counts before a
/// workload is seen, the last converged revision) carry over from
/// `previous`. The service address is only present when `Ready`.
pub fn project(
    checkpoint: &Checkpoint,
    namespace: &str,
    previous: &ModelDeploymentStatus,
    cluster_domain: &str,
) -> ModelDeploymentStatus {
    let carried = ModelDeploymentStatus {
        phase: Phase::Processing,
        replicas: previous.replicas,
        available_replicas: previous.available_replicas,
        service_url: None,
        last_revision_name: previous.last_revision_name.clone(),
        deployment: previous.deployment.clone(),
        message: None,
    };

    match checkpoint {
        Checkpoint::AwaitingRevision | Checkpoint::AwaitingWorkload { .. } => carried,
        Checkpoint::WorkloadObserved { revision, workload } => {
            let observed = ModelDeploymentStatus {
                replicas: workload.desired_replicas,
                available_replicas: workload.available_replicas,
                deployment: Some(workload.name.clone()),
                ..carried
            };
            if workload.desired_replicas != workload.available_replicas {
                return observed;
            }
            ModelDeploymentStatus {
                phase: Phase::Ready,
                service_url: Some(revision.service_url(namespace, cluster_domain)),
                last_revision_name: Some(revision.as_str().to_string()),
                ..observed
            }
        }
        Checkpoint::Rejected { reason } => ModelDeploymentStatus {
            phase: Phase::Failed,
            message: Some(reason.clone()),
            ..carried
        },
    }
}
