//! Reconciler: one forward-progress attempt per invocation.
//!
//! A cycle fetches the deployment, converges the serving resource, waits for
//! its ready revision, converges the route and access policy for that
//! revision, then reads the workload and commits the projected status.
//! Nothing is cached between cycles; every read is a fresh fetch.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use legion_state::{ObjectKey, ResourceKind, ResourceStore, StorageError, StoredObject};
use tracing::{debug, warn, Instrument};

use crate::builder::{validate_deployment, DesiredStateBuilder};
use crate::config::OperatorConfig;
use crate::domain::dependents::decode_status;
use crate::domain::digest::{self, HASH_ANNOTATION};
use crate::domain::{
    DesiredObject, ModelDeployment, ModelDeploymentSpec, ModelDeploymentStatus, Phase,
    ReconcileError, Result, RevisionHandle, ServingConfigurationStatus, WorkloadStatus,
};
use crate::metrics::Metrics;
use crate::obs;
use crate::status::{self, Checkpoint, WorkloadObservation};

/// Where a cycle stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Deployment no longer exists; nothing was written
    Deleted,
    /// Serving resource has not reported a ready revision
    AwaitingRevision,
    /// Route and policy applied; workload not yet at its desired size
    SecondaryConverging,
    Ready,
    /// Spec rejected; terminal until the deployment changes
    Failed,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Deleted => "deleted",
            Stage::AwaitingRevision => "awaiting_revision",
            Stage::SecondaryConverging => "secondary_converging",
            Stage::Ready => "ready",
            Stage::Failed => "failed",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a successful cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileOutcome {
    pub stage: Stage,
    /// Run the key again after this delay
    pub requeue_after: Option<Duration>,
}

impl ReconcileOutcome {
    pub fn done(stage: Stage) -> Self {
        Self {
            stage,
            requeue_after: None,
        }
    }

    pub fn requeue(stage: Stage, after: Duration) -> Self {
        Self {
            stage,
            requeue_after: Some(after),
        }
    }
}

/// Anything the scheduler can drive by deployment key.
#[async_trait]
pub trait Reconcile: Send + Sync + 'static {
    async fn reconcile(&self, key: &ObjectKey) -> Result<ReconcileOutcome>;
}

/// Deployment reconciler over a [`ResourceStore`].
pub struct Reconciler<S> {
    store: Arc<S>,
    config: OperatorConfig,
    metrics: Arc<Metrics>,
}

impl<S: ResourceStore> Reconciler<S> {
    pub fn new(store: Arc<S>, config: OperatorConfig) -> Self {
        Self {
            store,
            config,
            metrics: Arc::new(Metrics::new()),
        }
    }

    /// Share an existing counter set instead of a fresh one.
    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    pub fn config(&self) -> &OperatorConfig {
        &self.config
    }

    /// Run one cycle for the deployment at `key`.
    ///
    /// Unexpected errors abort the cycle without touching status. A
    /// `NotFound` from a write ends the cycle as `Deleted` when the owner
    /// turns out to be gone.
    pub async fn reconcile(&self, key: &ObjectKey) -> Result<ReconcileOutcome> {
        let span = obs::reconcile_span(key);
        async {
            self.metrics.inc_reconciles();
            let result = match self.run_cycle(key).await {
                Err(err) if err.is_not_found() => self.resolve_not_found(key, err).await,
                other => other,
            };

            match &result {
                Ok(ReconcileOutcome {
                    stage,
                    requeue_after: Some(delay),
                }) => {
                    self.metrics.inc_requeues();
                    obs::emit_requeue(key, stage.as_str(), delay.as_millis() as u64);
                }
                Ok(outcome) => debug!(stage = %outcome.stage, "cycle finished"),
                Err(err) => {
                    self.metrics.inc_errors();
                    obs::emit_reconcile_error(key, err);
                }
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn run_cycle(&self, key: &ObjectKey) -> Result<ReconcileOutcome> {
        let Some(stored) = self
            .store
            .get(ResourceKind::ModelDeployment, &key.namespace, &key.name)
            .await?
        else {
            debug!("deployment absent");
            return Ok(ReconcileOutcome::done(Stage::Deleted));
        };

        // A status we cannot read is rewritten from scratch; only the spec
        // decides whether the deployment is rejected.
        let previous = decode_status::<ModelDeploymentStatus>(&stored).unwrap_or_else(|err| {
            warn!(error = %err, "ignoring undecodable deployment status");
            ModelDeploymentStatus::default()
        });
        let spec: ModelDeploymentSpec = match serde_json::from_value(stored.spec.clone()) {
            Ok(spec) => spec,
            Err(err) => return self.reject(&stored, &previous, err.to_string()).await,
        };
        let md = ModelDeployment {
            metadata: stored.metadata.clone(),
            spec,
            status: previous,
        };
        if let Err(invalid) = validate_deployment(&md) {
            return self.reject(&stored, &md.status, invalid.to_string()).await;
        }

        let builder = DesiredStateBuilder::new(&self.config);
        self.apply(&builder.serving_configuration(&md)).await?;

        let revision = self.latest_ready_revision(&md).await?;
        if revision.is_empty() {
            self.persist_status(&stored, &md.status, &Checkpoint::AwaitingRevision)
                .await?;
            return Ok(ReconcileOutcome::requeue(
                Stage::AwaitingRevision,
                self.config.requeue_delay(),
            ));
        }

        self.apply(&builder.model_route(&md)).await?;
        self.apply(&builder.auth_policy(&md, &revision)?).await?;

        let checkpoint = self.observe_workload(&md, revision).await?;
        let status = self.persist_status(&stored, &md.status, &checkpoint).await?;
        if status.phase == Phase::Ready {
            Ok(ReconcileOutcome::done(Stage::Ready))
        } else {
            Ok(ReconcileOutcome::requeue(
                Stage::SecondaryConverging,
                self.config.requeue_delay(),
            ))
        }
    }

    /// Commit `Failed` for a spec the builder cannot map.
    async fn reject(
        &self,
        stored: &StoredObject,
        previous: &ModelDeploymentStatus,
        reason: String,
    ) -> Result<ReconcileOutcome> {
        warn!(reason = %reason, "deployment spec rejected");
        self.persist_status(stored, previous, &Checkpoint::Rejected { reason })
            .await?;
        Ok(ReconcileOutcome::done(Stage::Failed))
    }

    /// A write hit `NotFound`: finish as `Deleted` if the owner went away
    /// mid-cycle, otherwise surface the write error.
    async fn resolve_not_found(
        &self,
        key: &ObjectKey,
        err: ReconcileError,
    ) -> Result<ReconcileOutcome> {
        let owner = self
            .store
            .get(ResourceKind::ModelDeployment, &key.namespace, &key.name)
            .await?;
        match owner {
            None => {
                debug!("deployment deleted mid-cycle");
                Ok(ReconcileOutcome::done(Stage::Deleted))
            }
            Some(_) => Err(err),
        }
    }

    /// Create `desired` if absent, update it if its hash drifted.
    ///
    /// Updates replace spec, labels, annotations and owner references while
    /// keeping the live object's identity, version and status.
    async fn apply(&self, desired: &DesiredObject) -> Result<StoredObject> {
        let kind = desired.kind();
        let key = desired.key();
        let mut object = desired.to_stored()?;
        let hash = digest::compute(&object)?;
        object
            .metadata
            .annotations
            .insert(HASH_ANNOTATION.to_string(), hash.to_string());

        let live = self.store.get(kind, &key.namespace, &key.name).await?;
        let Some(live) = live else {
            let created = self.store.create(object).await?;
            self.metrics.inc_resources_created();
            obs::emit_resource_created(kind, &key, hash.short());
            return Ok(created);
        };

        if !digest::drifted(digest::stored_hash(&live), &object)? {
            obs::emit_resource_unchanged(kind, &key);
            return Ok(live);
        }

        object.metadata.uid = live.metadata.uid;
        object.metadata.resource_version = live.metadata.resource_version;
        object.metadata.creation_timestamp = live.metadata.creation_timestamp;
        object.status = live.status;
        let updated = self.store.update(object).await?;
        self.metrics.inc_resources_updated();
        obs::emit_resource_updated(kind, &key, hash.short());
        Ok(updated)
    }

    /// Fresh read of the serving resource's latest ready revision.
    async fn latest_ready_revision(&self, md: &ModelDeployment) -> Result<RevisionHandle> {
        let serving = self
            .store
            .get(ResourceKind::ServingConfiguration, md.namespace(), md.name())
            .await?
            .ok_or_else(|| {
                StorageError::not_found(
                    ResourceKind::ServingConfiguration,
                    md.namespace(),
                    md.name(),
                )
            })?;
        let status: ServingConfigurationStatus = decode_status(&serving)?;
        Ok(status.latest_ready_revision)
    }

    async fn observe_workload(
        &self,
        md: &ModelDeployment,
        revision: RevisionHandle,
    ) -> Result<Checkpoint> {
        let namespace = self.config.workload_namespace_for(md.namespace());
        let name = revision.workload_name();
        let Some(workload) = self
            .store
            .get(ResourceKind::Workload, namespace, &name)
            .await?
        else {
            debug!(workload = %name, "workload not visible yet");
            return Ok(Checkpoint::AwaitingWorkload { revision });
        };

        let observed: WorkloadStatus = decode_status(&workload)?;
        Ok(Checkpoint::WorkloadObserved {
            revision,
            workload: WorkloadObservation {
                name,
                desired_replicas: observed.desired_replicas,
                available_replicas: observed.available_replicas,
            },
        })
    }

    /// Project `checkpoint` and write it unless it equals `previous`.
    async fn persist_status(
        &self,
        owner: &StoredObject,
        previous: &ModelDeploymentStatus,
        checkpoint: &Checkpoint,
    ) -> Result<ModelDeploymentStatus> {
        let projected = status::project(
            checkpoint,
            &owner.metadata.namespace,
            previous,
            &self.config.cluster_domain,
        );
        if &projected == previous {
            debug!(phase = %projected.phase, "status unchanged");
            return Ok(projected);
        }

        let mut updated = owner.clone();
        updated.status = serde_json::to_value(&projected)?;
        self.store.update(updated).await?;
        self.metrics.inc_status_writes();
        obs::emit_status_persisted(&owner.key(), projected.phase.as_str());
        Ok(projected)
    }
}

#[async_trait]
impl<S: ResourceStore + 'static> Reconcile for Reconciler<S> {
    async fn reconcile(&self, key: &ObjectKey) -> Result<ReconcileOutcome> {
        Reconciler::reconcile(self, key).await
    }
}
