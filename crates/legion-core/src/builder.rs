//! Desired-state builder.
//!
//! Pure mapping from a validated `ModelDeployment` to the dependent
//! resources that must exist for it. Every dependent shares the
//! deployment's name and namespace and carries a controller owner
//! reference back to it, so the store removes them when the deployment
//! is deleted.

use std::collections::BTreeMap;

use legion_state::{ObjectMeta, OwnerReference, ResourceKind};

use crate::config::OperatorConfig;
use crate::domain::dependents::{
    AuthPolicySpec, Container, ContainerPort, DependentResource, DesiredObject, HttpGetAction,
    JwtOrigin, ModelRouteSpec, PolicyTarget, PrincipalBinding, Probe, RevisionTemplate,
    RouteTarget, ServingConfigurationSpec, TriggerRule,
};
use crate::domain::error::{ReconcileError, Result, ValidationError};
use crate::domain::{ModelDeployment, RevisionHandle};

pub const DEFAULT_MODEL_PORT: i32 = 5000;
pub const MODEL_PORT_NAME: &str = "http1";
pub const HEALTH_CHECK_PATH: &str = "/healthcheck";

const PROBE_FAILURE_THRESHOLD: i32 = 15;
const PROBE_PERIOD_SECS: i32 = 1;
const PROBE_TIMEOUT_SECS: i32 = 1;
const TERMINATION_GRACE_PERIOD_SECS: i64 = 15;

pub const MIN_SCALE_ANNOTATION: &str = "autoscaling.knative.dev/minScale";
pub const MAX_SCALE_ANNOTATION: &str = "autoscaling.knative.dev/maxScale";
pub const SCALE_TARGET_ANNOTATION: &str = "autoscaling.knative.dev/target";
const SCALE_TARGET_DEFAULT: &str = "10";

/// Revision template label naming the model.
pub const MODEL_NAME_LABEL: &str = "modelName";
pub const SKIP_URL_VALIDATION_ANNOTATION: &str = "legion.io/skip-url-validation";

const ROUTE_WEIGHT: i32 = 100;
const POLICY_TARGET_PORT: u32 = 80;
pub const PROTECTED_PATH_PREFIX: &str = "/api/model";

/// Reject specs the builder cannot map.
///
/// Runs before the builder; a deployment that passes is guaranteed to build.
pub fn validate_deployment(md: &ModelDeployment) -> std::result::Result<(), ValidationError> {
    if md.metadata.name.is_empty() {
        return Err(ValidationError::Empty { field: "name" });
    }
    if md.spec.image.trim().is_empty() {
        return Err(ValidationError::Empty { field: "image" });
    }
    let non_negative = [
        ("minReplicas", md.spec.min_replicas),
        ("livenessProbeInitialDelay", md.spec.liveness_probe_initial_delay),
        ("readinessProbeInitialDelay", md.spec.readiness_probe_initial_delay),
    ];
    for (field, value) in non_negative {
        if value < 0 {
            return Err(ValidationError::Negative { field, value });
        }
    }
    if md.spec.max_replicas < 1 {
        return Err(ValidationError::MaxReplicasTooLow(md.spec.max_replicas));
    }
    if md.spec.min_replicas > md.spec.max_replicas {
        return Err(ValidationError::ReplicaBounds {
            min: md.spec.min_replicas,
            max: md.spec.max_replicas,
        });
    }
    Ok(())
}

/// Builds dependent resources for one deployment.
pub struct DesiredStateBuilder<'a> {
    config: &'a OperatorConfig,
}

impl<'a> DesiredStateBuilder<'a> {
    pub fn new(config: &'a OperatorConfig) -> Self {
        Self { config }
    }

    /// Serving resource: one container, health probes, scaling hints.
    pub fn serving_configuration(&self, md: &ModelDeployment) -> DesiredObject {
        let mut labels = md.metadata.labels.clone();
        labels.insert(MODEL_NAME_LABEL.to_string(), md.name().to_string());

        let annotations = BTreeMap::from([
            (
                MIN_SCALE_ANNOTATION.to_string(),
                md.spec.min_replicas.to_string(),
            ),
            (
                MAX_SCALE_ANNOTATION.to_string(),
                md.spec.max_replicas.to_string(),
            ),
            (
                SCALE_TARGET_ANNOTATION.to_string(),
                SCALE_TARGET_DEFAULT.to_string(),
            ),
        ]);

        DesiredObject {
            metadata: dependent_meta(md),
            resource: DependentResource::Serving(ServingConfigurationSpec {
                template: RevisionTemplate {
                    labels,
                    annotations,
                    termination_grace_period_seconds: TERMINATION_GRACE_PERIOD_SECS,
                    containers: vec![model_container(md)],
                },
            }),
        }
    }

    /// Routing resource: `/model/<name>` with all traffic to the deployment.
    pub fn model_route(&self, md: &ModelDeployment) -> DesiredObject {
        let mut metadata = dependent_meta(md);
        metadata.annotations.insert(
            SKIP_URL_VALIDATION_ANNOTATION.to_string(),
            "true".to_string(),
        );

        DesiredObject {
            metadata,
            resource: DependentResource::Route(ModelRouteSpec {
                url_prefix: format!("/model/{}", md.name()),
                feedback: self.config.feedback_enabled,
                model_deployment_targets: vec![RouteTarget {
                    name: md.name().to_string(),
                    weight: ROUTE_WEIGHT,
                }],
            }),
        }
    }

    /// Access policy scoped to `revision`.
    ///
    /// Fails with `InvariantViolation` on the empty handle: a policy must
    /// never target a revision that does not exist yet.
    pub fn auth_policy(
        &self,
        md: &ModelDeployment,
        revision: &RevisionHandle,
    ) -> Result<DesiredObject> {
        if revision.is_empty() {
            return Err(ReconcileError::InvariantViolation(format!(
                "access policy for {} requested without a ready revision",
                md.key()
            )));
        }

        Ok(DesiredObject {
            metadata: dependent_meta(md),
            resource: DependentResource::AuthPolicy(AuthPolicySpec {
                targets: vec![PolicyTarget {
                    name: revision.as_str().to_string(),
                    ports: vec![POLICY_TARGET_PORT],
                }],
                origins: vec![JwtOrigin {
                    issuer: self.config.jwt_issuer.clone(),
                    jwks_uri: self.config.jwks_uri.clone(),
                    trigger_rules: vec![TriggerRule {
                        included_path_prefixes: vec![PROTECTED_PATH_PREFIX.to_string()],
                    }],
                }],
                principal_binding: PrincipalBinding::UseOrigin,
            }),
        })
    }
}

fn dependent_meta(md: &ModelDeployment) -> ObjectMeta {
    let mut meta = ObjectMeta::new(md.namespace(), md.name());
    meta.labels = md.metadata.labels.clone();
    meta.owner_references.push(OwnerReference {
        kind: ResourceKind::ModelDeployment,
        name: md.name().to_string(),
        uid: md.metadata.uid.clone(),
        controller: true,
    });
    meta
}

fn health_probe(initial_delay_seconds: i32) -> Probe {
    Probe {
        http_get: HttpGetAction {
            path: HEALTH_CHECK_PATH.to_string(),
        },
        failure_threshold: PROBE_FAILURE_THRESHOLD,
        initial_delay_seconds,
        period_seconds: PROBE_PERIOD_SECS,
        timeout_seconds: PROBE_TIMEOUT_SECS,
    }
}

fn model_container(md: &ModelDeployment) -> Container {
    Container {
        image: md.spec.image.clone(),
        resources: md.spec.resources.clone(),
        ports: vec![ContainerPort {
            name: MODEL_PORT_NAME.to_string(),
            container_port: DEFAULT_MODEL_PORT,
            protocol: "TCP".to_string(),
        }],
        liveness_probe: health_probe(md.spec.liveness_probe_initial_delay),
        readiness_probe: health_probe(md.spec.readiness_probe_initial_delay),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ModelDeploymentSpec, ResourceRequirements};

    fn deployment() -> ModelDeployment {
        let mut meta = ObjectMeta::new("team-a", "wine");
        meta.uid = Some("md-uid".to_string());
        meta.labels.insert("team".to_string(), "a".to_string());
        ModelDeployment::new(
            meta,
            ModelDeploymentSpec {
                image: "registry/wine:1.0".to_string(),
                resources: ResourceRequirements {
                    limits: BTreeMap::from([("cpu".to_string(), "1".to_string())]),
                    requests: BTreeMap::new(),
                },
                min_replicas: 1,
                max_replicas: 3,
                liveness_probe_initial_delay: 20,
                readiness_probe_initial_delay: 5,
            },
        )
    }

    #[test]
    fn serving_configuration_carries_container_contract() {
        let config = OperatorConfig::default();
        let desired = DesiredStateBuilder::new(&config).serving_configuration(&deployment());

        assert_eq!(desired.kind(), ResourceKind::ServingConfiguration);
        let DependentResource::Serving(spec) = &desired.resource else {
            panic!("expected serving spec");
        };
        let template = &spec.template;
        assert_eq!(template.termination_grace_period_seconds, 15);
        assert_eq!(template.annotations[MIN_SCALE_ANNOTATION], "1");
        assert_eq!(template.annotations[MAX_SCALE_ANNOTATION], "3");
        assert_eq!(template.labels[MODEL_NAME_LABEL], "wine");
        assert_eq!(template.labels["team"], "a");

        let container = &template.containers[0];
        assert_eq!(template.containers.len(), 1);
        assert_eq!(container.ports[0].container_port, 5000);
        assert_eq!(container.liveness_probe.initial_delay_seconds, 20);
        assert_eq!(container.readiness_probe.initial_delay_seconds, 5);
        assert_eq!(container.readiness_probe.failure_threshold, 15);
        assert_eq!(container.readiness_probe.period_seconds, 1);
        assert_eq!(container.liveness_probe.timeout_seconds, 1);
        assert_eq!(container.liveness_probe.http_get.path, HEALTH_CHECK_PATH);
        assert_eq!(container.resources.limits["cpu"], "1");
    }

    #[test]
    fn dependents_are_owned_by_deployment() {
        let config = OperatorConfig::default();
        let md = deployment();
        let desired = DesiredStateBuilder::new(&config).model_route(&md);

        let owner = desired.metadata.controller_ref().expect("owner");
        assert_eq!(owner.kind, ResourceKind::ModelDeployment);
        assert_eq!(owner.name, "wine");
        assert_eq!(owner.uid.as_deref(), Some("md-uid"));
        assert_eq!(desired.key(), md.key());
    }

    #[test]
    fn route_targets_deployment_with_full_weight() {
        let config = OperatorConfig::default();
        let desired = DesiredStateBuilder::new(&config).model_route(&deployment());

        let DependentResource::Route(spec) = &desired.resource else {
            panic!("expected route spec");
        };
        assert_eq!(spec.url_prefix, "/model/wine");
        assert!(!spec.feedback);
        assert_eq!(spec.model_deployment_targets.len(), 1);
        assert_eq!(spec.model_deployment_targets[0].weight, 100);
        assert_eq!(
            desired.metadata.annotations[SKIP_URL_VALIDATION_ANNOTATION],
            "true"
        );
    }

    #[test]
    fn auth_policy_scoped_to_revision() {
        let config = OperatorConfig::default();
        let desired = DesiredStateBuilder::new(&config)
            .auth_policy(&deployment(), &RevisionHandle::new("wine-00001"))
            .expect("policy");

        let DependentResource::AuthPolicy(spec) = &desired.resource else {
            panic!("expected policy spec");
        };
        assert_eq!(spec.targets[0].name, "wine-00001");
        assert_eq!(
            spec.origins[0].trigger_rules[0].included_path_prefixes,
            vec![PROTECTED_PATH_PREFIX.to_string()]
        );
        assert_eq!(spec.principal_binding, PrincipalBinding::UseOrigin);
    }

    #[test]
    fn auth_policy_without_revision_is_invariant_violation() {
        let config = OperatorConfig::default();
        let err = DesiredStateBuilder::new(&config)
            .auth_policy(&deployment(), &RevisionHandle::empty())
            .unwrap_err();
        assert!(matches!(err, ReconcileError::InvariantViolation(_)));
    }

    #[test]
    fn builder_output_is_deterministic() {
        let config = OperatorConfig::default();
        let builder = DesiredStateBuilder::new(&config);
        let md = deployment();
        assert_eq!(
            builder.serving_configuration(&md),
            builder.serving_configuration(&md)
        );
    }

    #[test]
    fn validation_rejects_bad_specs() {
        let mut md = deployment();
        assert!(validate_deployment(&md).is_ok());

        md.spec.image = " ".to_string();
        assert_eq!(
            validate_deployment(&md),
            Err(ValidationError::Empty { field: "image" })
        );

        let mut md = deployment();
        md.spec.min_replicas = 5;
        assert_eq!(
            validate_deployment(&md),
            Err(ValidationError::ReplicaBounds { min: 5, max: 3 })
        );

        let mut md = deployment();
        md.spec.readiness_probe_initial_delay = -1;
        assert!(matches!(
            validate_deployment(&md),
            Err(ValidationError::Negative { .. })
        ));

        let mut md = deployment();
        md.spec.min_replicas = 0;
        md.spec.max_replicas = 0;
        assert_eq!(
            validate_deployment(&md),
            Err(ValidationError::MaxReplicasTooLow(0))
        );
    }
}
