//! Dependent resources derived from a `ModelDeployment`, and the observed
//! status documents the reconciler reads back.

use std::collections::BTreeMap;

use legion_state::{ObjectKey, ObjectMeta, ResourceKind, StoredObject};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::domain::deployment::ResourceRequirements;
use crate::domain::error::Result;
use crate::domain::revision::RevisionHandle;

// ---------------------------------------------------------------------------
// Serving resource
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpGetAction {
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Probe {
    pub http_get: HttpGetAction,
    pub failure_threshold: i32,
    pub initial_delay_seconds: i32,
    pub period_seconds: i32,
    pub timeout_seconds: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerPort {
    pub name: String,
    pub container_port: i32,
    pub protocol: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Container {
    pub image: String,
    pub resources: ResourceRequirements,
    pub ports: Vec<ContainerPort>,
    pub liveness_probe: Probe,
    pub readiness_probe: Probe,
}

/// Template every revision of the serving configuration is stamped from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevisionTemplate {
    pub labels: BTreeMap<String, String>,
    /// Scaling hints
    pub annotations: BTreeMap<String, String>,
    pub termination_grace_period_seconds: i64,
    pub containers: Vec<Container>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServingConfigurationSpec {
    pub template: RevisionTemplate,
}

/// Observed status of a serving configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServingConfigurationStatus {
    #[serde(rename = "latestReadyRevision", default)]
    pub latest_ready_revision: RevisionHandle,
}

// ---------------------------------------------------------------------------
// Route resource
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteTarget {
    pub name: String,
    pub weight: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelRouteSpec {
    pub url_prefix: String,
    pub feedback: bool,
    pub model_deployment_targets: Vec<RouteTarget>,
}

// ---------------------------------------------------------------------------
// Access-policy resource
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyTarget {
    /// Revision the policy applies to
    pub name: String,
    pub ports: Vec<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerRule {
    pub included_path_prefixes: Vec<String>,
}

/// Token-validation origin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JwtOrigin {
    pub issuer: String,
    pub jwks_uri: String,
    pub trigger_rules: Vec<TriggerRule>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PrincipalBinding {
    UsePeer,
    UseOrigin,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthPolicySpec {
    pub targets: Vec<PolicyTarget>,
    pub origins: Vec<JwtOrigin>,
    pub principal_binding: PrincipalBinding,
}

// ---------------------------------------------------------------------------
// Workload instance (read-only)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkloadStatus {
    #[serde(default)]
    pub desired_replicas: i32,
    #[serde(default)]
    pub available_replicas: i32,
}

/// Decode the status document of a stored object, treating `null` as default.
pub fn decode_status<T>(object: &StoredObject) -> Result<T>
where
    T: DeserializeOwned + Default,
{
    if object.status.is_null() {
        return Ok(T::default());
    }
    Ok(serde_json::from_value(object.status.clone())?)
}

// ---------------------------------------------------------------------------
// Desired objects
// ---------------------------------------------------------------------------

/// Spec of one dependent resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DependentResource {
    Serving(ServingConfigurationSpec),
    Route(ModelRouteSpec),
    AuthPolicy(AuthPolicySpec),
}

impl DependentResource {
    pub fn kind(&self) -> ResourceKind {
        match self {
            DependentResource::Serving(_) => ResourceKind::ServingConfiguration,
            DependentResource::Route(_) => ResourceKind::ModelRoute,
            DependentResource::AuthPolicy(_) => ResourceKind::AuthPolicy,
        }
    }

    pub fn spec_value(&self) -> Result<serde_json::Value> {
        Ok(match self {
            DependentResource::Serving(spec) => serde_json::to_value(spec)?,
            DependentResource::Route(spec) => serde_json::to_value(spec)?,
            DependentResource::AuthPolicy(spec) => serde_json::to_value(spec)?,
        })
    }
}

/// A dependent resource as the builder wants it to exist, owner reference
/// included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DesiredObject {
    pub metadata: ObjectMeta,
    pub resource: DependentResource,
}

impl DesiredObject {
    pub fn kind(&self) -> ResourceKind {
        self.resource.kind()
    }

    pub fn key(&self) -> ObjectKey {
        self.metadata.key()
    }

    pub fn to_stored(&self) -> Result<StoredObject> {
        Ok(StoredObject::new(
            self.kind(),
            self.metadata.clone(),
            self.resource.spec_value()?,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serving_status_reads_latest_ready_revision() {
        let mut object = StoredObject::new(
            ResourceKind::ServingConfiguration,
            ObjectMeta::new("ns", "m"),
            serde_json::json!({}),
        );
        let empty: ServingConfigurationStatus = decode_status(&object).expect("null status");
        assert!(empty.latest_ready_revision.is_empty());

        object.status = serde_json::json!({ "latestReadyRevision": "m-00001" });
        let status: ServingConfigurationStatus = decode_status(&object).expect("status");
        assert_eq!(status.latest_ready_revision.as_str(), "m-00001");
    }

    #[test]
    fn workload_status_wire_names() {
        let mut object = StoredObject::new(
            ResourceKind::Workload,
            ObjectMeta::new("ns", "m-00001-deployment"),
            serde_json::json!({}),
        );
        object.status = serde_json::json!({ "desiredReplicas": 2, "availableReplicas": 1 });
        let status: WorkloadStatus = decode_status(&object).expect("status");
        assert_eq!(status.desired_replicas, 2);
        assert_eq!(status.available_replicas, 1);
    }

    #[test]
    fn principal_binding_wire_format() {
        let value = serde_json::to_value(PrincipalBinding::UseOrigin).expect("encode");
        assert_eq!(value, "USE_ORIGIN");
    }
}
