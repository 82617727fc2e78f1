//! `ModelDeployment`: the externally authored deployment descriptor and the
//! status the operator projects onto it.

use std::collections::BTreeMap;

use legion_state::{ObjectKey, ObjectMeta, ResourceKind, StoredObject};
use serde::{Deserialize, Serialize};

use crate::domain::error::{ReconcileError, Result};

/// Compute resource requests and limits, e.g. `{"cpu": "500m"}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRequirements {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub limits: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub requests: BTreeMap<String, String>,
}

fn default_max_replicas() -> i32 {
    1
}

/// Desired state of a served model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelDeploymentSpec {
    /// Container image reference
    pub image: String,
    #[serde(default)]
    pub resources: ResourceRequirements,
    #[serde(default)]
    pub min_replicas: i32,
    #[serde(default = "default_max_replicas")]
    pub max_replicas: i32,
    /// Seconds before the first liveness probe
    #[serde(default)]
    pub liveness_probe_initial_delay: i32,
    /// Seconds before the first readiness probe
    #[serde(default)]
    pub readiness_probe_initial_delay: i32,
}

/// Lifecycle phase reported in [`ModelDeploymentStatus`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    #[default]
    Pending,
    Processing,
    Ready,
    Failed,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Pending => "Pending",
            Phase::Processing => "Processing",
            Phase::Ready => "Ready",
            Phase::Failed => "Failed",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Aggregate status, written only by the reconciler.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelDeploymentStatus {
    #[serde(default)]
    pub phase: Phase,
    /// Replicas the workload wants
    #[serde(default)]
    pub replicas: i32,
    #[serde(default)]
    pub available_replicas: i32,
    /// Present only while `Ready`
    #[serde(rename = "serviceURL", default, skip_serializing_if = "Option::is_none")]
    pub service_url: Option<String>,
    /// Last revision that reached `Ready`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_revision_name: Option<String>,
    /// Name of the observed workload instance
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Typed view of a `ModelDeployment` object.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelDeployment {
    pub metadata: ObjectMeta,
    pub spec: ModelDeploymentSpec,
    pub status: ModelDeploymentStatus,
}

impl ModelDeployment {
    pub fn new(metadata: ObjectMeta, spec: ModelDeploymentSpec) -> Self {
        Self {
            metadata,
            spec,
            status: ModelDeploymentStatus::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    pub fn namespace(&self) -> &str {
        &self.metadata.namespace
    }

    pub fn key(&self) -> ObjectKey {
        self.metadata.key()
    }

    pub fn from_stored(object: StoredObject) -> Result<Self> {
        if object.kind != ResourceKind::ModelDeployment {
            return Err(ReconcileError::MalformedResource(format!(
                "expected ModelDeployment, got {}",
                object.kind
            )));
        }
        let spec = serde_json::from_value(object.spec)?;
        let status = if object.status.is_null() {
            ModelDeploymentStatus::default()
        } else {
            serde_json::from_value(object.status)?
        };
        Ok(Self {
            metadata: object.metadata,
            spec,
            status,
        })
    }

    pub fn to_stored(&self) -> Result<StoredObject> {
        Ok(StoredObject {
            kind: ResourceKind::ModelDeployment,
            metadata: self.metadata.clone(),
            spec: serde_json::to_value(&self.spec)?,
            status: serde_json::to_value(&self.status)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spec_defaults_apply() {
        let spec: ModelDeploymentSpec =
            serde_json::from_value(serde_json::json!({ "image": "x" })).expect("decode");
        assert_eq!(spec.min_replicas, 0);
        assert_eq!(spec.max_replicas, 1);
        assert!(spec.resources.limits.is_empty());
    }

    #[test]
    fn status_uses_wire_field_names() {
        let status = ModelDeploymentStatus {
            phase: Phase::Ready,
            replicas: 2,
            available_replicas: 2,
            service_url: Some("rev-1.ns.svc.cluster.local".to_string()),
            last_revision_name: Some("rev-1".to_string()),
            deployment: None,
            message: None,
        };
        let value = serde_json::to_value(&status).expect("encode");
        assert_eq!(value["phase"], "Ready");
        assert_eq!(value["serviceURL"], "rev-1.ns.svc.cluster.local");
        assert_eq!(value["availableReplicas"], 2);
        assert_eq!(value["lastRevisionName"], "rev-1");
        assert!(value.get("message").is_none());
    }

    #[test]
    fn stored_round_trip_with_null_status() {
        let stored = StoredObject::new(
            ResourceKind::ModelDeployment,
            ObjectMeta::new("ns", "m"),
            serde_json::json!({ "image": "x", "minReplicas": 1, "maxReplicas": 3 }),
        );
        let md = ModelDeployment::from_stored(stored).expect("decode");
        assert_eq!(md.status.phase, Phase::Pending);
        assert_eq!(md.spec.max_replicas, 3);

        let back = md.to_stored().expect("encode");
        assert_eq!(back.spec["minReplicas"], 1);
        assert_eq!(back.status["phase"], "Pending");
    }

    #[test]
    fn wrong_kind_is_malformed() {
        let stored = StoredObject::new(
            ResourceKind::ModelRoute,
            ObjectMeta::new("ns", "m"),
            serde_json::json!({}),
        );
        let err = ModelDeployment::from_stored(stored).unwrap_err();
        assert!(matches!(err, ReconcileError::MalformedResource(_)));
    }
}
