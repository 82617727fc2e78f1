//! Resource model shared by every store backend.
//!
//! Objects are kept in a dynamic form (`StoredObject`): typed metadata plus
//! JSON `spec` and `status` documents. Typed views live in `legion-core`.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kinds of resources the operator reads or writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ResourceKind {
    /// Top-level deployment descriptor (the owner)
    ModelDeployment,
    /// Serving resource; reports the latest ready revision
    ServingConfiguration,
    /// Routing resource
    ModelRoute,
    /// Access-policy resource
    AuthPolicy,
    /// Workload instance backing a ready revision
    Workload,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::ModelDeployment => "ModelDeployment",
            ResourceKind::ServingConfiguration => "ServingConfiguration",
            ResourceKind::ModelRoute => "ModelRoute",
            ResourceKind::AuthPolicy => "AuthPolicy",
            ResourceKind::Workload => "Workload",
        }
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Namespaced name of an object.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ObjectKey {
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl std::fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Back-reference from a dependent object to the object that owns it.
///
/// The store deletes every object whose controller reference points at a
/// deleted owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnerReference {
    pub kind: ResourceKind,
    pub name: String,
    /// Owner uid as assigned by the store
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
    #[serde(default)]
    pub controller: bool,
}

/// Object metadata.
///
/// `uid`, `resource_version` and `creation_timestamp` are assigned by the
/// store; writers leave them at their defaults on create.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    pub name: String,
    pub namespace: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub owner_references: Vec<OwnerReference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
    #[serde(default)]
    pub resource_version: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creation_timestamp: Option<DateTime<Utc>>,
}

impl ObjectMeta {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            ..Default::default()
        }
    }

    pub fn key(&self) -> ObjectKey {
        ObjectKey::new(self.namespace.clone(), self.name.clone())
    }

    /// The owner reference flagged as controller, if any.
    pub fn controller_ref(&self) -> Option<&OwnerReference> {
        self.owner_references.iter().find(|r| r.controller)
    }
}

/// An object as held by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredObject {
    pub kind: ResourceKind,
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: serde_json::Value,
    #[serde(default)]
    pub status: serde_json::Value,
}

impl StoredObject {
    pub fn new(kind: ResourceKind, metadata: ObjectMeta, spec: serde_json::Value) -> Self {
        Self {
            kind,
            metadata,
            spec,
            status: serde_json::Value::Null,
        }
    }

    pub fn key(&self) -> ObjectKey {
        self.metadata.key()
    }
}

/// What happened to an object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventType {
    /// Created or modified
    Applied,
    Deleted,
}

/// Change notification delivered by [`ResourceStore::watch`](crate::ResourceStore::watch).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceEvent {
    pub kind: ResourceKind,
    pub key: ObjectKey,
    pub event_type: EventType,
}
