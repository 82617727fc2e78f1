//! Loading `ModelDeployment` manifests from disk.
//!
//! A manifest file holds either one deployment object or a JSON array of
//! them:
//!
//! ```json
//! { "kind": "ModelDeployment",
//!   "metadata": { "name": "wine", "namespace": "team-a" },
//!   "spec": { "image": "registry/wine:1.0", "maxReplicas": 3 } }
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{bail, Context, Result};
use legion_state::{MemoryResourceStore, ObjectKey, ObjectMeta, ResourceKind, StoredObject};
use serde::Deserialize;

const DEFAULT_NAMESPACE: &str = "default";

#[derive(Debug, Deserialize)]
struct ManifestMeta {
    name: String,
    #[serde(default)]
    namespace: Option<String>,
    #[serde(default)]
    labels: BTreeMap<String, String>,
    #[serde(default)]
    annotations: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct DeploymentManifest {
    #[serde(default)]
    kind: Option<String>,
    metadata: ManifestMeta,
    spec: serde_json::Value,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ManifestFile {
    Many(Vec<DeploymentManifest>),
    One(DeploymentManifest),
}

/// Parse manifest text into store objects.
///
/// Spec contents are not validated here; the reconciler reports invalid
/// specs through the deployment's status.
pub fn parse_manifests(text: &str) -> Result<Vec<StoredObject>> {
    let file: ManifestFile = serde_json::from_str(text).context("invalid manifest JSON")?;
    let manifests = match file {
        ManifestFile::Many(many) => many,
        ManifestFile::One(one) => vec![one],
    };

    let mut objects = Vec::with_capacity(manifests.len());
    for manifest in manifests {
        if let Some(kind) = manifest.kind.as_deref() {
            if kind != ResourceKind::ModelDeployment.as_str() {
                bail!(
                    "manifest {} has kind {kind}, expected ModelDeployment",
                    manifest.metadata.name
                );
            }
        }
        let namespace = manifest
            .metadata
            .namespace
            .unwrap_or_else(|| DEFAULT_NAMESPACE.to_string());
        let mut meta = ObjectMeta::new(namespace, manifest.metadata.name);
        meta.labels = manifest.metadata.labels;
        meta.annotations = manifest.metadata.annotations;
        objects.push(StoredObject::new(
            ResourceKind::ModelDeployment,
            meta,
            manifest.spec,
        ));
    }
    Ok(objects)
}

pub fn load_manifests(path: &Path) -> Result<Vec<StoredObject>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read manifests from {}", path.display()))?;
    parse_manifests(&text).with_context(|| format!("failed to parse {}", path.display()))
}

/// Insert `objects` into the store, returning their keys for the initial resync.
pub fn seed_store(
    store: &MemoryResourceStore,
    objects: Vec<StoredObject>,
) -> Result<Vec<ObjectKey>> {
    let mut keys = Vec::with_capacity(objects.len());
    for object in objects {
        let key = object.key();
        store
            .seed(object)
            .with_context(|| format!("failed to load deployment {key}"))?;
        keys.push(key);
    }
    Ok(keys)
}
