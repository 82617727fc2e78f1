//! Content hashing for drift detection.
//!
//! A resource's digest covers its semantic fields only: kind, name,
//! namespace, labels, annotations (minus the digest annotation itself),
//! owner references (without uid) and spec. Server-managed bookkeeping
//! (`uid`, `resourceVersion`, `creationTimestamp`) and status are never
//! hashed.
//!
//! The semantic view is serialized as canonical JSON (RFC 8785-class):
//! - UTF-16 code unit ordering for object keys (§3.2.3)
//! - Number normalization (integer-valued floats → integers; reject NaN/Infinity)
//! - SHA256 hex digest computation

use legion_state::StoredObject;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::domain::error::{ReconcileError, Result};

/// Annotation under which the applied digest is recorded on each dependent.
pub const HASH_ANNOTATION: &str = "legion.io/spec-hash";

/// SHA-256 hex digest of a resource's semantic view.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentHash(String);

impl ContentHash {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short form (first 12 hex chars).
    pub fn short(&self) -> &str {
        &self.0[..12.min(self.0.len())]
    }
}

impl std::fmt::Display for ContentHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Recursively sort JSON object keys using UTF-16 code unit ordering (RFC 8785 §3.2.3).
fn sort_keys_utf16(value: &serde_json::Value) -> serde_json::Value {
    match value {
        serde_json::Value::Object(map) => {
            let mut keys: Vec<_> = map.keys().collect();
            keys.sort_by(|a, b| a.encode_utf16().cmp(b.encode_utf16()));

            let mut sorted = serde_json::Map::new();
            for key in keys {
                if let Some(v) = map.get(key) {
                    sorted.insert(key.to_string(), sort_keys_utf16(v));
                }
            }
            serde_json::Value::Object(sorted)
        }
        serde_json::Value::Array(arr) => {
            serde_json::Value::Array(arr.iter().map(sort_keys_utf16).collect())
        }
        other => other.clone(),
    }
}

/// Normalize numbers: integer-valued floats → integer repr; reject NaN/Infinity.
fn normalize_value(value: &serde_json::Value) -> Result<serde_json::Value> {
    match value {
        serde_json::Value::Object(map) => {
            let mut normalized = serde_json::Map::new();
            for (k, v) in map.iter() {
                normalized.insert(k.clone(), normalize_value(v)?);
            }
            Ok(serde_json::Value::Object(normalized))
        }
        serde_json::Value::Array(arr) => {
            let normalized = arr
                .iter()
                .map(normalize_value)
                .collect::<Result<Vec<_>>>()?;
            Ok(serde_json::Value::Array(normalized))
        }
        serde_json::Value::Number(n) => {
            if n.is_i64() || n.is_u64() {
                return Ok(serde_json::Value::Number(n.clone()));
            }
            match n.as_f64() {
                Some(f) if !f.is_finite() => Err(ReconcileError::MalformedResource(
                    "NaN/Infinity not permitted in canonical JSON".to_string(),
                )),
                Some(f) if f.fract() == 0.0 && f >= i64::MIN as f64 && f <= i64::MAX as f64 => {
                    Ok(serde_json::Value::Number(serde_json::Number::from(
                        f as i64,
                    )))
                }
                _ => Ok(serde_json::Value::Number(n.clone())),
            }
        }
        other => Ok(other.clone()),
    }
}

/// Convert JSON value to canonical form: normalize numbers → sort keys → compact JSON.
pub fn canonical_json(value: &serde_json::Value) -> Result<String> {
    let normalized = normalize_value(value)?;
    let sorted = sort_keys_utf16(&normalized);
    Ok(serde_json::to_string(&sorted)?)
}

/// Compute SHA256 hex digest of canonical JSON.
pub fn compute_digest(value: &serde_json::Value) -> Result<String> {
    let canonical = canonical_json(value)?;
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    Ok(hex::encode(hasher.finalize()))
}

/// The fields of `object` that define what it *is*.
fn semantic_view(object: &StoredObject) -> Result<serde_json::Value> {
    if !(object.spec.is_object() || object.spec.is_null()) {
        return Err(ReconcileError::MalformedResource(format!(
            "{} {} spec must be a JSON object",
            object.kind,
            object.key()
        )));
    }
    let meta = &object.metadata;
    let annotations: serde_json::Map<String, serde_json::Value> = meta
        .annotations
        .iter()
        .filter(|(k, _)| k.as_str() != HASH_ANNOTATION)
        .map(|(k, v)| (k.clone(), serde_json::Value::String(v.clone())))
        .collect();
    let owners: Vec<serde_json::Value> = meta
        .owner_references
        .iter()
        .map(|r| {
            serde_json::json!({
                "kind": r.kind,
                "name": r.name,
                "controller": r.controller,
            })
        })
        .collect();

    Ok(serde_json::json!({
        "kind": object.kind,
        "name": meta.name,
        "namespace": meta.namespace,
        "labels": meta.labels,
        "annotations": annotations,
        "ownerReferences": owners,
        "spec": object.spec,
    }))
}

/// Digest of the semantic view of `object`.
pub fn compute(object: &StoredObject) -> Result<ContentHash> {
    Ok(ContentHash(compute_digest(&semantic_view(object)?)?))
}

/// Whether `object` differs from what was applied under `stored`.
///
/// A missing stored digest always counts as drift.
pub fn drifted(stored: Option<&str>, object: &StoredObject) -> Result<bool> {
    let fresh = compute(object)?;
    Ok(stored != Some(fresh.as_str()))
}

/// Digest recorded on a live object, if any.
pub fn stored_hash(object: &StoredObject) -> Option<&str> {
    object
        .metadata
        .annotations
        .get(HASH_ANNOTATION)
        .map(String::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;
    use legion_state::{ObjectMeta, OwnerReference, ResourceKind};

    fn route(spec: serde_json::Value) -> StoredObject {
        let mut meta = ObjectMeta::new("team-a", "wine");
        meta.labels.insert("app".to_string(), "wine".to_string());
        meta.owner_references.push(OwnerReference {
            kind: ResourceKind::ModelDeployment,
            name: "wine".to_string(),
            uid: None,
            controller: true,
        });
        StoredObject::new(ResourceKind::ModelRoute, meta, spec)
    }

    #[test]
    fn test_canonical_json_integer_float() {
        let input = serde_json::json!({ "value": 1.0 });
        let canonical = canonical_json(&input).expect("canonical_json");
        assert_eq!(canonical, r#"{"value":1}"#);
    }

    #[test]
    fn test_canonical_json_fractional_float() {
        let input = serde_json::json!({ "value": 1.5 });
        let canonical = canonical_json(&input).expect("canonical_json");
        assert_eq!(canonical, r#"{"value":1.5}"#);
    }

    #[test]
    fn test_canonical_json_nested_field_order_invariant() {
        let input1 = serde_json::json!({ "outer": { "z": 1, "y": 2, "x": 3 } });
        let input2 = serde_json::json!({ "outer": { "x": 3, "y": 2, "z": 1 } });
        assert_eq!(
            canonical_json(&input1).expect("canonical 1"),
            canonical_json(&input2).expect("canonical 2")
        );
    }

    #[test]
    fn test_canonical_json_array_order_preserved() {
        let input1 = serde_json::json!({ "array": [3, 1, 2] });
        let input2 = serde_json::json!({ "array": [1, 2, 3] });
        assert_ne!(
            canonical_json(&input1).expect("canonical 1"),
            canonical_json(&input2).expect("canonical 2")
        );
    }

    #[test]
    fn test_compute_digest_is_hex_sha256() {
        let digest = compute_digest(&serde_json::json!({ "name": "test" })).expect("digest");
        assert_eq!(digest.len(), 64);
        assert!(digest.chars().all(|c: char| c.is_ascii_hexdigit()));
    }

    #[test]
    fn server_fields_and_status_do_not_change_hash() {
        let plain = route(serde_json::json!({ "urlPrefix": "/model/wine" }));
        let mut live = plain.clone();
        live.metadata.uid = Some("3f1c".to_string());
        live.metadata.resource_version = 42;
        live.metadata.creation_timestamp =
            serde_json::from_value(serde_json::json!("2024-01-01T00:00:00Z")).expect("timestamp");
        live.metadata.owner_references[0].uid = Some("owner-uid".to_string());
        live.status = serde_json::json!({ "ready": true });

        assert_eq!(
            compute(&plain).expect("plain"),
            compute(&live).expect("live")
        );
    }

    #[test]
    fn hash_annotation_is_excluded() {
        let plain = route(serde_json::json!({ "urlPrefix": "/model/wine" }));
        let mut annotated = plain.clone();
        annotated
            .metadata
            .annotations
            .insert(HASH_ANNOTATION.to_string(), "deadbeef".to_string());
        assert_eq!(
            compute(&plain).expect("plain"),
            compute(&annotated).expect("annotated")
        );
    }

    #[test]
    fn spec_change_changes_hash() {
        let a = route(serde_json::json!({ "urlPrefix": "/model/wine" }));
        let b = route(serde_json::json!({ "urlPrefix": "/model/beer" }));
        assert_ne!(compute(&a).expect("a"), compute(&b).expect("b"));
    }

    #[test]
    fn drifted_compares_against_stored() {
        let object = route(serde_json::json!({ "feedback": false }));
        let hash = compute(&object).expect("hash");
        assert!(!drifted(Some(hash.as_str()), &object).expect("same"));
        assert!(drifted(Some("stale"), &object).expect("stale"));
        assert!(drifted(None, &object).expect("missing"));
    }

    #[test]
    fn non_object_spec_is_rejected() {
        let object = route(serde_json::json!([1, 2, 3]));
        let err = compute(&object).unwrap_err();
        assert!(matches!(err, ReconcileError::MalformedResource(_)));
    }
}
