//! Trait contract tests for ResourceStore.
//!
//! These tests verify the behavioral contract of the store trait using the
//! in-memory implementation. Any conforming backend must pass these.

use futures::StreamExt;
use legion_state::fakes::{MemoryResourceStore, WriteOp};
use legion_state::storage_traits::*;
use legion_state::{
    EventType, ObjectMeta, OwnerReference, ResourceKind, StorageError, StoredObject,
};

fn deployment(name: &str) -> StoredObject {
    StoredObject::new(
        ResourceKind::ModelDeployment,
        ObjectMeta::new("team-a", name),
        serde_json::json!({ "image": "registry/model:1" }),
    )
}

fn owned_by(kind: ResourceKind, owner: &StoredObject) -> StoredObject {
    let mut meta = ObjectMeta::new(owner.metadata.namespace.clone(), owner.metadata.name.clone());
    meta.owner_references.push(OwnerReference {
        kind: owner.kind,
        name: owner.metadata.name.clone(),
        uid: owner.metadata.uid.clone(),
        controller: true,
    });
    StoredObject::new(kind, meta, serde_json::json!({}))
}

// ===========================================================================
// get / create
// ===========================================================================

#[tokio::test]
async fn get_absent_is_none() {
    let store = MemoryResourceStore::new();
    let found = store
        .get(ResourceKind::ModelDeployment, "team-a", "missing")
        .await
        .unwrap();
    assert!(found.is_none());
}

#[tokio::test]
async fn create_then_get_round_trip() {
    let store = MemoryResourceStore::new();
    let created = store.create(deployment("wine")).await.unwrap();
    let fetched = store
        .get(ResourceKind::ModelDeployment, "team-a", "wine")
        .await
        .unwrap()
        .expect("present");

    assert_eq!(created, fetched);
    assert_eq!(fetched.spec["image"], "registry/model:1");
}

#[tokio::test]
async fn create_duplicate_is_already_exists() {
    let store = MemoryResourceStore::new();
    store.create(deployment("wine")).await.unwrap();
    let err = store.create(deployment("wine")).await.unwrap_err();

    assert!(matches!(err, StorageError::AlreadyExists { .. }));
    assert!(err.is_conflict());
}

#[tokio::test]
async fn create_ignores_caller_supplied_server_fields() {
    let store = MemoryResourceStore::new();
    let mut obj = deployment("wine");
    obj.metadata.uid = Some("forged".to_string());
    obj.metadata.resource_version = 999;

    let created = store.create(obj).await.unwrap();
    assert_ne!(created.metadata.uid.as_deref(), Some("forged"));
    assert_ne!(created.metadata.resource_version, 999);
}

#[tokio::test]
async fn create_without_name_is_rejected() {
    let store = MemoryResourceStore::new();
    let err = store.create(deployment("")).await.unwrap_err();
    assert!(matches!(err, StorageError::InvalidObject(_)));
}

// ===========================================================================
// update
// ===========================================================================

#[tokio::test]
async fn update_bumps_version_and_keeps_identity() {
    let store = MemoryResourceStore::new();
    let created = store.create(deployment("wine")).await.unwrap();

    let mut changed = created.clone();
    changed.spec = serde_json::json!({ "image": "registry/model:2" });
    let updated = store.update(changed).await.unwrap();

    assert!(updated.metadata.resource_version > created.metadata.resource_version);
    assert_eq!(updated.metadata.uid, created.metadata.uid);
    assert_eq!(
        updated.metadata.creation_timestamp,
        created.metadata.creation_timestamp
    );
}

#[tokio::test]
async fn update_with_stale_version_conflicts() {
    let store = MemoryResourceStore::new();
    let created = store.create(deployment("wine")).await.unwrap();
    store.update(created.clone()).await.unwrap();

    let err = store.update(created).await.unwrap_err();
    assert!(matches!(err, StorageError::Conflict { .. }));
}

#[tokio::test]
async fn update_absent_is_not_found() {
    let store = MemoryResourceStore::new();
    let err = store.update(deployment("ghost")).await.unwrap_err();
    assert!(err.is_not_found());
}

// ===========================================================================
// list / delete
// ===========================================================================

#[tokio::test]
async fn list_filters_by_kind_and_namespace() {
    let store = MemoryResourceStore::new();
    store.create(deployment("a")).await.unwrap();
    store.create(deployment("b")).await.unwrap();
    let mut other_ns = deployment("c");
    other_ns.metadata.namespace = "team-b".to_string();
    store.create(other_ns).await.unwrap();

    let all = store
        .list(ResourceKind::ModelDeployment, None)
        .await
        .unwrap();
    assert_eq!(all.len(), 3);

    let team_a = store
        .list(ResourceKind::ModelDeployment, Some("team-a"))
        .await
        .unwrap();
    assert_eq!(team_a.len(), 2);

    let routes = store.list(ResourceKind::ModelRoute, None).await.unwrap();
    assert!(routes.is_empty());
}

#[tokio::test]
async fn delete_cascades_to_controlled_dependents() {
    let store = MemoryResourceStore::new();
    let owner = store.create(deployment("wine")).await.unwrap();
    store
        .create(owned_by(ResourceKind::ServingConfiguration, &owner))
        .await
        .unwrap();
    store
        .create(owned_by(ResourceKind::ModelRoute, &owner))
        .await
        .unwrap();
    store.create(deployment("unrelated")).await.unwrap();

    store
        .delete(ResourceKind::ModelDeployment, "team-a", "wine")
        .await
        .unwrap();

    assert_eq!(store.len(), 1);
    assert_eq!(store.write_count(WriteOp::Delete, ResourceKind::ModelRoute), 1);
    assert!(store
        .get(ResourceKind::ServingConfiguration, "team-a", "wine")
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn delete_absent_is_noop() {
    let store = MemoryResourceStore::new();
    store
        .delete(ResourceKind::ModelDeployment, "team-a", "ghost")
        .await
        .unwrap();
    assert!(store.journal().is_empty());
}

// ===========================================================================
// watch
// ===========================================================================

#[tokio::test]
async fn watch_delivers_writes_in_order() {
    let store = MemoryResourceStore::new();
    let mut events = store.watch();

    let created = store.create(deployment("wine")).await.unwrap();
    store.update(created).await.unwrap();
    store
        .delete(ResourceKind::ModelDeployment, "team-a", "wine")
        .await
        .unwrap();

    let first = events.next().await.expect("create event");
    assert_eq!(first.event_type, EventType::Applied);
    assert_eq!(first.key.name, "wine");
    let second = events.next().await.expect("update event");
    assert_eq!(second.event_type, EventType::Applied);
    let third = events.next().await.expect("delete event");
    assert_eq!(third.event_type, EventType::Deleted);
}

#[tokio::test]
async fn set_status_notifies_without_journal_entry() {
    let store = MemoryResourceStore::new();
    let created = store.create(deployment("wine")).await.unwrap();
    store.clear_journal();
    let mut events = store.watch();

    store
        .set_status(
            ResourceKind::ModelDeployment,
            "team-a",
            "wine",
            serde_json::json!({ "phase": "Ready" }),
        )
        .unwrap();

    let event = events.next().await.expect("status event");
    assert_eq!(event.kind, ResourceKind::ModelDeployment);
    assert!(store.journal().is_empty());

    let fetched = store
        .get(ResourceKind::ModelDeployment, "team-a", "wine")
        .await
        .unwrap()
        .expect("present");
    assert_eq!(fetched.status["phase"], "Ready");
    assert!(fetched.metadata.resource_version > created.metadata.resource_version);
}
