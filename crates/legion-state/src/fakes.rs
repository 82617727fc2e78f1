//! In-memory resource store
//!
//! `MemoryResourceStore` satisfies the `ResourceStore` contract without any
//! external dependencies. Besides backing tests it powers `legiond` when no
//! cluster is attached. It keeps a journal of writes and supports one-shot
//! fault injection so callers can assert exactly what was written.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use futures::channel::mpsc::{unbounded, UnboundedSender};
use futures::stream::BoxStream;
use futures::StreamExt;

use crate::error::StorageError;
use crate::resource::{
    EventType, ObjectKey, OwnerReference, ResourceEvent, ResourceKind, StoredObject,
};
use crate::storage_traits::*;

/// Kind of write recorded in the journal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOp {
    Create,
    Update,
    Delete,
}

/// One journal entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteRecord {
    pub op: WriteOp,
    pub kind: ResourceKind,
    pub key: ObjectKey,
}

/// Store operation a fault can be attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultOp {
    Get,
    List,
    Create,
    Update,
}

#[derive(Debug)]
struct Fault {
    op: FaultOp,
    kind: ResourceKind,
    error: StorageError,
}

type StoreKey = (ResourceKind, String, String);

fn store_key(kind: ResourceKind, namespace: &str, name: &str) -> StoreKey {
    (kind, namespace.to_string(), name.to_string())
}

#[derive(Debug, Default)]
struct Inner {
    objects: BTreeMap<StoreKey, StoredObject>,
    next_version: u64,
    journal: Vec<WriteRecord>,
    faults: Vec<Fault>,
    watchers: Vec<UnboundedSender<ResourceEvent>>,
}

impl Inner {
    fn take_fault(&mut self, op: FaultOp, kind: ResourceKind) -> Option<StorageError> {
        let idx = self
            .faults
            .iter()
            .position(|f| f.op == op && f.kind == kind)?;
        Some(self.faults.remove(idx).error)
    }

    fn bump_version(&mut self) -> u64 {
        self.next_version += 1;
        self.next_version
    }

    fn publish(&mut self, kind: ResourceKind, key: ObjectKey, event_type: EventType) {
        let event = ResourceEvent {
            kind,
            key,
            event_type,
        };
        // Closed receivers are dropped here.
        self.watchers
            .retain(|tx| tx.unbounded_send(event.clone()).is_ok());
    }

    fn admit(&mut self, mut object: StoredObject) -> StorageResult<StoredObject> {
        if object.metadata.name.is_empty() || object.metadata.namespace.is_empty() {
            return Err(StorageError::InvalidObject(format!(
                "{} requires a name and a namespace",
                object.kind
            )));
        }
        let key = store_key(
            object.kind,
            &object.metadata.namespace,
            &object.metadata.name,
        );
        if self.objects.contains_key(&key) {
            return Err(StorageError::AlreadyExists {
                kind: object.kind,
                namespace: object.metadata.namespace,
                name: object.metadata.name,
            });
        }
        if let Some(owner_ref) = object.metadata.controller_ref() {
            if !self.owner_is_live(owner_ref, &object.metadata.namespace) {
                return Err(StorageError::not_found(
                    owner_ref.kind,
                    &object.metadata.namespace,
                    &owner_ref.name,
                ));
            }
        }
        object.metadata.uid = Some(uuid::Uuid::new_v4().to_string());
        object.metadata.resource_version = self.bump_version();
        object.metadata.creation_timestamp = Some(Utc::now());
        self.objects.insert(key, object.clone());
        self.publish(object.kind, object.key(), EventType::Applied);
        Ok(object)
    }

    /// Whether the controller named by `owner_ref` exists, matched by uid
    /// when the reference carries one.
    fn owner_is_live(&self, owner_ref: &OwnerReference, namespace: &str) -> bool {
        match self
            .objects
            .get(&store_key(owner_ref.kind, namespace, &owner_ref.name))
        {
            Some(owner) => match (&owner_ref.uid, &owner.metadata.uid) {
                (Some(ref_uid), Some(owner_uid)) => ref_uid == owner_uid,
                _ => true,
            },
            None => false,
        }
    }

    /// Keys of everything transitively controlled by `root`, `root` included.
    fn cascade_from(&self, root: &StoreKey) -> Vec<StoreKey> {
        let mut doomed = vec![root.clone()];
        let mut cursor = 0;
        while cursor < doomed.len() {
            let Some(owner) = self.objects.get(&doomed[cursor]) else {
                cursor += 1;
                continue;
            };
            for (key, candidate) in &self.objects {
                if doomed.contains(key) {
                    continue;
                }
                if let Some(owner_ref) = candidate.metadata.controller_ref() {
                    let same_owner = match (&owner_ref.uid, &owner.metadata.uid) {
                        (Some(ref_uid), Some(owner_uid)) => ref_uid == owner_uid,
                        _ => {
                            owner_ref.kind == owner.kind
                                && owner_ref.name == owner.metadata.name
                                && candidate.metadata.namespace == owner.metadata.namespace
                        }
                    };
                    if same_owner {
                        doomed.push(key.clone());
                    }
                }
            }
            cursor += 1;
        }
        doomed
    }
}

/// In-memory resource store backed by a `BTreeMap<(kind, namespace, name), object>`.
#[derive(Debug, Default)]
pub struct MemoryResourceStore {
    inner: Mutex<Inner>,
}

impl MemoryResourceStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Insert an object as an external actor would, bypassing the journal.
    pub fn seed(&self, object: StoredObject) -> StorageResult<StoredObject> {
        self.lock().admit(object)
    }

    /// Overwrite the status of an object as its own controller would.
    ///
    /// Bumps the resource version and notifies watchers; not journaled.
    pub fn set_status(
        &self,
        kind: ResourceKind,
        namespace: &str,
        name: &str,
        status: serde_json::Value,
    ) -> StorageResult<()> {
        let mut inner = self.lock();
        let version = inner.bump_version();
        let object = inner
            .objects
            .get_mut(&store_key(kind, namespace, name))
            .ok_or_else(|| StorageError::not_found(kind, namespace, name))?;
        object.status = status;
        object.metadata.resource_version = version;
        let key = object.key();
        inner.publish(kind, key, EventType::Applied);
        Ok(())
    }

    /// Fail the next `op` against `kind` with `error`.
    pub fn inject_fault(&self, op: FaultOp, kind: ResourceKind, error: StorageError) {
        self.lock().faults.push(Fault { op, kind, error });
    }

    /// Writes issued through the `ResourceStore` trait, oldest first.
    pub fn journal(&self) -> Vec<WriteRecord> {
        self.lock().journal.clone()
    }

    pub fn clear_journal(&self) {
        self.lock().journal.clear();
    }

    /// Number of journaled writes of `op` against `kind`.
    pub fn write_count(&self, op: WriteOp, kind: ResourceKind) -> usize {
        self.lock()
            .journal
            .iter()
            .filter(|w| w.op == op && w.kind == kind)
            .count()
    }

    pub fn len(&self) -> usize {
        self.lock().objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ResourceStore for MemoryResourceStore {
    async fn get(
        &self,
        kind: ResourceKind,
        namespace: &str,
        name: &str,
    ) -> StorageResult<Option<StoredObject>> {
        let mut inner = self.lock();
        if let Some(err) = inner.take_fault(FaultOp::Get, kind) {
            return Err(err);
        }
        Ok(inner
            .objects
            .get(&store_key(kind, namespace, name))
            .cloned())
    }

    async fn list(
        &self,
        kind: ResourceKind,
        namespace: Option<&str>,
    ) -> StorageResult<Vec<StoredObject>> {
        let mut inner = self.lock();
        if let Some(err) = inner.take_fault(FaultOp::List, kind) {
            return Err(err);
        }
        Ok(inner
            .objects
            .values()
            .filter(|o| o.kind == kind)
            .filter(|o| namespace.map(|ns| o.metadata.namespace == ns).unwrap_or(true))
            .cloned()
            .collect())
    }

    async fn create(&self, object: StoredObject) -> StorageResult<StoredObject> {
        let mut inner = self.lock();
        if let Some(err) = inner.take_fault(FaultOp::Create, object.kind) {
            return Err(err);
        }
        let created = inner.admit(object)?;
        inner.journal.push(WriteRecord {
            op: WriteOp::Create,
            kind: created.kind,
            key: created.key(),
        });
        Ok(created)
    }

    async fn update(&self, mut object: StoredObject) -> StorageResult<StoredObject> {
        let mut inner = self.lock();
        if let Some(err) = inner.take_fault(FaultOp::Update, object.kind) {
            return Err(err);
        }
        let key = store_key(
            object.kind,
            &object.metadata.namespace,
            &object.metadata.name,
        );
        let (uid, created_at, actual) = match inner.objects.get(&key) {
            Some(existing) => (
                existing.metadata.uid.clone(),
                existing.metadata.creation_timestamp,
                existing.metadata.resource_version,
            ),
            None => {
                return Err(StorageError::not_found(
                    object.kind,
                    &object.metadata.namespace,
                    &object.metadata.name,
                ))
            }
        };
        if object.metadata.resource_version != actual {
            return Err(StorageError::Conflict {
                kind: object.kind,
                namespace: object.metadata.namespace,
                name: object.metadata.name,
                expected: object.metadata.resource_version,
                actual,
            });
        }
        object.metadata.uid = uid;
        object.metadata.creation_timestamp = created_at;
        object.metadata.resource_version = inner.bump_version();
        inner.objects.insert(key, object.clone());
        inner.journal.push(WriteRecord {
            op: WriteOp::Update,
            kind: object.kind,
            key: object.key(),
        });
        inner.publish(object.kind, object.key(), EventType::Applied);
        Ok(object)
    }

    async fn delete(&self, kind: ResourceKind, namespace: &str, name: &str) -> StorageResult<()> {
        let mut inner = self.lock();
        let root = store_key(kind, namespace, name);
        if !inner.objects.contains_key(&root) {
            return Ok(());
        }
        for key in inner.cascade_from(&root) {
            if let Some(removed) = inner.objects.remove(&key) {
                tracing::debug!(kind = %removed.kind, key = %removed.key(), "object deleted");
                inner.journal.push(WriteRecord {
                    op: WriteOp::Delete,
                    kind: removed.kind,
                    key: removed.key(),
                });
                inner.publish(removed.kind, removed.key(), EventType::Deleted);
            }
        }
        Ok(())
    }

    fn watch(&self) -> BoxStream<'static, ResourceEvent> {
        let (tx, rx) = unbounded();
        self.lock().watchers.push(tx);
        rx.boxed()
    }
}
