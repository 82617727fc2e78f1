//! Storage trait definitions for the operator
//!
//! `ResourceStore` is the contract the reconciler consumes: keyed reads,
//! writes with optimistic concurrency, and a change-notification stream.
//! An in-memory implementation is provided in the `fakes` module.

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::error::StorageError;
use crate::resource::{ResourceEvent, ResourceKind, StoredObject};

/// Result type for storage operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Cluster resource store.
///
/// Guarantees:
/// - `get` of an absent object is `Ok(None)`, never an error.
/// - `create` assigns `uid`, `resource_version` and `creation_timestamp`;
///   values supplied by the caller are ignored.
/// - `update` succeeds only when the caller's `resource_version` equals the
///   stored one (`Conflict` otherwise) and bumps it; `uid` and
///   `creation_timestamp` are preserved.
/// - `delete` removes the object and, transitively, every object whose
///   controller owner reference points at it.
/// - Every successful write is published to all open `watch` streams.
#[async_trait]
pub trait ResourceStore: Send + Sync {
    /// Fetch one object.
    async fn get(
        &self,
        kind: ResourceKind,
        namespace: &str,
        name: &str,
    ) -> StorageResult<Option<StoredObject>>;

    /// List objects of a kind, optionally restricted to one namespace.
    async fn list(
        &self,
        kind: ResourceKind,
        namespace: Option<&str>,
    ) -> StorageResult<Vec<StoredObject>>;

    /// Create a new object. Fails with `AlreadyExists` if the key is taken.
    async fn create(&self, object: StoredObject) -> StorageResult<StoredObject>;

    /// Replace an existing object. Fails with `NotFound` or `Conflict`.
    async fn update(&self, object: StoredObject) -> StorageResult<StoredObject>;

    /// Delete an object and cascade to its dependents. No-op if absent.
    async fn delete(&self, kind: ResourceKind, namespace: &str, name: &str) -> StorageResult<()>;

    /// Subscribe to change notifications from this point on.
    fn watch(&self) -> BoxStream<'static, ResourceEvent>;
}
