//! Legion-State: resource store layer for the Legion deployment operator
//!
//! This crate defines the contract between the reconciliation engine and the
//! cluster resource store, plus an in-memory store that satisfies it.
//!
//! ## Layer 0 - Data/Persistence
//!
//! Focus: keyed reads, optimistic-concurrency writes, ownership cascades and
//! change notification.
//!
//! ## Key Components
//!
//! - `ResourceStore`: async store contract (get/list/create/update/delete/watch)
//! - `StoredObject`: dynamic object form (typed metadata, JSON spec and status)
//! - `MemoryResourceStore`: in-memory implementation with a write journal

mod error;
pub mod fakes;
pub mod resource;
pub mod storage_traits;

pub use error::StorageError;
pub use fakes::MemoryResourceStore;
pub use resource::{
    EventType, ObjectKey, ObjectMeta, OwnerReference, ResourceEvent, ResourceKind, StoredObject,
};
pub use storage_traits::{ResourceStore, StorageResult};
