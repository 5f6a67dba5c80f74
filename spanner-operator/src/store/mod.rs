//! Desired-state cache and store capabilities.
//!
//! The reconcilers only read desired objects through [`DesiredStateCache`]
//! and write normalized copies back through [`DesiredStateWriter`], so they
//! run the same against Kubernetes and against the in-memory store.

pub mod kube;
pub mod memory;

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;
use crate::key::ObjectKey;

pub use self::kube::{KubeCache, KubeWriter};
pub use self::memory::{MemoryStore, StoreEvent};

/// Read-only local mirror of desired objects.
pub trait DesiredStateCache<K>: Send + Sync {
    /// The cached object for `key`, or `None` if it does not exist (anymore).
    ///
    /// The returned object is shared with the cache and must not be mutated.
    fn lookup(&self, key: &ObjectKey) -> Option<Arc<K>>;

    /// Keys of every cached object.
    fn keys(&self) -> Vec<ObjectKey>;
}

/// Write access to the authoritative desired-state store.
#[async_trait]
pub trait DesiredStateWriter<K>: Send + Sync {
    /// Replace the stored object (including its status) with `obj`.
    async fn update(&self, obj: &K) -> Result<K>;
}
