//! Reconcilers for the Spanner resource kinds.
//!
//! Each reconciler resolves a key against the desired-state cache, compares
//! it with what Spanner reports and issues the calls needed to converge.

pub mod database;
pub mod instance;

use async_trait::async_trait;

use crate::error::Result;
use crate::key::ObjectKey;

pub use database::DatabaseReconciler;
pub use instance::InstanceReconciler;

/// Trait for resource reconcilers.
#[async_trait]
pub trait Reconciler: Send + Sync + 'static {
    /// Resource kind, used in logs and queue names.
    fn kind(&self) -> &'static str;

    /// Converge the object identified by `key`.
    ///
    /// An error re-queues the key with backoff.
    async fn sync(&self, key: &ObjectKey) -> Result<()>;
}
