//! Operator error types.

use spanner_admin::AdminError;
use thiserror::Error;

/// Errors that can occur while reconciling.
#[derive(Debug, Error)]
pub enum Error {
    /// Cloud Spanner admin call failed.
    #[error("spanner admin: {0}")]
    Admin(#[from] AdminError),

    /// Writing back to the desired-state store failed.
    #[error("store: {0}")]
    Store(String),

    #[error("kubernetes: {0}")]
    Kube(#[from] kube::Error),

    /// A work item is not a valid `namespace/name` key.
    #[error("malformed key: {0:?}")]
    MalformedKey(String),

    /// A resource this one depends on does not exist.
    #[error("dependency missing: {0}")]
    DependencyMissing(String),

    /// Invalid configuration.
    #[error("config: {0}")]
    Config(String),

    /// The desired-state cache did not finish its initial sync.
    #[error("cache sync: {0}")]
    CacheSync(String),
}

impl Error {
    /// Whether re-queueing the item can ever help.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Error::MalformedKey(_))
    }
}

/// Result type for operator operations.
pub type Result<T> = std::result::Result<T, Error>;
