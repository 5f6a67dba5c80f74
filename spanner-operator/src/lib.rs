//! Declarative operator for Cloud Spanner.
//!
//! Watches `SpannerInstance` and `SpannerDatabase` objects and converges
//! Spanner instances and databases towards them. Each resource kind has a
//! [`Reconciler`](reconciler::Reconciler) driven by a
//! [`Controller`](controller::Controller) worker pool pulling keys from a
//! rate-limited [`WorkQueue`](workqueue::WorkQueue).

pub mod config;
pub mod controller;
pub mod error;
pub mod key;
pub mod reconciler;
pub mod recorder;
pub mod resource;
pub mod store;
pub mod watch;
pub mod workqueue;

pub use config::{Backend, OperatorConfig};
pub use controller::Controller;
pub use error::{Error, Result};
pub use key::ObjectKey;
pub use reconciler::{DatabaseReconciler, InstanceReconciler, Reconciler};
pub use recorder::{EventRecorder, EventType, KubeRecorder, MemoryRecorder, TracingRecorder};
pub use resource::{SpannerDatabase, SpannerDatabaseSpec, SpannerInstance, SpannerInstanceSpec};
pub use workqueue::WorkQueue;
