//! Cloud Spanner administrative facade.
//!
//! [`SpannerAdmin`] is the contract the operator reconciles against. Three
//! implementations are provided:
//!
//! - [`RestAdmin`]: the live Spanner Admin REST API
//! - [`FileAdmin`]: a mock persisting one JSON file per resource
//! - [`MemoryAdmin`]: an in-memory fake that records calls
//!
//! # Example
//! ```ignore
//! use spanner_admin::{FileAdmin, SpannerAdmin};
//!
//! let admin = FileAdmin::open("/tmp/spanner-operator", "my-project").await?;
//! admin.create_instance("Prod", "prod-1", "regional-us-central1", 1).await?;
//! ```

pub mod admin;
pub mod credentials;
pub mod error;
pub mod instance_config;
pub mod memory;
pub mod mock;
pub mod model;
pub mod naming;
pub mod rest;

pub use admin::SpannerAdmin;
pub use credentials::{MetadataServer, TokenSource};
pub use error::{AdminError, Result};
pub use memory::{Call, MemoryAdmin, Op};
pub use mock::FileAdmin;
pub use model::{Database, DatabaseState, Instance, InstanceState};
pub use rest::{RestAdmin, RestConfig};
