//! The admin contract shared by the live client, the mock and the fake.

use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::error::{AdminError, Result};
use crate::model::{Database, Instance};

/// Instance and database administration for one project.
///
/// Mutations that the API runs as long-running operations (instance create,
/// scale, label update, database create) return only once the operation has
/// finished, successfully or not.
#[async_trait]
pub trait SpannerAdmin: Send + Sync {
    /// Project every call is scoped to.
    fn project_id(&self) -> &str;

    /// Create an instance and wait for the operation to finish.
    async fn create_instance(
        &self,
        display_name: &str,
        instance_id: &str,
        config: &str,
        node_count: i32,
    ) -> Result<()>;

    /// Fetch an instance.
    async fn get_instance(&self, instance_id: &str) -> Result<Instance>;

    /// Set the node count and wait for the operation to finish.
    async fn scale(&self, instance_id: &str, node_count: i32) -> Result<()>;

    /// Replace the label set and wait for the operation to finish.
    async fn update_labels(&self, instance_id: &str, labels: &BTreeMap<String, String>)
    -> Result<()>;

    async fn delete_instance(&self, instance_id: &str) -> Result<()>;

    /// Create a database and wait for the operation to finish.
    async fn create_database(&self, instance_id: &str, name: &str) -> Result<()>;

    async fn get_database(&self, instance_id: &str, name: &str) -> Result<Database>;

    async fn drop_database(&self, instance_id: &str, name: &str) -> Result<()>;

    /// The only classification callers branch on.
    fn is_not_found_error(&self, err: &AdminError) -> bool {
        err.is_not_found()
    }
}
