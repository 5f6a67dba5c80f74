//! File-system backed mock.
//!
//! One JSON document per resource under `{data_dir}/{project}/`; a missing
//! file is reported as not found. Useful for running the operator against a
//! cluster without touching a real project.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{info, warn};

use crate::admin::SpannerAdmin;
use crate::error::{AdminError, Result};
use crate::model::{Database, DatabaseState, Instance, InstanceState};
use crate::naming;

/// Default data directory used when none is configured.
pub const DEFAULT_DATA_DIR: &str = "/tmp/spanner-operator";

/// Spanner admin mock persisting resources as JSON files.
pub struct FileAdmin {
    project_id: String,
    dir: PathBuf,
}

impl FileAdmin {
    /// Open (and create if needed) the mock directory for `project_id`.
    pub async fn open(data_dir: impl AsRef<Path>, project_id: impl Into<String>) -> Result<Self> {
        let project_id = project_id.into();
        let dir = data_dir.as_ref().join(&project_id);
        tokio::fs::create_dir_all(&dir).await?;
        info!("Mock admin enabled, data directory: {}", dir.display());
        Ok(Self { project_id, dir })
    }

    /// Directory holding this project's documents.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn instance_path(&self, instance_id: &str) -> PathBuf {
        self.dir.join(format!("instance_{}.json", instance_id))
    }

    fn database_path(&self, instance_id: &str, name: &str) -> PathBuf {
        self.dir
            .join(format!("database_{}_{}.json", instance_id, name))
    }

    async fn read<T: serde::de::DeserializeOwned>(&self, path: &Path, what: String) -> Result<T> {
        match tokio::fs::read(path).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(AdminError::NotFound(what)),
            Err(e) => Err(e.into()),
        }
    }

    async fn write<T: serde::Serialize>(&self, path: &Path, value: &T) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(value)?;
        tokio::fs::write(path, bytes).await?;
        Ok(())
    }

    async fn remove(&self, path: &Path, what: String) -> Result<()> {
        match tokio::fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(AdminError::NotFound(what)),
            Err(e) => Err(e.into()),
        }
    }

    async fn modify_instance(
        &self,
        instance_id: &str,
        apply: impl FnOnce(&mut Instance),
    ) -> Result<()> {
        let path = self.instance_path(instance_id);
        let mut instance: Instance = self
            .read(&path, naming::instance_name(&self.project_id, instance_id))
            .await?;
        apply(&mut instance);
        self.write(&path, &instance).await
    }
}

#[async_trait]
impl SpannerAdmin for FileAdmin {
    fn project_id(&self) -> &str {
        &self.project_id
    }

    async fn create_instance(
        &self,
        display_name: &str,
        instance_id: &str,
        config: &str,
        node_count: i32,
    ) -> Result<()> {
        info!("Mock: create instance {}", instance_id);
        let path = self.instance_path(instance_id);
        if tokio::fs::try_exists(&path).await? {
            return Err(AdminError::Api {
                status: 409,
                message: format!("instance {} already exists", instance_id),
            });
        }

        let instance = Instance {
            name: naming::instance_name(&self.project_id, instance_id),
            config: naming::instance_config_name(&self.project_id, config),
            display_name: display_name.to_string(),
            node_count,
            state: InstanceState::Ready,
            labels: BTreeMap::from([("mock".to_string(), "true".to_string())]),
        };
        self.write(&path, &instance).await
    }

    async fn get_instance(&self, instance_id: &str) -> Result<Instance> {
        self.read(
            &self.instance_path(instance_id),
            naming::instance_name(&self.project_id, instance_id),
        )
        .await
    }

    async fn scale(&self, instance_id: &str, node_count: i32) -> Result<()> {
        info!("Mock: scale {} to {} nodes", instance_id, node_count);
        self.modify_instance(instance_id, |i| i.node_count = node_count)
            .await
    }

    async fn update_labels(
        &self,
        instance_id: &str,
        labels: &BTreeMap<String, String>,
    ) -> Result<()> {
        info!("Mock: update labels of {} to {:?}", instance_id, labels);
        let labels = labels.clone();
        self.modify_instance(instance_id, move |i| i.labels = labels)
            .await
    }

    async fn delete_instance(&self, instance_id: &str) -> Result<()> {
        info!("Mock: delete instance {}", instance_id);
        self.remove(
            &self.instance_path(instance_id),
            naming::instance_name(&self.project_id, instance_id),
        )
        .await
    }

    async fn create_database(&self, instance_id: &str, name: &str) -> Result<()> {
        info!("Mock: create database {} on {}", name, instance_id);
        if !tokio::fs::try_exists(self.instance_path(instance_id)).await? {
            warn!("Mock: instance {} does not exist", instance_id);
            return Err(AdminError::NotFound(naming::instance_name(
                &self.project_id,
                instance_id,
            )));
        }

        let database = Database {
            name: naming::database_name(&self.project_id, instance_id, name),
            state: DatabaseState::Ready,
        };
        self.write(&self.database_path(instance_id, name), &database)
            .await
    }

    async fn get_database(&self, instance_id: &str, name: &str) -> Result<Database> {
        self.read(
            &self.database_path(instance_id, name),
            naming::database_name(&self.project_id, instance_id, name),
        )
        .await
    }

    async fn drop_database(&self, instance_id: &str, name: &str) -> Result<()> {
        info!("Mock: drop database {} on {}", name, instance_id);
        self.remove(
            &self.database_path(instance_id, name),
            naming::database_name(&self.project_id, instance_id, name),
        )
        .await
    }
}
