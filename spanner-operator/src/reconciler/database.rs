//! SpannerDatabase reconciler.

use std::sync::Arc;

use async_trait::async_trait;
use kube::Resource;
use spanner_admin::SpannerAdmin;
use tracing::info;

use super::Reconciler;
use crate::error::{Error, Result};
use crate::key::ObjectKey;
use crate::recorder::{EventRecorder, REASON_SYNC_FAILED, REASON_SYNCED};
use crate::resource::{SpannerDatabase, SpannerDatabaseStatus};
use crate::store::{DesiredStateCache, DesiredStateWriter};

pub const MESSAGE_SYNCED: &str = "SpannerDatabase synced successfully";

/// Creates Spanner databases for `SpannerDatabase` objects.
///
/// Databases are never dropped when their object goes away.
pub struct DatabaseReconciler {
    admin: Arc<dyn SpannerAdmin>,
    cache: Arc<dyn DesiredStateCache<SpannerDatabase>>,
    writer: Arc<dyn DesiredStateWriter<SpannerDatabase>>,
    recorder: Arc<dyn EventRecorder>,
}

impl DatabaseReconciler {
    pub fn new(
        admin: Arc<dyn SpannerAdmin>,
        cache: Arc<dyn DesiredStateCache<SpannerDatabase>>,
        writer: Arc<dyn DesiredStateWriter<SpannerDatabase>>,
        recorder: Arc<dyn EventRecorder>,
    ) -> Self {
        Self {
            admin,
            cache,
            writer,
            recorder,
        }
    }

    async fn reconcile(&self, desired: &SpannerDatabase) -> Result<()> {
        let name = ObjectKey::from_resource(desired).name;
        let instance_id = &desired.spec.instance_id;

        match self.admin.get_instance(instance_id).await {
            Ok(_) => {}
            Err(e) if self.admin.is_not_found_error(&e) => {
                return Err(Error::DependencyMissing(format!(
                    "instance {} of database {} does not exist",
                    instance_id, name
                )));
            }
            Err(e) => return Err(e.into()),
        }

        match self.admin.get_database(instance_id, &name).await {
            Ok(_) => {}
            Err(e) if self.admin.is_not_found_error(&e) => {
                info!("Database {} does not exist on {}, creating", name, instance_id);
                self.admin.create_database(instance_id, &name).await?;
            }
            Err(e) => return Err(e.into()),
        }

        let mut updated = desired.clone();
        updated.status = Some(SpannerDatabaseStatus::default());
        self.writer.update(&updated).await?;
        Ok(())
    }
}

#[async_trait]
impl Reconciler for DatabaseReconciler {
    fn kind(&self) -> &'static str {
        "SpannerDatabase"
    }

    async fn sync(&self, key: &ObjectKey) -> Result<()> {
        let Some(desired) = self.cache.lookup(key) else {
            info!("SpannerDatabase {} no longer exists", key);
            return Ok(());
        };

        match self.reconcile(&desired).await {
            Ok(()) => {
                self.recorder
                    .normal(&desired.object_ref(&()), REASON_SYNCED, MESSAGE_SYNCED);
                Ok(())
            }
            Err(e) => {
                self.recorder
                    .warning(&desired.object_ref(&()), REASON_SYNC_FAILED, &e.to_string());
                Err(e)
            }
        }
    }
}
