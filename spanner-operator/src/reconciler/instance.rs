//! SpannerInstance reconciler.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use kube::Resource;
use spanner_admin::{Instance, SpannerAdmin, instance_config};
use tracing::{info, warn};

use super::Reconciler;
use crate::error::Result;
use crate::key::ObjectKey;
use crate::recorder::{EventRecorder, REASON_SCALE_FAILED, REASON_SYNC_FAILED, REASON_SYNCED};
use crate::resource::{SpannerInstance, SpannerInstanceStatus};
use crate::store::{DesiredStateCache, DesiredStateWriter};

pub const MESSAGE_SYNCED: &str = "SpannerInstance synced successfully";

/// How a reconciliation that did not fail ended.
#[derive(Debug, PartialEq, Eq)]
enum Outcome {
    Synced,
    /// Scaling failed; the rest of the pass was skipped.
    ScaleFailed,
}

/// Keeps Spanner instances in line with `SpannerInstance` objects.
pub struct InstanceReconciler {
    admin: Arc<dyn SpannerAdmin>,
    cache: Arc<dyn DesiredStateCache<SpannerInstance>>,
    writer: Arc<dyn DesiredStateWriter<SpannerInstance>>,
    recorder: Arc<dyn EventRecorder>,
}

impl InstanceReconciler {
    pub fn new(
        admin: Arc<dyn SpannerAdmin>,
        cache: Arc<dyn DesiredStateCache<SpannerInstance>>,
        writer: Arc<dyn DesiredStateWriter<SpannerInstance>>,
        recorder: Arc<dyn EventRecorder>,
    ) -> Self {
        Self {
            admin,
            cache,
            writer,
            recorder,
        }
    }

    /// The object is gone: delete the instance if it still exists.
    async fn finalize(&self, key: &ObjectKey) -> Result<()> {
        info!("SpannerInstance {} no longer exists", key);
        match self.admin.get_instance(&key.name).await {
            Ok(_) => {
                info!("Deleting orphaned instance {}", key.name);
                self.admin.delete_instance(&key.name).await?;
                Ok(())
            }
            Err(e) if self.admin.is_not_found_error(&e) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Fetch the instance, creating it if it does not exist.
    async fn get_or_create(&self, desired: &SpannerInstance, id: &str) -> Result<Instance> {
        match self.admin.get_instance(id).await {
            Ok(instance) => return Ok(instance),
            Err(e) if self.admin.is_not_found_error(&e) => {}
            Err(e) => return Err(e.into()),
        }

        let spec = &desired.spec;
        info!(
            "Instance {} does not exist, creating ({}, {} nodes)",
            id, spec.instance_config, spec.node_count
        );
        self.admin
            .create_instance(&spec.display_name, id, &spec.instance_config, spec.node_count)
            .await?;

        if let Some(labels) = desired.metadata.labels.as_ref().filter(|l| !l.is_empty()) {
            self.admin.update_labels(id, labels).await?;
        }
        Ok(self.admin.get_instance(id).await?)
    }

    async fn reconcile(&self, desired: &SpannerInstance) -> Result<Outcome> {
        let id = ObjectKey::from_resource(desired).name;
        let spec = &desired.spec;

        if !instance_config::is_known(&spec.instance_config) {
            warn!("Unknown instance config {:?} for {}", spec.instance_config, id);
        }

        let observed = self.get_or_create(desired, &id).await?;

        let mut available_nodes = observed.node_count;
        if spec.node_count != observed.node_count {
            info!(
                "Node count of {} is {}, scaling to {}",
                id, observed.node_count, spec.node_count
            );
            if let Err(e) = self.admin.scale(&id, spec.node_count).await {
                warn!("Failed to scale {} to {} nodes: {}", id, spec.node_count, e);
                self.recorder.warning(
                    &desired.object_ref(&()),
                    REASON_SCALE_FAILED,
                    &format!("Failed to scale to {} nodes: {}", spec.node_count, e),
                );
                return Ok(Outcome::ScaleFailed);
            }
            available_nodes = spec.node_count;
        }

        let (labels, dirty) = merge_labels(
            desired.metadata.labels.as_ref().unwrap_or(&BTreeMap::new()),
            &observed.labels,
        );
        if dirty {
            info!("Labels of {} differ, updating to {:?}", id, labels);
            self.admin.update_labels(&id, &labels).await?;
        }

        // Fresh copy; the cached object is shared
        let mut updated = desired.clone();
        if !labels.is_empty() || updated.metadata.labels.is_some() {
            updated.metadata.labels = Some(labels.clone());
        }
        updated.status = Some(SpannerInstanceStatus {
            available_nodes,
            instance_labels: labels,
        });
        self.writer.update(&updated).await?;

        Ok(Outcome::Synced)
    }
}

/// Merge observed labels into the desired ones.
///
/// Observed keys missing from `desired` are adopted. A key present on both
/// sides with different values keeps the desired value. Returns the merged
/// map and whether it has to be pushed to the instance.
pub fn merge_labels(
    desired: &BTreeMap<String, String>,
    observed: &BTreeMap<String, String>,
) -> (BTreeMap<String, String>, bool) {
    let mut merged = desired.clone();
    let mut dirty = false;
    for (k, v) in observed {
        match merged.get(k) {
            Some(val) if val != v => dirty = true,
            Some(_) => {}
            None => {
                merged.insert(k.clone(), v.clone());
                dirty = true;
            }
        }
    }
    (merged, dirty)
}

#[async_trait]
impl Reconciler for InstanceReconciler {
    fn kind(&self) -> &'static str {
        "SpannerInstance"
    }

    async fn sync(&self, key: &ObjectKey) -> Result<()> {
        let Some(desired) = self.cache.lookup(key) else {
            return self.finalize(key).await;
        };

        match self.reconcile(&desired).await {
            Ok(Outcome::Synced) => {
                self.recorder
                    .normal(&desired.object_ref(&()), REASON_SYNCED, MESSAGE_SYNCED);
                Ok(())
            }
            Ok(Outcome::ScaleFailed) => Ok(()),
            Err(e) => {
                self.recorder
                    .warning(&desired.object_ref(&()), REASON_SYNC_FAILED, &e.to_string());
                Err(e)
            }
        }
    }
}
