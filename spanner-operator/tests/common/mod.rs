//! Shared test utilities for spanner-operator integration tests.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::Arc;

use spanner_admin::MemoryAdmin;
use spanner_operator::key::ObjectKey;
use spanner_operator::recorder::MemoryRecorder;
use spanner_operator::resource::{
    SpannerDatabase, SpannerDatabaseSpec, SpannerInstance, SpannerInstanceSpec,
};
use spanner_operator::store::MemoryStore;
use spanner_operator::{DatabaseReconciler, InstanceReconciler};

pub const PROJECT: &str = "acme";
pub const NAMESPACE: &str = "default";

pub fn labels(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// A `SpannerInstance` named `name` in the default namespace.
pub fn instance(name: &str, config: &str, node_count: i32) -> SpannerInstance {
    let mut obj = SpannerInstance::new(
        name,
        SpannerInstanceSpec {
            display_name: name.to_string(),
            instance_config: config.to_string(),
            node_count,
        },
    );
    obj.metadata.namespace = Some(NAMESPACE.to_string());
    obj
}

pub fn database(name: &str, instance_id: &str) -> SpannerDatabase {
    let mut obj = SpannerDatabase::new(
        name,
        SpannerDatabaseSpec {
            instance_id: instance_id.to_string(),
        },
    );
    obj.metadata.namespace = Some(NAMESPACE.to_string());
    obj
}

pub fn key(name: &str) -> ObjectKey {
    ObjectKey::new(NAMESPACE, name)
}

/// Instance reconciler wired to in-memory collaborators.
pub struct InstanceHarness {
    pub admin: Arc<MemoryAdmin>,
    pub store: Arc<MemoryStore<SpannerInstance>>,
    pub recorder: Arc<MemoryRecorder>,
    pub reconciler: Arc<InstanceReconciler>,
}

impl InstanceHarness {
    pub fn new() -> Self {
        let admin = Arc::new(MemoryAdmin::new(PROJECT));
        let store = Arc::new(MemoryStore::new());
        let recorder = Arc::new(MemoryRecorder::new());
        let reconciler = Arc::new(InstanceReconciler::new(
            admin.clone(),
            store.clone(),
            store.clone(),
            recorder.clone(),
        ));
        Self {
            admin,
            store,
            recorder,
            reconciler,
        }
    }

    pub fn stored(&self, name: &str) -> SpannerInstance {
        self.store.get(&key(name)).expect("object in store")
    }
}

/// Database reconciler wired to in-memory collaborators.
pub struct DatabaseHarness {
    pub admin: Arc<MemoryAdmin>,
    pub store: Arc<MemoryStore<SpannerDatabase>>,
    pub recorder: Arc<MemoryRecorder>,
    pub reconciler: Arc<DatabaseReconciler>,
}

impl DatabaseHarness {
    pub fn new() -> Self {
        let admin = Arc::new(MemoryAdmin::new(PROJECT));
        let store = Arc::new(MemoryStore::new());
        let recorder = Arc::new(MemoryRecorder::new());
        let reconciler = Arc::new(DatabaseReconciler::new(
            admin.clone(),
            store.clone(),
            store.clone(),
            recorder.clone(),
        ));
        Self {
            admin,
            store,
            recorder,
            reconciler,
        }
    }
}
