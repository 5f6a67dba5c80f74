//! Kubernetes-backed desired state.

use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;
use kube::api::{Api, Patch, PatchParams, PostParams};
use kube::runtime::reflector::{ObjectRef, Store};
use kube::{Client, Resource, ResourceExt};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::debug;

use super::{DesiredStateCache, DesiredStateWriter};
use crate::error::{Error, Result};
use crate::key::ObjectKey;

/// Cache over a reflector store kept current by a watch.
pub struct KubeCache<K: Resource<DynamicType = ()> + 'static> {
    store: Store<K>,
}

impl<K: Resource<DynamicType = ()> + Clone + 'static> KubeCache<K> {
    pub fn new(store: Store<K>) -> Self {
        Self { store }
    }
}

impl<K> DesiredStateCache<K> for KubeCache<K>
where
    K: Resource<DynamicType = ()> + Clone + Send + Sync + 'static,
{
    fn lookup(&self, key: &ObjectKey) -> Option<Arc<K>> {
        self.store
            .get(&ObjectRef::new(&key.name).within(&key.namespace))
    }

    fn keys(&self) -> Vec<ObjectKey> {
        self.store
            .state()
            .iter()
            .map(|obj| ObjectKey::from_resource(obj.as_ref()))
            .collect()
    }
}

/// Writes objects back through the API server.
///
/// The object is replaced first; its status is then merged through the
/// status subresource, which a plain replace ignores.
pub struct KubeWriter {
    client: Client,
}

impl KubeWriter {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl<K> DesiredStateWriter<K> for KubeWriter
where
    K: Resource<DynamicType = (), Scope = k8s_openapi::NamespaceResourceScope>
        + Clone
        + Debug
        + Serialize
        + DeserializeOwned
        + Send
        + Sync
        + 'static,
{
    async fn update(&self, obj: &K) -> Result<K> {
        let namespace = obj.namespace().unwrap_or_default();
        let name = obj.name_any();
        let api: Api<K> = Api::namespaced(self.client.clone(), &namespace);

        let replaced = api.replace(&name, &PostParams::default(), obj).await?;

        let value = serde_json::to_value(obj).map_err(|e| Error::Store(e.to_string()))?;
        match value.get("status") {
            Some(status) if !status.is_null() => {
                debug!("Patching status of {}/{}", namespace, name);
                let patch = json!({ "status": status });
                Ok(api
                    .patch_status(&name, &PatchParams::default(), &Patch::Merge(&patch))
                    .await?)
            }
            _ => Ok(replaced),
        }
    }
}
