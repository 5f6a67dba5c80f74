//! In-memory desired state.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use kube::Resource;
use tokio::sync::broadcast;

use super::{DesiredStateCache, DesiredStateWriter};
use crate::error::{Error, Result};
use crate::key::ObjectKey;

/// Change notification emitted by [`MemoryStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
    Applied(ObjectKey),
    Deleted(ObjectKey),
}

impl StoreEvent {
    pub fn key(&self) -> &ObjectKey {
        match self {
            StoreEvent::Applied(key) | StoreEvent::Deleted(key) => key,
        }
    }
}

struct State<K> {
    objects: BTreeMap<ObjectKey, Arc<K>>,
    writes: Vec<K>,
    changed_writes: usize,
}

/// Desired-state store and cache in one map.
///
/// Records every write so callers can tell no-op refreshes from real changes.
pub struct MemoryStore<K> {
    state: Mutex<State<K>>,
    events: broadcast::Sender<StoreEvent>,
}

impl<K> Default for MemoryStore<K> {
    fn default() -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            state: Mutex::new(State {
                objects: BTreeMap::new(),
                writes: Vec::new(),
                changed_writes: 0,
            }),
            events,
        }
    }
}

impl<K> MemoryStore<K>
where
    K: Resource + Clone + PartialEq,
{
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State<K>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Create or replace an object, as an external actor would.
    pub fn insert(&self, obj: K) -> ObjectKey {
        let key = ObjectKey::from_resource(&obj);
        self.state().objects.insert(key.clone(), Arc::new(obj));
        let _ = self.events.send(StoreEvent::Applied(key.clone()));
        key
    }

    /// Delete an object, as an external actor would.
    pub fn remove(&self, key: &ObjectKey) -> Option<Arc<K>> {
        let removed = self.state().objects.remove(key);
        if removed.is_some() {
            let _ = self.events.send(StoreEvent::Deleted(key.clone()));
        }
        removed
    }

    pub fn get(&self, key: &ObjectKey) -> Option<K> {
        self.state().objects.get(key).map(|o| K::clone(o))
    }

    /// Every object written through [`DesiredStateWriter::update`], in order.
    pub fn writes(&self) -> Vec<K> {
        self.state().writes.clone()
    }

    /// Number of writes that changed the stored object.
    pub fn changed_writes(&self) -> usize {
        self.state().changed_writes
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }
}

impl<K> DesiredStateCache<K> for MemoryStore<K>
where
    K: Resource + Clone + PartialEq + Send + Sync,
{
    fn lookup(&self, key: &ObjectKey) -> Option<Arc<K>> {
        self.state().objects.get(key).cloned()
    }

    fn keys(&self) -> Vec<ObjectKey> {
        self.state().objects.keys().cloned().collect()
    }
}

#[async_trait]
impl<K> DesiredStateWriter<K> for MemoryStore<K>
where
    K: Resource + Clone + PartialEq + Send + Sync,
{
    async fn update(&self, obj: &K) -> Result<K> {
        let key = ObjectKey::from_resource(obj);
        let mut state = self.state();
        let Some(current) = state.objects.get(&key) else {
            return Err(Error::Store(format!("{} not found", key)));
        };

        let changed = current.as_ref() != obj;
        state.writes.push(obj.clone());
        if changed {
            state.changed_writes += 1;
            state.objects.insert(key, Arc::new(obj.clone()));
        }
        Ok(obj.clone())
    }
}
