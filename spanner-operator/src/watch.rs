//! Feeding work queues from desired-state change notifications.

use std::fmt::Debug;
use std::pin::pin;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use kube::runtime::reflector::{self, Store};
use kube::runtime::{WatchStreamExt, watcher};
use kube::{Api, Resource};
use serde::de::DeserializeOwned;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::controller::enqueue;
use crate::error::{Error, Result};
use crate::key::ObjectKey;
use crate::store::{DesiredStateCache, StoreEvent};
use crate::workqueue::WorkQueue;

/// Watch `api`, mirror it into a reflector store and enqueue the key of
/// every applied or deleted object.
///
/// The returned task ends when `shutdown` flips to true.
pub fn watch_resources<K>(
    api: Api<K>,
    queue: WorkQueue<String>,
    mut shutdown: watch::Receiver<bool>,
) -> (Store<K>, JoinHandle<()>)
where
    K: Resource<DynamicType = ()> + Clone + Debug + DeserializeOwned + Send + Sync + 'static,
{
    let (reader, writer) = reflector::store();
    let stream = watcher(api, watcher::Config::default())
        .default_backoff()
        .reflect(writer);

    let task = tokio::spawn(async move {
        let mut stream = pin!(stream);
        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                event = stream.next() => match event {
                    Some(Ok(watcher::Event::Apply(obj)))
                    | Some(Ok(watcher::Event::InitApply(obj)))
                    | Some(Ok(watcher::Event::Delete(obj))) => {
                        let key = ObjectKey::from_resource(&obj);
                        debug!(queue = queue.name(), "Enqueue {}", key);
                        enqueue(&queue, &key);
                    }
                    Some(Ok(watcher::Event::Init)) | Some(Ok(watcher::Event::InitDone)) => {}
                    Some(Err(e)) => warn!(queue = queue.name(), "Watch error: {}", e),
                    None => break,
                },
            }
        }
        info!(queue = queue.name(), "Watch stopped");
    });

    (reader, task)
}

/// Wait until the store holds the initial list, or fail after `timeout`.
pub async fn wait_for_cache_sync<K>(store: &Store<K>, timeout: Duration) -> Result<()>
where
    K: Resource<DynamicType = ()> + Clone + 'static,
{
    match tokio::time::timeout(timeout, store.wait_until_ready()).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(Error::CacheSync(e.to_string())),
        Err(_) => Err(Error::CacheSync(format!(
            "timed out after {:?} waiting for the initial list",
            timeout
        ))),
    }
}

/// Enqueue the key of every [`StoreEvent`] until the sender goes away.
pub fn forward_store_events(
    mut events: broadcast::Receiver<StoreEvent>,
    queue: WorkQueue<String>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => enqueue(&queue, event.key()),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(queue = queue.name(), "Missed {} store events", n);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

/// Re-enqueue every cached key each `period` until `shutdown` flips to true.
///
/// Catches drift on the Spanner side and retries passes that ended without
/// an error but without converging, such as a failed scale. A zero period
/// disables resyncing.
pub fn resync<K>(
    cache: Arc<dyn DesiredStateCache<K>>,
    queue: WorkQueue<String>,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()>
where
    K: 'static,
{
    tokio::spawn(async move {
        if period.is_zero() {
            info!(queue = queue.name(), "Resync disabled");
            return;
        }

        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = ticker.tick() => {
                    let keys = cache.keys();
                    debug!(queue = queue.name(), "Resync of {} keys", keys.len());
                    for key in &keys {
                        enqueue(&queue, key);
                    }
                }
            }
        }
        debug!(queue = queue.name(), "Resync stopped");
    })
}
