//! Worker pool driving a reconciler from a work queue.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::watch;
use tracing::{Instrument, debug, error, info, info_span};

use crate::key::ObjectKey;
use crate::reconciler::Reconciler;
use crate::workqueue::WorkQueue;

/// Runs `workers` concurrent workers, each reconciling one key at a time.
pub struct Controller<R> {
    reconciler: Arc<R>,
    queue: WorkQueue<String>,
    workers: usize,
}

impl<R> Clone for Controller<R> {
    fn clone(&self) -> Self {
        Self {
            reconciler: Arc::clone(&self.reconciler),
            queue: self.queue.clone(),
            workers: self.workers,
        }
    }
}

impl<R: Reconciler> Controller<R> {
    pub fn new(reconciler: Arc<R>, queue: WorkQueue<String>, workers: usize) -> Self {
        Self {
            reconciler,
            queue,
            workers: workers.max(1),
        }
    }

    pub fn queue(&self) -> &WorkQueue<String> {
        &self.queue
    }

    /// Run until `shutdown` flips to true (or its sender is dropped), then
    /// shut the queue down and wait for every worker to finish its item.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let kind = self.reconciler.kind();
        info!("Starting {} controller with {} workers", kind, self.workers);

        let mut workers = Vec::with_capacity(self.workers);
        for id in 0..self.workers {
            let controller = self.clone();
            workers.push(tokio::spawn(async move {
                while controller.process_next_work_item().await {}
                debug!("{} worker {} stopped", kind, id);
            }));
        }

        while !*shutdown.borrow_and_update() {
            if shutdown.changed().await.is_err() {
                break;
            }
        }

        info!("Shutting down {} controller", kind);
        self.queue.shutdown();
        for worker in workers {
            if let Err(e) = worker.await {
                error!("{} worker failed: {}", kind, e);
            }
        }
        info!("{} controller stopped", kind);
    }

    /// Process one key. Returns false once the queue is shut down and empty.
    pub async fn process_next_work_item(&self) -> bool {
        let Some(key) = self.queue.get().await else {
            return false;
        };
        self.handle(&key).await;
        self.queue.done(&key);
        true
    }

    async fn handle(&self, raw: &str) {
        let kind = self.reconciler.kind();
        let key = match ObjectKey::parse(raw) {
            Ok(key) => key,
            Err(e) => {
                error!("{}: dropping work item: {}", kind, e);
                self.queue.forget(&raw.to_string());
                return;
            }
        };

        let span = info_span!("sync", kind, key = %key);
        let result = AssertUnwindSafe(self.reconciler.sync(&key))
            .catch_unwind()
            .instrument(span)
            .await;

        match result {
            Ok(Ok(())) => {
                self.queue.forget(&raw.to_string());
                debug!(key = %key, "Successfully synced {}", kind);
            }
            Ok(Err(e)) if !e.is_retryable() => {
                self.queue.forget(&raw.to_string());
                error!(key = %key, "Error syncing {}, not retrying: {}", kind, e);
            }
            Ok(Err(e)) => {
                error!(key = %key, "Error syncing {}, requeuing: {}", kind, e);
                self.queue.add_rate_limited(raw.to_string());
            }
            Err(_) => {
                error!(key = %key, "Panic while syncing {}, requeuing", kind);
                self.queue.add_rate_limited(raw.to_string());
            }
        }
    }
}

/// Enqueue the key of an object that changed.
pub fn enqueue(queue: &WorkQueue<String>, key: &ObjectKey) {
    queue.add(key.to_string());
}
