//! Worker pool, retry and shutdown behavior.

mod common;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use common::{InstanceHarness, instance, key, labels};
use spanner_admin::Op;
use spanner_operator::key::ObjectKey;
use spanner_operator::resource::SpannerInstance;
use spanner_operator::store::DesiredStateCache;
use spanner_operator::watch::{forward_store_events, resync};
use spanner_operator::workqueue::ExponentialFailureRateLimiter;
use spanner_operator::{Controller, Error, Reconciler, Result, WorkQueue};
use tokio::sync::watch;
use tokio::time::Instant;

/// Reconciler following a script of outcomes and recording every attempt.
#[derive(Default)]
struct ScriptedReconciler {
    /// Outcome per attempt (true = success); attempts past the end succeed.
    script: Vec<bool>,
    work: Duration,
    state: Mutex<ScriptState>,
}

#[derive(Default)]
struct ScriptState {
    attempts: Vec<(ObjectKey, Instant)>,
    in_flight: HashMap<ObjectKey, usize>,
    max_in_flight: usize,
}

impl ScriptedReconciler {
    fn new(script: Vec<bool>, work: Duration) -> Self {
        Self {
            script,
            work,
            ..Default::default()
        }
    }

    fn attempts(&self) -> Vec<Instant> {
        let state = self.state.lock().unwrap();
        state.attempts.iter().map(|(_, at)| *at).collect()
    }

    fn max_in_flight(&self) -> usize {
        self.state.lock().unwrap().max_in_flight
    }
}

#[async_trait]
impl Reconciler for ScriptedReconciler {
    fn kind(&self) -> &'static str {
        "Scripted"
    }

    async fn sync(&self, key: &ObjectKey) -> Result<()> {
        let attempt = {
            let mut state = self.state.lock().unwrap();
            state.attempts.push((key.clone(), Instant::now()));
            let n = state.in_flight.entry(key.clone()).or_insert(0);
            *n += 1;
            let n = *n;
            state.max_in_flight = state.max_in_flight.max(n);
            state.attempts.len() - 1
        };

        if !self.work.is_zero() {
            tokio::time::sleep(self.work).await;
        }

        let mut state = self.state.lock().unwrap();
        if let Some(n) = state.in_flight.get_mut(key) {
            *n -= 1;
        }
        if self.script.get(attempt).copied().unwrap_or(true) {
            Ok(())
        } else {
            Err(Error::Store(format!("attempt {} failed", attempt)))
        }
    }
}

fn queue() -> WorkQueue<String> {
    WorkQueue::with_rate_limiter(
        "test",
        ExponentialFailureRateLimiter::new(Duration::from_millis(10), Duration::from_secs(10)),
    )
}

async fn wait_until(mut cond: impl FnMut() -> bool) {
    for _ in 0..10_000 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    panic!("condition not reached");
}

#[tokio::test(start_paused = true)]
async fn test_backoff_grows_and_resets() {
    let reconciler = Arc::new(ScriptedReconciler::new(
        vec![false, false, false, true, false, true],
        Duration::ZERO,
    ));
    let queue = queue();
    let controller = Controller::new(reconciler.clone(), queue.clone(), 3);
    let (tx, rx) = watch::channel(false);
    let run = tokio::spawn(controller.run(rx));

    let key = "default/prod-1".to_string();
    queue.add(key.clone());
    wait_until(|| reconciler.attempts().len() == 4).await;
    wait_until(|| queue.num_requeues(&key) == 0).await;

    // Fails again after a success: back to the base delay
    queue.add(key.clone());
    wait_until(|| reconciler.attempts().len() == 6).await;

    let at = reconciler.attempts();
    let gaps: Vec<Duration> = at.windows(2).map(|w| w[1] - w[0]).collect();
    assert!(gaps[0] < gaps[1] && gaps[1] < gaps[2], "{gaps:?}");
    assert!(gaps[4] < gaps[1], "{gaps:?}");
    assert_eq!(reconciler.max_in_flight(), 1);

    tx.send(true).unwrap();
    run.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_same_key_never_runs_concurrently() {
    let reconciler = Arc::new(ScriptedReconciler::new(
        vec![false, true, false, true],
        Duration::from_millis(50),
    ));
    let queue = queue();
    let controller = Controller::new(reconciler.clone(), queue.clone(), 4);
    let (tx, rx) = watch::channel(false);
    let run = tokio::spawn(controller.run(rx));

    for _ in 0..20 {
        queue.add("default/prod-1".to_string());
        tokio::time::sleep(Duration::from_millis(7)).await;
    }
    wait_until(|| queue.is_empty()).await;
    tokio::time::sleep(Duration::from_secs(1)).await;

    assert_eq!(reconciler.max_in_flight(), 1);
    assert!(reconciler.attempts().len() >= 2);

    tx.send(true).unwrap();
    run.await.unwrap();
}

#[tokio::test]
async fn test_malformed_key_is_dropped() {
    let reconciler = Arc::new(ScriptedReconciler::default());
    let queue = queue();
    let controller = Controller::new(reconciler.clone(), queue.clone(), 1);

    queue.add("a/b/c".to_string());
    assert!(controller.process_next_work_item().await);

    assert!(reconciler.attempts().is_empty());
    assert!(queue.is_empty());
    assert_eq!(queue.num_requeues(&"a/b/c".to_string()), 0);
}

struct PanickingReconciler;

#[async_trait]
impl Reconciler for PanickingReconciler {
    fn kind(&self) -> &'static str {
        "Panicking"
    }

    async fn sync(&self, _key: &ObjectKey) -> Result<()> {
        panic!("reconciler bug");
    }
}

#[tokio::test]
async fn test_panic_is_requeued() {
    let queue = queue();
    let controller = Controller::new(Arc::new(PanickingReconciler), queue.clone(), 1);

    queue.add("default/prod-1".to_string());
    assert!(controller.process_next_work_item().await);
    assert_eq!(queue.num_requeues(&"default/prod-1".to_string()), 1);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_waits_for_in_flight() {
    let reconciler = Arc::new(ScriptedReconciler::new(vec![], Duration::from_secs(5)));
    let queue = queue();
    let controller = Controller::new(reconciler.clone(), queue.clone(), 2);
    let (tx, rx) = watch::channel(false);
    let run = tokio::spawn(controller.run(rx));

    queue.add("default/a".to_string());
    wait_until(|| reconciler.attempts().len() == 1).await;
    let started = Instant::now();

    tx.send(true).unwrap();
    run.await.unwrap();

    assert!(started.elapsed() >= Duration::from_secs(4));
    assert!(queue.is_shutting_down());
    queue.add("default/b".to_string());
    assert!(queue.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_store_changes_drive_instance_reconciler() {
    let h = InstanceHarness::new();
    let queue = queue();
    let feed = forward_store_events(h.store.subscribe(), queue.clone());
    let controller = Controller::new(h.reconciler.clone(), queue.clone(), 2);
    let (tx, rx) = watch::channel(false);
    let run = tokio::spawn(controller.run(rx));

    h.store.insert(instance("prod-1", "regional-us-central1", 3));
    wait_until(|| h.admin.instance("prod-1").is_some()).await;
    wait_until(|| h.store.get(&key("prod-1")).and_then(|o| o.status).is_some()).await;
    assert_eq!(h.admin.instance("prod-1").unwrap().node_count, 3);

    h.store.remove(&key("prod-1"));
    wait_until(|| h.admin.instance("prod-1").is_none()).await;

    tx.send(true).unwrap();
    run.await.unwrap();
    feed.abort();
}

const RESYNC: Duration = Duration::from_secs(30);

#[tokio::test(start_paused = true)]
async fn test_resync_retries_failed_scale() {
    let h = InstanceHarness::new();
    h.admin.insert_instance("prod-1", 3, &[]);
    h.admin.fail_times(Op::Scale, 1, "quota exceeded");

    let queue = queue();
    let feed = forward_store_events(h.store.subscribe(), queue.clone());
    let (tx, rx) = watch::channel(false);
    let cache: Arc<dyn DesiredStateCache<SpannerInstance>> = h.store.clone();
    let resyncer = resync(cache, queue.clone(), RESYNC, rx.clone());
    let run = tokio::spawn(Controller::new(h.reconciler.clone(), queue.clone(), 2).run(rx));

    h.store.insert(instance("prod-1", "regional-us-central1", 5));
    wait_until(|| h.admin.count(Op::Scale) == 1).await;
    assert_eq!(h.admin.instance("prod-1").unwrap().node_count, 3);
    assert!(h.store.writes().is_empty());

    // No store event from here on
    tokio::time::sleep(RESYNC + Duration::from_secs(1)).await;
    wait_until(|| h.admin.instance("prod-1").unwrap().node_count == 5).await;
    assert_eq!(h.admin.count(Op::Scale), 2);
    assert_eq!(h.stored("prod-1").status.unwrap().available_nodes, 5);

    tx.send(true).unwrap();
    run.await.unwrap();
    resyncer.await.unwrap();
    feed.abort();
}

#[tokio::test(start_paused = true)]
async fn test_resync_corrects_drift() {
    let h = InstanceHarness::new();
    let queue = queue();
    let feed = forward_store_events(h.store.subscribe(), queue.clone());
    let (tx, rx) = watch::channel(false);
    let cache: Arc<dyn DesiredStateCache<SpannerInstance>> = h.store.clone();
    let resyncer = resync(cache, queue.clone(), RESYNC, rx.clone());
    let run = tokio::spawn(Controller::new(h.reconciler.clone(), queue.clone(), 2).run(rx));

    let mut obj = instance("prod-1", "regional-us-central1", 3);
    obj.metadata.labels = Some(labels(&[("env", "prod")]));
    h.store.insert(obj);
    wait_until(|| h.store.get(&key("prod-1")).and_then(|o| o.status).is_some()).await;

    h.admin.set_node_count("prod-1", 1);
    h.admin.set_labels("prod-1", &[("env", "dev"), ("owner", "ops")]);
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(h.admin.instance("prod-1").unwrap().node_count, 1);

    tokio::time::sleep(RESYNC).await;
    wait_until(|| h.admin.instance("prod-1").unwrap().node_count == 3).await;
    wait_until(|| {
        h.admin.instance("prod-1").unwrap().labels == labels(&[("env", "prod"), ("owner", "ops")])
    })
    .await;

    tx.send(true).unwrap();
    run.await.unwrap();
    resyncer.await.unwrap();
    feed.abort();
}

#[tokio::test(start_paused = true)]
async fn test_zero_resync_period_disables_resync() {
    let h = InstanceHarness::new();
    h.store.insert(instance("prod-1", "nam3", 1));
    let queue = queue();
    let (_tx, rx) = watch::channel(false);
    let cache: Arc<dyn DesiredStateCache<SpannerInstance>> = h.store.clone();

    resync(cache, queue.clone(), Duration::ZERO, rx).await.unwrap();
    tokio::time::sleep(Duration::from_secs(300)).await;
    assert!(queue.is_empty());
}
