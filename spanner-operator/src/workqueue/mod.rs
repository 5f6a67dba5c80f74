//! Rate-limited, deduplicating work queue.
//!
//! Semantics:
//! - a key is queued at most once, no matter how often it is added
//! - a key handed out by [`WorkQueue::get`] is not handed out again until
//!   [`WorkQueue::done`] is called for it; adds in between are remembered and
//!   the key is re-queued by `done`
//! - after [`WorkQueue::shutdown`], adds are ignored, delayed keys are
//!   dropped, and `get` returns `None` once the queue is drained

pub mod rate_limiter;

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet, VecDeque};
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::debug;

pub use rate_limiter::{
    BucketRateLimiter, ExponentialFailureRateLimiter, MaxOfRateLimiter, RateLimiter,
    default_controller_rate_limiter,
};

struct State<K> {
    queue: VecDeque<K>,
    /// Keys that need processing (queued, or re-added while in flight).
    dirty: HashSet<K>,
    /// Keys currently handed out.
    processing: HashSet<K>,
    /// Delayed keys ordered by ready time; the sequence number breaks ties.
    waiting: BinaryHeap<Reverse<(Instant, u64)>>,
    waiting_keys: HashMap<u64, K>,
    /// Earliest pending ready time per delayed key.
    waiting_ready: HashMap<K, (Instant, u64)>,
    next_seq: u64,
    limiter: Box<dyn RateLimiter<K>>,
    shutting_down: bool,
}

impl<K: Clone + Eq + Hash> State<K> {
    /// Returns true if the key was newly queued.
    fn add(&mut self, key: K) -> bool {
        if self.shutting_down || self.dirty.contains(&key) {
            return false;
        }
        self.dirty.insert(key.clone());
        if self.processing.contains(&key) {
            return false;
        }
        self.queue.push_back(key);
        true
    }

    /// Move every delayed key whose time has come into the queue.
    fn promote_ready(&mut self, now: Instant) {
        while let Some(Reverse((at, seq))) = self.waiting.peek().copied() {
            if at > now {
                break;
            }
            self.waiting.pop();
            let Some(key) = self.waiting_keys.remove(&seq) else {
                continue;
            };
            // Superseded by an earlier entry for the same key
            if self.waiting_ready.get(&key).map(|(_, s)| *s) != Some(seq) {
                continue;
            }
            self.waiting_ready.remove(&key);
            self.add(key);
        }
    }

    fn next_ready(&self) -> Option<Instant> {
        self.waiting.peek().map(|Reverse((at, _))| *at)
    }
}

struct Inner<K> {
    name: String,
    state: Mutex<State<K>>,
    notify: Notify,
}

/// Cloneable handle to a shared work queue.
pub struct WorkQueue<K> {
    inner: Arc<Inner<K>>,
}

impl<K> Clone for WorkQueue<K> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K> WorkQueue<K>
where
    K: Clone + Eq + Hash + Send + 'static,
{
    /// Queue using the default controller rate limiter.
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_rate_limiter(name, default_controller_rate_limiter())
    }

    pub fn with_rate_limiter(name: impl Into<String>, limiter: impl RateLimiter<K> + 'static) -> Self {
        Self {
            inner: Arc::new(Inner {
                name: name.into(),
                state: Mutex::new(State {
                    queue: VecDeque::new(),
                    dirty: HashSet::new(),
                    processing: HashSet::new(),
                    waiting: BinaryHeap::new(),
                    waiting_keys: HashMap::new(),
                    waiting_ready: HashMap::new(),
                    next_seq: 0,
                    limiter: Box::new(limiter),
                    shutting_down: false,
                }),
                notify: Notify::new(),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    fn state(&self) -> MutexGuard<'_, State<K>> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue `key` unless it is already queued.
    pub fn add(&self, key: K) {
        let queued = self.state().add(key);
        if queued {
            self.inner.notify.notify_one();
        }
    }

    /// Queue `key` once `delay` has passed.
    pub fn add_after(&self, key: K, delay: Duration) {
        if delay.is_zero() {
            return self.add(key);
        }

        let mut state = self.state();
        if state.shutting_down {
            return;
        }
        let at = Instant::now() + delay;
        if let Some((existing, _)) = state.waiting_ready.get(&key) {
            if *existing <= at {
                return;
            }
        }
        let seq = state.next_seq;
        state.next_seq += 1;
        state.waiting.push(Reverse((at, seq)));
        state.waiting_keys.insert(seq, key.clone());
        state.waiting_ready.insert(key, (at, seq));
        drop(state);

        // A blocked getter may need to shorten its sleep
        self.inner.notify.notify_one();
    }

    /// Queue `key` after the delay the rate limiter assigns to it.
    pub fn add_rate_limited(&self, key: K) {
        let delay = self.state().limiter.when(&key);
        debug!(queue = %self.inner.name, "Requeue in {:?}", delay);
        self.add_after(key, delay);
    }

    /// Clear the rate limiter's failure history for `key`.
    pub fn forget(&self, key: &K) {
        self.state().limiter.forget(key);
    }

    pub fn num_requeues(&self, key: &K) -> u32 {
        self.state().limiter.num_requeues(key)
    }

    /// Wait for the next key. Returns `None` once the queue is shut down and
    /// drained.
    ///
    /// Every key returned must be passed to [`WorkQueue::done`].
    pub async fn get(&self) -> Option<K> {
        loop {
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let next_ready = {
                let mut state = self.state();
                state.promote_ready(Instant::now());

                if let Some(key) = state.queue.pop_front() {
                    state.processing.insert(key.clone());
                    state.dirty.remove(&key);
                    let more = !state.queue.is_empty();
                    drop(state);
                    if more {
                        self.inner.notify.notify_one();
                    }
                    return Some(key);
                }
                if state.shutting_down {
                    return None;
                }
                state.next_ready()
            };

            match next_ready {
                Some(at) => {
                    tokio::select! {
                        _ = &mut notified => {}
                        _ = tokio::time::sleep_until(at) => {}
                    }
                }
                None => notified.await,
            }
        }
    }

    /// Mark `key` as processed. Re-queues it if it was added meanwhile.
    pub fn done(&self, key: &K) {
        let mut state = self.state();
        state.processing.remove(key);
        if state.dirty.contains(key) {
            state.queue.push_back(key.clone());
            drop(state);
            self.inner.notify.notify_one();
        }
    }

    /// Number of keys ready to be handed out.
    pub fn len(&self) -> usize {
        self.state().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn shutdown(&self) {
        let mut state = self.state();
        state.shutting_down = true;
        state.waiting.clear();
        state.waiting_keys.clear();
        state.waiting_ready.clear();
        drop(state);
        debug!(queue = %self.inner.name, "Queue shutting down");
        self.inner.notify.notify_waiters();
    }

    pub fn is_shutting_down(&self) -> bool {
        self.state().shutting_down
    }
}
