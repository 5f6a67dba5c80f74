//! Re-queue delay policies.

use std::collections::HashMap;
use std::hash::Hash;
use std::time::Duration;

use tokio::time::Instant;

/// Decides how long a failed item waits before it is handed out again.
pub trait RateLimiter<K>: Send {
    /// Delay for the next re-queue of `key`. Counts as one failure.
    fn when(&mut self, key: &K) -> Duration;

    /// Reset the failure history of `key`.
    fn forget(&mut self, key: &K);

    /// Consecutive failures recorded for `key`.
    fn num_requeues(&self, key: &K) -> u32;
}

/// Per-item exponential backoff: `base * 2^failures`, capped at `max`.
pub struct ExponentialFailureRateLimiter<K> {
    failures: HashMap<K, u32>,
    base: Duration,
    max: Duration,
}

impl<K: Eq + Hash + Clone> ExponentialFailureRateLimiter<K> {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            failures: HashMap::new(),
            base,
            max,
        }
    }
}

impl<K: Eq + Hash + Clone + Send> RateLimiter<K> for ExponentialFailureRateLimiter<K> {
    fn when(&mut self, key: &K) -> Duration {
        let failures = self.failures.entry(key.clone()).or_insert(0);
        let exp = *failures;
        *failures = failures.saturating_add(1);

        2u32.checked_pow(exp)
            .and_then(|factor| self.base.checked_mul(factor))
            .map_or(self.max, |delay| delay.min(self.max))
    }

    fn forget(&mut self, key: &K) {
        self.failures.remove(key);
    }

    fn num_requeues(&self, key: &K) -> u32 {
        self.failures.get(key).copied().unwrap_or(0)
    }
}

/// Overall token bucket shared by all items.
///
/// Each call reserves one token; once the bucket is empty the caller is told
/// to wait until its token will have been refilled.
pub struct BucketRateLimiter {
    qps: f64,
    burst: f64,
    tokens: f64,
    last: Instant,
}

impl BucketRateLimiter {
    pub fn new(qps: f64, burst: u32) -> Self {
        Self {
            qps,
            burst: burst as f64,
            tokens: burst as f64,
            last: Instant::now(),
        }
    }
}

impl<K> RateLimiter<K> for BucketRateLimiter {
    fn when(&mut self, _key: &K) -> Duration {
        let now = Instant::now();
        let elapsed = now.saturating_duration_since(self.last).as_secs_f64();
        self.last = now;
        self.tokens = (self.tokens + elapsed * self.qps).min(self.burst);
        self.tokens -= 1.0;

        if self.tokens >= 0.0 || self.qps <= 0.0 {
            Duration::ZERO
        } else {
            Duration::from_secs_f64(-self.tokens / self.qps)
        }
    }

    fn forget(&mut self, _key: &K) {}

    fn num_requeues(&self, _key: &K) -> u32 {
        0
    }
}

/// Combines limiters by taking the longest delay.
pub struct MaxOfRateLimiter<K> {
    limiters: Vec<Box<dyn RateLimiter<K>>>,
}

impl<K> MaxOfRateLimiter<K> {
    pub fn new(limiters: Vec<Box<dyn RateLimiter<K>>>) -> Self {
        Self { limiters }
    }
}

impl<K> RateLimiter<K> for MaxOfRateLimiter<K> {
    fn when(&mut self, key: &K) -> Duration {
        self.limiters
            .iter_mut()
            .map(|l| l.when(key))
            .max()
            .unwrap_or(Duration::ZERO)
    }

    fn forget(&mut self, key: &K) {
        for limiter in &mut self.limiters {
            limiter.forget(key);
        }
    }

    fn num_requeues(&self, key: &K) -> u32 {
        self.limiters
            .iter()
            .map(|l| l.num_requeues(key))
            .max()
            .unwrap_or(0)
    }
}

/// Exponential per-item backoff (5ms to 1000s) combined with an overall
/// bucket of 10 qps and a burst of 100.
pub fn default_controller_rate_limiter<K>() -> MaxOfRateLimiter<K>
where
    K: Eq + Hash + Clone + Send + 'static,
{
    MaxOfRateLimiter::new(vec![
        Box::new(ExponentialFailureRateLimiter::new(
            Duration::from_millis(5),
            Duration::from_secs(1000),
        )),
        Box::new(BucketRateLimiter::new(10.0, 100)),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exponential_backoff() {
        let mut limiter =
            ExponentialFailureRateLimiter::new(Duration::from_millis(5), Duration::from_secs(1));
        let key = "default/prod-1".to_string();

        assert_eq!(limiter.when(&key), Duration::from_millis(5));
        assert_eq!(limiter.when(&key), Duration::from_millis(10));
        assert_eq!(limiter.when(&key), Duration::from_millis(20));
        assert_eq!(limiter.num_requeues(&key), 3);

        // Other keys are independent
        assert_eq!(limiter.when(&"other".to_string()), Duration::from_millis(5));

        limiter.forget(&key);
        assert_eq!(limiter.num_requeues(&key), 0);
        assert_eq!(limiter.when(&key), Duration::from_millis(5));
    }

    #[test]
    fn test_exponential_backoff_is_capped() {
        let mut limiter =
            ExponentialFailureRateLimiter::new(Duration::from_millis(5), Duration::from_secs(1));
        let key = 1u32;
        for _ in 0..8 {
            limiter.when(&key);
        }
        // 5ms * 2^8 = 1.28s
        assert_eq!(limiter.when(&key), Duration::from_secs(1));
        for _ in 0..2000 {
            limiter.when(&key);
        }
        assert_eq!(limiter.when(&key), Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_bucket_burst_then_throttle() {
        let mut limiter = BucketRateLimiter::new(10.0, 3);
        for _ in 0..3 {
            assert_eq!(RateLimiter::<u32>::when(&mut limiter, &0), Duration::ZERO);
        }
        let first = RateLimiter::<u32>::when(&mut limiter, &0);
        let second = RateLimiter::<u32>::when(&mut limiter, &0);
        assert!(first.abs_diff(Duration::from_millis(100)) < Duration::from_millis(1));
        assert!(second.abs_diff(Duration::from_millis(200)) < Duration::from_millis(1));

        // Refill
        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(RateLimiter::<u32>::when(&mut limiter, &0), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_default_limiter_takes_max() {
        let mut limiter = default_controller_rate_limiter::<String>();
        let key = "default/prod-1".to_string();
        assert_eq!(limiter.when(&key), Duration::from_millis(5));
        assert_eq!(limiter.when(&key), Duration::from_millis(10));
        assert_eq!(limiter.num_requeues(&key), 2);
        limiter.forget(&key);
        assert_eq!(limiter.num_requeues(&key), 0);
    }
}
