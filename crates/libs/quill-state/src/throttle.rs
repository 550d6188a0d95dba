use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use quill_provider::Origin;

/// Keep the bucket map from growing without bound under origin churn.
const PRUNE_THRESHOLD: usize = 1024;

/// Threshold and window for one limiter category.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RateLimiterConfig {
    pub max_calls: u32,
    pub window: Duration,
}

impl RateLimiterConfig {
    /// Connection-establishing calls (connect/disconnect).
    pub const CONNECTION: Self = Self { max_calls: 5, window: Duration::from_secs(60) };

    /// Transaction-like calls (signing, compose, broadcast).
    pub const TRANSACTION: Self = Self { max_calls: 10, window: Duration::from_secs(60) };

    /// Everything else (queries).
    pub const GENERAL: Self = Self { max_calls: 10, window: Duration::from_secs(10) };
}

struct Bucket {
    count: u32,
    window_start: Instant,
}

/// Fixed-window counter per origin.
///
/// Three independent instances run in the broker — connection, transaction,
/// general — so a burst in one category cannot starve another. Checking is
/// mutating: every allowed call increments the current window's counter.
pub struct RateLimiter {
    config: RateLimiterConfig,
    buckets: Mutex<HashMap<Origin, Bucket>>,
}

impl RateLimiter {
    pub fn new(config: RateLimiterConfig) -> Self {
        Self { config, buckets: Mutex::new(HashMap::new()) }
    }

    pub fn config(&self) -> RateLimiterConfig {
        self.config
    }

    /// Record one call attempt; `true` when it fits inside the window.
    /// A new origin's first call is always allowed.
    pub fn is_allowed(&self, origin: &str) -> bool {
        self.check_at(origin, Instant::now())
    }

    /// How long until the origin's window resets. Zero for an unknown origin
    /// or an already-elapsed window.
    pub fn reset_in(&self, origin: &str) -> Duration {
        self.reset_in_at(origin, Instant::now())
    }

    fn check_at(&self, origin: &str, now: Instant) -> bool {
        let mut buckets = self.buckets.lock().expect("rate limiter poisoned");

        if buckets.len() >= PRUNE_THRESHOLD && !buckets.contains_key(origin) {
            let window = self.config.window;
            buckets.retain(|_, bucket| now.duration_since(bucket.window_start) < window);
        }

        let bucket = buckets
            .entry(origin.to_string())
            .or_insert_with(|| Bucket { count: 0, window_start: now });

        if now.duration_since(bucket.window_start) >= self.config.window {
            bucket.count = 0;
            bucket.window_start = now;
        }

        if bucket.count < self.config.max_calls {
            bucket.count += 1;
            true
        } else {
            false
        }
    }

    fn reset_in_at(&self, origin: &str, now: Instant) -> Duration {
        let buckets = self.buckets.lock().expect("rate limiter poisoned");
        let Some(bucket) = buckets.get(origin) else {
            return Duration::ZERO;
        };
        self.config
            .window
            .checked_sub(now.duration_since(bucket.window_start))
            .unwrap_or(Duration::ZERO)
    }
}
