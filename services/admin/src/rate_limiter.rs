//! Process-wide token bucket guarding every request

use serde::Deserialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::debug;

/// Rate limiter configuration (`rate-limit.*`)
#[derive(Debug, Clone, Deserialize)]
pub struct RateLimiterConfig {
    /// Milliseconds to add one token
    pub fill_interval: u64,
    /// Bucket size
    pub capacity: u64,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            fill_interval: 50,
            capacity: 200,
        }
    }
}

#[derive(Debug)]
struct Bucket {
    tokens: u64,
    last_fill: Instant,
}

/// Token bucket starting full
#[derive(Debug, Clone)]
pub struct RateLimiter {
    config: RateLimiterConfig,
    bucket: Arc<Mutex<Bucket>>,
}

impl RateLimiter {
    pub fn new(config: RateLimiterConfig) -> Self {
        Self::starting_at(config, Instant::now())
    }

    fn starting_at(config: RateLimiterConfig, now: Instant) -> Self {
        let bucket = Bucket {
            tokens: config.capacity,
            last_fill: now,
        };
        Self {
            config,
            bucket: Arc::new(Mutex::new(bucket)),
        }
    }

    /// Take one token if available; never waits for a refill
    pub async fn try_acquire(&self) -> bool {
        self.try_acquire_at(Instant::now()).await
    }

    pub async fn try_acquire_at(&self, now: Instant) -> bool {
        let mut bucket = self.bucket.lock().await;
        let interval = Duration::from_millis(self.config.fill_interval.max(1));

        let elapsed = now.saturating_duration_since(bucket.last_fill);
        let fills = (elapsed.as_nanos() / interval.as_nanos()) as u64;
        if fills > 0 {
            bucket.tokens = bucket.tokens.saturating_add(fills).min(self.config.capacity);
            bucket.last_fill += interval * fills.min(u32::MAX as u64) as u32;
        }

        if bucket.tokens == 0 {
            debug!("Rate limit bucket empty");
            return false;
        }
        bucket.tokens -= 1;
        true
    }

    /// Get the rate limiter configuration
    pub fn config(&self) -> &RateLimiterConfig {
        &self.config
    }
}
