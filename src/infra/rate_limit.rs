use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::app_error::{AppError, AppResult};

/// Trait for rate limiting implementations.
#[async_trait]
pub trait RateLimiterTrait: Send + Sync {
    /// Returns Ok(()) if within limits, Err(AppError::RateLimited) if exceeded.
    async fn check(&self, ip: &str) -> AppResult<()>;
}

const SWEEP_INTERVAL: Duration = Duration::from_secs(10 * 60);
const MAX_IDLE: Duration = Duration::from_secs(15 * 60);

struct Bucket {
    tokens: f64,
    last_refill: Instant,
    last_seen: Instant,
}

/// In-process token-bucket limiter keyed by client IP. Idle entries are
/// swept periodically so the map does not grow without bound.
pub struct TokenBucketRateLimiter {
    clients: DashMap<String, Bucket>,
    rate_per_second: f64,
    burst: f64,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl TokenBucketRateLimiter {
    pub fn new(rate_per_second: f64, burst: f64) -> Self {
        Self {
            clients: DashMap::new(),
            rate_per_second,
            burst: burst.max(1.0),
            sweeper: Mutex::new(None),
        }
    }

    fn allow(&self, ip: &str) -> bool {
        let now = Instant::now();
        let mut bucket = self
            .clients
            .entry(ip.to_string())
            .or_insert_with(|| Bucket {
                tokens: self.burst,
                last_refill: now,
                last_seen: now,
            });

        let elapsed = now.saturating_duration_since(bucket.last_refill);
        bucket.tokens =
            (bucket.tokens + elapsed.as_secs_f64() * self.rate_per_second).min(self.burst);
        bucket.last_refill = now;
        bucket.last_seen = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Drops entries idle longer than `max_idle`.
    pub fn sweep_idle(&self, max_idle: Duration) {
        let now = Instant::now();
        let before = self.clients.len();
        self.clients
            .retain(|_, bucket| now.saturating_duration_since(bucket.last_seen) < max_idle);
        let removed = before - self.clients.len();
        if removed > 0 {
            debug!(removed, "Swept idle rate limiter entries");
        }
    }

    /// Spawns the background sweeper. Call once at startup.
    pub fn start(self: &std::sync::Arc<Self>) {
        let limiter = self.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
            ticker.tick().await; // the first tick fires immediately
            loop {
                ticker.tick().await;
                limiter.sweep_idle(MAX_IDLE);
            }
        });
        *self.sweeper.lock().expect("sweeper lock poisoned") = Some(handle);
        info!("Rate limiter sweeper started");
    }

    pub fn shutdown(&self) {
        if let Some(handle) = self.sweeper.lock().expect("sweeper lock poisoned").take() {
            handle.abort();
        }
    }
}

#[async_trait]
impl RateLimiterTrait for TokenBucketRateLimiter {
    async fn check(&self, ip: &str) -> AppResult<()> {
        if self.allow(ip) {
            Ok(())
        } else {
            Err(AppError::RateLimited)
        }
    }
}
