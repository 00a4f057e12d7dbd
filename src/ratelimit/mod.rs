//! Token-bucket rate limiting per minute, hour and day.
//!
//! One [`RateLimiter`] is shared by every call made against the same API.
//! The refill-check-decrement sequence runs under a single async mutex, so
//! concurrent callers can never spend the same token twice.

use tokio::sync::Mutex;
use tokio::time::{Duration, Instant};
use tracing::debug;

use crate::config::RateLimitConfig;
use crate::retry::millis;

const MINUTE: Duration = Duration::from_secs(60);
const HOUR: Duration = Duration::from_secs(60 * 60);
const DAY: Duration = Duration::from_secs(24 * 60 * 60);

// Absorbs float rounding so a wait of exactly one token interval suffices.
const TOKEN_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone)]
struct TokenBucket {
    capacity: f64,
    tokens: f64,
    window: Duration,
    last_refill: Instant,
}

impl TokenBucket {
    fn full(capacity: u64, window: Duration, now: Instant) -> Self {
        Self {
            capacity: capacity as f64,
            tokens: capacity as f64,
            window,
            last_refill: now,
        }
    }

    /// Adds tokens in proportion to the time since the last refill, capped at capacity.
    fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill);
        let added = elapsed.as_secs_f64() / self.window.as_secs_f64() * self.capacity;
        self.tokens = (self.tokens + added).min(self.capacity);
        self.last_refill = now;
    }

    fn has_token(&self) -> bool {
        self.tokens + TOKEN_EPSILON >= 1.0
    }

    fn take(&mut self) {
        self.tokens = (self.tokens - 1.0).max(0.0);
    }

    /// Time for one token to accrue.
    fn token_interval(&self) -> Duration {
        self.window.div_f64(self.capacity)
    }
}

#[derive(Debug)]
struct RateLimitState {
    minute: TokenBucket,
    hour: TokenBucket,
    day: TokenBucket,
}

impl RateLimitState {
    fn buckets_mut(&mut self) -> [&mut TokenBucket; 3] {
        [&mut self.minute, &mut self.hour, &mut self.day]
    }

    /// Takes one token from every bucket, or returns how long to wait.
    fn try_consume(&mut self, now: Instant) -> Result<(), Duration> {
        for bucket in self.buckets_mut() {
            bucket.refill(now);
        }

        let wait = self
            .buckets_mut()
            .into_iter()
            .filter(|bucket| !bucket.has_token())
            .map(|bucket| bucket.token_interval())
            .max();

        match wait {
            Some(wait) => Err(wait),
            None => {
                for bucket in self.buckets_mut() {
                    bucket.take();
                }
                Ok(())
            }
        }
    }
}

/// Remaining tokens per bucket, after refilling to the current instant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateLimitSnapshot {
    pub minute: f64,
    pub hour: f64,
    pub day: f64,
}

/// Admits or delays outgoing requests for one API.
#[derive(Debug)]
pub struct RateLimiter {
    enabled: bool,
    state: Mutex<RateLimitState>,
}

impl RateLimiter {
    /// Creates a limiter with all three buckets full.
    pub fn new(config: &RateLimitConfig) -> Self {
        let now = Instant::now();
        Self {
            enabled: config.enabled,
            state: Mutex::new(RateLimitState {
                minute: TokenBucket::full(config.requests_per_minute.max(1), MINUTE, now),
                hour: TokenBucket::full(config.hour_capacity().max(1), HOUR, now),
                day: TokenBucket::full(config.day_capacity().max(1), DAY, now),
            }),
        }
    }

    /// A limiter that never blocks.
    pub fn disabled() -> Self {
        Self::new(&RateLimitConfig::disabled())
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Takes one token from each bucket, sleeping until one is available if
    /// any bucket is empty. After a wait the check is repeated, since another
    /// caller may have taken the token that accrued meanwhile.
    pub async fn consume_or_wait(&self) {
        if !self.enabled {
            return;
        }

        loop {
            let wait = {
                let mut state = self.state.lock().await;
                match state.try_consume(Instant::now()) {
                    Ok(()) => return,
                    Err(wait) => wait,
                }
            };

            debug!(wait_ms = millis(wait), "Rate limit reached, waiting for a token");
            tokio::time::sleep(wait).await;
        }
    }

    /// Current token counts.
    pub async fn snapshot(&self) -> RateLimitSnapshot {
        let mut state = self.state.lock().await;
        let now = Instant::now();
        for bucket in state.buckets_mut() {
            bucket.refill(now);
        }
        RateLimitSnapshot {
            minute: state.minute.tokens,
            hour: state.hour.tokens,
            day: state.day.tokens,
        }
    }
}
