//! Retry decisions with deterministic exponential backoff.

use std::time::Duration;

use crate::config::RetryConfig;

/// Decides whether a failed attempt is retried and how long to wait first.
///
/// Attempt indices are zero-based: attempt 0 is the initial request, and
/// `backoff_delay(0)` is the pause before the first retry.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// A policy that never retries.
    pub fn disabled() -> Self {
        Self::new(RetryConfig::disabled())
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    pub fn max_retries(&self) -> u32 {
        self.config.max_retries
    }

    pub fn is_retryable_status(&self, status: u16) -> bool {
        self.config.retry_on_status_codes.contains(&status)
    }

    /// Whether a response with `status` on attempt `attempt` gets another try.
    pub fn should_retry(&self, status: u16, attempt: u32) -> bool {
        self.has_budget(attempt) && self.is_retryable_status(status)
    }

    /// Network failures are retried regardless of the status-code set.
    pub fn should_retry_network_error(&self, attempt: u32) -> bool {
        self.has_budget(attempt)
    }

    fn has_budget(&self, attempt: u32) -> bool {
        self.config.enabled && attempt < self.config.max_retries
    }

    /// `backoff_factor * 2^attempt` seconds, without jitter.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        if self.config.backoff_factor == 0.0 {
            return Duration::ZERO;
        }
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let secs = self.config.backoff_factor * 2f64.powi(exponent);
        Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(RetryConfig::default())
    }
}

/// Whole milliseconds for log fields, saturating at `u64::MAX`.
pub(crate) fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
