//! Retry policy: pure backoff and terminal-failure decision.

use std::time::Duration;

/// Exponential backoff configuration.
///
/// `max_retries` is a per-job attribute, not part of the policy; the two are
/// combined in [`RetryPolicy::decide`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Upper bound on any single delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(30),
            max_delay: Duration::from_secs(300),
        }
    }
}

/// Outcome of a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Schedule another attempt after `delay`.
    Retry { delay: Duration },
    /// Retries exhausted; the job becomes terminally failed.
    Terminal,
}

impl RetryPolicy {
    pub fn new(base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            base_delay,
            max_delay,
        }
    }

    /// Decide what happens after a failed attempt.
    ///
    /// `retry_count` is the count *including* the attempt that just failed.
    /// Pure: no clocks, no side effects.
    pub fn decide(&self, retry_count: u32, max_retries: u32) -> RetryDecision {
        if retry_count >= max_retries {
            RetryDecision::Terminal
        } else {
            RetryDecision::Retry {
                delay: self.delay_for(retry_count),
            }
        }
    }

    /// Delay before retry number `retry_count`:
    /// `min(max_delay, base_delay * 2^(retry_count - 1))`.
    pub fn delay_for(&self, retry_count: u32) -> Duration {
        let exp = retry_count.saturating_sub(1).min(31);
        self.base_delay
            .saturating_mul(1u32 << exp)
            .min(self.max_delay)
    }
}
