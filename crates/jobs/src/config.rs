//! Worker configuration with environment overrides.

use std::time::Duration;

use tracing::warn;

use crate::retry::RetryPolicy;

/// Sync worker tunables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerConfig {
    /// How often the worker polls the store for runnable jobs.
    pub poll_interval: Duration,
    /// `max_retries` stamped on newly enqueued jobs.
    pub default_max_retries: u32,
    /// Backoff policy for transient failures.
    pub retry: RetryPolicy,
    /// How long `stop()` waits for the loop to finish.
    pub shutdown_timeout: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(10),
            default_max_retries: 3,
            retry: RetryPolicy::default(),
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

impl WorkerConfig {
    /// Build from environment variables, falling back to defaults (with a
    /// warning) on anything missing or unparsable.
    ///
    /// - `WMS_SYNC_POLL_INTERVAL_SECS`
    /// - `WMS_SYNC_MAX_RETRIES`
    /// - `WMS_SYNC_RETRY_BASE_SECS`
    /// - `WMS_SYNC_RETRY_CAP_SECS`
    /// - `WMS_SYNC_SHUTDOWN_TIMEOUT_SECS`
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            poll_interval: Duration::from_secs(parse_var(
                "WMS_SYNC_POLL_INTERVAL_SECS",
                std::env::var("WMS_SYNC_POLL_INTERVAL_SECS").ok(),
                defaults.poll_interval.as_secs(),
            )),
            default_max_retries: parse_var(
                "WMS_SYNC_MAX_RETRIES",
                std::env::var("WMS_SYNC_MAX_RETRIES").ok(),
                u64::from(defaults.default_max_retries),
            ) as u32,
            retry: RetryPolicy::new(
                Duration::from_secs(parse_var(
                    "WMS_SYNC_RETRY_BASE_SECS",
                    std::env::var("WMS_SYNC_RETRY_BASE_SECS").ok(),
                    defaults.retry.base_delay.as_secs(),
                )),
                Duration::from_secs(parse_var(
                    "WMS_SYNC_RETRY_CAP_SECS",
                    std::env::var("WMS_SYNC_RETRY_CAP_SECS").ok(),
                    defaults.retry.max_delay.as_secs(),
                )),
            ),
            shutdown_timeout: Duration::from_secs(parse_var(
                "WMS_SYNC_SHUTDOWN_TIMEOUT_SECS",
                std::env::var("WMS_SYNC_SHUTDOWN_TIMEOUT_SECS").ok(),
                defaults.shutdown_timeout.as_secs(),
            )),
        }
    }
}

/// Parse an optional env value, warning and falling back on garbage.
fn parse_var(name: &str, raw: Option<String>, default: u64) -> u64 {
    match raw {
        None => default,
        Some(value) => match value.trim().parse::<u64>() {
            Ok(parsed) => parsed,
            Err(_) => {
                warn!(var = name, value = %value, default, "invalid value, using default");
                default
            }
        },
    }
}
