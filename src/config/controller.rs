//! # Controller Settings
//!
//! Worker pool, status retry, backoff and watch settings.

use super::{env_lookup, optional_var, var_or_default};
use crate::constants::{
    DEFAULT_ERROR_BACKOFF_MAX_SECS, DEFAULT_ERROR_BACKOFF_MIN_SECS, DEFAULT_RESYNC_PERIOD_SECS,
    DEFAULT_STATUS_UPDATE_MAX_ATTEMPTS, DEFAULT_STATUS_UPDATE_RETRY_DELAY_MS,
    DEFAULT_WORKER_COUNT,
};
use std::time::Duration;

/// Controller configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerConfig {
    /// Number of workers draining the work queue
    pub worker_count: usize,
    /// Status update attempts per pass, the first one included
    pub status_update_max_attempts: u32,
    /// Pause before re-fetching after a status conflict (milliseconds)
    pub status_update_retry_delay_ms: u64,
    /// First requeue delay after a failed pass (seconds)
    pub error_backoff_min_secs: u64,
    /// Cap on the requeue delay after failed passes (seconds)
    pub error_backoff_max_secs: u64,
    /// Period between full resyncs of the cache (seconds)
    pub resync_period_secs: u64,
    /// Namespace to watch; all namespaces when unset
    pub watch_namespace: Option<String>,
    /// Label selector applied to watched sources
    pub watch_label_selector: Option<String>,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            worker_count: DEFAULT_WORKER_COUNT,
            status_update_max_attempts: DEFAULT_STATUS_UPDATE_MAX_ATTEMPTS,
            status_update_retry_delay_ms: DEFAULT_STATUS_UPDATE_RETRY_DELAY_MS,
            error_backoff_min_secs: DEFAULT_ERROR_BACKOFF_MIN_SECS,
            error_backoff_max_secs: DEFAULT_ERROR_BACKOFF_MAX_SECS,
            resync_period_secs: DEFAULT_RESYNC_PERIOD_SECS,
            watch_namespace: None,
            watch_label_selector: None,
        }
    }
}

impl ControllerConfig {
    /// Load configuration from environment variables with defaults
    pub fn from_env() -> Self {
        Self::from_lookup(env_lookup)
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Self {
            worker_count: var_or_default(&lookup, "WORKER_COUNT", DEFAULT_WORKER_COUNT).max(1),
            status_update_max_attempts: var_or_default(
                &lookup,
                "STATUS_UPDATE_MAX_ATTEMPTS",
                DEFAULT_STATUS_UPDATE_MAX_ATTEMPTS,
            )
            .max(1),
            status_update_retry_delay_ms: var_or_default(
                &lookup,
                "STATUS_UPDATE_RETRY_DELAY_MS",
                DEFAULT_STATUS_UPDATE_RETRY_DELAY_MS,
            ),
            error_backoff_min_secs: var_or_default(
                &lookup,
                "ERROR_BACKOFF_MIN_SECS",
                DEFAULT_ERROR_BACKOFF_MIN_SECS,
            )
            .max(1),
            error_backoff_max_secs: var_or_default(
                &lookup,
                "ERROR_BACKOFF_MAX_SECS",
                DEFAULT_ERROR_BACKOFF_MAX_SECS,
            ),
            resync_period_secs: var_or_default(
                &lookup,
                "RESYNC_PERIOD_SECS",
                DEFAULT_RESYNC_PERIOD_SECS,
            ),
            watch_namespace: optional_var(&lookup, "WATCH_NAMESPACE"),
            watch_label_selector: optional_var(&lookup, "WATCH_LABEL_SELECTOR"),
        }
    }

    pub fn status_update_retry_delay(&self) -> Duration {
        Duration::from_millis(self.status_update_retry_delay_ms)
    }

    pub fn error_backoff_min(&self) -> Duration {
        Duration::from_secs(self.error_backoff_min_secs)
    }

    pub fn error_backoff_max(&self) -> Duration {
        Duration::from_secs(self.error_backoff_max_secs)
    }

    pub fn resync_period(&self) -> Duration {
        Duration::from_secs(self.resync_period_secs)
    }
}
