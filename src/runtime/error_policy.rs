//! # Error Policy
//!
//! Requeue delays after failed reconciliation passes, and classification of
//! watch stream errors.
//!
//! Backoff is tracked per key so one failing source never slows down another.
//! A successful pass forgets the key's history.

use crate::controller::backoff::FibonacciBackoff;
use crate::controller::reconciler::ReconcilerError;
use crate::controller::store::StoreError;
use crate::observability;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tracing::{error, info, warn};

#[derive(Debug)]
struct BackoffState {
    backoff: FibonacciBackoff,
    error_count: u32,
}

/// Per-key Fibonacci backoff for failed passes
#[derive(Debug)]
pub struct ErrorPolicy {
    kind: String,
    min: Duration,
    max: Duration,
    states: Mutex<HashMap<String, BackoffState>>,
}

impl ErrorPolicy {
    pub fn new(kind: impl Into<String>, min: Duration, max: Duration) -> Self {
        Self {
            kind: kind.into(),
            min,
            max,
            states: Mutex::new(HashMap::new()),
        }
    }

    /// Record a failed pass for `key` and return how long to wait before retrying
    pub fn on_error(&self, key: &str, err: &ReconcilerError) -> Duration {
        let span = tracing::span!(
            tracing::Level::ERROR,
            "controller.reconciliation_error",
            resource.kind = %self.kind,
            resource.key = key,
            error = %err
        );
        let _guard = span.enter();

        error!("Reconciliation error for {}: {}", key, err);
        observability::metrics::increment_reconciliation_errors(&self.kind, err.label());

        let (delay, error_count) = {
            let mut states = self.states.lock().unwrap_or_else(PoisonError::into_inner);
            let state = states
                .entry(key.to_string())
                .or_insert_with(|| BackoffState {
                    backoff: FibonacciBackoff::new(self.min, self.max),
                    error_count: 0,
                });
            state.error_count = state.error_count.saturating_add(1);
            (state.backoff.next_backoff(), state.error_count)
        };

        let next_trigger_time = chrono::Utc::now()
            + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::zero());
        info!(
            "🔄 Retrying {} in {}s (error count: {}, next attempt at {})",
            key,
            delay.as_secs(),
            error_count,
            next_trigger_time.to_rfc3339()
        );

        let reason = if err.is_retriable() {
            "error-backoff"
        } else {
            "invalid-spec"
        };
        observability::metrics::increment_requeues_total(reason);
        delay
    }

    /// Forget the error history of `key`
    pub fn on_success(&self, key: &str) {
        self.states
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
    }

    /// Consecutive failures recorded for `key`
    pub fn error_count(&self, key: &str) -> u32 {
        self.states
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .map_or(0, |state| state.error_count)
    }
}

/// Log a watch stream error according to what it most likely means
///
/// The watcher restarts on its own with backoff; this only makes the cause
/// visible.
pub fn log_watch_error(kind: &str, err: &StoreError) {
    let message = err.to_string();
    let is_401 = message.contains("401") || message.contains("Unauthorized");
    let is_410 = message.contains("410")
        || message.contains("too old resource version")
        || message.contains("Expired")
        || message.contains("Gone");
    let is_429 = message.contains("429") || message.contains("TooManyRequests");

    if is_401 {
        error!(
            "❌ Watch on {} failed authentication (401), RBAC may have been revoked: {}",
            kind, message
        );
    } else if is_410 {
        warn!(
            "Watch on {} resource version expired (410), the watch will restart",
            kind
        );
    } else if is_429 {
        warn!("API server throttling the {} watch (429), backing off", kind);
    } else {
        error!("{} watch stream error: {}", kind, message);
    }
}
