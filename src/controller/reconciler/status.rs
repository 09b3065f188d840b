//! # Status Updates
//!
//! Writes a source's desired status under optimistic concurrency.
//!
//! The first attempt writes onto the object the pass started from. After a
//! conflict the committer waits briefly, fetches a fresh copy and writes the
//! same desired status onto it, up to `max_attempts` attempts in total. The
//! write is skipped whenever the base already carries the desired status.

use crate::controller::key::ObjectKey;
use crate::controller::reconciler::types::ReconcilerError;
use crate::controller::store::ResourceStore;
use crate::crd::EventSource;
use crate::observability::metrics;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Result of a successful commit
#[derive(Debug, Clone, PartialEq)]
pub enum CommitOutcome<K> {
    /// The stored status already matched; nothing was written
    AlreadySatisfied,
    /// The status was written
    Updated {
        object: K,
        /// The write moved the source from not ready to ready
        became_ready: bool,
    },
}

pub struct StatusCommitter<K> {
    store: Arc<dyn ResourceStore<K>>,
    max_attempts: u32,
    retry_delay: Duration,
}

impl<K> std::fmt::Debug for StatusCommitter<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatusCommitter")
            .field("max_attempts", &self.max_attempts)
            .field("retry_delay", &self.retry_delay)
            .finish_non_exhaustive()
    }
}

impl<K: EventSource> StatusCommitter<K> {
    /// `max_attempts` of 0 is treated as 1
    pub fn new(store: Arc<dyn ResourceStore<K>>, max_attempts: u32, retry_delay: Duration) -> Self {
        Self {
            store,
            max_attempts: max_attempts.max(1),
            retry_delay,
        }
    }

    /// Same store, new retry bounds
    #[must_use]
    pub fn with_bounds(self, max_attempts: u32, retry_delay: Duration) -> Self {
        Self::new(self.store, max_attempts, retry_delay)
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Write `desired`'s status, starting from `original`
    ///
    /// # Errors
    ///
    /// - [`ReconcilerError::StatusConflict`] when every attempt conflicted
    /// - [`ReconcilerError::Store`] for any other store failure, including a
    ///   source deleted between attempts
    pub async fn commit(
        &self,
        original: &K,
        desired: &K,
    ) -> Result<CommitOutcome<K>, ReconcilerError> {
        let key = ObjectKey::from_resource(desired);
        let desired_status = desired.source_status();

        for attempt in 0..self.max_attempts {
            let base = if attempt == 0 {
                original.clone()
            } else {
                tokio::time::sleep(self.retry_delay).await;
                self.store.get(&key).await?
            };

            if base.source_status() == desired_status {
                debug!(
                    "Status of {} already up to date (attempt {})",
                    key,
                    attempt + 1
                );
                return Ok(CommitOutcome::AlreadySatisfied);
            }

            let was_ready = base.is_ready();
            let mut candidate = base;
            candidate.set_source_status(desired_status.cloned());

            match self.store.update_status(&candidate).await {
                Ok(object) => {
                    let became_ready = !was_ready && desired.is_ready();
                    debug!(
                        "Updated status of {} (attempt {}, became_ready={})",
                        key,
                        attempt + 1,
                        became_ready
                    );
                    return Ok(CommitOutcome::Updated {
                        object,
                        became_ready,
                    });
                }
                Err(e) if e.is_conflict() => {
                    metrics::increment_status_update_conflicts();
                    warn!(
                        "Conflict updating status of {} (attempt {}/{}): {}",
                        key,
                        attempt + 1,
                        self.max_attempts,
                        e
                    );
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(ReconcilerError::StatusConflict {
            key: key.to_string(),
            attempts: self.max_attempts,
        })
    }
}
