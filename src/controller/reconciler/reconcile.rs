//! # Reconcile
//!
//! One reconciliation pass for one key.
//!
//! The pass works on an owned copy of the cached object. It initializes
//! conditions, validates the spec, runs the kind's convergence plan, and
//! commits the resulting status only when it differs from what was cached.
//! It never sleeps or loops apart from the bounded status retry; requeueing
//! after an error is the caller's job.

use crate::constants::{
    DEFAULT_STATUS_UPDATE_MAX_ATTEMPTS, DEFAULT_STATUS_UPDATE_RETRY_DELAY_MS, REASON_INVALID_SPEC,
};
use crate::controller::events::{reasons, EventRecorder, EventSeverity};
use crate::controller::key::ObjectKey;
use crate::controller::reconciler::convergence::{ConvergenceFailure, ConvergencePlan};
use crate::controller::reconciler::status::{CommitOutcome, StatusCommitter};
use crate::controller::reconciler::types::{ReconcileOutcome, ReconcilerError};
use crate::controller::store::{Lister, ResourceStore};
use crate::crd::{ConditionOf, ConditionType, EventSource, SourceStatus};
use crate::observability::metrics::{self, MetricsSink};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::{Resource, ResourceExt};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn, Instrument};

pub struct Reconciler<K: EventSource> {
    lister: Arc<dyn Lister<K>>,
    committer: StatusCommitter<K>,
    plan: ConvergencePlan<K, ConditionOf<K>>,
    recorder: Arc<dyn EventRecorder<K>>,
    metrics: Arc<dyn MetricsSink>,
}

impl<K: EventSource> std::fmt::Debug for Reconciler<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("kind", &K::kind_name())
            .field("committer", &self.committer)
            .field("plan", &self.plan)
            .finish_non_exhaustive()
    }
}

impl<K: EventSource> Reconciler<K> {
    pub fn new(
        lister: Arc<dyn Lister<K>>,
        store: Arc<dyn ResourceStore<K>>,
        plan: ConvergencePlan<K, ConditionOf<K>>,
        recorder: Arc<dyn EventRecorder<K>>,
        metrics: Arc<dyn MetricsSink>,
    ) -> Self {
        Self {
            lister,
            committer: StatusCommitter::new(
                store,
                DEFAULT_STATUS_UPDATE_MAX_ATTEMPTS,
                Duration::from_millis(DEFAULT_STATUS_UPDATE_RETRY_DELAY_MS),
            ),
            plan,
            recorder,
            metrics,
        }
    }

    /// Replace the status committer's retry bounds
    #[must_use]
    pub fn with_status_retry(self, max_attempts: u32, retry_delay: Duration) -> Self {
        let Self {
            lister,
            committer,
            plan,
            recorder,
            metrics,
        } = self;
        Self {
            lister,
            committer: committer.with_bounds(max_attempts, retry_delay),
            plan,
            recorder,
            metrics,
        }
    }

    pub fn lister(&self) -> &Arc<dyn Lister<K>> {
        &self.lister
    }

    /// Reconcile the object stored under `key`
    ///
    /// # Errors
    ///
    /// Returns the status commit error if the write failed, otherwise the
    /// validation or convergence error of the pass.
    pub async fn reconcile(&self, key: &str) -> Result<ReconcileOutcome, ReconcilerError> {
        let kind = K::kind_name();
        let span = tracing::info_span!(
            "controller.reconcile",
            resource.kind = %kind,
            resource.key = %key
        );

        let start = Instant::now();
        metrics::increment_reconciliations(&kind);
        let result = self.reconcile_key(key).instrument(span).await;
        metrics::observe_reconciliation_duration(start.elapsed().as_secs_f64());
        result
    }

    async fn reconcile_key(&self, key: &str) -> Result<ReconcileOutcome, ReconcilerError> {
        let object_key = match key.parse::<ObjectKey>() {
            Ok(object_key) => object_key,
            Err(e) => {
                // Retrying cannot fix a malformed key
                error!("❌ {}", e);
                return Ok(ReconcileOutcome::InvalidKey);
            }
        };

        let Some(cached) = self.lister.get(&object_key) else {
            info!("{} {} no longer exists", K::kind_name(), object_key);
            return Ok(ReconcileOutcome::NotFound);
        };

        let original: K = (*cached).clone();

        if original.meta().deletion_timestamp.is_some() {
            return self.finalize(&object_key, &original).await;
        }

        let mut desired = original.clone();
        desired.source_status_mut().manage().initialize_conditions();

        let pass_error = match desired.validate() {
            Err(invalid) => {
                warn!(
                    "Spec of {} is invalid ({}): {}",
                    object_key,
                    invalid.condition.as_str(),
                    invalid.message
                );
                desired.source_status_mut().manage().mark_false(
                    invalid.condition,
                    REASON_INVALID_SPEC,
                    invalid.message.clone(),
                );
                Some(ReconcilerError::Validation {
                    key: object_key.to_string(),
                    message: invalid.message,
                })
            }
            Ok(()) => self
                .converge(&original, &mut desired)
                .await
                .map(|failures| ReconcilerError::Convergence {
                    key: object_key.to_string(),
                    failures,
                }),
        };

        if pass_error.is_none() {
            desired.source_status_mut().pubsub_mut().observed_generation =
                desired.meta().generation;
        }

        let mut outcome = ReconcileOutcome::Unchanged;
        let mut commit_error = None;

        if desired.source_status() == original.source_status() {
            debug!("Status of {} unchanged, skipping update", object_key);
        } else {
            match self.committer.commit(&original, &desired).await {
                Ok(CommitOutcome::AlreadySatisfied) => {}
                Ok(CommitOutcome::Updated { became_ready, .. }) => {
                    if pass_error.is_none() {
                        self.emit(
                            &desired,
                            EventSeverity::Normal,
                            reasons::UPDATED,
                            &format!("Updated status of {} {}", K::kind_name(), object_key),
                        );
                    }
                    if became_ready {
                        self.on_ready(&object_key, &desired);
                    }
                    outcome = ReconcileOutcome::StatusUpdated { became_ready };
                }
                Err(ReconcilerError::Store(e)) if e.is_not_found() => {
                    info!("{} was deleted during reconciliation", object_key);
                    return Ok(ReconcileOutcome::NotFound);
                }
                Err(e) => {
                    error!("Failed to update status of {}: {}", object_key, e);
                    self.emit(
                        &desired,
                        EventSeverity::Warning,
                        reasons::UPDATE_FAILED,
                        &format!("Failed to update status: {e}"),
                    );
                    commit_error = Some(e);
                }
            }
        }

        if let Some(e) = &pass_error {
            self.emit(
                &desired,
                EventSeverity::Warning,
                reasons::INTERNAL_ERROR,
                &e.to_string(),
            );
        }

        match (commit_error, pass_error) {
            (Some(e), _) | (None, Some(e)) => Err(e),
            (None, None) => {
                info!("✅ Reconciled {} {}", K::kind_name(), object_key);
                Ok(outcome)
            }
        }
    }

    /// Run every convergence step, returning the failures if any
    ///
    /// A step whose prerequisite failed (or was skipped) this pass is skipped
    /// and its condition left untouched.
    async fn converge(&self, original: &K, desired: &mut K) -> Option<Vec<ConvergenceFailure>> {
        let mut blocked: Vec<ConditionOf<K>> = Vec::new();
        let mut failures = Vec::new();

        for step in self.plan.steps() {
            if let Some(prerequisite) = step
                .prerequisites
                .iter()
                .find(|p| blocked.contains(*p))
            {
                debug!(
                    "Skipping {}: prerequisite {} did not succeed",
                    step.condition.as_str(),
                    prerequisite.as_str()
                );
                blocked.push(step.condition);
                continue;
            }

            match step.action.converge(original).await {
                Ok(output) => {
                    let status = desired.source_status_mut();
                    status.record_output(step.condition, &output);
                    status.manage().mark_true(step.condition);
                }
                Err(failure) => {
                    warn!(
                        "{} failed for {}: {}",
                        step.condition.as_str(),
                        original.name_any(),
                        failure
                    );
                    desired.source_status_mut().manage().mark_false(
                        step.condition,
                        failure.reason.clone(),
                        failure.message.clone(),
                    );
                    blocked.push(step.condition);
                    failures.push(failure);
                }
            }
        }

        (!failures.is_empty()).then_some(failures)
    }

    /// Deletion path: cleanup hooks only, status untouched
    async fn finalize(
        &self,
        key: &ObjectKey,
        source: &K,
    ) -> Result<ReconcileOutcome, ReconcilerError> {
        info!("🗑️ {} {} is being deleted", K::kind_name(), key);

        let mut failures = Vec::new();
        for hook in self.plan.cleanup_hooks() {
            if let Err(failure) = hook.cleanup(source).await {
                warn!("Cleanup of {} failed: {}", key, failure);
                failures.push(failure);
            }
        }

        if failures.is_empty() {
            Ok(ReconcileOutcome::Deleted)
        } else {
            Err(ReconcilerError::Convergence {
                key: key.to_string(),
                failures,
            })
        }
    }

    fn on_ready(&self, key: &ObjectKey, source: &K) {
        let kind = K::kind_name();
        info!("🎉 {} {} is ready", kind, key);
        self.emit(
            source,
            EventSeverity::Normal,
            reasons::READINESS_CHANGED,
            &format!("{kind} {key} is ready"),
        );

        let Some(ready_after) = since_creation(source.meta()) else {
            debug!("{} {} has no usable creationTimestamp, skipping readiness latency", kind, key);
            return;
        };
        if let Err(e) =
            self.metrics
                .report_ready(&kind, key.namespace_or_default(), &key.name, ready_after)
        {
            warn!("Failed to report readiness of {}: {}", key, e);
        }
    }

    fn emit(&self, source: &K, severity: EventSeverity, reason: &str, message: &str) {
        metrics::increment_events_emitted(severity.as_str(), reason);
        self.recorder.event(source, severity, reason, message);
    }
}

/// Time elapsed since the object's creation timestamp
fn since_creation(meta: &ObjectMeta) -> Option<Duration> {
    let created = meta.creation_timestamp.as_ref()?;
    let rfc3339 = serde_json::to_value(created).ok()?;
    let created = chrono::DateTime::parse_from_rfc3339(rfc3339.as_str()?).ok()?;
    (chrono::Utc::now() - created.with_timezone(&chrono::Utc))
        .to_std()
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_since_creation_without_timestamp() {
        assert_eq!(since_creation(&ObjectMeta::default()), None);
    }

    #[test]
    fn test_since_creation_measures_elapsed_time() {
        let created = chrono::Utc::now() - chrono::Duration::seconds(90);
        let meta = ObjectMeta {
            creation_timestamp: serde_json::from_value(serde_json::json!(
                created.to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
            ))
            .unwrap(),
            ..Default::default()
        };

        let elapsed = since_creation(&meta).unwrap();
        assert!(elapsed >= Duration::from_secs(89));
        assert!(elapsed < Duration::from_secs(120));
    }
}
