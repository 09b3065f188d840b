//! # Convergence
//!
//! The per-kind list of steps that drive dependents toward the source's spec.
//!
//! Each step owns exactly one condition. A step may name prerequisites; when a
//! prerequisite fails in a pass the step is skipped and its condition is left
//! as it was, while steps that do not depend on the failure still run.

use crate::crd::{ConditionType, DependentOutput};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

/// Why a dependent could not be converged
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{reason}: {message}")]
pub struct ConvergenceFailure {
    pub reason: String,
    pub message: String,
}

impl ConvergenceFailure {
    pub fn new(reason: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            message: message.into(),
        }
    }
}

/// Brings one dependent of `K` in line with the source's spec
///
/// Must be idempotent: the reconciler calls it on every pass.
#[async_trait]
pub trait ConvergenceAction<K>: Send + Sync {
    async fn converge(&self, source: &K) -> Result<DependentOutput, ConvergenceFailure>;
}

/// Runs when a source is being deleted
#[async_trait]
pub trait CleanupHook<K>: Send + Sync {
    async fn cleanup(&self, source: &K) -> Result<(), ConvergenceFailure>;
}

pub struct ConvergenceStep<K, C> {
    pub condition: C,
    pub prerequisites: Vec<C>,
    pub action: Arc<dyn ConvergenceAction<K>>,
}

impl<K, C: fmt::Debug> fmt::Debug for ConvergenceStep<K, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConvergenceStep")
            .field("condition", &self.condition)
            .field("prerequisites", &self.prerequisites)
            .finish_non_exhaustive()
    }
}

/// Ordered convergence steps and deletion hooks for one source kind
pub struct ConvergencePlan<K, C> {
    steps: Vec<ConvergenceStep<K, C>>,
    cleanup: Vec<Arc<dyn CleanupHook<K>>>,
}

impl<K, C: fmt::Debug> fmt::Debug for ConvergencePlan<K, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConvergencePlan")
            .field("steps", &self.steps)
            .field("cleanup_hooks", &self.cleanup.len())
            .finish()
    }
}

impl<K, C> Default for ConvergencePlan<K, C> {
    fn default() -> Self {
        Self {
            steps: Vec::new(),
            cleanup: Vec::new(),
        }
    }
}

impl<K, C: ConditionType> ConvergencePlan<K, C> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an independent step
    #[must_use]
    pub fn step(self, condition: C, action: Arc<dyn ConvergenceAction<K>>) -> Self {
        self.step_after(condition, &[], action)
    }

    /// Add a step that only runs when every prerequisite succeeded this pass
    #[must_use]
    pub fn step_after(
        mut self,
        condition: C,
        prerequisites: &[C],
        action: Arc<dyn ConvergenceAction<K>>,
    ) -> Self {
        self.steps.push(ConvergenceStep {
            condition,
            prerequisites: prerequisites.to_vec(),
            action,
        });
        self
    }

    #[must_use]
    pub fn on_delete(mut self, hook: Arc<dyn CleanupHook<K>>) -> Self {
        self.cleanup.push(hook);
        self
    }

    pub fn steps(&self) -> &[ConvergenceStep<K, C>] {
        &self.steps
    }

    pub fn cleanup_hooks(&self) -> &[Arc<dyn CleanupHook<K>>] {
        &self.cleanup
    }
}
