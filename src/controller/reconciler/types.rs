//! # Reconciler Types
//!
//! Errors and outcomes of a reconciliation pass.

use crate::controller::reconciler::convergence::ConvergenceFailure;
use crate::controller::store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum ReconcilerError {
    /// The store failed for a reason other than a conflict
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// One or more convergence steps failed
    #[error("failed to converge {key}: {}", join_failures(.failures))]
    Convergence {
        key: String,
        failures: Vec<ConvergenceFailure>,
    },

    /// The spec is invalid; retrying cannot help until it changes
    #[error("invalid spec for {key}: {message}")]
    Validation { key: String, message: String },

    /// Every status write attempt hit a conflict
    #[error("status update for {key} conflicted {attempts} times")]
    StatusConflict { key: String, attempts: u32 },
}

impl ReconcilerError {
    /// Whether requeueing the key can make progress without a spec change
    pub fn is_retriable(&self) -> bool {
        !matches!(self, Self::Validation { .. })
    }

    /// Short label for metrics
    pub fn label(&self) -> &'static str {
        match self {
            Self::Store(_) => "store",
            Self::Convergence { .. } => "convergence",
            Self::Validation { .. } => "validation",
            Self::StatusConflict { .. } => "status_conflict",
        }
    }
}

fn join_failures(failures: &[ConvergenceFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// What a successful pass did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// The key could not be parsed; nothing to retry
    InvalidKey,
    /// The object is gone
    NotFound,
    /// The object is being deleted; cleanup ran, status untouched
    Deleted,
    /// Status already matched the desired state; no write
    Unchanged,
    /// Status was written
    StatusUpdated { became_ready: bool },
}
