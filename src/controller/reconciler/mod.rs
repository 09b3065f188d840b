//! # Reconciler
//!
//! The per-key control loop and the pieces it is built from.
//!
//! ## Sub-modules
//!
//! - `reconcile` - One reconciliation pass
//! - `convergence` - Convergence actions, cleanup hooks and per-kind plans
//! - `status` - Status commits with bounded retry on conflict
//! - `types` - Errors and outcomes
//! - `validation` - Spec validation

pub mod convergence;
pub mod reconcile;
pub mod status;
pub mod types;
pub mod validation;

pub use convergence::{CleanupHook, ConvergenceAction, ConvergenceFailure, ConvergencePlan};
pub use reconcile::Reconciler;
pub use status::{CommitOutcome, StatusCommitter};
pub use types::{ReconcileOutcome, ReconcilerError};
