//! # Runtime
//!
//! Startup wiring, the per-kind watch loop and the requeue policy.

pub mod error_policy;
pub mod initialization;
pub mod watch_loop;

pub use error_policy::{log_watch_error, ErrorPolicy};
pub use initialization::{initialize, InitializationResult};
pub use watch_loop::SourceController;
