//! # Metrics Module
//!
//! Prometheus metrics for monitoring the controller, organized by responsibility.
//!
//! ## Sub-modules
//!
//! - `registry` - Metrics registry setup, registration and text encoding
//! - `controller_metrics` - Reconciliations, errors, requeues, conflicts, events
//! - `stats_reporter` - Source readiness latency behind the `MetricsSink` trait

pub mod controller_metrics;
pub mod registry;
pub mod stats_reporter;

pub use controller_metrics::*;
pub use registry::*;
pub use stats_reporter::{MetricsSink, PrometheusMetricsSink};
