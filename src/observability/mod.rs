//! # Observability
//!
//! Prometheus metrics for the controller and the readiness latency sink.

pub mod metrics;
