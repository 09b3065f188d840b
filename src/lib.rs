//! # Pub/Sub Source Controller
//!
//! A Kubernetes controller that reconciles Google Cloud Pub/Sub event sources.
//!
//! ## Overview
//!
//! Each source kind is driven by the same control loop:
//!
//! 1. **Watching** - Source and dependent changes are turned into queue keys,
//!    dependents enqueue the source that controls them
//! 2. **Reconciling** - A worker takes a key, validates the cached source and
//!    converges its dependents (`Topic`, `PullSubscription`, audit log sink)
//! 3. **Reporting** - Conditions are recomputed and the status is written back
//!    under optimistic concurrency, with a bounded retry on conflicts
//!
//! Readiness transitions are published as Kubernetes events and as a
//! readiness latency histogram.
//!
//! ## Modules
//!
//! - `crd` - Source and dependent resource types, conditions
//! - `controller` - Queue, dispatcher, reconciler and their boundaries
//! - `provider` - API server backed implementations of the boundaries
//! - `runtime` - Startup wiring and the watch loop
//! - `observability` - Prometheus metrics
//! - `config` - Environment configuration

pub mod config;
pub mod constants;
pub mod controller;
pub mod crd;
pub mod observability;
pub mod provider;
pub mod runtime;

pub use crd::*;
