//! # Providers
//!
//! Implementations of the controller's boundaries against real backends.
//!
//! - `kube` - API server backed store, lister and dependent convergence

pub mod kube;
