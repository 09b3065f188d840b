//! # Kubernetes Provider
//!
//! The store and convergence actions used when running in a cluster.

pub mod dependents;
pub mod store;

pub use dependents::{
    cloud_audit_log_plan, cloud_pubsub_source_plan, PullSubscriptionAction, TopicAction,
};
pub use store::{KubeStore, StoredResource};
