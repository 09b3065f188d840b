//! # Dispatcher
//!
//! Turns watch events into queue keys.
//!
//! Source events enqueue the source itself. Dependent events (Topic,
//! PullSubscription) enqueue the source that controls them, found through the
//! dependent's controller owner reference.

use crate::controller::key::ObjectKey;
use crate::controller::queue::WorkQueue;
use crate::controller::store::WatchEvent;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::{Resource, ResourceExt};
use std::sync::Arc;
use tracing::{debug, trace};

/// Accepts objects controlled by a given owner kind
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnerFilter {
    pub api_version: String,
    pub kind: String,
}

impl OwnerFilter {
    pub fn new(api_version: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            api_version: api_version.into(),
            kind: kind.into(),
        }
    }

    /// Filter matching objects controlled by a `K`
    pub fn for_owner<K: Resource<DynamicType = ()>>() -> Self {
        Self::new(K::api_version(&()), K::kind(&()))
    }

    /// The controller owner reference, if it names the expected kind
    pub fn matching_owner<'a>(&self, owners: &'a [OwnerReference]) -> Option<&'a OwnerReference> {
        owners.iter().find(|owner| {
            owner.controller == Some(true)
                && owner.api_version == self.api_version
                && owner.kind == self.kind
        })
    }
}

#[derive(Debug, Clone)]
pub struct Dispatcher {
    queue: Arc<WorkQueue>,
}

impl Dispatcher {
    pub fn new(queue: Arc<WorkQueue>) -> Self {
        Self { queue }
    }

    pub fn queue(&self) -> &Arc<WorkQueue> {
        &self.queue
    }

    /// Enqueue the object an event is about
    pub fn handle<K: Resource>(&self, event: &WatchEvent<K>) {
        let key = ObjectKey::from_resource(event.object());
        trace!("Enqueueing {}", key);
        self.queue.add(key.to_string());
    }

    /// Enqueue the owner of a dependent, if `filter` accepts it
    ///
    /// Returns the owner's key when something was enqueued.
    pub fn handle_dependent<D: Resource>(
        &self,
        event: &WatchEvent<D>,
        filter: &OwnerFilter,
    ) -> Option<ObjectKey> {
        let dependent = event.object();
        let owner = filter.matching_owner(dependent.owner_references())?;

        // Owner references are namespace-local
        let key = ObjectKey::new(dependent.namespace(), owner.name.clone());
        debug!(
            "{} {} changed, enqueueing owner {}",
            filter.kind,
            dependent.name_any(),
            key
        );
        self.queue.add(key.to_string());
        Some(key)
    }
}
