//! # Kubernetes Store
//!
//! `ResourceStore` and `Lister` backed by the API server and a reflector cache.
//!
//! The first stream returned by [`KubeStore::watch`] also feeds the cache, so
//! the lister only fills once that stream is being polled. Status writes are
//! merge patches that carry `metadata.resourceVersion`; the API server rejects
//! a stale version with 409, surfaced as [`StoreError::Conflict`].

use crate::controller::key::ObjectKey;
use crate::controller::store::{Lister, ResourceStore, StoreError, WatchEvent, WatchFilter};
use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use kube::api::{Api, Patch, PatchParams};
use kube::core::NamespaceResourceScope;
use kube_runtime::reflector::{self, store::Writer, ObjectRef, Store};
use kube_runtime::watcher::{self, watcher, Event};
use kube_runtime::WatchStreamExt;
use kube::{Client, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Debug;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;

/// Bounds shared by every kind the store can hold
pub trait StoredResource:
    Resource<DynamicType = (), Scope = NamespaceResourceScope>
    + Clone
    + Debug
    + Serialize
    + DeserializeOwned
    + Send
    + Sync
    + 'static
{
}

impl<K> StoredResource for K where
    K: Resource<DynamicType = (), Scope = NamespaceResourceScope>
        + Clone
        + Debug
        + Serialize
        + DeserializeOwned
        + Send
        + Sync
        + 'static
{
}

pub struct KubeStore<K: StoredResource> {
    client: Client,
    /// Namespace to watch, all namespaces when `None`
    namespace: Option<String>,
    reader: Store<K>,
    writer: Mutex<Option<Writer<K>>>,
}

impl<K: StoredResource> Debug for KubeStore<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeStore")
            .field("kind", &K::kind(&()))
            .field("namespace", &self.namespace)
            .finish_non_exhaustive()
    }
}

impl<K: StoredResource> KubeStore<K> {
    pub fn new(client: Client, namespace: Option<String>) -> Self {
        let (reader, writer) = reflector::store();
        Self {
            client,
            namespace,
            reader,
            writer: Mutex::new(Some(writer)),
        }
    }

    fn watch_api(&self) -> Api<K> {
        match &self.namespace {
            Some(ns) => Api::namespaced(self.client.clone(), ns),
            None => Api::all(self.client.clone()),
        }
    }

    fn api_for(&self, key: &ObjectKey) -> Api<K> {
        match &key.namespace {
            Some(ns) => Api::namespaced(self.client.clone(), ns),
            None => Api::default_namespaced(self.client.clone()),
        }
    }
}

fn to_watch_event<K>(event: Result<Event<K>, watcher::Error>) -> Option<Result<WatchEvent<K>, StoreError>> {
    match event {
        Ok(Event::InitApply(obj)) => Some(Ok(WatchEvent::Added(obj))),
        Ok(Event::Apply(obj)) => Some(Ok(WatchEvent::Updated(obj))),
        Ok(Event::Delete(obj)) => Some(Ok(WatchEvent::Deleted(obj))),
        Ok(Event::Init | Event::InitDone) => None,
        Err(e) => Some(Err(StoreError::Transient {
            message: e.to_string(),
        })),
    }
}

#[async_trait]
impl<K: StoredResource> ResourceStore<K> for KubeStore<K> {
    async fn get(&self, key: &ObjectKey) -> Result<K, StoreError> {
        self.api_for(key)
            .get(&key.name)
            .await
            .map_err(|e| StoreError::from_kube(key, e))
    }

    async fn update_status(&self, obj: &K) -> Result<K, StoreError> {
        let key = ObjectKey::from_resource(obj);
        let mut value = serde_json::to_value(obj).map_err(|e| StoreError::Transient {
            message: format!("failed to serialize {key}: {e}"),
        })?;
        let status = value
            .get_mut("status")
            .map(serde_json::Value::take)
            .unwrap_or_default();

        let patch = serde_json::json!({
            "metadata": { "resourceVersion": obj.resource_version() },
            "status": status,
        });

        debug!("Patching status of {} at {:?}", key, obj.resource_version());
        self.api_for(&key)
            .patch_status(&key.name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .map_err(|e| StoreError::from_kube(&key, e))
    }

    fn watch(&self, filter: WatchFilter) -> BoxStream<'static, Result<WatchEvent<K>, StoreError>> {
        let mut config = watcher::Config::default();
        if let Some(selector) = &filter.label_selector {
            config = config.labels(selector);
        }

        let events = watcher(self.watch_api(), config).default_backoff();
        let writer = self
            .writer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        let events = match writer {
            Some(writer) => reflector::reflector(writer, events).boxed(),
            None => events.boxed(),
        };

        events
            .filter_map(|event| futures::future::ready(to_watch_event(event)))
            .boxed()
    }
}

impl<K: StoredResource> Lister<K> for KubeStore<K> {
    fn get(&self, key: &ObjectKey) -> Option<Arc<K>> {
        let mut object_ref = ObjectRef::new(&key.name);
        if let Some(ns) = &key.namespace {
            object_ref = object_ref.within(ns);
        }
        self.reader.get(&object_ref)
    }

    fn list(&self) -> Vec<Arc<K>> {
        self.reader.state()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::{CloudPubSubSource, CloudPubSubSourceSpec};

    fn source() -> CloudPubSubSource {
        let mut source = CloudPubSubSource::new(
            "src1",
            CloudPubSubSourceSpec {
                pubsub: Default::default(),
                topic: "orders".to_string(),
                ack_deadline: None,
                retain_acked_messages: false,
                retention_duration: None,
            },
        );
        source.metadata.namespace = Some("default".to_string());
        source
    }

    #[test]
    fn test_watch_events_map_to_changes() {
        assert!(matches!(
            to_watch_event(Ok(Event::InitApply(source()))),
            Some(Ok(WatchEvent::Added(_)))
        ));
        assert!(matches!(
            to_watch_event(Ok(Event::Apply(source()))),
            Some(Ok(WatchEvent::Updated(_)))
        ));
        assert!(matches!(
            to_watch_event(Ok(Event::Delete(source()))),
            Some(Ok(WatchEvent::Deleted(_)))
        ));
        assert!(to_watch_event::<CloudPubSubSource>(Ok(Event::Init)).is_none());
        assert!(to_watch_event::<CloudPubSubSource>(Ok(Event::InitDone)).is_none());
    }
}
