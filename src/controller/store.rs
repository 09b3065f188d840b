//! # Resource Store
//!
//! Boundary traits over the API server and the informer cache.
//!
//! The reconciler reads through a [`Lister`] (possibly stale) and writes status
//! through a [`ResourceStore`]. Only the store's `update_status` enforces
//! optimistic concurrency: the object's resource version is the token and a
//! stale token yields [`StoreError::Conflict`].

use crate::controller::key::ObjectKey;
use async_trait::async_trait;
use futures::stream::BoxStream;
use kube::Resource;
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{key} not found")]
    NotFound { key: String },

    #[error("conflict writing {key}: {message}")]
    Conflict { key: String, message: String },

    #[error("transient store error: {message}")]
    Transient { message: String },

    #[error("kubernetes API error: {0}")]
    Kube(#[from] kube::Error),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound { .. } => true,
            Self::Kube(kube::Error::Api(resp)) => resp.code == 404,
            _ => false,
        }
    }

    pub fn is_conflict(&self) -> bool {
        match self {
            Self::Conflict { .. } => true,
            Self::Kube(kube::Error::Api(resp)) => resp.code == 409,
            _ => false,
        }
    }

    /// Classifies a kube error for `key` into not-found, conflict or other
    pub fn from_kube(key: &ObjectKey, err: kube::Error) -> Self {
        match err {
            kube::Error::Api(resp) if resp.code == 404 => Self::NotFound {
                key: key.to_string(),
            },
            kube::Error::Api(resp) if resp.code == 409 => Self::Conflict {
                key: key.to_string(),
                message: resp.message,
            },
            other => Self::Kube(other),
        }
    }
}

/// A change observed on a watched resource
#[derive(Debug, Clone, PartialEq)]
pub enum WatchEvent<K> {
    Added(K),
    Updated(K),
    Deleted(K),
}

impl<K> WatchEvent<K> {
    pub fn object(&self) -> &K {
        match self {
            Self::Added(obj) | Self::Updated(obj) | Self::Deleted(obj) => obj,
        }
    }
}

/// Narrows a watch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WatchFilter {
    pub label_selector: Option<String>,
}

/// Authoritative, keyed access to resources of kind `K`
#[async_trait]
pub trait ResourceStore<K>: Send + Sync {
    /// Fetch the live object
    async fn get(&self, key: &ObjectKey) -> Result<K, StoreError>;

    /// Write the object's status, guarded by its resource version
    async fn update_status(&self, obj: &K) -> Result<K, StoreError>;

    /// Stream of changes to objects matching `filter`
    fn watch(&self, filter: WatchFilter) -> BoxStream<'static, Result<WatchEvent<K>, StoreError>>;
}

/// Read-through cache of resources of kind `K`
pub trait Lister<K>: Send + Sync {
    fn get(&self, key: &ObjectKey) -> Option<Arc<K>>;

    fn list(&self) -> Vec<Arc<K>>;
}

/// Keys of every cached object, for resyncs
pub fn cached_keys<K: Resource>(lister: &dyn Lister<K>) -> Vec<String> {
    lister
        .list()
        .iter()
        .map(|obj| ObjectKey::from_resource(obj.as_ref()).to_string())
        .collect()
}
