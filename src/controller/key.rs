//! # Object Keys
//!
//! Queue keys are `namespace/name`, or just `name` for cluster-scoped objects.

use kube::{Resource, ResourceExt};
use std::fmt;
use std::str::FromStr;

/// Identity of an object in the work queue
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectKey {
    pub namespace: Option<String>,
    pub name: String,
}

/// A string that is not a valid object key
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid resource key: {0:?}")]
pub struct InvalidKey(pub String);

impl ObjectKey {
    pub fn new(namespace: Option<String>, name: impl Into<String>) -> Self {
        Self {
            namespace,
            name: name.into(),
        }
    }

    pub fn namespaced(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(Some(namespace.into()), name)
    }

    pub fn from_resource<K: Resource>(obj: &K) -> Self {
        Self::new(obj.namespace(), obj.name_any())
    }

    /// Namespace, or the empty string for cluster-scoped objects
    pub fn namespace_or_default(&self) -> &str {
        self.namespace.as_deref().unwrap_or_default()
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{ns}/{}", self.name),
            None => f.write_str(&self.name),
        }
    }
}

impl FromStr for ObjectKey {
    type Err = InvalidKey;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split('/');
        let key = match (parts.next(), parts.next(), parts.next()) {
            (Some(name), None, None) => Self::new(None, name),
            (Some(ns), Some(name), None) if !ns.is_empty() => Self::namespaced(ns, name),
            (Some(""), Some(name), None) => Self::new(None, name),
            _ => return Err(InvalidKey(s.to_string())),
        };

        if key.name.is_empty() {
            return Err(InvalidKey(s.to_string()));
        }
        Ok(key)
    }
}
