//! # Test Fixtures
//!
//! In-memory implementations of the controller's boundaries.
//!
//! `FakeStore` plays both the API server and the informer cache. Status writes
//! are checked against the stored resource version and bump it, so stale
//! writes conflict the way they would against a real API server.

#![allow(dead_code, reason = "each test binary uses a different subset")]

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use pubsub_source_controller::controller::reconciler::{
    CleanupHook, ConvergenceAction, ConvergenceFailure,
};
use pubsub_source_controller::controller::store::{
    Lister, ResourceStore, StoreError, WatchEvent, WatchFilter,
};
use pubsub_source_controller::controller::{EventRecorder, EventSeverity, ObjectKey};
use pubsub_source_controller::observability::metrics::MetricsSink;
use pubsub_source_controller::{
    CloudAuditLog, CloudAuditLogSpec, CloudPubSubSource, CloudPubSubSourceSpec, Destination,
    DependentOutput, EventSource, PubSubSpec,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::{Resource, ResourceExt};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Failure injected into the next status write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptedFailure {
    Conflict,
    NotFound,
    Transient,
}

pub struct FakeStore<K> {
    objects: Mutex<HashMap<String, K>>,
    cache: Mutex<HashMap<String, Arc<K>>>,
    failures: Mutex<VecDeque<ScriptedFailure>>,
    gets: AtomicUsize,
    updates: AtomicUsize,
}

impl<K: EventSource> FakeStore<K> {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            objects: Mutex::new(HashMap::new()),
            cache: Mutex::new(HashMap::new()),
            failures: Mutex::new(VecDeque::new()),
            gets: AtomicUsize::new(0),
            updates: AtomicUsize::new(0),
        })
    }

    /// Store `obj` in both the API server and the cache
    pub fn insert(&self, mut obj: K) {
        if obj.meta().resource_version.is_none() {
            obj.meta_mut().resource_version = Some("1".to_string());
        }
        let key = ObjectKey::from_resource(&obj).to_string();
        self.cache
            .lock()
            .unwrap()
            .insert(key.clone(), Arc::new(obj.clone()));
        self.objects.lock().unwrap().insert(key, obj);
    }

    /// Change the authoritative copy without the cache noticing
    pub fn modify_behind_cache(&self, key: &str, change: impl FnOnce(&mut K)) {
        let mut objects = self.objects.lock().unwrap();
        let obj = objects.get_mut(key).unwrap();
        change(obj);
        bump_resource_version(obj);
    }

    pub fn remove(&self, key: &str) {
        self.objects.lock().unwrap().remove(key);
        self.cache.lock().unwrap().remove(key);
    }

    pub fn fail_next_updates(&self, failures: &[ScriptedFailure]) {
        self.failures.lock().unwrap().extend(failures.iter().copied());
    }

    /// The authoritative copy
    pub fn stored(&self, key: &str) -> K {
        self.objects.lock().unwrap().get(key).cloned().unwrap()
    }

    pub fn cached(&self, key: &str) -> Arc<K> {
        Arc::clone(self.cache.lock().unwrap().get(key).unwrap())
    }

    pub fn gets(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    pub fn updates(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }
}

fn bump_resource_version<K: Resource>(obj: &mut K) {
    let next = obj
        .meta()
        .resource_version
        .as_deref()
        .and_then(|rv| rv.parse::<u64>().ok())
        .unwrap_or(0)
        + 1;
    obj.meta_mut().resource_version = Some(next.to_string());
}

#[async_trait]
impl<K: EventSource> ResourceStore<K> for FakeStore<K> {
    async fn get(&self, key: &ObjectKey) -> Result<K, StoreError> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.objects
            .lock()
            .unwrap()
            .get(&key.to_string())
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                key: key.to_string(),
            })
    }

    async fn update_status(&self, obj: &K) -> Result<K, StoreError> {
        self.updates.fetch_add(1, Ordering::SeqCst);
        let key = ObjectKey::from_resource(obj).to_string();

        if let Some(failure) = self.failures.lock().unwrap().pop_front() {
            return Err(match failure {
                ScriptedFailure::Conflict => StoreError::Conflict {
                    key,
                    message: "the object has been modified".to_string(),
                },
                ScriptedFailure::NotFound => StoreError::NotFound { key },
                ScriptedFailure::Transient => StoreError::Transient {
                    message: "connection reset".to_string(),
                },
            });
        }

        let mut objects = self.objects.lock().unwrap();
        let Some(stored) = objects.get_mut(&key) else {
            return Err(StoreError::NotFound { key });
        };
        if stored.resource_version() != obj.resource_version() {
            return Err(StoreError::Conflict {
                key,
                message: format!(
                    "resource version {:?} is stale",
                    obj.resource_version()
                ),
            });
        }

        stored.set_source_status(obj.source_status().cloned());
        bump_resource_version(stored);
        let updated = stored.clone();
        drop(objects);

        self.cache
            .lock()
            .unwrap()
            .insert(key, Arc::new(updated.clone()));
        Ok(updated)
    }

    fn watch(&self, _filter: WatchFilter) -> BoxStream<'static, Result<WatchEvent<K>, StoreError>> {
        stream::empty().boxed()
    }
}

impl<K: EventSource> Lister<K> for FakeStore<K> {
    fn get(&self, key: &ObjectKey) -> Option<Arc<K>> {
        self.cache.lock().unwrap().get(&key.to_string()).cloned()
    }

    fn list(&self) -> Vec<Arc<K>> {
        self.cache.lock().unwrap().values().cloned().collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedEvent {
    pub severity: EventSeverity,
    pub reason: String,
    pub message: String,
}

#[derive(Default)]
pub struct RecordingRecorder {
    events: Mutex<Vec<RecordedEvent>>,
}

impl RecordingRecorder {
    pub fn events(&self) -> Vec<RecordedEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn reasons(&self) -> Vec<String> {
        self.events().into_iter().map(|e| e.reason).collect()
    }

    pub fn count(&self, reason: &str) -> usize {
        self.events().iter().filter(|e| e.reason == reason).count()
    }
}

impl<K> EventRecorder<K> for RecordingRecorder {
    fn event(&self, _obj: &K, severity: EventSeverity, reason: &str, message: &str) {
        self.events.lock().unwrap().push(RecordedEvent {
            severity,
            reason: reason.to_string(),
            message: message.to_string(),
        });
    }
}

#[derive(Default)]
pub struct RecordingMetrics {
    ready: Mutex<Vec<(String, String, String, Duration)>>,
}

impl RecordingMetrics {
    pub fn ready_reports(&self) -> Vec<(String, String, String)> {
        self.ready
            .lock()
            .unwrap()
            .iter()
            .map(|(kind, ns, name, _)| (kind.clone(), ns.clone(), name.clone()))
            .collect()
    }

    /// Reported time from creation to first readiness, in report order
    pub fn ready_latencies(&self) -> Vec<Duration> {
        self.ready.lock().unwrap().iter().map(|r| r.3).collect()
    }
}

impl MetricsSink for RecordingMetrics {
    fn report_ready(
        &self,
        kind: &str,
        namespace: &str,
        name: &str,
        ready_after: Duration,
    ) -> anyhow::Result<()> {
        self.ready.lock().unwrap().push((
            kind.to_string(),
            namespace.to_string(),
            name.to_string(),
            ready_after,
        ));
        Ok(())
    }
}

/// Returns scripted results in order, then repeats the last one
pub struct ScriptedAction {
    results: Mutex<VecDeque<Result<DependentOutput, ConvergenceFailure>>>,
    last: Mutex<Result<DependentOutput, ConvergenceFailure>>,
    calls: AtomicUsize,
}

impl ScriptedAction {
    pub fn new(results: Vec<Result<DependentOutput, ConvergenceFailure>>) -> Arc<Self> {
        Arc::new(Self {
            results: Mutex::new(results.into()),
            last: Mutex::new(Ok(DependentOutput::default())),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn succeeding(output: DependentOutput) -> Arc<Self> {
        Self::new(vec![Ok(output)])
    }

    pub fn failing(reason: &str, message: &str) -> Arc<Self> {
        Self::new(vec![Err(ConvergenceFailure::new(reason, message))])
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl<K: Sync> ConvergenceAction<K> for ScriptedAction {
    async fn converge(&self, _source: &K) -> Result<DependentOutput, ConvergenceFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut last = self.last.lock().unwrap();
        if let Some(next) = self.results.lock().unwrap().pop_front() {
            *last = next;
        }
        last.clone()
    }
}

#[derive(Default)]
pub struct CountingCleanup {
    calls: AtomicUsize,
}

impl CountingCleanup {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl<K: Sync> CleanupHook<K> for CountingCleanup {
    async fn cleanup(&self, _source: &K) -> Result<(), ConvergenceFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub fn subscription_output() -> DependentOutput {
    DependentOutput {
        project_id: Some("my-project".to_string()),
        id: Some("cre-src_default_src1".to_string()),
        uri: Some("http://sink.default.svc.cluster.local".to_string()),
    }
}

fn pubsub_spec() -> PubSubSpec {
    PubSubSpec {
        sink: Destination {
            reference: None,
            uri: Some("http://sink.default.svc.cluster.local".to_string()),
        },
        project: Some("my-project".to_string()),
        secret: None,
        ce_overrides: None,
    }
}

pub fn pubsub_source(name: &str, generation: i64) -> CloudPubSubSource {
    let mut source = CloudPubSubSource::new(
        name,
        CloudPubSubSourceSpec {
            pubsub: pubsub_spec(),
            topic: "orders".to_string(),
            ack_deadline: Some("30s".to_string()),
            retain_acked_messages: false,
            retention_duration: None,
        },
    );
    source.metadata.namespace = Some("default".to_string());
    source.metadata.uid = Some(format!("uid-{name}"));
    source.metadata.generation = Some(generation);
    source.metadata.creation_timestamp = Some(created_secs_ago(60));
    source
}

pub fn audit_log(name: &str) -> CloudAuditLog {
    let mut source = CloudAuditLog::new(
        name,
        CloudAuditLogSpec {
            pubsub: pubsub_spec(),
            service_name: "storage.googleapis.com".to_string(),
            method_name: "storage.buckets.create".to_string(),
            resource_name: None,
        },
    );
    source.metadata.namespace = Some("default".to_string());
    source.metadata.uid = Some(format!("uid-{name}"));
    source.metadata.generation = Some(1);
    source.metadata.creation_timestamp = Some(created_secs_ago(60));
    source
}

/// A timestamp in the format the API server serializes
pub fn timestamp<T: serde::de::DeserializeOwned>(rfc3339: &str) -> T {
    serde_json::from_value(serde_json::json!(rfc3339)).unwrap()
}

/// A creation timestamp `secs` seconds in the past
pub fn created_secs_ago(secs: i64) -> Time {
    let created = chrono::Utc::now() - chrono::TimeDelta::seconds(secs);
    timestamp(&created.to_rfc3339_opts(chrono::SecondsFormat::Secs, true))
}
