//! # Watch Loop
//!
//! Drives one source kind: watch pumps feed the work queue, a fixed pool of
//! workers drains it through the reconciler, and a periodic resync re-enqueues
//! every cached source.
//!
//! The queue guarantees a key is never processed by two workers at once. A
//! failed pass is requeued after the key's backoff; a successful one is not
//! requeued at all, later changes arrive through the watches.

use crate::controller::dispatcher::{Dispatcher, OwnerFilter};
use crate::controller::queue::WorkQueue;
use crate::controller::reconciler::Reconciler;
use crate::controller::store::{cached_keys, ResourceStore, WatchFilter};
use crate::crd::EventSource;
use crate::runtime::error_policy::{log_watch_error, ErrorPolicy};
use futures::StreamExt;
use kube::Resource;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

pub struct SourceController<K: EventSource> {
    reconciler: Arc<Reconciler<K>>,
    dispatcher: Dispatcher,
    policy: Arc<ErrorPolicy>,
    worker_count: usize,
    resync_period: Duration,
    filter: WatchFilter,
    pumps: JoinSet<()>,
}

impl<K: EventSource> std::fmt::Debug for SourceController<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceController")
            .field("kind", &K::kind_name())
            .field("worker_count", &self.worker_count)
            .field("resync_period", &self.resync_period)
            .finish_non_exhaustive()
    }
}

impl<K: EventSource> SourceController<K> {
    pub fn new(reconciler: Arc<Reconciler<K>>, policy: ErrorPolicy) -> Self {
        Self {
            reconciler,
            dispatcher: Dispatcher::new(Arc::new(WorkQueue::new())),
            policy: Arc::new(policy),
            worker_count: crate::constants::DEFAULT_WORKER_COUNT,
            resync_period: Duration::from_secs(crate::constants::DEFAULT_RESYNC_PERIOD_SECS),
            filter: WatchFilter::default(),
            pumps: JoinSet::new(),
        }
    }

    /// At least one worker always runs
    #[must_use]
    pub fn with_workers(mut self, worker_count: usize) -> Self {
        self.worker_count = worker_count.max(1);
        self
    }

    #[must_use]
    pub fn with_resync_period(mut self, resync_period: Duration) -> Self {
        self.resync_period = resync_period;
        self
    }

    /// Only watch sources matching `filter`
    #[must_use]
    pub fn with_filter(mut self, filter: WatchFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn queue(&self) -> &Arc<WorkQueue> {
        self.dispatcher.queue()
    }

    /// Enqueue the controlling source whenever a dependent of kind `D` changes
    pub fn watch_dependents<D>(&mut self, store: Arc<dyn ResourceStore<D>>)
    where
        D: Resource<DynamicType = ()> + Send + 'static,
    {
        let dispatcher = self.dispatcher.clone();
        let filter = OwnerFilter::for_owner::<K>();
        let dependent_kind = D::kind(&()).into_owned();

        self.pumps.spawn(async move {
            let mut events = store.watch(WatchFilter::default());
            while let Some(event) = events.next().await {
                match event {
                    Ok(event) => {
                        dispatcher.handle_dependent(&event, &filter);
                    }
                    Err(e) => log_watch_error(&dependent_kind, &e),
                }
            }
            warn!("{} watch stream ended", dependent_kind);
        });
    }

    /// Run until `shutdown` resolves
    ///
    /// Stops handing out keys on shutdown and waits for in-flight passes to
    /// finish.
    pub async fn run<F>(mut self, source_store: Arc<dyn ResourceStore<K>>, shutdown: F)
    where
        F: Future<Output = ()> + Send,
    {
        let kind = K::kind_name();
        let queue = Arc::clone(self.dispatcher.queue());

        let dispatcher = self.dispatcher.clone();
        let filter = self.filter.clone();
        let source_kind = kind.clone();
        self.pumps.spawn(async move {
            let mut events = source_store.watch(filter);
            while let Some(event) = events.next().await {
                match event {
                    Ok(event) => dispatcher.handle(&event),
                    Err(e) => log_watch_error(&source_kind, &e),
                }
            }
            warn!("{} watch stream ended", source_kind);
        });

        self.pumps.spawn(resync(
            Arc::clone(&self.reconciler),
            Arc::clone(&queue),
            self.resync_period,
        ));

        let mut workers = JoinSet::new();
        for id in 0..self.worker_count {
            workers.spawn(worker(
                id,
                Arc::clone(&self.reconciler),
                Arc::clone(&queue),
                Arc::clone(&self.policy),
            ));
        }
        info!(
            "🚀 {} controller running with {} workers",
            kind, self.worker_count
        );

        shutdown.await;
        info!("Shutting down {} controller", kind);
        queue.shut_down();
        self.pumps.shutdown().await;
        while workers.join_next().await.is_some() {}
        info!("{} controller stopped", kind);
    }
}

async fn worker<K: EventSource>(
    id: usize,
    reconciler: Arc<Reconciler<K>>,
    queue: Arc<WorkQueue>,
    policy: Arc<ErrorPolicy>,
) {
    while let Some(key) = queue.next().await {
        match reconciler.reconcile(&key).await {
            Ok(outcome) => {
                debug!("Worker {} reconciled {}: {:?}", id, key, outcome);
                policy.on_success(&key);
            }
            Err(e) => {
                let delay = policy.on_error(&key, &e);
                queue.add_after(key.clone(), delay);
            }
        }
        queue.done(&key);
    }
    debug!("Worker {} exiting", id);
}

async fn resync<K: EventSource>(reconciler: Arc<Reconciler<K>>, queue: Arc<WorkQueue>, period: Duration) {
    if period.is_zero() {
        return;
    }
    let mut interval = tokio::time::interval(period);
    // The first tick completes immediately
    interval.tick().await;
    loop {
        interval.tick().await;
        let keys = cached_keys(reconciler.lister().as_ref());
        info!("Resyncing {} {} objects", keys.len(), K::kind_name());
        for key in keys {
            queue.add(key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::reconciler::ConvergencePlan;
    use crate::controller::store::{Lister, StoreError, WatchEvent};
    use crate::controller::{EventRecorder, EventSeverity, ObjectKey};
    use crate::crd::{CloudPubSubSource, CloudPubSubSourceSpec};
    use crate::observability::metrics::MetricsSink;
    use async_trait::async_trait;
    use futures::stream::{self, BoxStream};

    struct EmptyStore;

    #[async_trait]
    impl ResourceStore<CloudPubSubSource> for EmptyStore {
        async fn get(&self, key: &ObjectKey) -> Result<CloudPubSubSource, StoreError> {
            Err(StoreError::NotFound {
                key: key.to_string(),
            })
        }

        async fn update_status(&self, obj: &CloudPubSubSource) -> Result<CloudPubSubSource, StoreError> {
            Ok(obj.clone())
        }

        fn watch(
            &self,
            _filter: WatchFilter,
        ) -> BoxStream<'static, Result<WatchEvent<CloudPubSubSource>, StoreError>> {
            let source = CloudPubSubSource::new(
                "src1",
                CloudPubSubSourceSpec {
                    pubsub: Default::default(),
                    topic: "orders".to_string(),
                    ack_deadline: None,
                    retain_acked_messages: false,
                    retention_duration: None,
                },
            );
            stream::iter(vec![Ok(WatchEvent::Added(source))])
                .chain(stream::pending())
                .boxed()
        }
    }

    impl Lister<CloudPubSubSource> for EmptyStore {
        fn get(&self, _key: &ObjectKey) -> Option<Arc<CloudPubSubSource>> {
            None
        }

        fn list(&self) -> Vec<Arc<CloudPubSubSource>> {
            Vec::new()
        }
    }

    struct Silent;

    impl EventRecorder<CloudPubSubSource> for Silent {
        fn event(&self, _: &CloudPubSubSource, _: EventSeverity, _: &str, _: &str) {}
    }

    impl MetricsSink for Silent {
        fn report_ready(&self, _: &str, _: &str, _: &str, _: Duration) -> anyhow::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let store = Arc::new(EmptyStore);
        let reconciler = Arc::new(Reconciler::new(
            Arc::clone(&store) as Arc<dyn Lister<CloudPubSubSource>>,
            Arc::clone(&store) as Arc<dyn ResourceStore<CloudPubSubSource>>,
            ConvergencePlan::new(),
            Arc::new(Silent),
            Arc::new(Silent),
        ));
        let controller = SourceController::new(
            reconciler,
            ErrorPolicy::new("CloudPubSubSource", Duration::from_secs(1), Duration::from_secs(5)),
        )
        .with_workers(2);
        let queue = Arc::clone(controller.queue());

        tokio::time::timeout(
            Duration::from_secs(5),
            controller.run(store, tokio::time::sleep(Duration::from_millis(50))),
        )
        .await
        .expect("controller did not stop");

        assert!(queue.is_shutting_down());
    }
}
