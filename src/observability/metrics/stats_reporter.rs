//! # Stats Reporter
//!
//! Records how long a source took to become ready after creation.

use crate::observability::metrics::registry::REGISTRY;
use anyhow::Result;
use prometheus::HistogramVec;
use std::sync::LazyLock;
use std::time::Duration;

static SOURCE_READY_LATENCY: LazyLock<HistogramVec> = LazyLock::new(|| {
    HistogramVec::new(
        prometheus::HistogramOpts::new(
            "source_ready_latency_seconds",
            "Time from source creation until it first became ready",
        )
        .buckets(vec![
            1.0, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0, 600.0, 1800.0, 3600.0,
        ]),
        &["kind", "namespace"],
    )
    .expect("Failed to create SOURCE_READY_LATENCY metric - this should never happen")
});

pub(crate) fn register_stats_metrics() -> Result<()> {
    REGISTRY.register(Box::new(SOURCE_READY_LATENCY.clone()))?;
    Ok(())
}

/// Receives readiness reports from the reconciler
///
/// A failing sink is logged by the caller and never fails a reconciliation.
pub trait MetricsSink: Send + Sync {
    fn report_ready(
        &self,
        kind: &str,
        namespace: &str,
        name: &str,
        ready_after: Duration,
    ) -> Result<()>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PrometheusMetricsSink;

impl MetricsSink for PrometheusMetricsSink {
    fn report_ready(
        &self,
        kind: &str,
        namespace: &str,
        name: &str,
        ready_after: Duration,
    ) -> Result<()> {
        let histogram = SOURCE_READY_LATENCY.get_metric_with_label_values(&[kind, namespace])?;
        histogram.observe(ready_after.as_secs_f64());
        tracing::debug!(
            "Reported {} {}/{} ready after {:.3}s",
            kind,
            namespace,
            name,
            ready_after.as_secs_f64()
        );
        Ok(())
    }
}
