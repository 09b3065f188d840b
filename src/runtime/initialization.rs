//! # Initialization
//!
//! Controller startup: rustls, tracing, metrics, the HTTP server, the
//! Kubernetes client and the CloudPubSubSource controller wiring.

use crate::config::{ControllerConfig, ServerConfig};
use crate::constants::CONTROLLER_NAME;
use crate::controller::events::KubeEventRecorder;
use crate::controller::reconciler::Reconciler;
use crate::controller::server::{start_server, ServerState};
use crate::controller::store::{Lister, ResourceStore, WatchFilter};
use crate::crd::{CloudPubSubSource, PullSubscription};
use crate::observability;
use crate::observability::metrics::PrometheusMetricsSink;
use crate::provider::kube::{cloud_pubsub_source_plan, KubeStore};
use crate::runtime::error_policy::ErrorPolicy;
use crate::runtime::watch_loop::SourceController;
use anyhow::{Context, Result};
use kube::api::{Api, ListParams};
use kube::{Client, ResourceExt};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// Everything `main` needs to run the controller
pub struct InitializationResult {
    pub client: Client,
    pub controller: SourceController<CloudPubSubSource>,
    /// Store the controller's source watch reads from
    pub sources: Arc<KubeStore<CloudPubSubSource>>,
    pub server_state: Arc<ServerState>,
}

impl std::fmt::Debug for InitializationResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InitializationResult")
            .field("controller", &self.controller)
            .field("sources", &self.sources)
            .field("server_state", &self.server_state)
            .finish_non_exhaustive()
    }
}

/// Initialize the controller runtime
///
/// Installs the rustls crypto provider, sets up tracing and metrics, starts
/// the HTTP server and waits for it to bind, then builds the reconciler for
/// CloudPubSubSource from the environment's configuration.
pub async fn initialize() -> Result<InitializationResult> {
    // Must happen before any TLS connection is made
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|existing| {
            anyhow::anyhow!(
                "Failed to install rustls crypto provider, one is already installed: {:?}",
                existing
            )
        })?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pubsub_source_controller=info".into()),
        )
        .init();

    info!(
        "Starting Pub/Sub Source Controller v{}",
        env!("CARGO_PKG_VERSION")
    );

    let (controller_config, server_config) = crate::config::load_config();
    info!("Controller configuration: {:?}", controller_config);

    observability::metrics::register_metrics()?;

    let server_state = Arc::new(ServerState::default());
    let server_handle = {
        let state = Arc::clone(&server_state);
        let port = server_config.metrics_port;
        tokio::spawn(async move {
            if let Err(e) = start_server(port, state).await {
                error!("HTTP server error: {}", e);
            }
        })
    };
    wait_for_server_ready(&server_state, &server_handle, &server_config).await?;

    let client = Client::try_default()
        .await
        .context("Failed to create Kubernetes client")?;

    check_crd_queryable(&client, controller_config.watch_namespace.as_deref()).await;

    let (controller, sources) = build_controller(&client, &controller_config);

    info!("Controller initialized, starting watch loop...");
    Ok(InitializationResult {
        client,
        controller,
        sources,
        server_state,
    })
}

/// Wire the CloudPubSubSource reconciler and its watches
fn build_controller(
    client: &Client,
    config: &ControllerConfig,
) -> (SourceController<CloudPubSubSource>, Arc<KubeStore<CloudPubSubSource>>) {
    let namespace = config.watch_namespace.clone();
    let sources = Arc::new(KubeStore::<CloudPubSubSource>::new(
        client.clone(),
        namespace.clone(),
    ));
    let subscriptions = Arc::new(KubeStore::<PullSubscription>::new(client.clone(), namespace));

    let reconciler = Reconciler::new(
        Arc::clone(&sources) as Arc<dyn Lister<CloudPubSubSource>>,
        Arc::clone(&sources) as Arc<dyn ResourceStore<CloudPubSubSource>>,
        cloud_pubsub_source_plan(client),
        Arc::new(KubeEventRecorder::new(client.clone(), CONTROLLER_NAME)),
        Arc::new(PrometheusMetricsSink),
    )
    .with_status_retry(
        config.status_update_max_attempts,
        config.status_update_retry_delay(),
    );

    let policy = ErrorPolicy::new(
        "CloudPubSubSource",
        config.error_backoff_min(),
        config.error_backoff_max(),
    );

    let mut controller = SourceController::new(Arc::new(reconciler), policy)
        .with_workers(config.worker_count)
        .with_resync_period(config.resync_period())
        .with_filter(WatchFilter {
            label_selector: config.watch_label_selector.clone(),
        });
    controller.watch_dependents(subscriptions as Arc<dyn ResourceStore<PullSubscription>>);

    (controller, sources)
}

/// Wait for the HTTP server to become ready
async fn wait_for_server_ready(
    server_state: &Arc<ServerState>,
    server_handle: &tokio::task::JoinHandle<()>,
    config: &ServerConfig,
) -> Result<()> {
    let startup_timeout = Duration::from_secs(config.startup_timeout_secs);
    let poll_interval = Duration::from_millis(config.poll_interval_ms);
    let start_time = Instant::now();

    loop {
        if server_handle.is_finished() {
            return Err(anyhow::anyhow!("HTTP server failed to start"));
        }

        if server_state.is_ready() {
            info!("HTTP server is ready and accepting connections");
            return Ok(());
        }

        if start_time.elapsed() > startup_timeout {
            return Err(anyhow::anyhow!(
                "HTTP server failed to become ready within {} seconds",
                startup_timeout.as_secs()
            ));
        }

        tokio::time::sleep(poll_interval).await;
    }
}

/// Log what is already in the cluster, or warn when the CRD is missing
///
/// The controller keeps starting either way; the watch retries until the CRD
/// appears.
async fn check_crd_queryable(client: &Client, namespace: Option<&str>) {
    let api: Api<CloudPubSubSource> = match namespace {
        Some(ns) => Api::namespaced(client.clone(), ns),
        None => Api::all(client.clone()),
    };

    match api.list(&ListParams::default()).await {
        Ok(list) => {
            let mut by_namespace: BTreeMap<String, Vec<String>> = BTreeMap::new();
            for item in &list.items {
                by_namespace
                    .entry(item.namespace().unwrap_or_default())
                    .or_default()
                    .push(item.name_any());
            }

            info!(
                "CRD is queryable, found {} existing CloudPubSubSource resources in {} namespaces",
                list.items.len(),
                by_namespace.len()
            );
            for (namespace, mut names) in by_namespace {
                names.sort();
                let shown = if names.len() <= 3 {
                    names.join(", ")
                } else {
                    format!("{}, ... ({} total)", names[..3].join(", "), names.len())
                };
                info!("  {}: {}", namespace, shown);
            }
        }
        Err(e) => {
            error!("CRD is not queryable; {:?}. Is the CRD installed?", e);
            error!("Installation: cargo run --bin crdgen | kubectl apply -f -");
            warn!("Continuing despite CRD queryability check failure - the watch will retry");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_debug<T: std::fmt::Debug>() {}

    #[test]
    fn test_initialization_result_is_debug() {
        assert_debug::<InitializationResult>();
    }
}
