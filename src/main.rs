//! # Pub/Sub Source Controller
//!
//! Runs the CloudPubSubSource controller until interrupted.
//!
//! See the library documentation for how sources are reconciled.

use anyhow::Result;
use pubsub_source_controller::controller::store::ResourceStore;
use pubsub_source_controller::runtime::initialize;
use pubsub_source_controller::CloudPubSubSource;
use std::sync::Arc;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let init_result = initialize().await?;
    let server_state = Arc::clone(&init_result.server_state);

    let sources = init_result.sources as Arc<dyn ResourceStore<CloudPubSubSource>>;
    init_result
        .controller
        .run(sources, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for shutdown signal: {}", e);
                return;
            }
            info!("Received shutdown signal");
        })
        .await;

    server_state.set_ready(false);
    info!("Controller stopped");
    Ok(())
}
