//! Prints the CRDs of every source and dependent kind as a YAML stream
//!
//! Usage:
//!   cargo run --bin crdgen | kubectl apply -f -

use anyhow::Result;
use kube::CustomResourceExt;
use pubsub_source_controller::{CloudAuditLog, CloudPubSubSource, PullSubscription, Topic};

fn main() -> Result<()> {
    let crds = [
        CloudPubSubSource::crd(),
        CloudAuditLog::crd(),
        Topic::crd(),
        PullSubscription::crd(),
    ];

    let documents = crds
        .iter()
        .map(serde_yaml::to_string)
        .collect::<Result<Vec<_>, _>>()?;
    println!("{}", documents.join("---\n"));
    Ok(())
}
