//! # Custom Resource Definitions
//!
//! CRD types for the Pub/Sub Source Controller.
//!
//! Two source kinds are reconciled:
//!
//! - `CloudPubSubSource` reads from an existing topic through an owned
//!   `PullSubscription`
//! - `CloudAuditLog` owns a `Topic`, a `PullSubscription` reading from it and an
//!   audit log sink publishing into it
//!
//! `Topic` and `PullSubscription` are the in-cluster dependents. Their own
//! controllers talk to Pub/Sub; this controller only creates them, keeps their
//! spec in line with the source and propagates their readiness.

pub mod conditions;
pub mod lifecycle;
pub mod source;
pub mod status;

pub use conditions::{ConditionManager, ConditionSet, ConditionType};
pub use source::{ConditionOf, DependentOutput, EventSource, SourceStatus, ValidationError};
pub use status::{
    CloudAuditLogStatus, CloudPubSubSourceStatus, Condition, ConditionStatus, PubSubStatus,
    PullSubscriptionStatus, TopicStatus,
};

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// API group of the source kinds
pub const EVENTS_GROUP: &str = "events.cloud.google.com";

/// API group of the dependent kinds
pub const PUBSUB_GROUP: &str = "pubsub.cloud.google.com";

/// Where a source delivers its events
///
/// Either an object reference resolved by the PullSubscription controller, an
/// absolute URI, or both (the URI is then resolved relative to the reference).
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Destination {
    /// Reference to an addressable object
    #[serde(default, rename = "ref")]
    pub reference: Option<KReference>,
    /// Absolute URI, or a path relative to `ref`
    #[serde(default)]
    pub uri: Option<String>,
}

/// Reference to another Kubernetes object
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct KReference {
    pub api_version: String,
    pub kind: String,
    pub name: String,
    #[serde(default)]
    pub namespace: Option<String>,
}

/// Key of a Kubernetes Secret holding GCP credentials
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SecretKeyRef {
    pub name: String,
    pub key: String,
}

/// CloudEvent attributes added to every event the source emits
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CloudEventOverrides {
    #[serde(default)]
    pub extensions: BTreeMap<String, String>,
}

/// Spec fields shared by every Pub/Sub backed source
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PubSubSpec {
    /// Where to deliver events
    pub sink: Destination,
    /// GCP project; defaults to the project of the cluster's credentials
    #[serde(default)]
    pub project: Option<String>,
    /// Credentials used to talk to Pub/Sub
    #[serde(default)]
    pub secret: Option<SecretKeyRef>,
    /// CloudEvent overrides applied by the receive adapter
    #[serde(default)]
    pub ce_overrides: Option<CloudEventOverrides>,
}

/// CloudPubSubSource Custom Resource Definition
///
/// Delivers messages published to an existing Pub/Sub topic to a sink.
///
/// # Example
///
/// ```yaml
/// apiVersion: events.cloud.google.com/v1alpha1
/// kind: CloudPubSubSource
/// metadata:
///   name: orders
///   namespace: default
/// spec:
///   topic: orders
///   sink:
///     ref:
///       apiVersion: serving.knative.dev/v1
///       kind: Service
///       name: order-processor
/// ```
#[derive(CustomResource, Debug, Clone, PartialEq, Deserialize, Serialize, JsonSchema)]
#[kube(
    kind = "CloudPubSubSource",
    group = "events.cloud.google.com",
    version = "v1alpha1",
    namespaced,
    status = "CloudPubSubSourceStatus",
    derive = "PartialEq",
    shortname = "cpss",
    printcolumn = r#"{"name":"Ready", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Ready\")].status"}, {"name":"Reason", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Ready\")].reason"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct CloudPubSubSourceSpec {
    #[serde(flatten)]
    pub pubsub: PubSubSpec,
    /// Pub/Sub topic ID to subscribe to
    pub topic: String,
    /// How long Pub/Sub waits for an acknowledgement (e.g. "30s")
    #[serde(default)]
    pub ack_deadline: Option<String>,
    /// Keep acknowledged messages in the subscription's backlog
    #[serde(default)]
    pub retain_acked_messages: bool,
    /// How long unacknowledged messages are retained (e.g. "7d")
    #[serde(default)]
    pub retention_duration: Option<String>,
}

/// CloudAuditLog Custom Resource Definition
///
/// Delivers Cloud Audit Log entries matching a service and method to a sink.
///
/// # Example
///
/// ```yaml
/// apiVersion: events.cloud.google.com/v1alpha1
/// kind: CloudAuditLog
/// metadata:
///   name: bucket-audit
///   namespace: default
/// spec:
///   serviceName: storage.googleapis.com
///   methodName: storage.buckets.create
///   sink:
///     uri: http://audit-receiver.default.svc.cluster.local
/// ```
#[derive(CustomResource, Debug, Clone, PartialEq, Deserialize, Serialize, JsonSchema)]
#[kube(
    kind = "CloudAuditLog",
    group = "events.cloud.google.com",
    version = "v1alpha1",
    namespaced,
    status = "CloudAuditLogStatus",
    derive = "PartialEq",
    shortname = "cal",
    printcolumn = r#"{"name":"Ready", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Ready\")].status"}, {"name":"Reason", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Ready\")].reason"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct CloudAuditLogSpec {
    #[serde(flatten)]
    pub pubsub: PubSubSpec,
    /// The GCP service providing audit logs (e.g. "storage.googleapis.com")
    pub service_name: String,
    /// The name of the service method or operation
    pub method_name: String,
    /// The resource or collection targeted by the operation
    #[serde(default)]
    pub resource_name: Option<String>,
}

/// Topic dependent, owned by a source
#[derive(CustomResource, Debug, Clone, PartialEq, Deserialize, Serialize, JsonSchema)]
#[kube(
    kind = "Topic",
    group = "pubsub.cloud.google.com",
    version = "v1alpha1",
    namespaced,
    status = "TopicStatus",
    derive = "PartialEq"
)]
#[serde(rename_all = "camelCase")]
pub struct TopicSpec {
    #[serde(default)]
    pub project: Option<String>,
    pub topic: String,
    #[serde(default)]
    pub secret: Option<SecretKeyRef>,
    /// CreateDelete, CreateNoDelete or NoCreateNoDelete
    #[serde(default)]
    pub propagation_policy: Option<String>,
}

/// PullSubscription dependent, owned by a source
#[derive(CustomResource, Debug, Clone, PartialEq, Deserialize, Serialize, JsonSchema)]
#[kube(
    kind = "PullSubscription",
    group = "pubsub.cloud.google.com",
    version = "v1alpha1",
    namespaced,
    status = "PullSubscriptionStatus",
    derive = "PartialEq"
)]
#[serde(rename_all = "camelCase")]
pub struct PullSubscriptionSpec {
    #[serde(default)]
    pub project: Option<String>,
    pub topic: String,
    #[serde(default)]
    pub secret: Option<SecretKeyRef>,
    pub sink: Destination,
    #[serde(default)]
    pub ack_deadline: Option<String>,
    #[serde(default)]
    pub retain_acked_messages: bool,
    #[serde(default)]
    pub retention_duration: Option<String>,
    #[serde(default)]
    pub ce_overrides: Option<CloudEventOverrides>,
    /// Event format the receive adapter converts messages into
    #[serde(default)]
    pub adapter_type: Option<String>,
}

/// Condition types of CloudPubSubSource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CloudPubSubSourceCondition {
    Ready,
    PullSubscriptionReady,
}

impl ConditionType for CloudPubSubSourceCondition {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Ready => "Ready",
            Self::PullSubscriptionReady => "PullSubscriptionReady",
        }
    }
}

/// CloudPubSubSource is ready once its PullSubscription is
pub const CLOUD_PUBSUB_SOURCE_CONDITIONS: ConditionSet<CloudPubSubSourceCondition> =
    ConditionSet::new(
        CloudPubSubSourceCondition::Ready,
        &[CloudPubSubSourceCondition::PullSubscriptionReady],
    );

/// Condition types of CloudAuditLog
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CloudAuditLogCondition {
    Ready,
    TopicReady,
    PullSubscriptionReady,
    SinkReady,
}

impl ConditionType for CloudAuditLogCondition {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Ready => "Ready",
            Self::TopicReady => "TopicReady",
            Self::PullSubscriptionReady => "PullSubscriptionReady",
            Self::SinkReady => "SinkReady",
        }
    }
}

/// CloudAuditLog is ready once its topic, subscription and sink all are
pub const CLOUD_AUDIT_LOG_CONDITIONS: ConditionSet<CloudAuditLogCondition> = ConditionSet::new(
    CloudAuditLogCondition::Ready,
    &[
        CloudAuditLogCondition::TopicReady,
        CloudAuditLogCondition::PullSubscriptionReady,
        CloudAuditLogCondition::SinkReady,
    ],
);

#[cfg(test)]
mod tests {
    use super::*;
    use kube::CustomResourceExt;

    #[test]
    fn test_crd_names() {
        assert_eq!(
            CloudPubSubSource::crd().metadata.name.as_deref(),
            Some("cloudpubsubsources.events.cloud.google.com")
        );
        assert_eq!(
            CloudAuditLog::crd().metadata.name.as_deref(),
            Some("cloudauditlogs.events.cloud.google.com")
        );
        assert_eq!(
            PullSubscription::crd().metadata.name.as_deref(),
            Some("pullsubscriptions.pubsub.cloud.google.com")
        );
    }

    #[test]
    fn test_source_spec_deserializes_flattened_pubsub_fields() {
        let spec: CloudPubSubSourceSpec = serde_json::from_value(serde_json::json!({
            "topic": "orders",
            "project": "my-project",
            "sink": { "uri": "http://sink.default.svc.cluster.local" },
            "retainAckedMessages": true
        }))
        .unwrap();

        assert_eq!(spec.topic, "orders");
        assert_eq!(spec.pubsub.project.as_deref(), Some("my-project"));
        assert_eq!(
            spec.pubsub.sink.uri.as_deref(),
            Some("http://sink.default.svc.cluster.local")
        );
        assert!(spec.retain_acked_messages);
    }

    #[test]
    fn test_audit_log_status_round_trips_sink_id() {
        let status = CloudAuditLogStatus {
            sink_id: Some("sink-123".to_string()),
            ..Default::default()
        };
        let value = serde_json::to_value(&status).unwrap();
        assert_eq!(value["sinkId"], "sink-123");
        assert!(value.get("conditions").is_some());
    }
}
