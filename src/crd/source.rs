//! # Event Sources
//!
//! The generic view of a source kind the reconciler works against.

use crate::crd::conditions::{ConditionManager, ConditionSet, ConditionType};
use crate::crd::status::{CloudAuditLogStatus, CloudPubSubSourceStatus, Condition, PubSubStatus};
use crate::crd::{
    CloudAuditLog, CloudAuditLogCondition, CloudPubSubSource, CloudPubSubSourceCondition,
    PubSubSpec, PullSubscriptionSpec, TopicSpec, CLOUD_AUDIT_LOG_CONDITIONS,
    CLOUD_PUBSUB_SOURCE_CONDITIONS,
};
use crate::controller::reconciler::validation;
use kube::{Resource, ResourceExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Debug;

/// Adapter type the receive adapter uses for plain Pub/Sub messages
pub const ADAPTER_TYPE_PUBSUB: &str = "google.pubsub";

/// Adapter type the receive adapter uses for audit log entries
pub const ADAPTER_TYPE_AUDIT_LOG: &str = "google.auditlog";

/// What a converged dependent reports back into the source's status
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependentOutput {
    pub project_id: Option<String>,
    /// Topic, subscription or sink identifier, depending on the dependent
    pub id: Option<String>,
    /// Resolved sink URI (subscriptions only)
    pub uri: Option<String>,
}

/// A spec that cannot be made valid by retrying
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError<C> {
    /// Condition marked `False` because of the failure
    pub condition: C,
    pub message: String,
}

impl<C> ValidationError<C> {
    pub fn new(condition: C, message: impl Into<String>) -> Self {
        Self {
            condition,
            message: message.into(),
        }
    }
}

/// Status of a source kind
pub trait SourceStatus:
    Clone + Debug + Default + PartialEq + Serialize + DeserializeOwned + Send + Sync + 'static
{
    type Condition: ConditionType;

    fn condition_set() -> ConditionSet<Self::Condition>;

    fn pubsub(&self) -> &PubSubStatus;

    fn pubsub_mut(&mut self) -> &mut PubSubStatus;

    /// Copies what a dependent reported into the fields owned by `condition`
    fn record_output(&mut self, condition: Self::Condition, output: &DependentOutput);

    fn conditions(&self) -> &[Condition] {
        &self.pubsub().conditions
    }

    fn manage(&mut self) -> ConditionManager<'_, Self::Condition> {
        Self::condition_set().manage(&mut self.pubsub_mut().conditions)
    }

    fn is_ready(&self) -> bool {
        Self::condition_set().is_happy(self.conditions())
    }
}

/// Condition type of a source kind
pub type ConditionOf<K> = <<K as EventSource>::Status as SourceStatus>::Condition;

/// A Pub/Sub backed source the reconciler can drive
pub trait EventSource:
    Resource<DynamicType = ()> + Clone + Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
    type Status: SourceStatus;

    fn source_status(&self) -> Option<&Self::Status>;

    /// Status, created empty if the object has none yet
    fn source_status_mut(&mut self) -> &mut Self::Status;

    fn set_source_status(&mut self, status: Option<Self::Status>);

    fn pubsub_spec(&self) -> &PubSubSpec;

    /// Pub/Sub topic ID the source reads from
    fn topic_id(&self) -> String;

    fn adapter_type(&self) -> &'static str;

    fn validate(&self) -> Result<(), ValidationError<ConditionOf<Self>>>;

    fn kind_name() -> String {
        Self::kind(&()).into_owned()
    }

    fn is_ready(&self) -> bool {
        self.source_status().is_some_and(SourceStatus::is_ready)
    }

    /// Spec of the Topic this source owns
    fn topic_spec(&self) -> TopicSpec {
        let spec = self.pubsub_spec();
        TopicSpec {
            project: spec.project.clone(),
            topic: self.topic_id(),
            secret: spec.secret.clone(),
            propagation_policy: Some("CreateDelete".to_string()),
        }
    }

    /// Spec of the PullSubscription this source owns
    fn pull_subscription_spec(&self) -> PullSubscriptionSpec {
        let spec = self.pubsub_spec();
        PullSubscriptionSpec {
            project: spec.project.clone(),
            topic: self.topic_id(),
            secret: spec.secret.clone(),
            sink: spec.sink.clone(),
            ack_deadline: None,
            retain_acked_messages: false,
            retention_duration: None,
            ce_overrides: spec.ce_overrides.clone(),
            adapter_type: Some(self.adapter_type().to_string()),
        }
    }
}

impl SourceStatus for CloudPubSubSourceStatus {
    type Condition = CloudPubSubSourceCondition;

    fn condition_set() -> ConditionSet<Self::Condition> {
        CLOUD_PUBSUB_SOURCE_CONDITIONS
    }

    fn pubsub(&self) -> &PubSubStatus {
        &self.pubsub
    }

    fn pubsub_mut(&mut self) -> &mut PubSubStatus {
        &mut self.pubsub
    }

    fn record_output(&mut self, condition: Self::Condition, output: &DependentOutput) {
        if condition == CloudPubSubSourceCondition::PullSubscriptionReady {
            record_subscription(&mut self.pubsub, output);
        }
    }
}

impl SourceStatus for CloudAuditLogStatus {
    type Condition = CloudAuditLogCondition;

    fn condition_set() -> ConditionSet<Self::Condition> {
        CLOUD_AUDIT_LOG_CONDITIONS
    }

    fn pubsub(&self) -> &PubSubStatus {
        &self.pubsub
    }

    fn pubsub_mut(&mut self) -> &mut PubSubStatus {
        &mut self.pubsub
    }

    fn record_output(&mut self, condition: Self::Condition, output: &DependentOutput) {
        match condition {
            CloudAuditLogCondition::TopicReady => {
                if output.project_id.is_some() {
                    self.pubsub.project_id.clone_from(&output.project_id);
                }
                self.pubsub.topic_id.clone_from(&output.id);
            }
            CloudAuditLogCondition::PullSubscriptionReady => {
                record_subscription(&mut self.pubsub, output);
            }
            CloudAuditLogCondition::SinkReady => {
                self.sink_id.clone_from(&output.id);
            }
            CloudAuditLogCondition::Ready => {}
        }
    }
}

fn record_subscription(status: &mut PubSubStatus, output: &DependentOutput) {
    if output.project_id.is_some() {
        status.project_id.clone_from(&output.project_id);
    }
    status.subscription_id.clone_from(&output.id);
    status.sink_uri.clone_from(&output.uri);
}

impl EventSource for CloudPubSubSource {
    type Status = CloudPubSubSourceStatus;

    fn source_status(&self) -> Option<&Self::Status> {
        self.status.as_ref()
    }

    fn source_status_mut(&mut self) -> &mut Self::Status {
        self.status.get_or_insert_with(Default::default)
    }

    fn set_source_status(&mut self, status: Option<Self::Status>) {
        self.status = status;
    }

    fn pubsub_spec(&self) -> &PubSubSpec {
        &self.spec.pubsub
    }

    fn topic_id(&self) -> String {
        self.spec.topic.clone()
    }

    fn adapter_type(&self) -> &'static str {
        ADAPTER_TYPE_PUBSUB
    }

    fn validate(&self) -> Result<(), ValidationError<CloudPubSubSourceCondition>> {
        validation::validate_cloud_pubsub_source(&self.spec)
    }

    fn pull_subscription_spec(&self) -> PullSubscriptionSpec {
        let spec = &self.spec;
        PullSubscriptionSpec {
            project: spec.pubsub.project.clone(),
            topic: spec.topic.clone(),
            secret: spec.pubsub.secret.clone(),
            sink: spec.pubsub.sink.clone(),
            ack_deadline: spec.ack_deadline.clone(),
            retain_acked_messages: spec.retain_acked_messages,
            retention_duration: spec.retention_duration.clone(),
            ce_overrides: spec.pubsub.ce_overrides.clone(),
            adapter_type: Some(ADAPTER_TYPE_PUBSUB.to_string()),
        }
    }
}

impl EventSource for CloudAuditLog {
    type Status = CloudAuditLogStatus;

    fn source_status(&self) -> Option<&Self::Status> {
        self.status.as_ref()
    }

    fn source_status_mut(&mut self) -> &mut Self::Status {
        self.status.get_or_insert_with(Default::default)
    }

    fn set_source_status(&mut self, status: Option<Self::Status>) {
        self.status = status;
    }

    fn pubsub_spec(&self) -> &PubSubSpec {
        &self.spec.pubsub
    }

    /// Audit log sources publish into a topic of their own
    fn topic_id(&self) -> String {
        format!("cal-{}", self.name_any())
    }

    fn adapter_type(&self) -> &'static str {
        ADAPTER_TYPE_AUDIT_LOG
    }

    fn validate(&self) -> Result<(), ValidationError<CloudAuditLogCondition>> {
        validation::validate_cloud_audit_log(&self.spec)
    }
}
