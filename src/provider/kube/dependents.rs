//! # Dependents
//!
//! Convergence actions that keep a source's `Topic` and `PullSubscription` in
//! line with its spec.
//!
//! Each action creates the dependent when it is missing, patches its spec when
//! it drifted, and reports it converged only once the dependent's own
//! controller has marked it `Ready`. Dependents carry the source's name and a
//! controller owner reference, so they are garbage collected with the source.

use crate::constants::FIELD_MANAGER;
use crate::controller::reconciler::{ConvergenceAction, ConvergenceFailure, ConvergencePlan};
use crate::crd::{
    CloudAuditLog, CloudAuditLogCondition, CloudPubSubSource, CloudPubSubSourceCondition,
    Condition, DependentOutput, EventSource, PullSubscription, PullSubscriptionSpec, Topic,
    TopicSpec,
};
use crate::provider::kube::store::StoredResource;
use async_trait::async_trait;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{Api, Patch, PatchParams, PostParams};
use kube::{Client, Resource, ResourceExt};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Label carrying the kind of the source that owns a dependent
pub const SOURCE_KIND_LABEL: &str = "events.cloud.google.com/source-kind";

/// Label carrying the name of the source that owns a dependent
pub const SOURCE_NAME_LABEL: &str = "events.cloud.google.com/source-name";

/// A kind a source owns and converges
trait Dependent: StoredResource {
    type Spec: Clone + PartialEq + Serialize + Send + Sync;

    /// Failure reason while the dependent is not ready
    const NOT_READY_REASON: &'static str;

    fn spec(&self) -> &Self::Spec;

    fn build(metadata: ObjectMeta, spec: Self::Spec) -> Self;

    fn conditions(&self) -> &[Condition];

    fn output(&self) -> DependentOutput;
}

impl Dependent for Topic {
    type Spec = TopicSpec;

    const NOT_READY_REASON: &'static str = "TopicNotReady";

    fn spec(&self) -> &TopicSpec {
        &self.spec
    }

    fn build(metadata: ObjectMeta, spec: TopicSpec) -> Self {
        Self {
            metadata,
            spec,
            status: None,
        }
    }

    fn conditions(&self) -> &[Condition] {
        self.status
            .as_ref()
            .map(|status| status.conditions.as_slice())
            .unwrap_or_default()
    }

    fn output(&self) -> DependentOutput {
        let status = self.status.clone().unwrap_or_default();
        DependentOutput {
            project_id: status.project_id.or_else(|| self.spec.project.clone()),
            id: status.topic_id.or_else(|| Some(self.spec.topic.clone())),
            uri: None,
        }
    }
}

impl Dependent for PullSubscription {
    type Spec = PullSubscriptionSpec;

    const NOT_READY_REASON: &'static str = "PullSubscriptionNotReady";

    fn spec(&self) -> &PullSubscriptionSpec {
        &self.spec
    }

    fn build(metadata: ObjectMeta, spec: PullSubscriptionSpec) -> Self {
        Self {
            metadata,
            spec,
            status: None,
        }
    }

    fn conditions(&self) -> &[Condition] {
        self.status
            .as_ref()
            .map(|status| status.conditions.as_slice())
            .unwrap_or_default()
    }

    fn output(&self) -> DependentOutput {
        let status = self.status.clone().unwrap_or_default();
        DependentOutput {
            project_id: status.project_id.or_else(|| self.spec.project.clone()),
            id: status.subscription_id,
            uri: status.sink_uri,
        }
    }
}

fn failure(reason: &str, message: impl Into<String>) -> ConvergenceFailure {
    ConvergenceFailure::new(reason, message)
}

/// Dependent named after `source`, controlled by it
fn desired_dependent<K, D>(source: &K, spec: D::Spec) -> Result<D, ConvergenceFailure>
where
    K: EventSource,
    D: Dependent,
{
    let owner = source.controller_owner_ref(&()).ok_or_else(|| {
        failure(
            "MissingOwnerIdentity",
            format!(
                "{} {} has no uid yet, cannot own a {}",
                K::kind_name(),
                source.name_any(),
                D::kind(&())
            ),
        )
    })?;

    let labels = BTreeMap::from([
        (SOURCE_KIND_LABEL.to_string(), K::kind_name().to_lowercase()),
        (SOURCE_NAME_LABEL.to_string(), source.name_any()),
    ]);

    let metadata = ObjectMeta {
        name: Some(source.name_any()),
        namespace: source.namespace(),
        labels: Some(labels),
        owner_references: Some(vec![owner]),
        ..Default::default()
    };
    Ok(D::build(metadata, spec))
}

/// Whether `dependent` is controlled by the object with `uid`
fn is_controlled_by<D: Resource>(dependent: &D, uid: &str) -> bool {
    dependent
        .owner_references()
        .iter()
        .any(|owner| owner.controller == Some(true) && owner.uid == uid)
}

/// The dependent's output once its Ready condition is True
fn readiness<D: Dependent>(dependent: &D) -> Result<DependentOutput, ConvergenceFailure> {
    let ready = dependent.conditions().iter().find(|c| c.r#type == "Ready");
    match ready {
        Some(condition) if condition.is_true() => Ok(dependent.output()),
        Some(condition) => Err(failure(
            D::NOT_READY_REASON,
            condition.message.clone().unwrap_or_else(|| {
                format!(
                    "{} {} is {}",
                    D::kind(&()),
                    dependent.name_any(),
                    condition.status
                )
            }),
        )),
        None => Err(failure(
            D::NOT_READY_REASON,
            format!("{} {} has not reported readiness yet", D::kind(&()), dependent.name_any()),
        )),
    }
}

/// Create or update the dependent of `source`, then check its readiness
async fn ensure<K, D>(client: &Client, source: &K, spec: D::Spec) -> Result<DependentOutput, ConvergenceFailure>
where
    K: EventSource,
    D: Dependent,
{
    let kind = D::kind(&());
    let desired: D = desired_dependent(source, spec)?;
    let name = source.name_any();
    let namespace = source.namespace().ok_or_else(|| {
        failure(
            "MissingOwnerIdentity",
            format!("{} {} has no namespace", K::kind_name(), name),
        )
    })?;
    let api: Api<D> = Api::namespaced(client.clone(), &namespace);

    let existing = api.get_opt(&name).await.map_err(|e| {
        failure(
            "DependentReadFailed",
            format!("failed to read {kind} {namespace}/{name}: {e}"),
        )
    })?;

    let current = match existing {
        None => {
            let params = PostParams {
                field_manager: Some(FIELD_MANAGER.to_string()),
                ..Default::default()
            };
            let created = api.create(&params, &desired).await.map_err(|e| {
                failure(
                    "DependentCreateFailed",
                    format!("failed to create {kind} {namespace}/{name}: {e}"),
                )
            })?;
            info!("✅ Created {} {}/{}", kind, namespace, name);
            created
        }
        Some(current) => {
            let uid = source.uid().unwrap_or_default();
            if !is_controlled_by(&current, &uid) {
                return Err(failure(
                    "NotOwned",
                    format!(
                        "{kind} {namespace}/{name} exists and is not controlled by {} {name}",
                        K::kind_name()
                    ),
                ));
            }

            if current.spec() == desired.spec() {
                current
            } else {
                debug!("{} {}/{} drifted, patching spec", kind, namespace, name);
                let params = PatchParams {
                    field_manager: Some(FIELD_MANAGER.to_string()),
                    ..Default::default()
                };
                let patch = serde_json::json!({ "spec": desired.spec() });
                let patched = api
                    .patch(&name, &params, &Patch::Merge(&patch))
                    .await
                    .map_err(|e| {
                        failure(
                            "DependentUpdateFailed",
                            format!("failed to update {kind} {namespace}/{name}: {e}"),
                        )
                    })?;
                info!("Updated {} {}/{}", kind, namespace, name);
                patched
            }
        }
    };

    readiness(&current)
}

/// Converges the Topic a source publishes into
#[derive(Clone)]
pub struct TopicAction {
    client: Client,
}

impl TopicAction {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl<K: EventSource> ConvergenceAction<K> for TopicAction {
    async fn converge(&self, source: &K) -> Result<DependentOutput, ConvergenceFailure> {
        ensure::<K, Topic>(&self.client, source, source.topic_spec()).await
    }
}

/// Converges the PullSubscription a source receives through
#[derive(Clone)]
pub struct PullSubscriptionAction {
    client: Client,
}

impl PullSubscriptionAction {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl<K: EventSource> ConvergenceAction<K> for PullSubscriptionAction {
    async fn converge(&self, source: &K) -> Result<DependentOutput, ConvergenceFailure> {
        ensure::<K, PullSubscription>(&self.client, source, source.pull_subscription_spec()).await
    }
}

/// CloudPubSubSource reads from an existing topic, so only its subscription is converged
pub fn cloud_pubsub_source_plan(
    client: &Client,
) -> ConvergencePlan<CloudPubSubSource, CloudPubSubSourceCondition> {
    ConvergencePlan::new().step(
        CloudPubSubSourceCondition::PullSubscriptionReady,
        Arc::new(PullSubscriptionAction::new(client.clone())),
    )
}

/// CloudAuditLog converges topic, then subscription, then the audit log sink
///
/// The sink lives outside the cluster; `sink` is the action that manages it.
pub fn cloud_audit_log_plan(
    client: &Client,
    sink: Arc<dyn ConvergenceAction<CloudAuditLog>>,
) -> ConvergencePlan<CloudAuditLog, CloudAuditLogCondition> {
    ConvergencePlan::new()
        .step(
            CloudAuditLogCondition::TopicReady,
            Arc::new(TopicAction::new(client.clone())),
        )
        .step_after(
            CloudAuditLogCondition::PullSubscriptionReady,
            &[CloudAuditLogCondition::TopicReady],
            Arc::new(PullSubscriptionAction::new(client.clone())),
        )
        .step_after(
            CloudAuditLogCondition::SinkReady,
            &[CloudAuditLogCondition::TopicReady],
            sink,
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::{
        CloudPubSubSourceSpec, ConditionStatus, Destination, PubSubSpec, PullSubscriptionStatus,
        TopicStatus,
    };

    fn source(uid: Option<&str>) -> CloudPubSubSource {
        let mut source = CloudPubSubSource::new(
            "src1",
            CloudPubSubSourceSpec {
                pubsub: PubSubSpec {
                    sink: Destination {
                        reference: None,
                        uri: Some("http://sink.default.svc".to_string()),
                    },
                    project: Some("my-project".to_string()),
                    ..Default::default()
                },
                topic: "orders".to_string(),
                ack_deadline: Some("30s".to_string()),
                retain_acked_messages: false,
                retention_duration: None,
            },
        );
        source.metadata.namespace = Some("default".to_string());
        source.metadata.uid = uid.map(str::to_string);
        source
    }

    fn ready(status: ConditionStatus, message: Option<&str>) -> Vec<Condition> {
        vec![Condition {
            r#type: "Ready".to_string(),
            status,
            last_transition_time: None,
            reason: None,
            message: message.map(str::to_string),
        }]
    }

    #[test]
    fn test_desired_dependent_is_owned_and_labelled() {
        let source = source(Some("uid-1"));
        let sub: PullSubscription =
            desired_dependent(&source, source.pull_subscription_spec()).unwrap();

        assert_eq!(sub.name_any(), "src1");
        assert_eq!(sub.namespace().as_deref(), Some("default"));
        assert!(is_controlled_by(&sub, "uid-1"));
        assert!(!is_controlled_by(&sub, "uid-2"));
        assert_eq!(
            sub.labels().get(SOURCE_NAME_LABEL).map(String::as_str),
            Some("src1")
        );
        assert_eq!(sub.spec.topic, "orders");
        assert_eq!(sub.spec.ack_deadline.as_deref(), Some("30s"));
        assert_eq!(sub.spec.adapter_type.as_deref(), Some("google.pubsub"));
    }

    #[test]
    fn test_source_without_uid_cannot_own() {
        let source = source(None);
        let err = desired_dependent::<_, Topic>(&source, source.topic_spec()).unwrap_err();
        assert_eq!(err.reason, "MissingOwnerIdentity");
    }

    #[test]
    fn test_ready_subscription_reports_output() {
        let source = source(Some("uid-1"));
        let mut sub: PullSubscription =
            desired_dependent(&source, source.pull_subscription_spec()).unwrap();
        sub.status = Some(PullSubscriptionStatus {
            conditions: ready(ConditionStatus::True, None),
            sink_uri: Some("http://sink.default.svc".to_string()),
            subscription_id: Some("cre-src-src1".to_string()),
            ..Default::default()
        });

        let output = readiness(&sub).unwrap();
        assert_eq!(output.project_id.as_deref(), Some("my-project"));
        assert_eq!(output.id.as_deref(), Some("cre-src-src1"));
        assert_eq!(output.uri.as_deref(), Some("http://sink.default.svc"));
    }

    #[test]
    fn test_unready_dependent_carries_its_message() {
        let source = source(Some("uid-1"));
        let mut topic: Topic = desired_dependent(&source, source.topic_spec()).unwrap();

        let err = readiness(&topic).unwrap_err();
        assert_eq!(err.reason, "TopicNotReady");

        topic.status = Some(TopicStatus {
            conditions: ready(ConditionStatus::False, Some("topic quota exceeded")),
            ..Default::default()
        });
        let err = readiness(&topic).unwrap_err();
        assert_eq!(err.reason, "TopicNotReady");
        assert_eq!(err.message, "topic quota exceeded");
    }
}
