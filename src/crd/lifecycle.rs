//! # Status Lifecycle
//!
//! Named transitions on the status of each source kind.

use crate::crd::source::SourceStatus;
use crate::crd::status::{CloudAuditLogStatus, CloudPubSubSourceStatus, Condition};
use crate::crd::{CloudAuditLogCondition, CloudPubSubSourceCondition};

impl CloudPubSubSourceStatus {
    pub fn initialize_conditions(&mut self) {
        self.manage().initialize_conditions();
    }

    pub fn get_condition(&self, condition_type: CloudPubSubSourceCondition) -> Option<&Condition> {
        Self::condition_set().get(self.conditions(), condition_type)
    }

    pub fn is_ready(&self) -> bool {
        SourceStatus::is_ready(self)
    }

    pub fn mark_pull_subscription_ready(&mut self) {
        self.manage()
            .mark_true(CloudPubSubSourceCondition::PullSubscriptionReady);
    }

    pub fn mark_pull_subscription_not_ready(
        &mut self,
        reason: impl Into<String>,
        message: impl Into<String>,
    ) {
        self.manage().mark_false(
            CloudPubSubSourceCondition::PullSubscriptionReady,
            reason,
            message,
        );
    }
}

impl CloudAuditLogStatus {
    pub fn initialize_conditions(&mut self) {
        self.manage().initialize_conditions();
    }

    pub fn get_condition(&self, condition_type: CloudAuditLogCondition) -> Option<&Condition> {
        Self::condition_set().get(self.conditions(), condition_type)
    }

    pub fn is_ready(&self) -> bool {
        SourceStatus::is_ready(self)
    }

    pub fn mark_topic_ready(&mut self) {
        self.manage().mark_true(CloudAuditLogCondition::TopicReady);
    }

    pub fn mark_topic_not_ready(&mut self, reason: impl Into<String>, message: impl Into<String>) {
        self.manage()
            .mark_false(CloudAuditLogCondition::TopicReady, reason, message);
    }

    pub fn mark_pull_subscription_ready(&mut self) {
        self.manage()
            .mark_true(CloudAuditLogCondition::PullSubscriptionReady);
    }

    pub fn mark_pull_subscription_not_ready(
        &mut self,
        reason: impl Into<String>,
        message: impl Into<String>,
    ) {
        self.manage().mark_false(
            CloudAuditLogCondition::PullSubscriptionReady,
            reason,
            message,
        );
    }

    pub fn mark_sink_ready(&mut self) {
        self.manage().mark_true(CloudAuditLogCondition::SinkReady);
    }

    pub fn mark_sink_not_ready(&mut self, reason: impl Into<String>, message: impl Into<String>) {
        self.manage()
            .mark_false(CloudAuditLogCondition::SinkReady, reason, message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::status::ConditionStatus;

    #[test]
    fn test_pubsub_source_ready_follows_subscription() {
        let mut status = CloudPubSubSourceStatus::default();
        status.initialize_conditions();
        assert!(!status.is_ready());

        status.mark_pull_subscription_ready();
        assert!(status.is_ready());
        assert_eq!(
            status
                .get_condition(CloudPubSubSourceCondition::Ready)
                .map(|c| c.status),
            Some(ConditionStatus::True)
        );

        status.mark_pull_subscription_not_ready("PullSubscriptionNotReady", "waiting");
        assert!(!status.is_ready());
        let ready = status
            .get_condition(CloudPubSubSourceCondition::Ready)
            .unwrap();
        assert!(ready.is_false());
        assert_eq!(ready.reason.as_deref(), Some("PullSubscriptionNotReady"));
        assert_eq!(ready.message.as_deref(), Some("waiting"));
    }

    #[test]
    fn test_audit_log_ready_needs_topic_subscription_and_sink() {
        let mut status = CloudAuditLogStatus::default();
        status.initialize_conditions();

        status.mark_topic_ready();
        status.mark_pull_subscription_ready();
        assert!(!status.is_ready());

        status.mark_sink_ready();
        assert!(status.is_ready());

        status.mark_topic_not_ready("TopicDeleted", "topic is gone");
        assert!(!status.is_ready());
        assert_eq!(
            status
                .get_condition(CloudAuditLogCondition::Ready)
                .and_then(|c| c.reason.as_deref()),
            Some("TopicDeleted")
        );
    }

    #[test]
    fn test_sink_not_ready_sets_reason_on_sink_condition() {
        let mut status = CloudAuditLogStatus::default();
        status.initialize_conditions();
        status.mark_sink_not_ready("SinkCreateFailed", "permission denied");

        let sink = status
            .get_condition(CloudAuditLogCondition::SinkReady)
            .unwrap();
        assert!(sink.is_false());
        assert_eq!(sink.message.as_deref(), Some("permission denied"));
        assert!(status
            .get_condition(CloudAuditLogCondition::TopicReady)
            .unwrap()
            .is_unknown());
    }
}
