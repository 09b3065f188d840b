//! # Event Recording
//!
//! Kubernetes Events emitted on sources, visible through `kubectl describe`.
//!
//! Recording is fire-and-forget: a failed publish is logged and never reaches
//! the reconciler.

use kube_runtime::events::{Event, EventType, Recorder, Reporter};
use kube::{Client, Resource};
use std::fmt::Debug;
use tracing::warn;

/// Event reasons emitted by the reconciler
pub mod reasons {
    /// Status could not be written
    pub const UPDATE_FAILED: &str = "UpdateFailed";
    /// Status was written after a successful pass
    pub const UPDATED: &str = "Updated";
    /// The source became ready
    pub const READINESS_CHANGED: &str = "ReadinessChanged";
    /// Validation or convergence failed
    pub const INTERNAL_ERROR: &str = "InternalError";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventSeverity {
    Normal,
    Warning,
}

impl EventSeverity {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Normal => "Normal",
            Self::Warning => "Warning",
        }
    }
}

impl From<EventSeverity> for EventType {
    fn from(severity: EventSeverity) -> Self {
        match severity {
            EventSeverity::Normal => EventType::Normal,
            EventSeverity::Warning => EventType::Warning,
        }
    }
}

/// Emits events about objects of kind `K`
pub trait EventRecorder<K>: Send + Sync {
    fn event(&self, obj: &K, severity: EventSeverity, reason: &str, message: &str);
}

/// Publishes events through the kube-runtime recorder on a spawned task
#[derive(Clone)]
pub struct KubeEventRecorder {
    recorder: Recorder,
}

impl Debug for KubeEventRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeEventRecorder").finish_non_exhaustive()
    }
}

impl KubeEventRecorder {
    pub fn new(client: Client, controller_name: &str) -> Self {
        let reporter = Reporter {
            controller: controller_name.to_string(),
            instance: std::env::var("POD_NAME").ok(),
        };
        Self {
            recorder: Recorder::new(client, reporter),
        }
    }
}

impl<K> EventRecorder<K> for KubeEventRecorder
where
    K: Resource<DynamicType = ()>,
{
    fn event(&self, obj: &K, severity: EventSeverity, reason: &str, message: &str) {
        let reference = obj.object_ref(&());
        let event = Event {
            type_: severity.into(),
            reason: reason.to_string(),
            note: Some(message.to_string()),
            action: "Reconcile".to_string(),
            secondary: None,
        };
        let recorder = self.recorder.clone();

        tokio::spawn(async move {
            if let Err(e) = recorder.publish(&event, &reference).await {
                warn!(
                    reason = %event.reason,
                    error = %e,
                    "Failed to publish Kubernetes event"
                );
            }
        });
    }
}
