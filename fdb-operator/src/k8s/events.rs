//! K8s event publication.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ObjectReference;
use kube::client::Client;
use kube::runtime::events::{Event, EventType as KubeEventType, Recorder, Reporter};

/// The severity of an event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventType {
    Normal,
    Warning,
}

/// An event describing something the operator did, or failed to do, to an object.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OperatorEvent {
    pub event_type: EventType,
    /// A short machine readable reason, in UpperCamelCase.
    pub reason: &'static str,
    /// The action which was taken, or attempted.
    pub action: &'static str,
    /// A human readable description of the event.
    pub note: String,
}

impl OperatorEvent {
    /// Create a new `Normal` event.
    pub fn normal(reason: &'static str, action: &'static str, note: impl Into<String>) -> Self {
        Self {
            event_type: EventType::Normal,
            reason,
            action,
            note: note.into(),
        }
    }

    /// Create a new `Warning` event.
    pub fn warning(reason: &'static str, action: &'static str, note: impl Into<String>) -> Self {
        Self {
            event_type: EventType::Warning,
            reason,
            action,
            note: note.into(),
        }
    }
}

/// A sink for events about reconciled objects.
#[async_trait]
pub trait EventRecorder: Send + Sync {
    /// Publish an event regarding the referenced object.
    async fn publish(&self, reference: &ObjectReference, event: OperatorEvent) -> anyhow::Result<()>;
}

/// An event recorder which publishes events to the K8s API.
pub struct KubeEventRecorder {
    recorder: Recorder,
}

impl KubeEventRecorder {
    /// Create a new instance reporting events as the given controller & instance.
    pub fn new(client: Client, controller: &str, instance: &str) -> Self {
        let reporter = Reporter {
            controller: controller.into(),
            instance: Some(instance.into()),
        };
        Self {
            recorder: Recorder::new(client, reporter),
        }
    }
}

#[async_trait]
impl EventRecorder for KubeEventRecorder {
    async fn publish(&self, reference: &ObjectReference, event: OperatorEvent) -> anyhow::Result<()> {
        let event = Event {
            type_: match event.event_type {
                EventType::Normal => KubeEventType::Normal,
                EventType::Warning => KubeEventType::Warning,
            },
            reason: event.reason.into(),
            note: Some(event.note),
            action: event.action.into(),
            secondary: None,
        };
        self.recorder.publish(&event, reference).await?;
        Ok(())
    }
}
