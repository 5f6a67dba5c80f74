//! Event recording.
//!
//! Reconcilers report outcomes against the desired object. Recording never
//! fails and never blocks the caller; the Kubernetes recorder posts events
//! from a spawned task.

use std::sync::{Mutex, PoisonError};

use chrono::Utc;
use k8s_openapi::api::core::v1::{Event, EventSource, ObjectReference};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, Time};
use kube::api::{Api, PostParams};
use kube::Client;
use tracing::{info, warn};

pub const REASON_SYNCED: &str = "Synced";
pub const REASON_SYNC_FAILED: &str = "SyncFailed";
pub const REASON_SCALE_FAILED: &str = "ScaleFailed";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    Normal,
    Warning,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Normal => "Normal",
            EventType::Warning => "Warning",
        }
    }
}

/// Sink for human-readable outcomes.
pub trait EventRecorder: Send + Sync {
    fn record(&self, target: &ObjectReference, event_type: EventType, reason: &str, message: &str);

    fn normal(&self, target: &ObjectReference, reason: &str, message: &str) {
        self.record(target, EventType::Normal, reason, message);
    }

    fn warning(&self, target: &ObjectReference, reason: &str, message: &str) {
        self.record(target, EventType::Warning, reason, message);
    }
}

fn describe(target: &ObjectReference) -> String {
    format!(
        "{} {}/{}",
        target.kind.as_deref().unwrap_or_default(),
        target.namespace.as_deref().unwrap_or_default(),
        target.name.as_deref().unwrap_or_default()
    )
}

/// Posts `core/v1` Events to the API server.
pub struct KubeRecorder {
    client: Client,
    component: String,
}

impl KubeRecorder {
    pub fn new(client: Client, component: impl Into<String>) -> Self {
        Self {
            client,
            component: component.into(),
        }
    }

    fn event(&self, target: &ObjectReference, event_type: EventType, reason: &str, message: &str) -> Event {
        let now = Time(Utc::now());
        Event {
            metadata: ObjectMeta {
                generate_name: Some(format!("{}.", target.name.as_deref().unwrap_or("unknown"))),
                namespace: target.namespace.clone(),
                ..Default::default()
            },
            involved_object: target.clone(),
            type_: Some(event_type.as_str().to_string()),
            reason: Some(reason.to_string()),
            message: Some(message.to_string()),
            count: Some(1),
            first_timestamp: Some(now.clone()),
            last_timestamp: Some(now),
            source: Some(EventSource {
                component: Some(self.component.clone()),
                host: None,
            }),
            reporting_component: Some(self.component.clone()),
            ..Default::default()
        }
    }
}

impl EventRecorder for KubeRecorder {
    fn record(&self, target: &ObjectReference, event_type: EventType, reason: &str, message: &str) {
        let event = self.event(target, event_type, reason, message);
        let namespace = target.namespace.clone().unwrap_or_else(|| "default".to_string());
        let api: Api<Event> = Api::namespaced(self.client.clone(), &namespace);
        let what = describe(target);
        tokio::spawn(async move {
            if let Err(e) = api.create(&PostParams::default(), &event).await {
                warn!("Failed to record event for {}: {}", what, e);
            }
        });
    }
}

/// Writes events to the log only.
#[derive(Debug, Default)]
pub struct TracingRecorder;

impl EventRecorder for TracingRecorder {
    fn record(&self, target: &ObjectReference, event_type: EventType, reason: &str, message: &str) {
        let what = describe(target);
        match event_type {
            EventType::Normal => info!(reason, "{}: {}", what, message),
            EventType::Warning => warn!(reason, "{}: {}", what, message),
        }
    }
}

/// A recorded event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedEvent {
    pub name: String,
    pub event_type: EventType,
    pub reason: String,
    pub message: String,
}

/// Keeps events in memory.
#[derive(Debug, Default)]
pub struct MemoryRecorder {
    events: Mutex<Vec<RecordedEvent>>,
}

impl MemoryRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<RecordedEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn reasons(&self) -> Vec<String> {
        self.events().into_iter().map(|e| e.reason).collect()
    }
}

impl EventRecorder for MemoryRecorder {
    fn record(&self, target: &ObjectReference, event_type: EventType, reason: &str, message: &str) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(RecordedEvent {
                name: target.name.clone().unwrap_or_default(),
                event_type,
                reason: reason.to_string(),
                message: message.to_string(),
            });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target() -> ObjectReference {
        ObjectReference {
            kind: Some("SpannerInstance".into()),
            namespace: Some("default".into()),
            name: Some("prod-1".into()),
            ..Default::default()
        }
    }

    #[test]
    fn test_memory_recorder() {
        let recorder = MemoryRecorder::new();
        recorder.normal(&target(), REASON_SYNCED, "ok");
        recorder.warning(&target(), REASON_SYNC_FAILED, "boom");

        let events = recorder.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_type, EventType::Normal);
        assert_eq!(events[1].event_type, EventType::Warning);
        assert_eq!(events[1].name, "prod-1");
        assert_eq!(recorder.reasons(), vec!["Synced", "SyncFailed"]);
    }

    #[test]
    fn test_describe() {
        assert_eq!(describe(&target()), "SpannerInstance default/prod-1");
    }
}
