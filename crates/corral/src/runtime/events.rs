//! Runtime event definitions and bus.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Runtime event types.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum RuntimeEvent {
    /// Pod created.
    PodCreated {
        id: String,
        name: String,
        timestamp: DateTime<Utc>,
    },
    /// Pod removed.
    PodRemoved { id: String, timestamp: DateTime<Utc> },
    /// Container registered.
    ContainerAdded {
        id: String,
        pod: Option<String>,
        timestamp: DateTime<Utc>,
    },
    /// Container stopped by the runtime.
    ContainerStopped { id: String, timestamp: DateTime<Utc> },
    /// Container removed.
    ContainerRemoved {
        id: String,
        pod: Option<String>,
        timestamp: DateTime<Utc>,
    },
}

impl RuntimeEvent {
    /// ID of the pod or container the event is about.
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::PodCreated { id, .. }
            | Self::PodRemoved { id, .. }
            | Self::ContainerAdded { id, .. }
            | Self::ContainerStopped { id, .. }
            | Self::ContainerRemoved { id, .. } => id,
        }
    }
}

/// Event bus for runtime events.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<RuntimeEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        let (sender, _) = broadcast::channel(1024);
        Self { sender }
    }
}

impl EventBus {
    /// Create a new event bus.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<RuntimeEvent> {
        self.sender.subscribe()
    }

    /// Publish an event.
    pub fn publish(&self, event: RuntimeEvent) {
        // Ignore SendError (no subscribers)
        let _ = self.sender.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publish_without_subscribers() {
        EventBus::new().publish(RuntimeEvent::PodRemoved {
            id: "pod1".to_string(),
            timestamp: Utc::now(),
        });
    }

    #[test]
    fn subscribers_receive_events() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();

        bus.publish(RuntimeEvent::ContainerStopped {
            id: "ctr1".to_string(),
            timestamp: Utc::now(),
        });

        let event = rx.try_recv().unwrap();
        assert_eq!(event.id(), "ctr1");
        assert!(matches!(event, RuntimeEvent::ContainerStopped { .. }));
    }

    #[test]
    fn events_serialize_with_type_tag() {
        let json = serde_json::to_string(&RuntimeEvent::PodCreated {
            id: "pod1".to_string(),
            name: "web".to_string(),
            timestamp: Utc::now(),
        })
        .unwrap();
        assert!(json.contains("\"type\":\"podCreated\""));
    }
}
