//! Daemon event system.
//!
//! Events are published when something observable happens — an agent run
//! starts or finishes, a tool executes, feedback arrives. The webhook
//! dispatcher consumes the bus and fans matching events out to subscribers;
//! producers never wait on delivery.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

/// The kinds of events the daemon emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    #[serde(rename = "agent.started")]
    AgentStarted,
    #[serde(rename = "agent.completed")]
    AgentCompleted,
    #[serde(rename = "agent.failed")]
    AgentFailed,
    #[serde(rename = "tool.executed")]
    ToolExecuted,
    #[serde(rename = "session.created")]
    SessionCreated,
    #[serde(rename = "feedback.received")]
    FeedbackReceived,
}

impl EventKind {
    /// The dotted wire name (e.g., `agent.completed`).
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::AgentStarted => "agent.started",
            EventKind::AgentCompleted => "agent.completed",
            EventKind::AgentFailed => "agent.failed",
            EventKind::ToolExecuted => "tool.executed",
            EventKind::SessionCreated => "session.created",
            EventKind::FeedbackReceived => "feedback.received",
        }
    }
}

/// An emitted event with its payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentEvent {
    /// What happened
    pub kind: EventKind,

    /// Event-specific payload
    pub data: serde_json::Value,

    /// When it happened
    pub timestamp: DateTime<Utc>,
}

impl AgentEvent {
    pub fn new(kind: EventKind, data: serde_json::Value) -> Self {
        Self {
            kind,
            data,
            timestamp: Utc::now(),
        }
    }
}

/// A broadcast-based event bus.
///
/// Components subscribe to receive all events and filter for what they care
/// about. Publishing with no subscribers is fine.
pub struct EventBus {
    sender: broadcast::Sender<Arc<AgentEvent>>,
}

impl EventBus {
    /// Create a new event bus with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, kind: EventKind, data: serde_json::Value) {
        let _ = self.sender.send(Arc::new(AgentEvent::new(kind, data)));
    }

    /// Subscribe to receive events.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<AgentEvent>> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_subscribe() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        bus.publish(
            EventKind::ToolExecuted,
            serde_json::json!({ "tool": "add", "success": true }),
        );

        let event = rx.recv().await.unwrap();
        assert_eq!(event.kind, EventKind::ToolExecuted);
        assert_eq!(event.data["tool"], "add");
    }

    #[test]
    fn publish_without_subscribers_is_fine() {
        let bus = EventBus::default();
        bus.publish(EventKind::AgentStarted, serde_json::json!({}));
    }

    #[test]
    fn kind_wire_names() {
        assert_eq!(EventKind::AgentCompleted.as_str(), "agent.completed");
        assert_eq!(EventKind::FeedbackReceived.as_str(), "feedback.received");

        let json = serde_json::to_string(&EventKind::SessionCreated).unwrap();
        assert_eq!(json, "\"session.created\"");
        let parsed: EventKind = serde_json::from_str("\"tool.executed\"").unwrap();
        assert_eq!(parsed, EventKind::ToolExecuted);
    }
}
