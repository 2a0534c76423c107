//! Agent-level streaming events.
//!
//! `AgentStreamEvent` is what the loop yields to its caller: text deltas as
//! they arrive, tool activity as it happens, and a terminal `done` or
//! `error`. The gateway forwards these over SSE.

use serde::{Deserialize, Serialize};

/// Events emitted by the agent loop during execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentStreamEvent {
    /// Partial text from the LLM.
    Chunk { content: String },

    /// The agent is invoking a tool.
    ToolCall {
        id: String,
        name: String,
        input: serde_json::Value,
    },

    /// Tool execution completed (success or structured failure).
    ToolResult {
        id: String,
        name: String,
        output: String,
        success: bool,
    },

    /// The run is complete.
    Done {
        session_id: String,
        text: String,
        iterations: u32,
    },

    /// A fatal error ended the run (persistence failure).
    Error { message: String },
}

impl AgentStreamEvent {
    /// SSE event name for this event type.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Chunk { .. } => "chunk",
            Self::ToolCall { .. } => "tool_call",
            Self::ToolResult { .. } => "tool_result",
            Self::Done { .. } => "done",
            Self::Error { .. } => "error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_serialization() {
        let event = AgentStreamEvent::Chunk {
            content: "Hello".into(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"chunk""#));
        assert!(json.contains(r#""content":"Hello""#));
    }

    #[test]
    fn done_carries_session_and_iterations() {
        let event = AgentStreamEvent::Done {
            session_id: "s1".into(),
            text: "final".into(),
            iterations: 2,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""iterations":2"#));
        assert_eq!(event.event_type(), "done");
    }

    #[test]
    fn deserialization_roundtrip() {
        let json = r#"{"type":"tool_result","id":"c1","name":"add","output":"5","success":true}"#;
        let event: AgentStreamEvent = serde_json::from_str(json).unwrap();
        match event {
            AgentStreamEvent::ToolResult { name, success, .. } => {
                assert_eq!(name, "add");
                assert!(success);
            }
            _ => panic!("Wrong variant"),
        }
    }
}
