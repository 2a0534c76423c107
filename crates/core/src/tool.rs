//! Tool trait, invocation context, and the process-wide registry.
//!
//! Tools are what let a skill act: query the knowledge base, delegate to
//! another skill, and so on. Every invocation receives a [`ToolContext`] —
//! the explicit flow-local value carrying the orchestration depth, so a
//! handler spawning a sub-agent can enforce the depth limit without any
//! hidden thread-local state.
//!
//! Failures never escape [`ToolRegistry::invoke`]: a missing tool, bad
//! arguments, or a handler error all become a structured error payload that
//! the agent loop feeds back to the model as a tool message.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::ToolError;
use crate::provider::ToolDefinition;

/// Ambient execution context handed to every tool invocation.
///
/// The agent loop constructs one at its own orchestration depth for the
/// duration of a run; nested delegations observe monotonically increasing
/// depths along a call chain while unrelated concurrent requests are
/// isolated by construction.
#[derive(Debug, Clone, Default)]
pub struct ToolContext {
    /// Number of delegations currently on the call chain (0 = top level)
    pub depth: usize,

    /// Name of the skill the calling loop is bound to
    pub skill: Option<String>,
}

impl ToolContext {
    /// Context for a top-level (non-delegated) run.
    pub fn root() -> Self {
        Self::default()
    }

    /// Context at an explicit orchestration depth.
    pub fn at_depth(depth: usize) -> Self {
        Self {
            depth,
            skill: None,
        }
    }

    /// Attach the calling skill's name.
    pub fn for_skill(mut self, skill: impl Into<String>) -> Self {
        self.skill = Some(skill.into());
        self
    }
}

/// A request to execute a tool, with arguments already parsed from JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    /// Unique call ID (matches the model's tool_call id)
    pub id: String,

    /// Name of the tool to execute
    pub name: String,

    /// Parsed arguments
    pub arguments: serde_json::Value,
}

/// The result of a tool execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    /// The call ID this result answers
    pub call_id: String,

    /// Whether the tool executed successfully
    pub success: bool,

    /// Output fed back to the model (JSON or plain text)
    pub output: String,
}

impl ToolResult {
    /// A successful result.
    pub fn ok(call_id: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            success: true,
            output: output.into(),
        }
    }

    /// A structured error payload the model can react to.
    pub fn error(call_id: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self {
            call_id: call_id.into(),
            success: false,
            output: serde_json::json!({ "error": message.to_string() }).to_string(),
        }
    }
}

/// The core Tool trait.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool. Must be an identifier.
    fn name(&self) -> &str;

    /// A description of what this tool does (sent to the LLM).
    fn description(&self) -> &str;

    /// JSON Schema describing this tool's parameters.
    fn parameters_schema(&self) -> serde_json::Value;

    /// Execute the tool with parsed arguments and the ambient context.
    async fn execute(
        &self,
        arguments: serde_json::Value,
        ctx: &ToolContext,
    ) -> std::result::Result<serde_json::Value, ToolError>;

    /// Convert this tool into a definition for the LLM.
    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

/// Check parsed arguments against a tool's declared schema.
///
/// Arguments must be a JSON object containing every property the schema's
/// `required` list names. Deeper type validation is the handler's concern.
pub fn validate_arguments(
    schema: &serde_json::Value,
    arguments: &serde_json::Value,
) -> std::result::Result<(), ToolError> {
    let obj = arguments
        .as_object()
        .ok_or_else(|| ToolError::InvalidArguments("arguments must be a JSON object".into()))?;

    if let Some(required) = schema.get("required").and_then(|r| r.as_array()) {
        for key in required.iter().filter_map(|k| k.as_str()) {
            if !obj.contains_key(key) {
                return Err(ToolError::InvalidArguments(format!(
                    "missing required argument '{key}'"
                )));
            }
        }
    }
    Ok(())
}

/// A registry of available tools.
///
/// The agent loop uses this to advertise schemas (filtered to the calling
/// skill's allow-list) and to dispatch calls the model requests.
pub struct ToolRegistry {
    tools: HashMap<String, Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Register a tool. Replaces any existing tool with the same name.
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        let name = tool.name().to_string();
        debug_assert!(
            name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_'),
            "tool names must be identifiers"
        );
        self.tools.insert(name, tool);
    }

    /// Get a tool by name.
    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.get(name).map(|t| t.as_ref())
    }

    /// List all registered tool names.
    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(|s| s.as_str()).collect()
    }

    /// Names from `requested` that are not registered.
    pub fn unknown_names<'a>(&self, requested: &'a [String]) -> Vec<&'a str> {
        requested
            .iter()
            .filter(|n| !self.tools.contains_key(n.as_str()))
            .map(|n| n.as_str())
            .collect()
    }

    /// Tool definitions restricted to an allow-list, in the list's order.
    pub fn definitions_for(&self, allow_list: &[String]) -> Vec<ToolDefinition> {
        allow_list
            .iter()
            .filter_map(|n| self.tools.get(n))
            .map(|t| t.to_definition())
            .collect()
    }

    /// All tool definitions.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.values().map(|t| t.to_definition()).collect()
    }

    /// Execute a tool call, converting every failure into a structured
    /// error result. The caller can always persist the output as a tool
    /// message — nothing propagates.
    pub async fn invoke(&self, call: &ToolCall, ctx: &ToolContext) -> ToolResult {
        let Some(tool) = self.tools.get(&call.name) else {
            return ToolResult::error(&call.id, format!("Unknown tool: {}", call.name));
        };

        if let Err(e) = validate_arguments(&tool.parameters_schema(), &call.arguments) {
            return ToolResult::error(&call.id, e);
        }

        match tool.execute(call.arguments.clone(), ctx).await {
            Ok(value) => {
                let output = match value {
                    serde_json::Value::String(s) => s,
                    other => other.to_string(),
                };
                ToolResult::ok(&call.id, output)
            }
            Err(e) => {
                tracing::warn!(tool = %call.name, error = %e, "Tool execution failed");
                ToolResult::error(&call.id, e)
            }
        }
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
