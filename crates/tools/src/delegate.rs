//! Sub-agent delegation tool.
//!
//! `delegate_to_agent(skill_name, task, context?)` spawns a fresh session
//! bound to the target skill and runs it to completion one orchestration
//! level deeper. The depth limit is enforced here, from the ambient
//! [`ToolContext`] — exceeding it returns an error *payload* the model can
//! read and react to, never an exception.

use async_trait::async_trait;
use std::sync::Weak;
use tracing::{debug, info};

use agentgw_core::delegate::Delegator;
use agentgw_core::error::ToolError;
use agentgw_core::tool::{Tool, ToolContext};

/// The `delegate_to_agent` tool.
pub struct DelegateTool {
    delegator: Weak<dyn Delegator>,
}

impl DelegateTool {
    pub fn new(delegator: Weak<dyn Delegator>) -> Self {
        Self { delegator }
    }
}

#[async_trait]
impl Tool for DelegateTool {
    fn name(&self) -> &str {
        "delegate_to_agent"
    }

    fn description(&self) -> &str {
        "Delegate a task to another specialized agent skill. Use this to break \
         complex work into subtasks handled by specialists. The delegated skill \
         runs in its own fresh session with its own tools."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "skill_name": {
                    "type": "string",
                    "description": "Name of the skill to delegate to"
                },
                "task": {
                    "type": "string",
                    "description": "The specific task or question to delegate"
                },
                "context": {
                    "type": "string",
                    "description": "Optional additional context for the sub-agent"
                }
            },
            "required": ["skill_name", "task"]
        })
    }

    async fn execute(
        &self,
        arguments: serde_json::Value,
        ctx: &ToolContext,
    ) -> Result<serde_json::Value, ToolError> {
        let skill_name = arguments["skill_name"].as_str().unwrap_or_default();
        let task = arguments["task"].as_str().unwrap_or_default();
        let context = arguments["context"].as_str();

        let Some(delegator) = self.delegator.upgrade() else {
            return Ok(serde_json::json!({
                "error": "Agent service not available for delegation"
            }));
        };

        let max_depth = delegator.max_orchestration_depth();
        if ctx.depth + 1 > max_depth {
            debug!(depth = ctx.depth, max_depth, "Delegation refused at depth limit");
            return Ok(serde_json::json!({
                "error": format!(
                    "Maximum orchestration depth ({max_depth}) reached. Cannot delegate further."
                ),
                "current_depth": ctx.depth,
            }));
        }

        if !delegator.has_skill(skill_name) {
            return Ok(serde_json::json!({
                "error": format!("Unknown skill: {skill_name}")
            }));
        }

        let full_task = match context {
            Some(extra) if !extra.is_empty() => format!("{extra}\n\n{task}"),
            _ => task.to_string(),
        };

        info!(skill = %skill_name, depth = ctx.depth + 1, "Delegating to sub-agent");

        match delegator.delegate(skill_name, &full_task, ctx.depth + 1).await {
            Ok(result) => Ok(serde_json::json!({
                "status": "ok",
                "skill": skill_name,
                "result": result,
                "depth": ctx.depth + 1,
            })),
            Err(e) => Ok(serde_json::json!({
                "error": format!("Delegation failed: {e}")
            })),
        }
    }
}
