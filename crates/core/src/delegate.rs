//! Delegation seam.
//!
//! The `delegate_to_agent` tool spawns sub-agents from inside a tool call.
//! The tool lives below the service in the dependency graph, so the service
//! implements this trait and the tool holds a weak handle to it — no crate
//! cycle, no global state.

use async_trait::async_trait;

use crate::error::Error;

/// Spawns a sub-agent run on behalf of a tool handler.
#[async_trait]
pub trait Delegator: Send + Sync {
    /// Whether a skill with this name is loaded.
    fn has_skill(&self, skill_name: &str) -> bool;

    /// The configured maximum orchestration depth.
    fn max_orchestration_depth(&self) -> usize;

    /// Run `task` against `skill_name` in a fresh session at the given
    /// orchestration depth, to completion. Returns the sub-agent's final
    /// text.
    async fn delegate(&self, skill_name: &str, task: &str, depth: usize)
        -> Result<String, Error>;
}
