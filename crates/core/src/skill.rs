//! Skill definitions.
//!
//! A skill is an immutable, declarative agent specification: system prompt,
//! tool allow-list, model selection, few-shot examples, and retrieval policy.
//! Skills are loaded from YAML files at startup and validated by the loader.

use serde::{Deserialize, Serialize};

/// A `(user, assistant)` few-shot pair injected ahead of the session history.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SkillExample {
    #[serde(default)]
    pub user: Option<String>,

    #[serde(default)]
    pub assistant: Option<String>,
}

/// Retrieval policy for automatic context injection.
///
/// When present and enabled, the agent loop issues a vector search before
/// every LLM call and appends the top-k chunks as a second system message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RagContextConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Skill names used as the retrieval filter. Defaults to the owning
    /// skill's own name when absent.
    #[serde(default)]
    pub skills: Option<Vec<String>>,

    /// Tag filter for retrieval
    #[serde(default)]
    pub tags: Vec<String>,

    /// Number of chunks to inject
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

fn default_true() -> bool {
    true
}

fn default_top_k() -> usize {
    3
}

impl Default for RagContextConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            skills: None,
            tags: Vec::new(),
            top_k: default_top_k(),
        }
    }
}

/// A declarative skill bundle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Skill {
    /// Unique skill name (identifier)
    pub name: String,

    /// Human-readable description, also used by the planner for routing
    pub description: String,

    /// The system prompt establishing the skill's behavior
    pub system_prompt: String,

    /// Tool names this skill may invoke (subset of the registry)
    #[serde(default)]
    pub tools: Vec<String>,

    /// Optional override of the global default model
    #[serde(default)]
    pub model: Option<String>,

    /// Sampling temperature, must be within [0, 2]
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum reason–act iterations per request
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    /// Routing and retrieval tags
    #[serde(default)]
    pub tags: Vec<String>,

    /// Ordered few-shot examples
    #[serde(default)]
    pub examples: Vec<SkillExample>,

    /// Skills this one is expected to delegate to. Advisory only — the
    /// runtime gate on delegation is orchestration depth.
    #[serde(default)]
    pub sub_agents: Vec<String>,

    /// Optional automatic retrieval policy
    #[serde(default)]
    pub rag_context: Option<RagContextConfig>,
}

fn default_temperature() -> f32 {
    0.7
}

fn default_max_iterations() -> u32 {
    10
}

impl Skill {
    /// Whether retrieval injection is configured and enabled.
    pub fn rag_enabled(&self) -> bool {
        self.rag_context.as_ref().is_some_and(|r| r.enabled)
    }

    /// Whether `tool` is on this skill's allow-list.
    pub fn allows_tool(&self, tool: &str) -> bool {
        self.tools.iter().any(|t| t == tool)
    }
}
