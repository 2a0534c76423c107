//! Planner — routes a user message to the best-suited skill.
//!
//! A low-temperature LLM classification over the loaded skills' names,
//! descriptions, and tags. The model answers with a small JSON object; the
//! parser is tolerant of code fences and falls back to "no match" on
//! unparseable output.

use std::sync::Arc;
use tracing::{debug, warn};

use agentgw_core::error::Error;
use agentgw_core::message::Message;
use agentgw_core::provider::{Provider, ProviderRequest};
use agentgw_core::skill::Skill;

const PLANNER_PROMPT: &str = "You are an intelligent task router. Analyze the user's message and \
decide which skill is best suited to handle it.\n\n\
Available skills:\n{skills}\n\n\
Respond with ONLY a JSON object:\n\
{\"skill\": \"<skill_name or null>\", \"reasoning\": \"<brief explanation>\", \
\"refined_message\": \"<optionally rewritten message, or null>\"}";

/// The routing decision.
#[derive(Debug, Clone)]
pub struct PlannerResult {
    /// The selected skill, or None when nothing matches
    pub skill: Option<String>,

    /// Why the planner chose it
    pub reasoning: String,

    /// Optional rewrite of the message for the target skill
    pub refined_message: Option<String>,
}

/// LLM-backed skill router.
pub struct PlannerAgent {
    provider: Arc<dyn Provider>,
    model: String,
}

impl PlannerAgent {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
        }
    }

    /// Pick the best skill for `user_message` out of `skills`.
    pub async fn route(
        &self,
        skills: &[Arc<Skill>],
        user_message: &str,
    ) -> Result<PlannerResult, Error> {
        let descriptions: String = skills
            .iter()
            .map(|s| {
                let tags = if s.tags.is_empty() {
                    "general".to_string()
                } else {
                    s.tags.join(", ")
                };
                format!("- {}: {} (tags: {})", s.name, s.description.trim(), tags)
            })
            .collect::<Vec<_>>()
            .join("\n");

        let system_prompt = PLANNER_PROMPT.replace("{skills}", &descriptions);

        let request = ProviderRequest {
            model: self.model.clone(),
            messages: vec![Message::system(system_prompt), Message::user(user_message)],
            temperature: 0.1, // deterministic routing
            max_tokens: Some(512),
            tools: vec![],
        };

        let response = self.provider.complete(request).await?;
        let content = response.message.content.trim();

        if content.is_empty() {
            warn!("Planner returned empty response");
            return Ok(PlannerResult {
                skill: None,
                reasoning: "Empty response from planner".into(),
                refined_message: None,
            });
        }

        Ok(parse_planner_response(content, skills))
    }
}

fn parse_planner_response(content: &str, skills: &[Arc<Skill>]) -> PlannerResult {
    let stripped = strip_code_fence(content);

    let Ok(data) = serde_json::from_str::<serde_json::Value>(stripped) else {
        let preview: String = content.chars().take(120).collect();
        warn!(preview = %preview, "Planner returned non-JSON");
        return PlannerResult {
            skill: None,
            reasoning: "Could not parse planner response".into(),
            refined_message: None,
        };
    };

    let skill = data["skill"]
        .as_str()
        .map(str::to_string)
        .filter(|name| skills.iter().any(|s| &s.name == name));

    debug!(skill = ?skill, "Planner routed");

    PlannerResult {
        skill,
        reasoning: data["reasoning"].as_str().unwrap_or_default().to_string(),
        refined_message: data["refined_message"]
            .as_str()
            .filter(|s| !s.is_empty())
            .map(str::to_string),
    }
}

/// Strip a ```json … ``` fence if the model wrapped its answer in one.
fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.trim_start_matches('\n')
        .strip_suffix("```")
        .unwrap_or(rest)
        .trim()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::{text_response, ScriptedProvider};

    fn skills() -> Vec<Arc<Skill>> {
        ["billing", "support"]
            .iter()
            .map(|name| {
                Arc::new(Skill {
                    name: name.to_string(),
                    description: format!("{name} skill"),
                    system_prompt: "prompt".into(),
                    tools: vec![],
                    model: None,
                    temperature: 0.7,
                    max_iterations: 10,
                    tags: vec![],
                    examples: vec![],
                    sub_agents: vec![],
                    rag_context: None,
                })
            })
            .collect()
    }

    #[tokio::test]
    async fn routes_to_named_skill() {
        let provider = Arc::new(ScriptedProvider::new(vec![text_response(
            r#"{"skill": "billing", "reasoning": "about invoices", "refined_message": null}"#,
        )]));
        let planner = PlannerAgent::new(provider, "test-model");

        let result = planner.route(&skills(), "my invoice is wrong").await.unwrap();
        assert_eq!(result.skill.as_deref(), Some("billing"));
        assert_eq!(result.reasoning, "about invoices");
        assert!(result.refined_message.is_none());
    }

    #[tokio::test]
    async fn unknown_skill_name_becomes_none() {
        let provider = Arc::new(ScriptedProvider::new(vec![text_response(
            r#"{"skill": "made_up", "reasoning": "guess"}"#,
        )]));
        let planner = PlannerAgent::new(provider, "test-model");

        let result = planner.route(&skills(), "hello").await.unwrap();
        assert!(result.skill.is_none());
    }

    #[tokio::test]
    async fn code_fenced_json_is_accepted() {
        let provider = Arc::new(ScriptedProvider::new(vec![text_response(
            "```json\n{\"skill\": \"support\", \"reasoning\": \"general question\"}\n```",
        )]));
        let planner = PlannerAgent::new(provider, "test-model");

        let result = planner.route(&skills(), "help me").await.unwrap();
        assert_eq!(result.skill.as_deref(), Some("support"));
    }

    #[tokio::test]
    async fn garbage_response_degrades_to_no_match() {
        let provider = Arc::new(ScriptedProvider::new(vec![text_response(
            "I think you should use the support skill!",
        )]));
        let planner = PlannerAgent::new(provider, "test-model");

        let result = planner.route(&skills(), "help").await.unwrap();
        assert!(result.skill.is_none());
        assert!(result.reasoning.contains("parse"));
    }

    #[tokio::test]
    async fn planner_uses_low_temperature() {
        let provider = Arc::new(ScriptedProvider::new(vec![text_response(
            r#"{"skill": null, "reasoning": "none"}"#,
        )]));
        let planner = PlannerAgent::new(provider.clone(), "test-model");
        planner.route(&skills(), "q").await.unwrap();

        let request = &provider.requests()[0];
        assert!(request.temperature <= 0.2);
        assert!(request.messages[0].content.contains("- billing: billing skill"));
    }
}
