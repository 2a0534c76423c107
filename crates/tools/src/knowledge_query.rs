//! Knowledge base search tool.
//!
//! Results are scoped to the calling skill via the ambient context, so a
//! skill can only retrieve chunks it is allowed to see.

use async_trait::async_trait;
use std::sync::Arc;

use agentgw_core::error::ToolError;
use agentgw_core::tool::{Tool, ToolContext};
use agentgw_rag::store::DEFAULT_COLLECTION;
use agentgw_rag::VectorStore;

/// The `knowledge_base_query` tool.
pub struct KnowledgeQueryTool {
    rag: Arc<VectorStore>,
}

impl KnowledgeQueryTool {
    pub fn new(rag: Arc<VectorStore>) -> Self {
        Self { rag }
    }
}

#[async_trait]
impl Tool for KnowledgeQueryTool {
    fn name(&self) -> &str {
        "knowledge_base_query"
    }

    fn description(&self) -> &str {
        "Search the knowledge base for relevant document chunks. Returns the \
         best-matching chunks with their sources and similarity scores."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "Natural language search query"
                },
                "top_k": {
                    "type": "integer",
                    "description": "Number of results to return (default 5)"
                },
                "tags": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "Optional tag filters"
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(
        &self,
        arguments: serde_json::Value,
        ctx: &ToolContext,
    ) -> Result<serde_json::Value, ToolError> {
        let query = arguments["query"].as_str().unwrap_or_default();
        let top_k = arguments["top_k"].as_u64().unwrap_or(5) as usize;
        let tags: Vec<String> = arguments["tags"]
            .as_array()
            .map(|a| {
                a.iter()
                    .filter_map(|t| t.as_str().map(String::from))
                    .collect()
            })
            .unwrap_or_default();

        // Scope retrieval to the calling skill
        let skills: Vec<String> = ctx.skill.iter().cloned().collect();

        let hits = self
            .rag
            .search(query, DEFAULT_COLLECTION, &skills, &tags, top_k)
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: "knowledge_base_query".into(),
                reason: e.to_string(),
            })?;

        let results: Vec<serde_json::Value> = hits
            .into_iter()
            .map(|h| {
                serde_json::json!({
                    "id": h.id,
                    "text": h.text,
                    "source": h.metadata.source,
                    "chunk_index": h.metadata.chunk_index,
                    "similarity": h.score,
                })
            })
            .collect();

        Ok(serde_json::json!({ "results": results }))
    }
}
