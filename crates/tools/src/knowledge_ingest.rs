//! Knowledge base ingestion tool.

use async_trait::async_trait;
use std::sync::Arc;

use agentgw_core::error::ToolError;
use agentgw_core::tool::{Tool, ToolContext};
use agentgw_rag::store::DEFAULT_COLLECTION;
use agentgw_rag::VectorStore;

/// The `knowledge_base_ingest` tool.
pub struct KnowledgeIngestTool {
    rag: Arc<VectorStore>,
}

impl KnowledgeIngestTool {
    pub fn new(rag: Arc<VectorStore>) -> Self {
        Self { rag }
    }
}

#[async_trait]
impl Tool for KnowledgeIngestTool {
    fn name(&self) -> &str {
        "knowledge_base_ingest"
    }

    fn description(&self) -> &str {
        "Store text in the knowledge base for future retrieval. The text is \
         chunked and indexed under the given source name."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "text": {
                    "type": "string",
                    "description": "The text content to ingest"
                },
                "source": {
                    "type": "string",
                    "description": "Source identifier (e.g. filename, URL)"
                },
                "tags": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "Tags for categorizing the document"
                }
            },
            "required": ["text"]
        })
    }

    async fn execute(
        &self,
        arguments: serde_json::Value,
        ctx: &ToolContext,
    ) -> Result<serde_json::Value, ToolError> {
        let text = arguments["text"].as_str().unwrap_or_default();
        let source = arguments["source"].as_str().unwrap_or("manual");
        let tags: Vec<String> = arguments["tags"]
            .as_array()
            .map(|a| {
                a.iter()
                    .filter_map(|t| t.as_str().map(String::from))
                    .collect()
            })
            .unwrap_or_default();

        // Ingested chunks stay scoped to the skill that wrote them
        let skills: Vec<String> = ctx.skill.iter().cloned().collect();

        let chunks = self
            .rag
            .ingest(source, text, skills, tags, DEFAULT_COLLECTION)
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: "knowledge_base_ingest".into(),
                reason: e.to_string(),
            })?;

        Ok(serde_json::json!({ "status": "ok", "chunks_created": chunks }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentgw_rag::LocalEmbedder;

    #[tokio::test]
    async fn ingest_scopes_chunks_to_writing_skill() {
        let store = Arc::new(VectorStore::in_memory(Arc::new(LocalEmbedder::new())));
        let tool = KnowledgeIngestTool::new(store.clone());

        let ctx = ToolContext::root().for_skill("notes_agent");
        let result = tool
            .execute(
                serde_json::json!({"text": "remember this fact", "source": "chat"}),
                &ctx,
            )
            .await
            .unwrap();
        assert_eq!(result["status"], "ok");
        assert_eq!(result["chunks_created"], 1);

        let previews = store.list(DEFAULT_COLLECTION, &[], None, 10).await;
        assert_eq!(previews[0].metadata.skills, vec!["notes_agent"]);
        assert_eq!(previews[0].metadata.source, "chat");
    }
}
