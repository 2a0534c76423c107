//! Provider trait — the abstraction over LLM backends.
//!
//! A Provider knows how to send a conversation to an LLM and get a response
//! back, either as a complete message or as a stream of chunks. The stream
//! contract is finish-reason driven: providers reconstruct coherent tool
//! calls from fragmented deltas *before* emitting the finishing chunk, so
//! the agent loop never sees a half-assembled call.
//!
//! Implementations: OpenAI-compatible (OpenAI, xAI/Grok, proxies) and
//! native Anthropic.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ProviderError;
use crate::message::{Message, MessageToolCall};

/// Why a streamed response finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    /// The model produced a complete text response
    Stop,
    /// The response was cut off by the token limit
    Length,
    /// The model requested tool invocations
    ToolCalls,
    /// The provider reported an error mid-response
    Error,
}

/// A tool definition sent to the LLM so it knows what it can call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// The tool name
    pub name: String,

    /// Description of what the tool does
    pub description: String,

    /// JSON Schema describing the tool's parameters
    pub parameters: serde_json::Value,
}

/// Token usage statistics.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// Configuration for a provider request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderRequest {
    /// The model to use (e.g., "gpt-4o", "claude-sonnet-4-20250514")
    pub model: String,

    /// The conversation messages, in order
    pub messages: Vec<Message>,

    /// Sampling temperature
    pub temperature: f32,

    /// Maximum tokens to generate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Tools the model may call
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDefinition>,
}

/// A complete (non-streaming) response from a provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderResponse {
    /// The generated assistant message
    pub message: Message,

    /// Why the response ended
    pub finish: FinishReason,

    /// Token usage, when reported
    pub usage: Option<Usage>,

    /// Which model actually responded (may differ from requested)
    pub model: String,
}

/// A single chunk in a streaming response.
///
/// Ordinary chunks carry a text delta. The final chunk carries `finish`
/// and, for tool-use turns, the fully reassembled tool calls.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StreamChunk {
    /// Partial text delta
    #[serde(default)]
    pub content: Option<String>,

    /// Reassembled tool calls (only on the finishing chunk)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<MessageToolCall>,

    /// Set on the final chunk of the response
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish: Option<FinishReason>,

    /// Usage info (typically only on the final chunk)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

impl StreamChunk {
    /// A plain text delta chunk.
    pub fn text(delta: impl Into<String>) -> Self {
        Self {
            content: Some(delta.into()),
            ..Self::default()
        }
    }

    /// A finishing chunk.
    pub fn finished(reason: FinishReason, tool_calls: Vec<MessageToolCall>) -> Self {
        Self {
            tool_calls,
            finish: Some(reason),
            ..Self::default()
        }
    }
}

/// An embedding request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingRequest {
    /// The embedding model (e.g., "text-embedding-3-small")
    pub model: String,

    /// The texts to embed
    pub inputs: Vec<String>,
}

/// An embedding response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingResponse {
    /// One vector per input text
    pub embeddings: Vec<Vec<f32>>,

    /// Which model was used
    pub model: String,
}

/// The core Provider trait.
///
/// The agent loop calls `stream()` without knowing which backend is in use;
/// scripted test providers usually implement only `complete()` and inherit
/// the default single-chunk stream.
#[async_trait]
pub trait Provider: Send + Sync {
    /// A human-readable name for this provider (e.g., "openai", "anthropic").
    fn name(&self) -> &str;

    /// Send a request and get a complete response.
    async fn complete(
        &self,
        request: ProviderRequest,
    ) -> std::result::Result<ProviderResponse, ProviderError>;

    /// Send a request and get a stream of response chunks.
    ///
    /// Default implementation calls `complete()` and emits the result as a
    /// text chunk followed by a finishing chunk.
    async fn stream(
        &self,
        request: ProviderRequest,
    ) -> std::result::Result<
        tokio::sync::mpsc::Receiver<std::result::Result<StreamChunk, ProviderError>>,
        ProviderError,
    > {
        let response = self.complete(request).await?;
        let (tx, rx) = tokio::sync::mpsc::channel(4);
        if !response.message.content.is_empty() {
            let _ = tx.send(Ok(StreamChunk::text(&response.message.content))).await;
        }
        let mut last = StreamChunk::finished(response.finish, response.message.tool_calls);
        last.usage = response.usage;
        let _ = tx.send(Ok(last)).await;
        Ok(rx)
    }

    /// Generate embeddings for the given texts.
    async fn embed(
        &self,
        _request: EmbeddingRequest,
    ) -> std::result::Result<EmbeddingResponse, ProviderError> {
        Err(ProviderError::NotConfigured(format!(
            "Provider '{}' does not support embeddings",
            self.name()
        )))
    }

    /// Health check — can we reach the provider?
    async fn health_check(&self) -> std::result::Result<bool, ProviderError> {
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedProvider;

    #[async_trait]
    impl Provider for FixedProvider {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn complete(
            &self,
            _request: ProviderRequest,
        ) -> std::result::Result<ProviderResponse, ProviderError> {
            Ok(ProviderResponse {
                message: Message::assistant("hi"),
                finish: FinishReason::Stop,
                usage: None,
                model: "fixed-model".into(),
            })
        }
    }

    #[tokio::test]
    async fn default_stream_wraps_complete() {
        let provider = FixedProvider;
        let mut rx = provider
            .stream(ProviderRequest {
                model: "fixed-model".into(),
                messages: vec![Message::user("hello")],
                temperature: 0.7,
                max_tokens: None,
                tools: vec![],
            })
            .await
            .unwrap();

        let first = rx.recv().await.unwrap().unwrap();
        assert_eq!(first.content.as_deref(), Some("hi"));
        assert!(first.finish.is_none());

        let last = rx.recv().await.unwrap().unwrap();
        assert_eq!(last.finish, Some(FinishReason::Stop));
        assert!(rx.recv().await.is_none());
    }

    #[test]
    fn finish_reason_serializes_snake_case() {
        let json = serde_json::to_string(&FinishReason::ToolCalls).unwrap();
        assert_eq!(json, "\"tool_calls\"");
    }
}
