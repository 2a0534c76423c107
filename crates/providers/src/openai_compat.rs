//! OpenAI-compatible provider implementation.
//!
//! Works with OpenAI, xAI (Grok), and any endpoint exposing the
//! `/chat/completions` wire format. Supports non-streaming and streaming
//! SSE completions, tool calling, and embeddings.
//!
//! Streaming tool calls arrive as fragmented deltas keyed by index; this
//! provider reassembles them into complete `(id, name, arguments)` tuples
//! and validates the argument JSON before emitting the finishing chunk, so
//! downstream code never sees a half-built call.

use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, trace, warn};

use agentgw_core::error::ProviderError;
use agentgw_core::message::{Message, MessageToolCall, Role};
use agentgw_core::provider::*;

/// An OpenAI-compatible LLM provider.
pub struct OpenAiCompatProvider {
    name: String,
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAiCompatProvider {
    /// Create a provider against an arbitrary OpenAI-compatible endpoint.
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            client,
        }
    }

    /// OpenAI convenience constructor.
    pub fn openai(api_key: impl Into<String>) -> Self {
        Self::new("openai", "https://api.openai.com/v1", api_key)
    }

    /// xAI (Grok) convenience constructor — OpenAI wire format at api.x.ai.
    pub fn xai(api_key: impl Into<String>) -> Self {
        Self::new("xai", "https://api.x.ai/v1", api_key)
    }

    /// Convert our messages to the OpenAI wire format.
    fn to_api_messages(messages: &[Message]) -> Vec<ApiMessage> {
        messages
            .iter()
            .map(|m| ApiMessage {
                role: m.role.as_str().to_string(),
                content: Some(m.content.clone()),
                tool_calls: if m.tool_calls.is_empty() {
                    None
                } else {
                    Some(
                        m.tool_calls
                            .iter()
                            .map(|tc| ApiToolCall {
                                id: tc.id.clone(),
                                r#type: "function".into(),
                                function: ApiFunction {
                                    name: tc.name.clone(),
                                    arguments: tc.arguments.clone(),
                                },
                            })
                            .collect(),
                    )
                },
                tool_call_id: m.tool_call_id.clone(),
            })
            .collect()
    }

    fn to_api_tools(tools: &[ToolDefinition]) -> Vec<ApiToolDefinition> {
        tools
            .iter()
            .map(|t| ApiToolDefinition {
                r#type: "function".into(),
                function: ApiToolFunction {
                    name: t.name.clone(),
                    description: t.description.clone(),
                    parameters: t.parameters.clone(),
                },
            })
            .collect()
    }

    fn map_finish_reason(reason: Option<&str>, has_tool_calls: bool) -> FinishReason {
        match reason {
            Some("tool_calls") => FinishReason::ToolCalls,
            Some("length") => FinishReason::Length,
            Some("stop") | None => {
                if has_tool_calls {
                    FinishReason::ToolCalls
                } else {
                    FinishReason::Stop
                }
            }
            Some(_) => FinishReason::Stop,
        }
    }

    fn check_status(status: u16, body: String) -> Result<(), ProviderError> {
        match status {
            200 => Ok(()),
            429 => Err(ProviderError::RateLimited {
                retry_after_secs: 5,
            }),
            401 | 403 => Err(ProviderError::AuthenticationFailed(
                "Invalid API key or insufficient permissions".into(),
            )),
            _ => {
                warn!(status, body = %body, "Provider returned error");
                Err(ProviderError::ApiError {
                    status_code: status,
                    message: body,
                })
            }
        }
    }
}

#[async_trait]
impl Provider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(
        &self,
        request: ProviderRequest,
    ) -> std::result::Result<ProviderResponse, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url);

        let mut body = serde_json::json!({
            "model": request.model,
            "messages": Self::to_api_messages(&request.messages),
            "temperature": request.temperature,
            "stream": false,
        });
        if let Some(max_tokens) = request.max_tokens {
            body["max_tokens"] = serde_json::json!(max_tokens);
        }
        if !request.tools.is_empty() {
            body["tools"] = serde_json::json!(Self::to_api_tools(&request.tools));
        }

        debug!(provider = %self.name, model = %request.model, "Sending completion request");

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        let status = response.status().as_u16();
        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            return Err(Self::check_status(status, error_body).unwrap_err());
        }

        let api_response: ApiResponse =
            response.json().await.map_err(|e| ProviderError::MalformedResponse(format!(
                "Failed to parse response: {e}"
            )))?;

        let choice = api_response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::MalformedResponse("No choices in response".into()))?;

        let tool_calls: Vec<MessageToolCall> = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|tc| MessageToolCall {
                id: tc.id,
                name: tc.function.name,
                arguments: tc.function.arguments,
            })
            .collect();

        let finish = Self::map_finish_reason(choice.finish_reason.as_deref(), !tool_calls.is_empty());

        let message = Message {
            id: uuid::Uuid::new_v4().to_string(),
            role: Role::Assistant,
            content: choice.message.content.unwrap_or_default(),
            tool_calls,
            tool_call_id: None,
            created_at: chrono::Utc::now(),
        };

        let usage = api_response.usage.map(|u| Usage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
        });

        Ok(ProviderResponse {
            message,
            finish,
            usage,
            model: api_response.model,
        })
    }

    async fn stream(
        &self,
        request: ProviderRequest,
    ) -> std::result::Result<
        tokio::sync::mpsc::Receiver<std::result::Result<StreamChunk, ProviderError>>,
        ProviderError,
    > {
        let url = format!("{}/chat/completions", self.base_url);

        let mut body = serde_json::json!({
            "model": request.model,
            "messages": Self::to_api_messages(&request.messages),
            "temperature": request.temperature,
            "stream": true,
            "stream_options": { "include_usage": true },
        });
        if let Some(max_tokens) = request.max_tokens {
            body["max_tokens"] = serde_json::json!(max_tokens);
        }
        if !request.tools.is_empty() {
            body["tools"] = serde_json::json!(Self::to_api_tools(&request.tools));
        }

        debug!(provider = %self.name, model = %request.model, "Sending streaming request");

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .header("Accept", "text/event-stream")
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        let status = response.status().as_u16();
        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            return Err(Self::check_status(status, error_body).unwrap_err());
        }

        let (tx, rx) = tokio::sync::mpsc::channel(64);
        let provider_name = self.name.clone();

        tokio::spawn(async move {
            let mut byte_stream = response.bytes_stream();
            let mut buffer = String::new();

            // Tool-call fragments keyed by delta index; BTreeMap keeps the
            // provider-emitted order.
            let mut accumulators: BTreeMap<u32, ToolCallAccumulator> = BTreeMap::new();
            let mut finish_reason: Option<String> = None;
            let mut usage: Option<Usage> = None;

            while let Some(chunk_result) = byte_stream.next().await {
                let bytes = match chunk_result {
                    Ok(b) => b,
                    Err(e) => {
                        let _ = tx
                            .send(Err(ProviderError::StreamInterrupted(e.to_string())))
                            .await;
                        return;
                    }
                };

                buffer.push_str(&String::from_utf8_lossy(&bytes));

                while let Some(line_end) = buffer.find('\n') {
                    let line = buffer[..line_end].trim_end_matches('\r').to_string();
                    buffer = buffer[line_end + 1..].to_string();

                    if line.is_empty() || line.starts_with(':') {
                        continue;
                    }

                    let Some(data) = line.strip_prefix("data: ") else {
                        continue;
                    };
                    let data = data.trim();

                    if data == "[DONE]" {
                        finish_stream(&tx, accumulators, finish_reason.as_deref(), usage).await;
                        return;
                    }

                    let stream_resp: StreamResponse = match serde_json::from_str(data) {
                        Ok(v) => v,
                        Err(e) => {
                            trace!(provider = %provider_name, error = %e, "Ignoring unparseable SSE chunk");
                            continue;
                        }
                    };

                    if let Some(u) = stream_resp.usage {
                        usage = Some(Usage {
                            prompt_tokens: u.prompt_tokens,
                            completion_tokens: u.completion_tokens,
                            total_tokens: u.total_tokens,
                        });
                    }

                    let Some(choice) = stream_resp.choices.first() else {
                        continue;
                    };

                    if let Some(reason) = &choice.finish_reason {
                        finish_reason = Some(reason.clone());
                    }

                    if let Some(tc_deltas) = &choice.delta.tool_calls {
                        for tc_delta in tc_deltas {
                            let acc = accumulators.entry(tc_delta.index).or_default();
                            if let Some(id) = &tc_delta.id {
                                acc.id = id.clone();
                            }
                            if let Some(func) = &tc_delta.function {
                                if let Some(name) = &func.name {
                                    acc.name = name.clone();
                                }
                                if let Some(args) = &func.arguments {
                                    acc.arguments.push_str(args);
                                }
                            }
                        }
                    }

                    if let Some(content) = &choice.delta.content {
                        if !content.is_empty()
                            && tx.send(Ok(StreamChunk::text(content))).await.is_err()
                        {
                            return; // receiver dropped
                        }
                    }
                }
            }

            // Stream ended without [DONE]
            finish_stream(&tx, accumulators, finish_reason.as_deref(), usage).await;
        });

        Ok(rx)
    }

    async fn embed(
        &self,
        request: EmbeddingRequest,
    ) -> std::result::Result<EmbeddingResponse, ProviderError> {
        let url = format!("{}/embeddings", self.base_url);

        let body = serde_json::json!({
            "model": request.model,
            "input": request.inputs,
            "encoding_format": "float",
        });

        debug!(provider = %self.name, model = %request.model, count = request.inputs.len(), "Sending embedding request");

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        let status = response.status().as_u16();
        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            return Err(Self::check_status(status, error_body).unwrap_err());
        }

        let api_resp: EmbeddingApiResponse = response.json().await.map_err(|e| {
            ProviderError::MalformedResponse(format!("Failed to parse embedding response: {e}"))
        })?;

        Ok(EmbeddingResponse {
            embeddings: api_resp.data.into_iter().map(|d| d.embedding).collect(),
            model: api_resp.model,
        })
    }

    async fn health_check(&self) -> std::result::Result<bool, ProviderError> {
        let url = format!("{}/models", self.base_url);
        let response = self
            .client
            .get(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;
        Ok(response.status().is_success())
    }
}

#[derive(Default)]
struct ToolCallAccumulator {
    id: String,
    name: String,
    arguments: String,
}

/// Emit the finishing chunk: reassembled tool calls, mapped reason, usage.
/// Malformed tool-argument JSON is a provider error, not a panic.
async fn finish_stream(
    tx: &tokio::sync::mpsc::Sender<std::result::Result<StreamChunk, ProviderError>>,
    accumulators: BTreeMap<u32, ToolCallAccumulator>,
    finish_reason: Option<&str>,
    usage: Option<Usage>,
) {
    let mut tool_calls = Vec::with_capacity(accumulators.len());
    for acc in accumulators.into_values() {
        if serde_json::from_str::<serde_json::Value>(&acc.arguments).is_err()
            && !acc.arguments.is_empty()
        {
            let _ = tx
                .send(Err(ProviderError::MalformedResponse(format!(
                    "tool call '{}' arguments are not valid JSON",
                    acc.name
                ))))
                .await;
            return;
        }
        tool_calls.push(MessageToolCall {
            id: acc.id,
            name: acc.name,
            arguments: if acc.arguments.is_empty() {
                "{}".into()
            } else {
                acc.arguments
            },
        });
    }

    let reason = OpenAiCompatProvider::map_finish_reason(finish_reason, !tool_calls.is_empty());
    let mut chunk = StreamChunk::finished(reason, tool_calls);
    chunk.usage = usage;
    let _ = tx.send(Ok(chunk)).await;
}

// --- OpenAI wire types (internal) ---

#[derive(Debug, Serialize, Deserialize)]
struct ApiMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<ApiToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolCall {
    id: String,
    r#type: String,
    function: ApiFunction,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiFunction {
    name: String,
    arguments: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolDefinition {
    r#type: String,
    function: ApiToolFunction,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolFunction {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    model: String,
    choices: Vec<ApiChoice>,
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct EmbeddingApiResponse {
    model: String,
    data: Vec<EmbeddingDatum>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingDatum {
    embedding: Vec<f32>,
}

// --- Streaming wire types ---

#[derive(Debug, Deserialize)]
struct StreamResponse {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    #[serde(default)]
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<StreamToolCallDelta>>,
}

#[derive(Debug, Deserialize)]
struct StreamToolCallDelta {
    index: u32,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: Option<StreamFunctionDelta>,
}

#[derive(Debug, Deserialize)]
struct StreamFunctionDelta {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructors() {
        let p = OpenAiCompatProvider::openai("sk-test");
        assert_eq!(p.name(), "openai");
        assert_eq!(p.base_url, "https://api.openai.com/v1");

        let x = OpenAiCompatProvider::xai("xai-test");
        assert_eq!(x.name(), "xai");
        assert_eq!(x.base_url, "https://api.x.ai/v1");

        let c = OpenAiCompatProvider::new("proxy", "https://proxy.example.com/v1/", "key");
        assert_eq!(c.base_url, "https://proxy.example.com/v1");
    }

    #[test]
    fn message_conversion_includes_tool_results() {
        let messages = vec![
            Message::user("add 2 and 3"),
            Message::assistant_with_tools(
                "",
                vec![MessageToolCall {
                    id: "call_1".into(),
                    name: "add".into(),
                    arguments: r#"{"a":2,"b":3}"#.into(),
                }],
            ),
            Message::tool_result("call_1", "5"),
        ];

        let api = OpenAiCompatProvider::to_api_messages(&messages);
        assert_eq!(api.len(), 3);
        assert_eq!(api[1].role, "assistant");
        assert_eq!(api[1].tool_calls.as_ref().unwrap().len(), 1);
        assert_eq!(api[2].role, "tool");
        assert_eq!(api[2].tool_call_id.as_deref(), Some("call_1"));
    }

    #[test]
    fn finish_reason_mapping() {
        use FinishReason::*;
        assert_eq!(OpenAiCompatProvider::map_finish_reason(Some("stop"), false), Stop);
        assert_eq!(OpenAiCompatProvider::map_finish_reason(Some("length"), false), Length);
        assert_eq!(
            OpenAiCompatProvider::map_finish_reason(Some("tool_calls"), true),
            ToolCalls
        );
        // Some backends report "stop" even with tool calls buffered
        assert_eq!(OpenAiCompatProvider::map_finish_reason(Some("stop"), true), ToolCalls);
        assert_eq!(OpenAiCompatProvider::map_finish_reason(None, false), Stop);
    }

    #[test]
    fn parse_completion_response() {
        let resp: ApiResponse = serde_json::from_str(
            r#"{
                "model": "gpt-4o",
                "choices": [{
                    "message": {"role": "assistant", "content": "Hello!"},
                    "finish_reason": "stop"
                }],
                "usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15}
            }"#,
        )
        .unwrap();
        assert_eq!(resp.choices[0].message.content.as_deref(), Some("Hello!"));
        assert_eq!(resp.choices[0].finish_reason.as_deref(), Some("stop"));
    }

    #[test]
    fn parse_stream_tool_call_delta() {
        let resp: StreamResponse = serde_json::from_str(
            r#"{
                "choices": [{
                    "delta": {
                        "tool_calls": [{
                            "index": 0,
                            "id": "call_9",
                            "function": {"name": "add", "arguments": "{\"a\":"}
                        }]
                    },
                    "finish_reason": null
                }]
            }"#,
        )
        .unwrap();
        let deltas = resp.choices[0].delta.tool_calls.as_ref().unwrap();
        assert_eq!(deltas[0].index, 0);
        assert_eq!(deltas[0].id.as_deref(), Some("call_9"));
        assert_eq!(
            deltas[0].function.as_ref().unwrap().arguments.as_deref(),
            Some("{\"a\":")
        );
    }

    #[tokio::test]
    async fn finish_stream_reassembles_fragments() {
        let (tx, mut rx) = tokio::sync::mpsc::channel(4);
        let mut accumulators = BTreeMap::new();
        accumulators.insert(
            0,
            ToolCallAccumulator {
                id: "call_1".into(),
                name: "add".into(),
                arguments: r#"{"a":2,"b":3}"#.into(),
            },
        );

        finish_stream(&tx, accumulators, Some("tool_calls"), None).await;

        let chunk = rx.recv().await.unwrap().unwrap();
        assert_eq!(chunk.finish, Some(FinishReason::ToolCalls));
        assert_eq!(chunk.tool_calls.len(), 1);
        assert_eq!(chunk.tool_calls[0].arguments, r#"{"a":2,"b":3}"#);
    }

    #[tokio::test]
    async fn finish_stream_rejects_malformed_arguments() {
        let (tx, mut rx) = tokio::sync::mpsc::channel(4);
        let mut accumulators = BTreeMap::new();
        accumulators.insert(
            0,
            ToolCallAccumulator {
                id: "call_1".into(),
                name: "add".into(),
                arguments: r#"{"a": 2, "#.into(), // truncated
            },
        );

        finish_stream(&tx, accumulators, Some("tool_calls"), None).await;

        let err = rx.recv().await.unwrap().unwrap_err();
        assert!(matches!(err, ProviderError::MalformedResponse(_)));
    }

    #[tokio::test]
    async fn finish_stream_defaults_empty_arguments() {
        let (tx, mut rx) = tokio::sync::mpsc::channel(4);
        let mut accumulators = BTreeMap::new();
        accumulators.insert(
            0,
            ToolCallAccumulator {
                id: "call_1".into(),
                name: "ping".into(),
                arguments: String::new(),
            },
        );

        finish_stream(&tx, accumulators, None, None).await;

        let chunk = rx.recv().await.unwrap().unwrap();
        assert_eq!(chunk.tool_calls[0].arguments, "{}");
        assert_eq!(chunk.finish, Some(FinishReason::ToolCalls));
    }
}
