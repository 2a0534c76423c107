//! Anthropic native provider implementation.
//!
//! Uses Anthropic's Messages API directly:
//! - `x-api-key` header authentication (not Bearer)
//! - System prompt as a top-level field
//! - Native tool use via `tool_use` / `tool_result` content blocks
//! - Streaming via SSE `content_block_delta` events, with tool arguments
//!   arriving as `input_json_delta` fragments
//!
//! The normalizer's job is to make this wire shape indistinguishable from
//! the OpenAI one at the `StreamChunk` level: text deltas stream through,
//! and tool calls are fully assembled before the finishing chunk.

use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use agentgw_core::error::ProviderError;
use agentgw_core::message::{Message, MessageToolCall, Role};
use agentgw_core::provider::*;

const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const DEFAULT_MAX_TOKENS: u32 = 4096;

/// Anthropic native Messages API provider.
pub struct AnthropicProvider {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl AnthropicProvider {
    pub fn new(api_key: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(300))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            base_url: DEFAULT_BASE_URL.into(),
            api_key: api_key.into(),
            client,
        }
    }

    /// Custom base URL (testing, proxies).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Anthropic wants the system prompt as a top-level field, not a message.
    fn extract_system(messages: &[Message]) -> (Option<String>, Vec<&Message>) {
        let mut system_parts: Vec<&str> = Vec::new();
        let mut rest: Vec<&Message> = Vec::new();

        for msg in messages {
            match msg.role {
                Role::System => system_parts.push(&msg.content),
                _ => rest.push(msg),
            }
        }

        let system = if system_parts.is_empty() {
            None
        } else {
            Some(system_parts.join("\n\n"))
        };
        (system, rest)
    }

    fn to_api_messages(messages: &[&Message]) -> Vec<AnthropicMessage> {
        let mut result = Vec::new();

        for msg in messages {
            match msg.role {
                Role::User => result.push(AnthropicMessage {
                    role: "user".into(),
                    content: AnthropicContent::Text(msg.content.clone()),
                }),
                Role::Assistant => {
                    if msg.tool_calls.is_empty() {
                        result.push(AnthropicMessage {
                            role: "assistant".into(),
                            content: AnthropicContent::Text(msg.content.clone()),
                        });
                    } else {
                        let mut blocks: Vec<ContentBlock> = Vec::new();
                        if !msg.content.is_empty() {
                            blocks.push(ContentBlock::Text {
                                text: msg.content.clone(),
                            });
                        }
                        for tc in &msg.tool_calls {
                            let input: serde_json::Value =
                                serde_json::from_str(&tc.arguments).unwrap_or_default();
                            blocks.push(ContentBlock::ToolUse {
                                id: tc.id.clone(),
                                name: tc.name.clone(),
                                input,
                            });
                        }
                        result.push(AnthropicMessage {
                            role: "assistant".into(),
                            content: AnthropicContent::Blocks(blocks),
                        });
                    }
                }
                Role::Tool => {
                    // Tool results travel as user-role tool_result blocks
                    result.push(AnthropicMessage {
                        role: "user".into(),
                        content: AnthropicContent::Blocks(vec![ContentBlock::ToolResult {
                            tool_use_id: msg.tool_call_id.clone().unwrap_or_default(),
                            content: msg.content.clone(),
                        }]),
                    });
                }
                Role::System => {} // handled separately
            }
        }
        result
    }

    fn to_api_tools(tools: &[ToolDefinition]) -> Vec<AnthropicTool> {
        tools
            .iter()
            .map(|t| AnthropicTool {
                name: t.name.clone(),
                description: t.description.clone(),
                input_schema: t.parameters.clone(),
            })
            .collect()
    }

    fn map_stop_reason(reason: Option<&str>, has_tool_calls: bool) -> FinishReason {
        match reason {
            Some("tool_use") => FinishReason::ToolCalls,
            Some("max_tokens") => FinishReason::Length,
            Some("end_turn") | Some("stop_sequence") | None => {
                if has_tool_calls {
                    FinishReason::ToolCalls
                } else {
                    FinishReason::Stop
                }
            }
            Some(_) => FinishReason::Stop,
        }
    }

    fn build_body(&self, request: &ProviderRequest, stream: bool) -> serde_json::Value {
        let (system, messages) = Self::extract_system(&request.messages);
        let api_messages = Self::to_api_messages(&messages);

        let mut body = serde_json::json!({
            "model": request.model,
            "messages": api_messages,
            "max_tokens": request.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            "temperature": request.temperature,
        });
        if stream {
            body["stream"] = serde_json::json!(true);
        }
        if let Some(sys) = system {
            body["system"] = serde_json::json!(sys);
        }
        if !request.tools.is_empty() {
            body["tools"] = serde_json::json!(Self::to_api_tools(&request.tools));
        }
        body
    }

    fn check_status(status: u16, body: String) -> Result<(), ProviderError> {
        match status {
            200 => Ok(()),
            429 => Err(ProviderError::RateLimited {
                retry_after_secs: 5,
            }),
            401 | 403 => Err(ProviderError::AuthenticationFailed(
                "Invalid Anthropic API key".into(),
            )),
            _ => {
                warn!(status, body = %body, "Anthropic API error");
                Err(ProviderError::ApiError {
                    status_code: status,
                    message: body,
                })
            }
        }
    }

    fn response_to_provider_response(
        resp: AnthropicResponse,
    ) -> Result<ProviderResponse, ProviderError> {
        let mut text = String::new();
        let mut tool_calls = Vec::new();

        for block in resp.content {
            match block {
                ResponseContentBlock::Text { text: t } => {
                    if !text.is_empty() {
                        text.push('\n');
                    }
                    text.push_str(&t);
                }
                ResponseContentBlock::ToolUse { id, name, input } => {
                    tool_calls.push(MessageToolCall {
                        id,
                        name,
                        arguments: serde_json::to_string(&input).unwrap_or_default(),
                    });
                }
            }
        }

        let finish = Self::map_stop_reason(resp.stop_reason.as_deref(), !tool_calls.is_empty());

        let message = Message {
            id: resp.id,
            role: Role::Assistant,
            content: text,
            tool_calls,
            tool_call_id: None,
            created_at: chrono::Utc::now(),
        };

        let usage = Some(Usage {
            prompt_tokens: resp.usage.input_tokens,
            completion_tokens: resp.usage.output_tokens,
            total_tokens: resp.usage.input_tokens + resp.usage.output_tokens,
        });

        Ok(ProviderResponse {
            message,
            finish,
            usage,
            model: resp.model,
        })
    }
}

#[async_trait]
impl Provider for AnthropicProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    async fn complete(
        &self,
        request: ProviderRequest,
    ) -> std::result::Result<ProviderResponse, ProviderError> {
        let url = format!("{}/v1/messages", self.base_url);
        let body = self.build_body(&request, false);

        debug!(provider = "anthropic", model = %request.model, "Sending completion request");

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
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

        let api_resp: AnthropicResponse = response.json().await.map_err(|e| {
            ProviderError::MalformedResponse(format!("Failed to parse Anthropic response: {e}"))
        })?;

        Self::response_to_provider_response(api_resp)
    }

    async fn stream(
        &self,
        request: ProviderRequest,
    ) -> std::result::Result<
        tokio::sync::mpsc::Receiver<std::result::Result<StreamChunk, ProviderError>>,
        ProviderError,
    > {
        let url = format!("{}/v1/messages", self.base_url);
        let body = self.build_body(&request, true);

        debug!(provider = "anthropic", model = %request.model, "Sending streaming request");

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
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

        tokio::spawn(async move {
            let mut byte_stream = response.bytes_stream();
            let mut buffer = String::new();

            let mut current_tool_id = String::new();
            let mut current_tool_name = String::new();
            let mut tool_args_buffer = String::new();
            let mut in_tool_use = false;
            let mut tool_calls: Vec<MessageToolCall> = Vec::new();
            let mut stop_reason: Option<String> = None;
            let mut usage: Option<Usage> = None;

            // Close the current tool_use block into a finished call.
            macro_rules! flush_tool {
                () => {
                    if in_tool_use {
                        let arguments = std::mem::take(&mut tool_args_buffer);
                        if !arguments.is_empty()
                            && serde_json::from_str::<serde_json::Value>(&arguments).is_err()
                        {
                            let _ = tx
                                .send(Err(ProviderError::MalformedResponse(format!(
                                    "tool call '{}' arguments are not valid JSON",
                                    current_tool_name
                                ))))
                                .await;
                            return;
                        }
                        tool_calls.push(MessageToolCall {
                            id: std::mem::take(&mut current_tool_id),
                            name: std::mem::take(&mut current_tool_name),
                            arguments: if arguments.is_empty() {
                                "{}".into()
                            } else {
                                arguments
                            },
                        });
                        in_tool_use = false;
                    }
                };
            }

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

                    if line.is_empty() || line.starts_with(':') || line.starts_with("event: ") {
                        continue;
                    }
                    let Some(data) = line.strip_prefix("data: ") else {
                        continue;
                    };
                    let data = data.trim();
                    if data.is_empty() {
                        continue;
                    }

                    let event: serde_json::Value = match serde_json::from_str(data) {
                        Ok(v) => v,
                        Err(e) => {
                            trace!(error = %e, "Ignoring unparseable Anthropic SSE");
                            continue;
                        }
                    };

                    match event["type"].as_str().unwrap_or("") {
                        "content_block_start" => {
                            let block = &event["content_block"];
                            if block["type"].as_str() == Some("tool_use") {
                                flush_tool!();
                                current_tool_id = block["id"].as_str().unwrap_or("").to_string();
                                current_tool_name =
                                    block["name"].as_str().unwrap_or("").to_string();
                                tool_args_buffer.clear();
                                in_tool_use = true;
                            }
                        }
                        "content_block_delta" => {
                            let delta = &event["delta"];
                            match delta["type"].as_str().unwrap_or("") {
                                "text_delta" => {
                                    if let Some(text) = delta["text"].as_str() {
                                        if tx.send(Ok(StreamChunk::text(text))).await.is_err() {
                                            return;
                                        }
                                    }
                                }
                                "input_json_delta" => {
                                    if let Some(partial) = delta["partial_json"].as_str() {
                                        tool_args_buffer.push_str(partial);
                                    }
                                }
                                _ => {}
                            }
                        }
                        "content_block_stop" => {
                            flush_tool!();
                        }
                        "message_delta" => {
                            if let Some(reason) = event["delta"]["stop_reason"].as_str() {
                                stop_reason = Some(reason.to_string());
                            }
                            if let (Some(out), Some(inp)) = (
                                event["usage"]["output_tokens"].as_u64(),
                                event["usage"]["input_tokens"].as_u64(),
                            ) {
                                usage = Some(Usage {
                                    prompt_tokens: inp as u32,
                                    completion_tokens: out as u32,
                                    total_tokens: (inp + out) as u32,
                                });
                            }
                        }
                        "message_stop" => {
                            flush_tool!();
                            let reason = AnthropicProvider::map_stop_reason(
                                stop_reason.as_deref(),
                                !tool_calls.is_empty(),
                            );
                            let mut chunk =
                                StreamChunk::finished(reason, std::mem::take(&mut tool_calls));
                            chunk.usage = usage.take();
                            let _ = tx.send(Ok(chunk)).await;
                            return;
                        }
                        _ => {}
                    }
                }
            }

            // Stream ended without message_stop
            flush_tool!();
            let reason =
                AnthropicProvider::map_stop_reason(stop_reason.as_deref(), !tool_calls.is_empty());
            let mut chunk = StreamChunk::finished(reason, tool_calls);
            chunk.usage = usage;
            let _ = tx.send(Ok(chunk)).await;
        });

        Ok(rx)
    }

    async fn health_check(&self) -> std::result::Result<bool, ProviderError> {
        let url = format!("{}/v1/messages", self.base_url);
        let body = serde_json::json!({
            "model": "claude-3-5-haiku-20241022",
            "messages": [{"role": "user", "content": "hi"}],
            "max_tokens": 1,
        });

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        // Reachable and authenticated counts; other statuses mean reachable.
        Ok(response.status().as_u16() != 401)
    }
}

// --- Anthropic wire types ---

#[derive(Debug, Serialize, Deserialize)]
struct AnthropicMessage {
    role: String,
    content: AnthropicContent,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum AnthropicContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "tool_use")]
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    #[serde(rename = "tool_result")]
    ToolResult { tool_use_id: String, content: String },
}

#[derive(Debug, Serialize, Deserialize)]
struct AnthropicTool {
    name: String,
    description: String,
    input_schema: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    id: String,
    model: String,
    content: Vec<ResponseContentBlock>,
    usage: AnthropicUsage,
    #[serde(default)]
    stop_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum ResponseContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "tool_use")]
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
}

#[derive(Debug, Deserialize)]
struct AnthropicUsage {
    input_tokens: u32,
    output_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_extraction_joins_parts() {
        let messages = vec![
            Message::system("You are helpful"),
            Message::system("Retrieved context"),
            Message::user("Hello"),
        ];
        let (system, rest) = AnthropicProvider::extract_system(&messages);
        assert_eq!(system.as_deref(), Some("You are helpful\n\nRetrieved context"));
        assert_eq!(rest.len(), 1);
    }

    #[test]
    fn tool_result_becomes_user_block() {
        let msg = Message::tool_result("toolu_1", "result text");
        let refs: Vec<&Message> = vec![&msg];
        let api = AnthropicProvider::to_api_messages(&refs);
        assert_eq!(api[0].role, "user");
        match &api[0].content {
            AnthropicContent::Blocks(blocks) => match &blocks[0] {
                ContentBlock::ToolResult { tool_use_id, content } => {
                    assert_eq!(tool_use_id, "toolu_1");
                    assert_eq!(content, "result text");
                }
                _ => panic!("Expected tool_result block"),
            },
            _ => panic!("Expected blocks content"),
        }
    }

    #[test]
    fn assistant_tool_calls_become_blocks() {
        let msg = Message::assistant_with_tools(
            "Let me check",
            vec![MessageToolCall {
                id: "toolu_2".into(),
                name: "search".into(),
                arguments: r#"{"query":"rust"}"#.into(),
            }],
        );
        let refs: Vec<&Message> = vec![&msg];
        let api = AnthropicProvider::to_api_messages(&refs);
        match &api[0].content {
            AnthropicContent::Blocks(blocks) => {
                assert_eq!(blocks.len(), 2);
                assert!(matches!(&blocks[0], ContentBlock::Text { .. }));
                assert!(matches!(&blocks[1], ContentBlock::ToolUse { .. }));
            }
            _ => panic!("Expected blocks content"),
        }
    }

    #[test]
    fn stop_reason_mapping() {
        use FinishReason::*;
        assert_eq!(AnthropicProvider::map_stop_reason(Some("end_turn"), false), Stop);
        assert_eq!(AnthropicProvider::map_stop_reason(Some("max_tokens"), false), Length);
        assert_eq!(AnthropicProvider::map_stop_reason(Some("tool_use"), true), ToolCalls);
        assert_eq!(AnthropicProvider::map_stop_reason(None, true), ToolCalls);
    }

    #[test]
    fn parse_text_response() {
        let resp: AnthropicResponse = serde_json::from_str(
            r#"{
                "id": "msg_01",
                "model": "claude-sonnet-4-20250514",
                "content": [{"type": "text", "text": "Hello!"}],
                "usage": {"input_tokens": 10, "output_tokens": 5},
                "stop_reason": "end_turn"
            }"#,
        )
        .unwrap();

        let pr = AnthropicProvider::response_to_provider_response(resp).unwrap();
        assert_eq!(pr.message.content, "Hello!");
        assert_eq!(pr.finish, FinishReason::Stop);
        assert_eq!(pr.usage.unwrap().total_tokens, 15);
    }

    #[test]
    fn parse_tool_use_response() {
        let resp: AnthropicResponse = serde_json::from_str(
            r#"{
                "id": "msg_02",
                "model": "claude-sonnet-4-20250514",
                "content": [
                    {"type": "text", "text": "Calculating"},
                    {"type": "tool_use", "id": "toolu_abc", "name": "add", "input": {"a": 2, "b": 3}}
                ],
                "usage": {"input_tokens": 20, "output_tokens": 10},
                "stop_reason": "tool_use"
            }"#,
        )
        .unwrap();

        let pr = AnthropicProvider::response_to_provider_response(resp).unwrap();
        assert_eq!(pr.finish, FinishReason::ToolCalls);
        assert_eq!(pr.message.tool_calls.len(), 1);
        let args: serde_json::Value =
            serde_json::from_str(&pr.message.tool_calls[0].arguments).unwrap();
        assert_eq!(args["a"], 2);
    }

    #[test]
    fn custom_base_url_trims_slash() {
        let p = AnthropicProvider::new("sk-ant").with_base_url("https://proxy.example.com/");
        assert_eq!(p.base_url, "https://proxy.example.com");
    }
}
