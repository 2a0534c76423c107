//! Scripted providers for tests.
//!
//! `ScriptedProvider` returns a fixed sequence of responses, one per LLM
//! call, and records every request it saw. Streaming is derived from the
//! default `Provider::stream` implementation, which is exactly what the
//! loop consumes.

use async_trait::async_trait;
use std::sync::Mutex;

use agentgw_core::error::ProviderError;
use agentgw_core::message::{Message, MessageToolCall};
use agentgw_core::provider::{
    FinishReason, Provider, ProviderRequest, ProviderResponse, StreamChunk, Usage,
};

/// A provider that replays scripted responses in order.
///
/// Panics if more calls are made than responses were provided — a scripting
/// mistake in the test, not a runtime condition.
pub struct ScriptedProvider {
    responses: Mutex<Vec<ProviderResponse>>,
    requests: Mutex<Vec<ProviderRequest>>,
    cursor: Mutex<usize>,
}

impl ScriptedProvider {
    pub fn new(responses: Vec<ProviderResponse>) -> Self {
        Self {
            responses: Mutex::new(responses),
            requests: Mutex::new(Vec::new()),
            cursor: Mutex::new(0),
        }
    }

    /// One plain text response.
    pub fn single_text(text: &str) -> Self {
        Self::new(vec![text_response(text)])
    }

    /// How many calls were made.
    pub fn call_count(&self) -> usize {
        *self.cursor.lock().unwrap()
    }

    /// The recorded requests, in call order.
    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(
        &self,
        request: ProviderRequest,
    ) -> Result<ProviderResponse, ProviderError> {
        self.requests.lock().unwrap().push(request);

        let mut cursor = self.cursor.lock().unwrap();
        let responses = self.responses.lock().unwrap();
        if *cursor >= responses.len() {
            panic!(
                "ScriptedProvider: no response scripted for call #{} (have {})",
                *cursor + 1,
                responses.len()
            );
        }
        let response = responses[*cursor].clone();
        *cursor += 1;
        Ok(response)
    }
}

/// A provider that emits some text then drops the stream with an error.
pub struct InterruptedProvider {
    pub prefix: String,
}

#[async_trait]
impl Provider for InterruptedProvider {
    fn name(&self) -> &str {
        "interrupted"
    }

    async fn complete(
        &self,
        _request: ProviderRequest,
    ) -> Result<ProviderResponse, ProviderError> {
        Err(ProviderError::StreamInterrupted("connection reset".into()))
    }

    async fn stream(
        &self,
        _request: ProviderRequest,
    ) -> Result<
        tokio::sync::mpsc::Receiver<Result<StreamChunk, ProviderError>>,
        ProviderError,
    > {
        let (tx, rx) = tokio::sync::mpsc::channel(4);
        let prefix = self.prefix.clone();
        tokio::spawn(async move {
            if !prefix.is_empty() {
                let _ = tx.send(Ok(StreamChunk::text(prefix))).await;
            }
            let _ = tx
                .send(Err(ProviderError::StreamInterrupted("connection reset".into())))
                .await;
        });
        Ok(rx)
    }
}

/// A plain text response finishing with `stop`.
pub fn text_response(text: &str) -> ProviderResponse {
    ProviderResponse {
        message: Message::assistant(text),
        finish: FinishReason::Stop,
        usage: Some(Usage {
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 15,
        }),
        model: "scripted-model".into(),
    }
}

/// A response requesting tool calls, optionally with interleaved text.
pub fn tool_call_response(text: &str, tool_calls: Vec<MessageToolCall>) -> ProviderResponse {
    ProviderResponse {
        message: Message::assistant_with_tools(text, tool_calls),
        finish: FinishReason::ToolCalls,
        usage: None,
        model: "scripted-model".into(),
    }
}

/// A response truncated by the token limit.
pub fn length_response(text: &str) -> ProviderResponse {
    ProviderResponse {
        message: Message::assistant(text),
        finish: FinishReason::Length,
        usage: None,
        model: "scripted-model".into(),
    }
}

/// Shorthand for a tool call with JSON arguments.
pub fn tool_call(id: &str, name: &str, args: serde_json::Value) -> MessageToolCall {
    MessageToolCall {
        id: id.into(),
        name: name.into(),
        arguments: args.to_string(),
    }
}
