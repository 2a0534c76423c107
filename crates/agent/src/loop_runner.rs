//! The agent reasoning loop.
//!
//! One `AgentLoop` per in-flight request; it owns no long-lived state. The
//! loop streams the model's output, executes requested tools sequentially in
//! the order the model emitted them, persists every exchange as it happens,
//! and repeats until the model produces a final text answer or a limit is
//! hit.
//!
//! Failure semantics: tool failures are observations the model reacts to,
//! never fatal. Provider failures degrade the run — whatever text already
//! streamed is persisted with an interruption marker. Persistence failures
//! are fatal. Cancellation finishes the current suspension then aborts
//! without persisting the in-progress output.

use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use agentgw_core::error::Error;
use agentgw_core::event::{EventBus, EventKind};
use agentgw_core::message::{Message, MessageToolCall, Role};
use agentgw_core::provider::{FinishReason, Provider, ProviderRequest};
use agentgw_core::skill::Skill;
use agentgw_core::store::MessageStore;
use agentgw_core::tool::{ToolCall, ToolContext, ToolRegistry, ToolResult};
use agentgw_rag::store::DEFAULT_COLLECTION;
use agentgw_rag::VectorStore;

use crate::stream_event::AgentStreamEvent;

const MAX_ITERATIONS_TEXT: &str = "Maximum iterations reached.";
const TRUNCATED_MARKER: &str = "[truncated]";
const INTERRUPTED_MARKER: &str = " [response interrupted]";

/// The streaming reason–act coordinator for a single request.
pub struct AgentLoop {
    skill: Arc<Skill>,
    session_id: String,
    history: Vec<Message>,
    provider: Arc<dyn Provider>,
    tools: Arc<ToolRegistry>,
    store: Arc<dyn MessageStore>,
    events: Arc<EventBus>,
    rag: Option<Arc<VectorStore>>,
    default_model: String,
    max_tokens: Option<u32>,
    depth: usize,
    cancel: CancellationToken,
}

impl AgentLoop {
    /// Create a loop over an already-resolved skill and session.
    ///
    /// `history` is the session's persisted log; a trailing assistant
    /// message with unanswered tool calls (a cancelled run's tail) is
    /// compacted out of the prompt.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        skill: Arc<Skill>,
        session_id: impl Into<String>,
        history: Vec<Message>,
        provider: Arc<dyn Provider>,
        tools: Arc<ToolRegistry>,
        store: Arc<dyn MessageStore>,
        events: Arc<EventBus>,
    ) -> Self {
        Self {
            skill,
            session_id: session_id.into(),
            history: compact_resumed_history(history),
            provider,
            tools,
            store,
            events,
            rag: None,
            default_model: String::new(),
            max_tokens: None,
            depth: 0,
            cancel: CancellationToken::new(),
        }
    }

    /// Attach the vector store for retrieval injection.
    pub fn with_rag(mut self, rag: Arc<VectorStore>) -> Self {
        self.rag = Some(rag);
        self
    }

    /// Set the model used when the skill has no override.
    pub fn with_default_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = model.into();
        self
    }

    /// Cap tokens per LLM response.
    pub fn with_max_tokens(mut self, max: u32) -> Self {
        self.max_tokens = Some(max);
        self
    }

    /// Set the orchestration depth this loop runs at.
    pub fn with_depth(mut self, depth: usize) -> Self {
        self.depth = depth;
        self
    }

    /// Attach a cancellation handle.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Execute the loop, yielding streamed events. Consumes the loop — it is
    /// a transient coordinator for exactly one request.
    pub fn run(self, user_input: impl Into<String>) -> mpsc::Receiver<AgentStreamEvent> {
        let (tx, rx) = mpsc::channel(64);
        let user_input = user_input.into();
        tokio::spawn(async move {
            self.drive(user_input, tx).await;
        });
        rx
    }

    /// Non-streaming convenience: run and return the final text.
    pub async fn run_to_completion(self, user_input: impl Into<String>) -> Result<String, Error> {
        let mut rx = self.run(user_input);
        while let Some(event) = rx.recv().await {
            match event {
                AgentStreamEvent::Done { text, .. } => return Ok(text),
                AgentStreamEvent::Error { message } => return Err(Error::Internal(message)),
                _ => {}
            }
        }
        Err(Error::Cancelled)
    }

    async fn drive(mut self, user_input: String, tx: mpsc::Sender<AgentStreamEvent>) {
        info!(
            session_id = %self.session_id,
            skill = %self.skill.name,
            depth = self.depth,
            "Agent run starting"
        );

        let user_msg = Message::user(&user_input);
        if !self.persist(&user_msg, &tx).await {
            return;
        }
        self.history.push(user_msg);

        let tool_defs = self.tools.definitions_for(&self.skill.tools);
        let model = self
            .skill
            .model
            .clone()
            .unwrap_or_else(|| self.default_model.clone());
        let ctx = ToolContext::at_depth(self.depth).for_skill(&self.skill.name);

        for iteration in 1..=self.skill.max_iterations {
            if self.cancel.is_cancelled() {
                debug!(session_id = %self.session_id, "Run cancelled at iteration boundary");
                return;
            }

            debug!(
                session_id = %self.session_id,
                iteration,
                max = self.skill.max_iterations,
                "Agent loop iteration"
            );

            let request = ProviderRequest {
                model: model.clone(),
                messages: self.assemble_prompt().await,
                temperature: self.skill.temperature,
                max_tokens: self.max_tokens,
                tools: tool_defs.clone(),
            };

            let mut stream = match self.provider.stream(request).await {
                Ok(stream) => stream,
                Err(e) => {
                    warn!(session_id = %self.session_id, error = %e, "Provider request failed");
                    self.finish_with_text(&tx, format!("Provider error: {e}"), iteration)
                        .await;
                    return;
                }
            };

            let mut content = String::new();
            let mut tool_calls: Vec<MessageToolCall> = Vec::new();
            let mut finish: Option<FinishReason> = None;
            let mut interrupted = false;

            while let Some(item) = stream.recv().await {
                if self.cancel.is_cancelled() {
                    debug!(session_id = %self.session_id, "Run cancelled mid-stream");
                    return;
                }
                match item {
                    Ok(chunk) => {
                        if let Some(delta) = chunk.content {
                            content.push_str(&delta);
                            if tx
                                .send(AgentStreamEvent::Chunk { content: delta })
                                .await
                                .is_err()
                            {
                                // Receiver gone — treat as cancellation
                                self.cancel.cancel();
                                return;
                            }
                        }
                        if !chunk.tool_calls.is_empty() {
                            tool_calls = chunk.tool_calls;
                        }
                        if let Some(reason) = chunk.finish {
                            finish = Some(reason);
                        }
                    }
                    Err(e) => {
                        warn!(session_id = %self.session_id, error = %e, "Provider stream interrupted");
                        interrupted = true;
                        break;
                    }
                }
            }

            if interrupted || finish == Some(FinishReason::Error) {
                let text = if content.is_empty() {
                    "The provider reported an error before any output.".to_string()
                } else {
                    format!("{content}{INTERRUPTED_MARKER}")
                };
                self.finish_with_text(&tx, text, iteration).await;
                return;
            }

            if finish == Some(FinishReason::Length) {
                self.finish_with_text(&tx, format!("{content}{TRUNCATED_MARKER}"), iteration)
                    .await;
                return;
            }

            if tool_calls.is_empty() {
                // Final text answer
                let assistant = Message::assistant(&content);
                if !self.persist(&assistant, &tx).await {
                    return;
                }
                self.history.push(assistant);
                let _ = tx
                    .send(AgentStreamEvent::Done {
                        session_id: self.session_id.clone(),
                        text: content,
                        iterations: iteration,
                    })
                    .await;
                return;
            }

            // Tool-call turn. Text emitted alongside the calls stays as this
            // turn's assistant content, persisted before the tool messages.
            let assistant = Message::assistant_with_tools(&content, tool_calls.clone());
            if !self.persist(&assistant, &tx).await {
                return;
            }
            self.history.push(assistant);

            for tc in tool_calls {
                if self.cancel.is_cancelled() {
                    debug!(session_id = %self.session_id, "Run cancelled between tool calls");
                    return;
                }

                let arguments: serde_json::Value =
                    serde_json::from_str(&tc.arguments).unwrap_or(serde_json::json!({}));

                let _ = tx
                    .send(AgentStreamEvent::ToolCall {
                        id: tc.id.clone(),
                        name: tc.name.clone(),
                        input: arguments.clone(),
                    })
                    .await;

                let result = if !self.skill.allows_tool(&tc.name) {
                    ToolResult::error(
                        &tc.id,
                        format!("Tool '{}' is not allowed for this skill", tc.name),
                    )
                } else {
                    let call = ToolCall {
                        id: tc.id.clone(),
                        name: tc.name.clone(),
                        arguments,
                    };
                    self.tools.invoke(&call, &ctx).await
                };

                // A cancel that raced the handler: drop its result unpersisted.
                if self.cancel.is_cancelled() {
                    debug!(session_id = %self.session_id, tool = %tc.name, "Run cancelled during tool execution");
                    return;
                }

                self.events.publish(
                    EventKind::ToolExecuted,
                    serde_json::json!({
                        "session_id": self.session_id,
                        "tool": tc.name,
                        "success": result.success,
                    }),
                );

                let tool_msg = Message::tool_result(&tc.id, &result.output);
                if !self.persist(&tool_msg, &tx).await {
                    return;
                }
                self.history.push(tool_msg);

                let _ = tx
                    .send(AgentStreamEvent::ToolResult {
                        id: tc.id,
                        name: tc.name,
                        output: result.output,
                        success: result.success,
                    })
                    .await;
            }
            // Loop back — the model sees the tool results next iteration.
        }

        warn!(
            session_id = %self.session_id,
            max = self.skill.max_iterations,
            "Max iterations reached"
        );
        self.finish_with_text(&tx, MAX_ITERATIONS_TEXT.to_string(), self.skill.max_iterations)
            .await;
    }

    /// Persist a terminal assistant message and emit `Done`.
    async fn finish_with_text(
        &self,
        tx: &mpsc::Sender<AgentStreamEvent>,
        text: String,
        iterations: u32,
    ) {
        let assistant = Message::assistant(&text);
        if !self.persist(&assistant, tx).await {
            return;
        }
        let _ = tx
            .send(AgentStreamEvent::Done {
                session_id: self.session_id.clone(),
                text,
                iterations,
            })
            .await;
    }

    /// Append to the store. A failure is fatal to the request: an `Error`
    /// event is emitted and the caller must return.
    async fn persist(&self, message: &Message, tx: &mpsc::Sender<AgentStreamEvent>) -> bool {
        match self.store.append(&self.session_id, message).await {
            Ok(()) => true,
            Err(e) => {
                warn!(session_id = %self.session_id, error = %e, "Persistence failed");
                let _ = tx
                    .send(AgentStreamEvent::Error {
                        message: format!("Persistence failed: {e}"),
                    })
                    .await;
                false
            }
        }
    }

    /// Build the message sequence for the provider:
    /// skill system prompt, retrieved context (second system message),
    /// few-shot examples, then the session history including the new input.
    async fn assemble_prompt(&self) -> Vec<Message> {
        let mut messages = vec![Message::system(&self.skill.system_prompt)];

        if let (Some(rag_cfg), Some(rag)) = (&self.skill.rag_context, &self.rag) {
            if rag_cfg.enabled {
                if let Some(context) = self.retrieve_context(rag, rag_cfg).await {
                    messages.push(Message::system(context));
                }
            }
        }

        for example in &self.skill.examples {
            if let Some(user) = &example.user {
                messages.push(Message::user(user));
            }
            if let Some(assistant) = &example.assistant {
                messages.push(Message::assistant(assistant));
            }
        }

        messages.extend(self.history.iter().cloned());
        messages
    }

    /// Run the retrieval query for this turn. Retrieval failures degrade to
    /// "no context" — they never kill the request.
    async fn retrieve_context(
        &self,
        rag: &VectorStore,
        cfg: &agentgw_core::skill::RagContextConfig,
    ) -> Option<String> {
        let query = self
            .history
            .iter()
            .rev()
            .find(|m| m.role == Role::User && !m.content.is_empty())
            .map(|m| m.content.clone())?;

        let skills_filter = cfg
            .skills
            .clone()
            .unwrap_or_else(|| vec![self.skill.name.clone()]);

        match rag
            .search(&query, DEFAULT_COLLECTION, &skills_filter, &cfg.tags, cfg.top_k)
            .await
        {
            Ok(hits) if !hits.is_empty() => {
                debug!(
                    session_id = %self.session_id,
                    chunks = hits.len(),
                    "Injecting retrieved context"
                );
                let block = hits
                    .iter()
                    .map(|h| h.text.as_str())
                    .collect::<Vec<_>>()
                    .join("\n---\n");
                Some(format!("## Relevant Knowledge Base Context\n{block}"))
            }
            Ok(_) => None,
            Err(e) => {
                warn!(session_id = %self.session_id, error = %e, "Retrieval failed, continuing without context");
                None
            }
        }
    }
}

/// Drop a trailing assistant message whose tool calls were never answered —
/// the tail a cancelled run leaves behind. The stored log keeps it; only the
/// rebuilt prompt is compacted.
fn compact_resumed_history(mut history: Vec<Message>) -> Vec<Message> {
    while history
        .last()
        .is_some_and(|m| m.requests_tools())
    {
        history.pop();
    }
    history
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::*;
    use agentgw_memory::SqliteStore;
    use agentgw_rag::LocalEmbedder;
    use async_trait::async_trait;
    use agentgw_core::error::ToolError;
    use agentgw_core::tool::Tool;

    struct AddTool;

    #[async_trait]
    impl Tool for AddTool {
        fn name(&self) -> &str {
            "add"
        }
        fn description(&self) -> &str {
            "Add two integers"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({
                "type": "object",
                "properties": {
                    "a": { "type": "integer" },
                    "b": { "type": "integer" }
                },
                "required": ["a", "b"]
            })
        }
        async fn execute(
            &self,
            arguments: serde_json::Value,
            _ctx: &ToolContext,
        ) -> Result<serde_json::Value, ToolError> {
            let a = arguments["a"].as_i64().unwrap_or(0);
            let b = arguments["b"].as_i64().unwrap_or(0);
            Ok(serde_json::json!(a + b))
        }
    }

    struct SlowTool;

    #[async_trait]
    impl Tool for SlowTool {
        fn name(&self) -> &str {
            "slow"
        }
        fn description(&self) -> &str {
            "Takes a while"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({ "type": "object", "properties": {} })
        }
        async fn execute(
            &self,
            _arguments: serde_json::Value,
            _ctx: &ToolContext,
        ) -> Result<serde_json::Value, ToolError> {
            tokio::time::sleep(std::time::Duration::from_millis(100)).await;
            Ok(serde_json::json!("done"))
        }
    }

    fn skill(tools: &[&str]) -> Arc<Skill> {
        Arc::new(Skill {
            name: "tester".into(),
            description: "Test skill".into(),
            system_prompt: "You are a test agent.".into(),
            tools: tools.iter().map(|s| s.to_string()).collect(),
            model: None,
            temperature: 0.7,
            max_iterations: 10,
            tags: vec![],
            examples: vec![],
            sub_agents: vec![],
            rag_context: None,
        })
    }

    fn registry() -> Arc<ToolRegistry> {
        let mut reg = ToolRegistry::new();
        reg.register(Box::new(AddTool));
        reg.register(Box::new(SlowTool));
        Arc::new(reg)
    }

    async fn store() -> Arc<SqliteStore> {
        let store = SqliteStore::open("sqlite::memory:").await.unwrap();
        Arc::new(store)
    }

    async fn new_session(store: &Arc<SqliteStore>) -> String {
        store.create_session("tester", None).await.unwrap()
    }

    fn build_loop(
        skill: Arc<Skill>,
        session_id: &str,
        provider: Arc<dyn Provider>,
        store: Arc<SqliteStore>,
    ) -> AgentLoop {
        AgentLoop::new(
            skill,
            session_id,
            vec![],
            provider,
            registry(),
            store,
            Arc::new(EventBus::default()),
        )
        .with_default_model("test-model")
    }

    async fn collect(mut rx: mpsc::Receiver<AgentStreamEvent>) -> Vec<AgentStreamEvent> {
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn no_tool_chat() {
        let store = store().await;
        let sid = new_session(&store).await;
        let provider = Arc::new(ScriptedProvider::single_text("hi"));

        let agent = build_loop(skill(&[]), &sid, provider, store.clone());
        let events = collect(agent.run("hello")).await;

        match events.last().unwrap() {
            AgentStreamEvent::Done { text, iterations, .. } => {
                assert_eq!(text, "hi");
                assert_eq!(*iterations, 1);
            }
            other => panic!("Expected Done, got {other:?}"),
        }

        let history = store.history(&sid).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].role, Role::User);
        assert_eq!(history[1].role, Role::Assistant);
        assert_eq!(history[1].content, "hi");
    }

    #[tokio::test]
    async fn single_tool_call_persists_full_sequence() {
        let store = store().await;
        let sid = new_session(&store).await;
        let provider = Arc::new(ScriptedProvider::new(vec![
            tool_call_response(
                "",
                vec![tool_call("call_1", "add", serde_json::json!({"a": 2, "b": 3}))],
            ),
            text_response("5"),
        ]));

        let agent = build_loop(skill(&["add"]), &sid, provider, store.clone());
        let final_text = agent.run_to_completion("add 2 and 3").await.unwrap();
        assert_eq!(final_text, "5");

        let history = store.history(&sid).await.unwrap();
        let roles: Vec<Role> = history.iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![Role::User, Role::Assistant, Role::Tool, Role::Assistant]
        );
        assert_eq!(history[1].tool_calls[0].name, "add");
        assert_eq!(history[2].tool_call_id.as_deref(), Some("call_1"));
        assert_eq!(history[2].content, "5");
        assert_eq!(history[3].content, "5");
    }

    #[tokio::test]
    async fn interleaved_text_is_persisted_before_tool_messages() {
        let store = store().await;
        let sid = new_session(&store).await;
        let provider = Arc::new(ScriptedProvider::new(vec![
            tool_call_response(
                "Let me add those",
                vec![tool_call("call_1", "add", serde_json::json!({"a": 1, "b": 1}))],
            ),
            text_response("2"),
        ]));

        let agent = build_loop(skill(&["add"]), &sid, provider, store.clone());
        agent.run_to_completion("1+1?").await.unwrap();

        let history = store.history(&sid).await.unwrap();
        assert_eq!(history[1].content, "Let me add those");
        assert!(history[1].requests_tools());
        assert_eq!(history[2].role, Role::Tool);
    }

    #[tokio::test]
    async fn disallowed_tool_becomes_error_observation() {
        let store = store().await;
        let sid = new_session(&store).await;
        let provider = Arc::new(ScriptedProvider::new(vec![
            tool_call_response(
                "",
                vec![tool_call("call_1", "add", serde_json::json!({"a": 1, "b": 1}))],
            ),
            text_response("I cannot use that tool."),
        ]));

        // Skill has no tools allowed
        let agent = build_loop(skill(&[]), &sid, provider, store.clone());
        let final_text = agent.run_to_completion("add").await.unwrap();
        assert_eq!(final_text, "I cannot use that tool.");

        let history = store.history(&sid).await.unwrap();
        assert_eq!(history[2].role, Role::Tool);
        assert!(history[2].content.contains("not allowed"));
    }

    #[tokio::test]
    async fn iteration_cap_produces_synthetic_answer() {
        let store = store().await;
        let sid = new_session(&store).await;

        // Always asks for another tool call
        let responses: Vec<_> = (0..3)
            .map(|i| {
                tool_call_response(
                    "",
                    vec![tool_call(
                        &format!("call_{i}"),
                        "add",
                        serde_json::json!({"a": 1, "b": 1}),
                    )],
                )
            })
            .collect();
        let provider = Arc::new(ScriptedProvider::new(responses));

        let mut capped = (*skill(&["add"])).clone();
        capped.max_iterations = 3;

        let agent = build_loop(Arc::new(capped), &sid, provider.clone(), store.clone());
        let final_text = agent.run_to_completion("loop forever").await.unwrap();
        assert_eq!(final_text, MAX_ITERATIONS_TEXT);
        assert_eq!(provider.call_count(), 3);

        // At most max_iterations assistant tool turns plus the synthetic one
        let history = store.history(&sid).await.unwrap();
        let assistant_turns = history.iter().filter(|m| m.role == Role::Assistant).count();
        assert_eq!(assistant_turns, 4);
    }

    #[tokio::test]
    async fn length_finish_appends_truncation_marker() {
        let store = store().await;
        let sid = new_session(&store).await;
        let provider = Arc::new(ScriptedProvider::new(vec![length_response("partial answ")]));

        let agent = build_loop(skill(&[]), &sid, provider, store.clone());
        let final_text = agent.run_to_completion("long question").await.unwrap();
        assert_eq!(final_text, "partial answ[truncated]");
    }

    #[tokio::test]
    async fn provider_interruption_persists_partial_text() {
        let store = store().await;
        let sid = new_session(&store).await;
        let provider = Arc::new(InterruptedProvider {
            prefix: "partial thought".into(),
        });

        let agent = build_loop(skill(&[]), &sid, provider, store.clone());
        let final_text = agent.run_to_completion("q").await.unwrap();
        assert_eq!(final_text, "partial thought [response interrupted]");

        let history = store.history(&sid).await.unwrap();
        assert_eq!(history[1].content, "partial thought [response interrupted]");
    }

    #[tokio::test]
    async fn cancellation_during_tool_skips_tool_message() {
        let store = store().await;
        let sid = new_session(&store).await;
        let provider = Arc::new(ScriptedProvider::new(vec![tool_call_response(
            "",
            vec![tool_call("call_1", "slow", serde_json::json!({}))],
        )]));

        let cancel = CancellationToken::new();
        let agent = build_loop(skill(&["slow"]), &sid, provider, store.clone())
            .with_cancellation(cancel.clone());

        let mut rx = agent.run("take your time");
        let mut saw_done = false;
        while let Some(event) = rx.recv().await {
            match event {
                AgentStreamEvent::ToolCall { .. } => cancel.cancel(),
                AgentStreamEvent::Done { .. } => saw_done = true,
                _ => {}
            }
        }
        assert!(!saw_done, "cancelled run must not complete");

        // The orphan assistant(tool_calls) tail remains; no tool message after it
        let history = store.history(&sid).await.unwrap();
        assert_eq!(history.len(), 2);
        assert!(history[1].requests_tools());
    }

    #[tokio::test]
    async fn resumed_history_compacts_orphan_tool_call_tail() {
        let history = vec![
            Message::user("q"),
            Message::assistant_with_tools(
                "",
                vec![tool_call("call_1", "slow", serde_json::json!({}))],
            ),
        ];
        let compacted = compact_resumed_history(history);
        assert_eq!(compacted.len(), 1);
        assert_eq!(compacted[0].role, Role::User);

        // Answered tool calls are kept
        let answered = vec![
            Message::user("q"),
            Message::assistant_with_tools(
                "",
                vec![tool_call("call_1", "add", serde_json::json!({}))],
            ),
            Message::tool_result("call_1", "2"),
        ];
        assert_eq!(compact_resumed_history(answered).len(), 3);
    }

    #[tokio::test]
    async fn few_shot_examples_precede_history() {
        let store = store().await;
        let sid = new_session(&store).await;
        let provider = Arc::new(ScriptedProvider::single_text("ok"));

        let mut with_examples = (*skill(&[])).clone();
        with_examples.examples = vec![agentgw_core::skill::SkillExample {
            user: Some("example question".into()),
            assistant: Some("example answer".into()),
        }];

        let agent = build_loop(Arc::new(with_examples), &sid, provider.clone(), store);
        agent.run_to_completion("real question").await.unwrap();

        let request = &provider.requests()[0];
        let contents: Vec<&str> = request.messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(
            contents,
            vec![
                "You are a test agent.",
                "example question",
                "example answer",
                "real question"
            ]
        );
    }

    #[tokio::test]
    async fn rag_context_is_injected_as_second_system_message() {
        let store = store().await;
        let sid = new_session(&store).await;
        let provider = Arc::new(ScriptedProvider::single_text("grounded answer"));

        let rag = Arc::new(VectorStore::in_memory(Arc::new(LocalEmbedder::new())));
        rag.ingest(
            "kb",
            "The release train departs every Tuesday.",
            vec!["tester".into()],
            vec![],
            DEFAULT_COLLECTION,
        )
        .await
        .unwrap();

        let mut rag_skill = (*skill(&[])).clone();
        rag_skill.rag_context = Some(agentgw_core::skill::RagContextConfig::default());

        let agent = build_loop(Arc::new(rag_skill), &sid, provider.clone(), store)
            .with_rag(rag);
        agent.run_to_completion("when is the release?").await.unwrap();

        let request = &provider.requests()[0];
        assert_eq!(request.messages[0].role, Role::System);
        assert_eq!(request.messages[1].role, Role::System);
        assert!(request.messages[1]
            .content
            .contains("release train departs"));
        assert!(request.messages[1]
            .content
            .starts_with("## Relevant Knowledge Base Context"));
    }

    #[tokio::test]
    async fn skill_model_overrides_default() {
        let store = store().await;
        let sid = new_session(&store).await;
        let provider = Arc::new(ScriptedProvider::single_text("ok"));

        let mut custom = (*skill(&[])).clone();
        custom.model = Some("special-model".into());

        let agent = build_loop(Arc::new(custom), &sid, provider.clone(), store);
        agent.run_to_completion("q").await.unwrap();

        assert_eq!(provider.requests()[0].model, "special-model");
    }

    #[tokio::test]
    async fn tool_schemas_are_filtered_to_allow_list() {
        let store = store().await;
        let sid = new_session(&store).await;
        let provider = Arc::new(ScriptedProvider::single_text("ok"));

        let agent = build_loop(skill(&["add"]), &sid, provider.clone(), store);
        agent.run_to_completion("q").await.unwrap();

        let tools = &provider.requests()[0].tools;
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].name, "add");
    }
}
