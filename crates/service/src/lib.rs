//! The central service object.
//!
//! One `AgentService` per daemon process. It owns every long-lived
//! subsystem — skill loader, tool registry, message store, vector store,
//! provider, event bus — and is shared by the HTTP gateway, the CLI, the
//! scheduler, and delegation. Per-session mutual exclusion lives here: no
//! two agent loops ever advance the same session concurrently.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use agentgw_agent::{AgentLoop, AgentStreamEvent, PlannerAgent, PlannerResult};
use agentgw_config::AppConfig;
use agentgw_core::delegate::Delegator;
use agentgw_core::error::{Error, SkillError};
use agentgw_core::event::{EventBus, EventKind};
use agentgw_core::message::Message;
use agentgw_core::provider::Provider;
use agentgw_core::session::Session;
use agentgw_core::skill::Skill;
use agentgw_core::store::MessageStore;
use agentgw_core::tool::ToolRegistry;
use agentgw_memory::SqliteStore;
use agentgw_providers::ProviderRouter;
use agentgw_rag::{DocumentPreview, Embedder, LocalEmbedder, ProviderEmbedder, VectorStore};
use agentgw_skills::SkillLoader;
use agentgw_tools::builtin_registry;

/// Central service shared by every front-end.
pub struct AgentService {
    config: AppConfig,
    skills: SkillLoader,
    tools: Arc<ToolRegistry>,
    store: Arc<dyn MessageStore>,
    rag: Arc<VectorStore>,
    provider: Arc<dyn Provider>,
    events: Arc<EventBus>,
    session_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    started_at: DateTime<Utc>,
}

impl AgentService {
    /// Build the service from configuration: providers from API keys, SQLite
    /// store, vector index, tool registry, and the skills directory.
    pub async fn new(config: AppConfig) -> Result<Arc<Self>, Error> {
        let router = ProviderRouter::from_config(&config)?;
        let provider = router.default_provider().ok_or_else(|| Error::Config {
            message: "default provider unavailable".into(),
        })?;

        if let Some(parent) = std::path::Path::new(&config.storage.sqlite_path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| Error::Config {
                    message: format!("cannot create data directory: {e}"),
                })?;
            }
        }
        let store = Arc::new(SqliteStore::open(&config.storage.sqlite_path).await?);

        let embedder: Arc<dyn Embedder> = match &config.llm.embedding_model {
            Some(model) => Arc::new(ProviderEmbedder::new(provider.clone(), model)),
            None => Arc::new(LocalEmbedder::new()),
        };
        let rag = Arc::new(VectorStore::open(&config.storage.index_path, embedder));

        Ok(Self::assemble(config, provider, store, rag))
    }

    /// Assemble from pre-built parts. This is also the seam tests use to
    /// inject scripted providers and in-memory stores.
    pub fn assemble(
        config: AppConfig,
        provider: Arc<dyn Provider>,
        store: Arc<dyn MessageStore>,
        rag: Arc<VectorStore>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak: &Weak<AgentService>| {
            let delegator: Weak<dyn Delegator> = weak.clone();
            let tools = Arc::new(builtin_registry(rag.clone(), delegator));

            let skills = SkillLoader::new(&config.skills_dir);
            let tool_names: Vec<String> =
                tools.names().iter().map(|s| s.to_string()).collect();
            let loaded = skills.load_all(&tool_names);
            info!(skills = loaded, "Service assembled");

            Self {
                config,
                skills,
                tools,
                store,
                rag,
                provider,
                events: Arc::new(EventBus::default()),
                session_locks: Mutex::new(HashMap::new()),
                started_at: Utc::now(),
            }
        })
    }

    // --- accessors ---

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn events(&self) -> Arc<EventBus> {
        self.events.clone()
    }

    pub fn provider(&self) -> Arc<dyn Provider> {
        self.provider.clone()
    }

    pub fn rag(&self) -> Arc<VectorStore> {
        self.rag.clone()
    }

    /// All loaded skills, sorted by name.
    pub fn skills(&self) -> Vec<Arc<Skill>> {
        self.skills.list()
    }

    /// Re-read the skills directory and atomically swap the loaded set.
    pub fn reload_skills(&self) -> usize {
        let tool_names: Vec<String> = self.tools.names().iter().map(|s| s.to_string()).collect();
        self.skills.reload(&tool_names)
    }

    // --- interactive surface ---

    /// Start a streaming chat run. Returns the session id and the event
    /// stream. The run task takes the per-session lock and only then
    /// snapshots history, so concurrent requests against one session queue
    /// up in order and each sees the turns the previous run persisted.
    pub async fn chat(
        &self,
        skill_name: &str,
        message: &str,
        session_id: Option<String>,
        cancel: CancellationToken,
    ) -> Result<(String, mpsc::Receiver<AgentStreamEvent>), Error> {
        let skill = self.resolve_skill(skill_name)?;
        let sid = self.resolve_session_id(&skill, session_id).await?;

        let lock = self.session_lock(&sid).await;
        let events = self.events.clone();
        let store = self.store.clone();
        let provider = self.provider.clone();
        let tools = self.tools.clone();
        let rag = self.rag.clone();
        let default_model = self.config.llm.model.clone();
        let max_tokens = self.config.llm.max_tokens;
        let (tx, rx) = mpsc::channel(64);

        let run_sid = sid.clone();
        let run_skill = skill.name.clone();
        let run_message = message.to_string();

        tokio::spawn(async move {
            let _guard = lock.lock_owned().await;

            // Snapshot history only now, under the lock — a queued request
            // must reason over the turns the previous holder persisted.
            let history = match store.history(&run_sid).await {
                Ok(history) => history,
                Err(e) => {
                    let _ = tx
                        .send(AgentStreamEvent::Error {
                            message: format!("Persistence failed: {e}"),
                        })
                        .await;
                    return;
                }
            };

            events.publish(
                EventKind::AgentStarted,
                serde_json::json!({ "session_id": run_sid, "skill": run_skill }),
            );

            let agent = AgentLoop::new(
                skill,
                &run_sid,
                history,
                provider,
                tools,
                store,
                events.clone(),
            )
            .with_rag(rag)
            .with_default_model(default_model)
            .with_max_tokens(max_tokens)
            .with_cancellation(cancel.clone());

            let mut inner = agent.run(run_message);
            let mut final_text: Option<String> = None;
            let mut failure: Option<String> = None;

            while let Some(event) = inner.recv().await {
                match &event {
                    AgentStreamEvent::Done { text, .. } => final_text = Some(text.clone()),
                    AgentStreamEvent::Error { message } => failure = Some(message.clone()),
                    _ => {}
                }
                if tx.send(event).await.is_err() {
                    // Client disconnected; stop the loop at its next check.
                    cancel.cancel();
                }
            }

            if let Some(error) = failure {
                events.publish(
                    EventKind::AgentFailed,
                    serde_json::json!({ "session_id": run_sid, "skill": run_skill, "error": error }),
                );
            } else if let Some(result) = final_text {
                events.publish(
                    EventKind::AgentCompleted,
                    serde_json::json!({ "session_id": run_sid, "skill": run_skill, "result": result }),
                );
            }
            // A cancelled run publishes neither — not an error for the session.
        });

        Ok((sid, rx))
    }

    /// Run a skill to completion. Returns `(session_id, final_text)`.
    pub async fn run(
        &self,
        skill_name: &str,
        message: &str,
        session_id: Option<String>,
    ) -> Result<(String, String), Error> {
        self.execute_run(skill_name, message, session_id, 0).await
    }

    async fn execute_run(
        &self,
        skill_name: &str,
        message: &str,
        session_id: Option<String>,
        depth: usize,
    ) -> Result<(String, String), Error> {
        let skill = self.resolve_skill(skill_name)?;
        let sid = self.resolve_session_id(&skill, session_id).await?;

        let lock = self.session_lock(&sid).await;
        let _guard = lock.lock_owned().await;

        // Snapshot history under the lock, not before it.
        let history = self.store.history(&sid).await?;

        self.events.publish(
            EventKind::AgentStarted,
            serde_json::json!({ "session_id": sid, "skill": skill.name }),
        );

        let agent = self.build_loop(skill.clone(), &sid, history, depth, CancellationToken::new());

        match agent.run_to_completion(message).await {
            Ok(text) => {
                self.events.publish(
                    EventKind::AgentCompleted,
                    serde_json::json!({ "session_id": sid, "skill": skill.name, "result": text }),
                );
                Ok((sid, text))
            }
            Err(e) => {
                self.events.publish(
                    EventKind::AgentFailed,
                    serde_json::json!({ "session_id": sid, "skill": skill.name, "error": e.to_string() }),
                );
                Err(e)
            }
        }
    }

    /// Route a message to the best-suited skill.
    pub async fn route(&self, message: &str) -> Result<PlannerResult, Error> {
        let planner = PlannerAgent::new(self.provider.clone(), self.config.llm.model.clone());
        planner.route(&self.skills.list(), message).await
    }

    // --- knowledge surface ---

    /// Ingest text into the knowledge base. Returns the chunk count.
    pub async fn ingest(
        &self,
        source: &str,
        text: &str,
        skills: Vec<String>,
        tags: Vec<String>,
        collection: &str,
    ) -> Result<usize, Error> {
        self.rag.ingest(source, text, skills, tags, collection).await
    }

    /// List chunk previews.
    pub async fn documents(
        &self,
        collection: &str,
        skills: &[String],
        source: Option<&str>,
        limit: usize,
    ) -> Vec<DocumentPreview> {
        self.rag.list(collection, skills, source, limit).await
    }

    /// Delete documents by ids or by source. Returns the number removed.
    pub async fn delete_documents(
        &self,
        collection: &str,
        ids: &[String],
        source: Option<&str>,
    ) -> usize {
        let mut removed = 0;
        if !ids.is_empty() {
            removed += self.rag.delete(collection, ids).await;
        }
        if let Some(source) = source {
            removed += self.rag.delete_by_source(collection, source).await;
        }
        removed
    }

    // --- sessions & feedback ---

    pub async fn sessions(
        &self,
        skill_name: Option<&str>,
        limit: usize,
    ) -> Result<Vec<Session>, Error> {
        Ok(self.store.list_sessions(skill_name, limit).await?)
    }

    pub async fn session_messages(&self, session_id: &str) -> Result<Vec<Message>, Error> {
        Ok(self.store.history(session_id).await?)
    }

    /// Record feedback on a message. Idempotent; resubmitting replaces.
    pub async fn feedback(&self, message_id: &str, value: i64) -> Result<(), Error> {
        if value != 1 && value != -1 {
            return Err(Error::Internal(format!(
                "feedback value must be +1 or -1, got {value}"
            )));
        }
        self.store.set_feedback(message_id, value).await?;
        self.events.publish(
            EventKind::FeedbackReceived,
            serde_json::json!({ "message_id": message_id, "value": value }),
        );
        Ok(())
    }

    /// Service status for `/daemon/status` and the CLI.
    pub fn status(&self) -> serde_json::Value {
        serde_json::json!({
            "status": "running",
            "provider": self.provider.name(),
            "model": self.config.llm.model,
            "skills": self.skills.names(),
            "started_at": self.started_at.to_rfc3339(),
        })
    }

    // --- internals ---

    fn resolve_skill(&self, skill_name: &str) -> Result<Arc<Skill>, Error> {
        self.skills
            .get(skill_name)
            .ok_or_else(|| SkillError::NotFound(skill_name.to_string()).into())
    }

    /// Resolve the session id: resume an existing session or create one
    /// (implicitly, or with a client-chosen id). History is deliberately
    /// not read here — each run snapshots it under the per-session lock.
    async fn resolve_session_id(
        &self,
        skill: &Skill,
        session_id: Option<String>,
    ) -> Result<String, Error> {
        match session_id {
            Some(id) => {
                if self.store.session(&id).await?.is_some() {
                    info!(session_id = %id, "Resuming session");
                } else {
                    self.store.create_session(&skill.name, Some(&id)).await?;
                    self.publish_session_created(&id, &skill.name);
                }
                Ok(id)
            }
            None => {
                let id = self.store.create_session(&skill.name, None).await?;
                self.publish_session_created(&id, &skill.name);
                Ok(id)
            }
        }
    }

    fn publish_session_created(&self, session_id: &str, skill_name: &str) {
        self.events.publish(
            EventKind::SessionCreated,
            serde_json::json!({ "session_id": session_id, "skill": skill_name }),
        );
    }

    fn build_loop(
        &self,
        skill: Arc<Skill>,
        session_id: &str,
        history: Vec<Message>,
        depth: usize,
        cancel: CancellationToken,
    ) -> AgentLoop {
        AgentLoop::new(
            skill,
            session_id,
            history,
            self.provider.clone(),
            self.tools.clone(),
            self.store.clone(),
            self.events.clone(),
        )
        .with_rag(self.rag.clone())
        .with_default_model(&self.config.llm.model)
        .with_max_tokens(self.config.llm.max_tokens)
        .with_depth(depth)
        .with_cancellation(cancel)
    }

    async fn session_lock(&self, session_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.session_locks.lock().await;
        locks
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

#[async_trait]
impl Delegator for AgentService {
    fn has_skill(&self, skill_name: &str) -> bool {
        self.skills.contains(skill_name)
    }

    fn max_orchestration_depth(&self) -> usize {
        self.config.agent.max_orchestration_depth
    }

    /// Run a sub-agent in a fresh session at the given depth. No history
    /// sharing with the parent, and no cancellation inheritance — every
    /// sub-run gets its own token.
    async fn delegate(
        &self,
        skill_name: &str,
        task: &str,
        depth: usize,
    ) -> Result<String, Error> {
        match self.execute_run(skill_name, task, None, depth).await {
            Ok((_, text)) => Ok(text),
            Err(e) => {
                warn!(skill = %skill_name, error = %e, "Delegated run failed");
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentgw_agent::mocks::*;
    use agentgw_core::message::Role;

    struct TempSkillsDir {
        path: std::path::PathBuf,
    }

    impl TempSkillsDir {
        fn new() -> Self {
            let path =
                std::env::temp_dir().join(format!("agentgw-service-{}", uuid::Uuid::new_v4()));
            std::fs::create_dir_all(&path).unwrap();
            Self { path }
        }

        fn write(&self, name: &str, content: &str) {
            std::fs::write(self.path.join(name), content).unwrap();
        }
    }

    impl Drop for TempSkillsDir {
        fn drop(&mut self) {
            let _ = std::fs::remove_dir_all(&self.path);
        }
    }

    async fn service_with(
        dir: &TempSkillsDir,
        provider: Arc<dyn Provider>,
        max_depth: usize,
    ) -> Arc<AgentService> {
        let mut config = AppConfig::default();
        config.skills_dir = dir.path.to_string_lossy().to_string();
        config.agent.max_orchestration_depth = max_depth;
        config.llm.model = "test-model".into();

        let store = Arc::new(SqliteStore::open("sqlite::memory:").await.unwrap());
        let rag = Arc::new(VectorStore::in_memory(Arc::new(LocalEmbedder::new())));
        AgentService::assemble(config, provider, store, rag)
    }

    const PLAIN_SKILL: &str = r#"
name: plain
description: Just answers
system_prompt: Answer briefly.
"#;

    const LEAD_SKILL: &str = r#"
name: lead
description: Delegates work
system_prompt: Delegate when useful.
tools: [delegate_to_agent]
"#;

    const WORKER_SKILL: &str = r#"
name: worker
description: Does the work, sometimes recursively
system_prompt: Work hard.
tools: [delegate_to_agent]
"#;

    #[tokio::test]
    async fn run_creates_session_and_persists() {
        let dir = TempSkillsDir::new();
        dir.write("plain.yaml", PLAIN_SKILL);

        let provider = Arc::new(ScriptedProvider::single_text("short answer"));
        let service = service_with(&dir, provider, 3).await;

        let (sid, text) = service.run("plain", "question?", None).await.unwrap();
        assert_eq!(text, "short answer");

        let messages = service.session_messages(&sid).await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::User);
        assert_eq!(messages[1].content, "short answer");

        let sessions = service.sessions(None, 10).await.unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].skill_name, "plain");
    }

    #[tokio::test]
    async fn unknown_skill_is_an_error() {
        let dir = TempSkillsDir::new();
        let provider = Arc::new(ScriptedProvider::new(vec![]));
        let service = service_with(&dir, provider, 3).await;

        let err = service.run("ghost", "hi", None).await.unwrap_err();
        assert!(matches!(err, Error::Skill(SkillError::NotFound(_))));
    }

    #[tokio::test]
    async fn resume_appends_to_existing_session() {
        let dir = TempSkillsDir::new();
        dir.write("plain.yaml", PLAIN_SKILL);

        let provider = Arc::new(ScriptedProvider::new(vec![
            text_response("first"),
            text_response("second"),
        ]));
        let service = service_with(&dir, provider.clone(), 3).await;

        let (sid, _) = service.run("plain", "one", None).await.unwrap();
        let (sid2, _) = service.run("plain", "two", Some(sid.clone())).await.unwrap();
        assert_eq!(sid, sid2);

        let messages = service.session_messages(&sid).await.unwrap();
        assert_eq!(messages.len(), 4);

        // Second request's prompt included the first exchange
        let second_request = &provider.requests()[1];
        let contents: Vec<&str> = second_request
            .messages
            .iter()
            .map(|m| m.content.as_str())
            .collect();
        assert!(contents.contains(&"one"));
        assert!(contents.contains(&"first"));
    }

    /// Provider whose completions block until the test releases a permit.
    /// Lets a test hold one run mid-LLM-call while another queues behind
    /// the session lock.
    struct GatedProvider {
        inner: ScriptedProvider,
        gate: Arc<tokio::sync::Semaphore>,
    }

    #[async_trait]
    impl Provider for GatedProvider {
        fn name(&self) -> &str {
            "gated"
        }

        async fn complete(
            &self,
            request: agentgw_core::provider::ProviderRequest,
        ) -> Result<agentgw_core::provider::ProviderResponse, agentgw_core::error::ProviderError>
        {
            // Record the call first, then hold the response until released —
            // the run stays observably "inside" its LLM call.
            let response = self.inner.complete(request).await?;
            let permit = self.gate.acquire().await.map_err(|_| {
                agentgw_core::error::ProviderError::Network("gate closed".into())
            })?;
            permit.forget();
            Ok(response)
        }
    }

    #[tokio::test]
    async fn concurrent_runs_on_one_session_are_serialized() {
        let dir = TempSkillsDir::new();
        dir.write("plain.yaml", PLAIN_SKILL);

        let gate = Arc::new(tokio::sync::Semaphore::new(0));
        let provider = Arc::new(GatedProvider {
            inner: ScriptedProvider::new(vec![text_response("first"), text_response("second")]),
            gate: gate.clone(),
        });
        let service = service_with(&dir, provider.clone(), 3).await;

        // First run takes the session lock and blocks inside its LLM call
        let svc = service.clone();
        let first = tokio::spawn(async move {
            svc.run("plain", "one", Some("shared".into())).await
        });
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        // Second run against the same session queues behind the lock
        let svc = service.clone();
        let second = tokio::spawn(async move {
            svc.run("plain", "two", Some("shared".into())).await
        });
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        // Only the lock holder has reached the provider so far
        assert_eq!(provider.inner.call_count(), 1);

        gate.add_permits(2);
        let (_, first_text) = first.await.unwrap().unwrap();
        let (_, second_text) = second.await.unwrap().unwrap();
        assert_eq!(first_text, "first");
        assert_eq!(second_text, "second");

        // The queued run's prompt was snapshotted under the lock, so it
        // includes the first run's full exchange
        let requests = provider.inner.requests();
        assert_eq!(requests.len(), 2);
        let second_prompt: Vec<&str> = requests[1]
            .messages
            .iter()
            .map(|m| m.content.as_str())
            .collect();
        assert!(second_prompt.contains(&"one"));
        assert!(second_prompt.contains(&"first"));
        assert!(second_prompt.contains(&"two"));

        // And the persisted transcript is strictly ordered end-to-end
        let messages = service.session_messages("shared").await.unwrap();
        let contents: Vec<&str> = messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["one", "first", "two", "second"]);
    }

    #[tokio::test]
    async fn delegation_observes_depth_limit() {
        let dir = TempSkillsDir::new();
        dir.write("lead.yaml", LEAD_SKILL);
        dir.write("worker.yaml", WORKER_SKILL);

        // Global call order across sessions:
        // 1. lead asks to delegate to worker
        // 2. worker asks to delegate again (will be refused at depth 1)
        // 3. worker's final answer, having seen the refusal
        // 4. lead's final answer
        let provider = Arc::new(ScriptedProvider::new(vec![
            tool_call_response(
                "",
                vec![tool_call(
                    "call_a",
                    "delegate_to_agent",
                    serde_json::json!({"skill_name": "worker", "task": "dig"}),
                )],
            ),
            tool_call_response(
                "",
                vec![tool_call(
                    "call_b",
                    "delegate_to_agent",
                    serde_json::json!({"skill_name": "worker", "task": "dig deeper"}),
                )],
            ),
            text_response("inner done"),
            text_response("outer done"),
        ]));

        let service = service_with(&dir, provider, 1).await;

        let (lead_sid, text) = service.run("lead", "start", None).await.unwrap();
        assert_eq!(text, "outer done");

        // The lead session's tool observation carries the worker result
        let lead_messages = service.session_messages(&lead_sid).await.unwrap();
        let lead_tool_msg = lead_messages
            .iter()
            .find(|m| m.role == Role::Tool)
            .unwrap();
        assert!(lead_tool_msg.content.contains("\"status\":\"ok\""));
        assert!(lead_tool_msg.content.contains("inner done"));
        assert!(lead_tool_msg.content.contains("\"depth\":1"));

        // The worker session saw its own delegation refused with depth data
        let sessions = service.sessions(Some("worker"), 10).await.unwrap();
        assert_eq!(sessions.len(), 1);
        let worker_messages = service
            .session_messages(&sessions[0].id)
            .await
            .unwrap();
        let refusal = worker_messages
            .iter()
            .find(|m| m.role == Role::Tool)
            .unwrap();
        assert!(refusal.content.contains("Maximum orchestration depth"));
        assert!(refusal.content.contains("\"current_depth\":1"));
    }

    #[tokio::test]
    async fn chat_streams_and_completes() {
        let dir = TempSkillsDir::new();
        dir.write("plain.yaml", PLAIN_SKILL);

        let provider = Arc::new(ScriptedProvider::single_text("streamed"));
        let service = service_with(&dir, provider, 3).await;

        let mut events_rx = service.events().subscribe();
        let (sid, mut rx) = service
            .chat("plain", "hello", None, CancellationToken::new())
            .await
            .unwrap();
        assert!(!sid.is_empty());

        let mut chunks = String::new();
        let mut done = false;
        while let Some(event) = rx.recv().await {
            match event {
                AgentStreamEvent::Chunk { content } => chunks.push_str(&content),
                AgentStreamEvent::Done { text, .. } => {
                    assert_eq!(text, "streamed");
                    done = true;
                }
                _ => {}
            }
        }
        assert!(done);
        assert_eq!(chunks, "streamed");

        // session.created, agent.started, agent.completed all published
        let mut kinds = Vec::new();
        while let Ok(event) = events_rx.try_recv() {
            kinds.push(event.kind);
        }
        assert!(kinds.contains(&EventKind::SessionCreated));
        assert!(kinds.contains(&EventKind::AgentStarted));
        assert!(kinds.contains(&EventKind::AgentCompleted));
    }

    #[tokio::test]
    async fn feedback_validates_and_publishes() {
        let dir = TempSkillsDir::new();
        dir.write("plain.yaml", PLAIN_SKILL);
        let provider = Arc::new(ScriptedProvider::single_text("answer"));
        let service = service_with(&dir, provider, 3).await;

        let (sid, _) = service.run("plain", "q", None).await.unwrap();
        let messages = service.session_messages(&sid).await.unwrap();
        let assistant_id = &messages[1].id;

        let mut events_rx = service.events().subscribe();
        service.feedback(assistant_id, 1).await.unwrap();
        service.feedback(assistant_id, -1).await.unwrap();
        assert!(service.feedback(assistant_id, 5).await.is_err());

        let event = events_rx.recv().await.unwrap();
        assert_eq!(event.kind, EventKind::FeedbackReceived);
        assert_eq!(event.data["value"], 1);
    }

    #[tokio::test]
    async fn ingest_and_documents_roundtrip() {
        let dir = TempSkillsDir::new();
        let provider = Arc::new(ScriptedProvider::new(vec![]));
        let service = service_with(&dir, provider, 3).await;

        let added = service
            .ingest("manual", "Some knowledge to keep", vec![], vec![], "default")
            .await
            .unwrap();
        assert_eq!(added, 1);

        let docs = service.documents("default", &[], None, 10).await;
        assert_eq!(docs.len(), 1);

        let removed = service
            .delete_documents("default", &[], Some("manual"))
            .await;
        assert_eq!(removed, 1);
    }

    #[tokio::test]
    async fn status_reports_provider_and_skills() {
        let dir = TempSkillsDir::new();
        dir.write("plain.yaml", PLAIN_SKILL);
        let provider = Arc::new(ScriptedProvider::new(vec![]));
        let service = service_with(&dir, provider, 3).await;

        let status = service.status();
        assert_eq!(status["status"], "running");
        assert_eq!(status["provider"], "scripted");
        assert_eq!(status["skills"][0], "plain");
    }
}
