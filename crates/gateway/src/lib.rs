//! HTTP API gateway for agentgw.
//!
//! A thin Axum shell over the service object: SSE streaming chat, JSON run,
//! knowledge management, sessions, and feedback. When an API key is
//! configured, every `/api/*` request must carry `Authorization: Bearer`
//! with it; `/health`, `/`, and `/daemon/status` stay public.

use axum::{
    extract::{Path, Query, Request, State},
    http::StatusCode,
    middleware::Next,
    response::sse::{Event as SseEvent, KeepAlive, Sse},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use std::convert::Infallible;
use std::sync::Arc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::info;

use agentgw_agent::AgentStreamEvent;
use agentgw_core::error::{Error, SkillError};
use agentgw_scheduler::CronScheduler;
use agentgw_service::AgentService;

/// Shared gateway state.
pub struct GatewayState {
    pub service: Arc<AgentService>,
    pub scheduler: Option<Arc<CronScheduler>>,
    pub api_key: Option<String>,
}

type SharedState = Arc<GatewayState>;

/// Build the full router.
pub fn build_router(state: SharedState) -> Router {
    let api = Router::new()
        .route("/chat", post(chat_handler))
        .route("/run", post(run_handler))
        .route("/route", post(route_handler))
        .route("/ingest", post(ingest_handler))
        .route(
            "/documents",
            get(documents_handler).delete(delete_documents_handler),
        )
        .route("/feedback", post(feedback_handler))
        .route("/skills", get(skills_handler))
        .route("/sessions", get(sessions_handler))
        .route("/sessions/:id/messages", get(session_messages_handler))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            require_api_key,
        ))
        .with_state(state.clone());

    Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
        .route("/daemon/status", get(daemon_status_handler))
        .with_state(state)
        .nest("/api", api)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

/// Serve the gateway until the listener fails or the process exits.
pub async fn serve(state: SharedState, host: &str, port: u16) -> Result<(), std::io::Error> {
    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(addr = %addr, "Gateway listening");
    axum::serve(listener, build_router(state)).await
}

// --- auth ---

/// Bearer-token check for `/api/*`. No configured key = open access.
async fn require_api_key(
    State(state): State<SharedState>,
    request: Request,
    next: Next,
) -> Response {
    let Some(expected) = &state.api_key else {
        return next.run(request).await;
    };

    let provided = request
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    if provided == Some(expected.as_str()) {
        next.run(request).await
    } else {
        (
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({ "error": "Invalid or missing API key" })),
        )
            .into_response()
    }
}

// --- error mapping ---

struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            Error::Skill(SkillError::NotFound(_)) => StatusCode::NOT_FOUND,
            Error::Internal(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (
            status,
            Json(serde_json::json!({ "error": self.0.to_string() })),
        )
            .into_response()
    }
}

// --- request/response bodies ---

#[derive(Deserialize)]
struct ChatRequest {
    skill_name: String,
    message: String,
    #[serde(default)]
    session_id: Option<String>,
}

#[derive(Deserialize)]
struct RouteRequest {
    message: String,
}

#[derive(Deserialize)]
struct IngestRequest {
    text: String,
    #[serde(default = "default_source")]
    source: String,
    #[serde(default)]
    skills: Vec<String>,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default = "default_collection")]
    collection: String,
}

fn default_source() -> String {
    "manual".into()
}

fn default_collection() -> String {
    "default".into()
}

#[derive(Deserialize)]
struct FeedbackRequest {
    message_id: String,
    value: i64,
}

#[derive(Deserialize)]
struct DocumentsQuery {
    #[serde(default = "default_collection")]
    collection: String,
    #[serde(default)]
    skills: Option<String>,
    #[serde(default)]
    source: Option<String>,
    #[serde(default = "default_limit")]
    limit: usize,
}

fn default_limit() -> usize {
    100
}

#[derive(Deserialize)]
struct DeleteDocumentsQuery {
    #[serde(default = "default_collection")]
    collection: String,
    #[serde(default)]
    ids: Option<String>,
    #[serde(default)]
    source: Option<String>,
}

#[derive(Deserialize)]
struct SessionsQuery {
    #[serde(default)]
    skill: Option<String>,
    #[serde(default = "default_sessions_limit")]
    limit: usize,
}

fn default_sessions_limit() -> usize {
    20
}

fn split_csv(raw: &Option<String>) -> Vec<String> {
    raw.as_deref()
        .map(|s| {
            s.split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(String::from)
                .collect()
        })
        .unwrap_or_default()
}

// --- handlers ---

async fn root_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "name": "agentgw", "version": env!("CARGO_PKG_VERSION") }))
}

async fn health_handler(State(state): State<SharedState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "provider": state.service.provider().name(),
        "model": state.service.config().llm.model,
    }))
}

async fn daemon_status_handler(State(state): State<SharedState>) -> Json<serde_json::Value> {
    let scheduler = match &state.scheduler {
        Some(scheduler) => serde_json::json!({
            "enabled": true,
            "jobs_count": scheduler.job_count(),
            "jobs": scheduler.summaries(),
        }),
        None => serde_json::json!({ "enabled": false, "jobs_count": 0 }),
    };

    Json(serde_json::json!({
        "status": "running",
        "scheduler": scheduler,
        "service": state.service.status(),
    }))
}

/// `POST /api/chat` — SSE stream: `data:` per text delta, named events for
/// tool activity, `event: done` on completion. Client disconnect cancels
/// the run.
async fn chat_handler(
    State(state): State<SharedState>,
    Json(payload): Json<ChatRequest>,
) -> Result<Sse<impl futures::Stream<Item = Result<SseEvent, Infallible>>>, ApiError> {
    let cancel = CancellationToken::new();
    let (_session_id, rx) = state
        .service
        .chat(
            &payload.skill_name,
            &payload.message,
            payload.session_id,
            cancel.clone(),
        )
        .await?;

    // Dropping the SSE stream (client gone) drops the guard and cancels.
    let guard = cancel.drop_guard();

    let stream = ReceiverStream::new(rx).map(move |event| {
        let _keep_alive = &guard;
        Ok(match event {
            AgentStreamEvent::Chunk { content } => SseEvent::default().data(content),
            other => {
                let data = serde_json::to_string(&other).unwrap_or_default();
                SseEvent::default().event(other.event_type()).data(data)
            }
        })
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

/// `POST /api/run` — run to completion, return the final text.
async fn run_handler(
    State(state): State<SharedState>,
    Json(payload): Json<ChatRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let (session_id, result) = state
        .service
        .run(&payload.skill_name, &payload.message, payload.session_id)
        .await?;
    Ok(Json(
        serde_json::json!({ "session_id": session_id, "result": result }),
    ))
}

/// `POST /api/route` — planner-based skill selection.
async fn route_handler(
    State(state): State<SharedState>,
    Json(payload): Json<RouteRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let result = state.service.route(&payload.message).await?;
    Ok(Json(serde_json::json!({
        "skill_name": result.skill,
        "reason": result.reasoning,
        "refined_message": result.refined_message,
    })))
}

async fn ingest_handler(
    State(state): State<SharedState>,
    Json(payload): Json<IngestRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let chunks = state
        .service
        .ingest(
            &payload.source,
            &payload.text,
            payload.skills,
            payload.tags,
            &payload.collection,
        )
        .await?;
    Ok(Json(serde_json::json!({ "chunks_added": chunks })))
}

async fn documents_handler(
    State(state): State<SharedState>,
    Query(query): Query<DocumentsQuery>,
) -> Json<serde_json::Value> {
    let skills = split_csv(&query.skills);
    let documents = state
        .service
        .documents(
            &query.collection,
            &skills,
            query.source.as_deref(),
            query.limit,
        )
        .await;
    Json(serde_json::json!({ "count": documents.len(), "documents": documents }))
}

async fn delete_documents_handler(
    State(state): State<SharedState>,
    Query(query): Query<DeleteDocumentsQuery>,
) -> Json<serde_json::Value> {
    let ids = split_csv(&query.ids);
    let deleted = state
        .service
        .delete_documents(&query.collection, &ids, query.source.as_deref())
        .await;
    Json(serde_json::json!({ "deleted": deleted }))
}

async fn feedback_handler(
    State(state): State<SharedState>,
    Json(payload): Json<FeedbackRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state
        .service
        .feedback(&payload.message_id, payload.value)
        .await?;
    Ok(Json(serde_json::json!({ "ok": true })))
}

async fn skills_handler(State(state): State<SharedState>) -> Json<serde_json::Value> {
    let skills: Vec<serde_json::Value> = state
        .service
        .skills()
        .iter()
        .map(|s| {
            serde_json::json!({
                "name": s.name,
                "description": s.description,
                "tags": s.tags,
                "tools": s.tools,
                "sub_agents": s.sub_agents,
                "model": s.model,
            })
        })
        .collect();
    Json(serde_json::json!({ "skills": skills }))
}

async fn sessions_handler(
    State(state): State<SharedState>,
    Query(query): Query<SessionsQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let sessions = state
        .service
        .sessions(query.skill.as_deref(), query.limit)
        .await?;
    Ok(Json(serde_json::json!({ "sessions": sessions })))
}

async fn session_messages_handler(
    State(state): State<SharedState>,
    Path(session_id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let messages = state.service.session_messages(&session_id).await?;
    Ok(Json(serde_json::json!({ "messages": messages })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentgw_agent::mocks::{text_response, ScriptedProvider};
    use agentgw_config::AppConfig;
    use agentgw_core::provider::Provider;
    use agentgw_memory::SqliteStore;
    use agentgw_rag::{LocalEmbedder, VectorStore};
    use axum::body::Body;
    use axum::http::Request as HttpRequest;
    use tower::ServiceExt;

    async fn test_state(provider: Arc<dyn Provider>, api_key: Option<&str>) -> SharedState {
        let skills_dir =
            std::env::temp_dir().join(format!("agentgw-gw-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&skills_dir).unwrap();
        std::fs::write(
            skills_dir.join("plain.yaml"),
            "name: plain\ndescription: d\nsystem_prompt: p\n",
        )
        .unwrap();

        let mut config = AppConfig::default();
        config.skills_dir = skills_dir.to_string_lossy().to_string();

        let store = Arc::new(SqliteStore::open("sqlite::memory:").await.unwrap());
        let rag = Arc::new(VectorStore::in_memory(Arc::new(LocalEmbedder::new())));
        let service = AgentService::assemble(config, provider, store, rag);

        Arc::new(GatewayState {
            service,
            scheduler: None,
            api_key: api_key.map(String::from),
        })
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), 1 << 20)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn post_json(uri: &str, body: serde_json::Value) -> HttpRequest<Body> {
        HttpRequest::builder()
            .method("POST")
            .uri(uri)
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn health_is_public() {
        let state = test_state(Arc::new(ScriptedProvider::new(vec![])), Some("key")).await;
        let app = build_router(state);

        let response = app
            .oneshot(HttpRequest::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = body_json(response).await;
        assert_eq!(json["status"], "ok");
        assert_eq!(json["provider"], "scripted");
    }

    #[tokio::test]
    async fn api_requires_bearer_token() {
        let state = test_state(Arc::new(ScriptedProvider::new(vec![])), Some("sekrit")).await;
        let app = build_router(state);

        let no_auth = app
            .clone()
            .oneshot(HttpRequest::get("/api/skills").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(no_auth.status(), StatusCode::UNAUTHORIZED);

        let wrong = app
            .clone()
            .oneshot(
                HttpRequest::get("/api/skills")
                    .header("Authorization", "Bearer nope")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(wrong.status(), StatusCode::UNAUTHORIZED);

        let right = app
            .oneshot(
                HttpRequest::get("/api/skills")
                    .header("Authorization", "Bearer sekrit")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(right.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn no_key_means_open_access() {
        let state = test_state(Arc::new(ScriptedProvider::new(vec![])), None).await;
        let app = build_router(state);

        let response = app
            .oneshot(HttpRequest::get("/api/skills").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = body_json(response).await;
        assert_eq!(json["skills"][0]["name"], "plain");
    }

    #[tokio::test]
    async fn run_returns_session_and_result() {
        let state = test_state(Arc::new(ScriptedProvider::single_text("the answer")), None).await;
        let app = build_router(state);

        let response = app
            .oneshot(post_json(
                "/api/run",
                serde_json::json!({"skill_name": "plain", "message": "question"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = body_json(response).await;
        assert_eq!(json["result"], "the answer");
        assert!(json["session_id"].as_str().is_some());
    }

    #[tokio::test]
    async fn unknown_skill_is_404() {
        let state = test_state(Arc::new(ScriptedProvider::new(vec![])), None).await;
        let app = build_router(state);

        let response = app
            .oneshot(post_json(
                "/api/run",
                serde_json::json!({"skill_name": "ghost", "message": "hi"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn chat_streams_sse() {
        let state = test_state(Arc::new(ScriptedProvider::single_text("hi there")), None).await;
        let app = build_router(state);

        let response = app
            .oneshot(post_json(
                "/api/chat",
                serde_json::json!({"skill_name": "plain", "message": "hello"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = axum::body::to_bytes(response.into_body(), 1 << 20)
            .await
            .unwrap();
        let body = String::from_utf8_lossy(&bytes);
        assert!(body.contains("data: hi there"));
        assert!(body.contains("event: done"));
    }

    #[tokio::test]
    async fn ingest_documents_delete_roundtrip() {
        let state = test_state(Arc::new(ScriptedProvider::new(vec![])), None).await;
        let app = build_router(state);

        let ingest = app
            .clone()
            .oneshot(post_json(
                "/api/ingest",
                serde_json::json!({"text": "fact to remember", "source": "notes"}),
            ))
            .await
            .unwrap();
        assert_eq!(body_json(ingest).await["chunks_added"], 1);

        let list = app
            .clone()
            .oneshot(
                HttpRequest::get("/api/documents?source=notes")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let json = body_json(list).await;
        assert_eq!(json["count"], 1);

        let delete = app
            .oneshot(
                HttpRequest::builder()
                    .method("DELETE")
                    .uri("/api/documents?source=notes")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(body_json(delete).await["deleted"], 1);
    }

    #[tokio::test]
    async fn feedback_validates_value() {
        let state = test_state(Arc::new(ScriptedProvider::single_text("a")), None).await;
        let app = build_router(state);

        let run = app
            .clone()
            .oneshot(post_json(
                "/api/run",
                serde_json::json!({"skill_name": "plain", "message": "q"}),
            ))
            .await
            .unwrap();
        let session_id = body_json(run).await["session_id"]
            .as_str()
            .unwrap()
            .to_string();

        let messages = app
            .clone()
            .oneshot(
                HttpRequest::get(format!("/api/sessions/{session_id}/messages"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let json = body_json(messages).await;
        let message_id = json["messages"][1]["id"].as_str().unwrap().to_string();

        let good = app
            .clone()
            .oneshot(post_json(
                "/api/feedback",
                serde_json::json!({"message_id": message_id, "value": 1}),
            ))
            .await
            .unwrap();
        assert_eq!(good.status(), StatusCode::OK);

        let bad = app
            .oneshot(post_json(
                "/api/feedback",
                serde_json::json!({"message_id": message_id, "value": 7}),
            ))
            .await
            .unwrap();
        assert_eq!(bad.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn daemon_status_reports_scheduler_absence() {
        let state = test_state(Arc::new(ScriptedProvider::new(vec![])), None).await;
        let app = build_router(state);

        let response = app
            .oneshot(
                HttpRequest::get("/daemon/status")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let json = body_json(response).await;
        assert_eq!(json["scheduler"]["enabled"], false);
        assert_eq!(json["service"]["status"], "running");
    }
}
