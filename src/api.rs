//! REST API server for the smart audit pipeline
//!
//! Exposes the root agent via a plain and a server-sent-events chat endpoint.

use axum::{
    extract::State,
    http::StatusCode,
    response::{
        sse::{Event, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info};

use crate::error::ServiceError;
use crate::frames::{error_frames, final_text, frame_stream};
use crate::models::Content;
use crate::registry::RunnerRegistry;

/// =============================
/// Request / Response Models
/// =============================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub query: String,
    #[serde(default = "default_user_id")]
    pub user_id: String,
    #[serde(default = "default_session_id")]
    pub session_id: String,
}

fn default_user_id() -> String {
    "default_user".to_string()
}

fn default_session_id() -> String {
    "session_1".to_string()
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatResponse {
    pub agent_response: String,
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        error!(error = %self, "Request failed");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({ "error": self.to_string() })),
        )
            .into_response()
    }
}

/// =============================
/// API State
/// =============================

#[derive(Clone)]
pub struct ApiState {
    pub registry: Arc<RunnerRegistry>,
    pub stream_pacing: Duration,
}

/// =============================
/// Health Endpoint
/// =============================

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// =============================
/// Chat Endpoints
/// =============================

async fn chat(
    State(state): State<ApiState>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ServiceError> {
    info!(session_id = %req.session_id, user_id = %req.user_id, "Chat request");

    let runner = state.registry.resolve(&req.session_id, &req.user_id).await?;
    let events = runner.run(&req.user_id, &req.session_id, Content::user_text(req.query));
    let agent_response = final_text(events).await?;

    Ok(Json(ChatResponse { agent_response }))
}

async fn chat_stream(
    State(state): State<ApiState>,
    Json(req): Json<ChatRequest>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    info!(session_id = %req.session_id, user_id = %req.user_id, "Streaming chat request");

    let frames = match state.registry.resolve(&req.session_id, &req.user_id).await {
        Ok(runner) => {
            let events = runner.run(&req.user_id, &req.session_id, Content::user_text(req.query));
            frame_stream(events, state.stream_pacing)
        }
        Err(e) => error_frames(e),
    };

    Sse::new(frames.map(|frame| Ok::<_, Infallible>(Event::default().data(frame.to_json()))))
}

/// =============================
/// Router
/// =============================

pub fn create_router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/chat", post(chat))
        .route("/chat_stream", post(chat_stream))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// =============================
/// Server Startup
/// =============================

pub async fn start_server(
    state: ApiState,
    bind_address: &str,
) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let router = create_router(state);

    let listener = tokio::net::TcpListener::bind(bind_address).await?;

    info!("API Server listening on http://{}", bind_address);

    axum::serve(listener, router).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::{conversation_agent, matching_agent, Agent, MATCHING_AGENT};
    use crate::frames::{FrameKind, StreamFrame};
    use crate::registry::RegistryLimits;
    use crate::session::InMemorySessionService;
    use crate::testing::{call_response, text_response, ScriptedBackend};
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request};
    use tower::ServiceExt;

    fn app(backend: ScriptedBackend) -> Router {
        let root = Arc::new(
            Agent::new("FinanceOrchestrator", "root", "orchestrate")
                .with_tool(Arc::new(matching_agent("worker", "{}")))
                .with_tool(Arc::new(conversation_agent("worker"))),
        );
        let registry = RunnerRegistry::new(
            root,
            Arc::new(InMemorySessionService::new()),
            Arc::new(backend),
            RegistryLimits::default(),
        );
        create_router(ApiState {
            registry: Arc::new(registry),
            stream_pacing: Duration::ZERO,
        })
    }

    fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_string(response: Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn parse_frames(body: &str) -> Vec<StreamFrame> {
        body.split("\n\n")
            .filter_map(|chunk| chunk.strip_prefix("data: "))
            .map(|data| serde_json::from_str(data).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn test_health() {
        let response = app(ScriptedBackend::new())
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_string(response).await.contains("healthy"));
    }

    #[tokio::test]
    async fn test_chat_returns_final_answer() {
        let response = app(ScriptedBackend::new().reply(text_response("Capex was $1.58bn.")))
            .oneshot(post_json("/chat", serde_json::json!({"query": "3M capex?"})))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body: ChatResponse = serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(body.agent_response, "Capex was $1.58bn.");
    }

    #[tokio::test]
    async fn test_chat_failure_is_server_error() {
        let backend = ScriptedBackend::new().fail(ServiceError::ModelApi {
            status: 503,
            message: "down".into(),
        });
        let response = app(backend)
            .oneshot(post_json("/chat", serde_json::json!({"query": "hi"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_chat_stream_frames() {
        let backend = ScriptedBackend::new()
            .reply(call_response(MATCHING_AGENT, "3M capex FY2018"))
            .reply(text_response(
                "```json\n{\"financial_audit\": {\"primary_metric\": \"Capex\", \"value\": 1577.0, \"status\": \"Peer Match\", \"confidence\": 0.95}}\n```",
            ))
            .reply(text_response("3M spent $1,577m on capex in FY2018."));

        let response = app(backend)
            .oneshot(post_json(
                "/chat_stream",
                serde_json::json!({"query": "3M capex?", "user_id": "u1", "session_id": "s1"}),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let content_type = response.headers()[header::CONTENT_TYPE].to_str().unwrap().to_string();
        assert!(content_type.starts_with("text/event-stream"));

        let frames = parse_frames(&body_string(response).await);
        assert_eq!(frames.len(), 3);
        assert!(frames[0].content.starts_with("EXEC_OP: MatchingAgent"));
        assert_eq!(frames[1].trace_data.domain, "Capex");
        assert_eq!(frames[1].trace_data.score, 0.95);
        assert_eq!(frames[2].kind, FrameKind::Final);
        assert_eq!(frames[2].content, "3M spent $1,577m on capex in FY2018.");
    }

    #[tokio::test]
    async fn test_chat_stream_error_frame() {
        let backend = ScriptedBackend::new().fail(ServiceError::Llm("no candidates".into()));
        let response = app(backend)
            .oneshot(post_json("/chat_stream", serde_json::json!({"query": "hi"})))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let frames = parse_frames(&body_string(response).await);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].kind, FrameKind::Error);
        assert_eq!(frames[0].content, "Error: LLM error: no candidates");
    }

    #[test]
    fn test_request_defaults() {
        let req: ChatRequest = serde_json::from_str(r#"{"query": "hi"}"#).unwrap();
        assert_eq!(req.user_id, "default_user");
        assert_eq!(req.session_id, "session_1");
    }
}
