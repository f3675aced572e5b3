//! REST API for the wedding planner
//!
//! Thin HTTP transport over the orchestrator: one chat endpoint, summary
//! history, and a health check.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::agent::{Orchestrator, TurnOutcome, TurnStatus};
use crate::error::OrchestrationError;
use crate::models::{Intent, UserId};
use crate::scheduler::FollowUp;
use crate::synthesizer::QuickAction;

/// =============================
/// Request / Response Models
/// =============================

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub user_id: Option<String>,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub user_id: UserId,
    pub reply: String,
    pub quick_actions: Vec<QuickAction>,
    pub status: TurnStatus,
    pub intent: Intent,
    /// Delayed prompts the client may show later
    pub follow_ups: Vec<FollowUp>,
}

impl ChatResponse {
    fn from_outcome(user_id: UserId, outcome: TurnOutcome) -> Self {
        Self {
            user_id,
            reply: outcome.reply,
            quick_actions: outcome.quick_actions,
            status: outcome.status,
            intent: outcome.intent,
            follow_ups: outcome.follow_ups,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse {
    pub success: bool,
    pub data: Option<serde_json::Value>,
    pub error: Option<String>,
    pub timestamp: String,
}

impl ApiResponse {
    pub fn success<T: Serialize>(data: T) -> Self {
        Self {
            success: true,
            data: serde_json::to_value(data).ok(),
            error: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// =============================
/// API State
/// =============================

#[derive(Clone)]
pub struct ApiState {
    pub orchestrator: Arc<Orchestrator>,
}

/// =============================
/// User ids
/// =============================

fn stable_uuid_from_string(input: &str) -> uuid::Uuid {
    use sha2::{Digest, Sha256};

    let hash = Sha256::digest(input.as_bytes());
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&hash[..16]);

    // Set UUID version (4) and variant (RFC4122) bits.
    bytes[6] = (bytes[6] & 0x0f) | 0x40;
    bytes[8] = (bytes[8] & 0x3f) | 0x80;

    uuid::Uuid::from_bytes(bytes)
}

/// Parsed UUID, a stable hash of any other string, or the trial user.
pub fn resolve_user_id(value: Option<&str>, trial_user: UserId) -> UserId {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => {
            uuid::Uuid::parse_str(v).unwrap_or_else(|_| stable_uuid_from_string(v))
        }
        _ => trial_user,
    }
}

/// =============================
/// Handlers
/// =============================

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

async fn chat_handler(
    State(state): State<ApiState>,
    Json(req): Json<ChatRequest>,
) -> (StatusCode, Json<ApiResponse>) {
    if req.message.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::error("message is empty".into())),
        );
    }

    let user_id = resolve_user_id(
        req.user_id.as_deref(),
        state.orchestrator.config().trial_user_id,
    );
    info!(user_id = %user_id, "Chat request");

    // The turn runs on its own task: if the client goes away this handler
    // future is dropped, the guard cancels read tools, and the task still
    // finishes any mutating work and merges it.
    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();
    let orchestrator = state.orchestrator.clone();
    let message = req.message;
    let turn = tokio::spawn(async move {
        orchestrator.handle_turn(user_id, &message, &cancel).await
    });

    match turn.await {
        Ok(Ok(outcome)) => (
            StatusCode::OK,
            Json(ApiResponse::success(ChatResponse::from_outcome(user_id, outcome))),
        ),
        Ok(Err(e)) => {
            error!(user_id = %user_id, error = %e, "Turn failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::error(format!("Turn failed: {}", e))),
            )
        }
        Err(e) => {
            error!(user_id = %user_id, error = %e, "Turn task aborted");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::error("Turn task aborted".into())),
            )
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SummaryParams {
    pub limit: Option<usize>,
}

async fn summaries_handler(
    State(state): State<ApiState>,
    Path(user): Path<String>,
    Query(params): Query<SummaryParams>,
) -> (StatusCode, Json<ApiResponse>) {
    let user_id = resolve_user_id(Some(&user), state.orchestrator.config().trial_user_id);
    let limit = params.limit.unwrap_or(10).clamp(1, 50);

    match state.orchestrator.store().summaries(user_id, limit).await {
        Ok(summaries) => (StatusCode::OK, Json(ApiResponse::success(summaries))),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ApiResponse::error(e.to_string())),
        ),
    }
}

async fn promote_handler(
    State(state): State<ApiState>,
    Path((user, summary_id)): Path<(String, i64)>,
) -> (StatusCode, Json<ApiResponse>) {
    let user_id = resolve_user_id(Some(&user), state.orchestrator.config().trial_user_id);

    match state.orchestrator.store().promote_summary(user_id, summary_id).await {
        Ok(summary) => (StatusCode::OK, Json(ApiResponse::success(summary))),
        Err(e @ OrchestrationError::PersistenceError(_)) => (
            StatusCode::NOT_FOUND,
            Json(ApiResponse::error(e.to_string())),
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ApiResponse::error(e.to_string())),
        ),
    }
}

/// =============================
/// Router
/// =============================

pub fn create_router(orchestrator: Arc<Orchestrator>) -> Router {
    let state = ApiState { orchestrator };

    Router::new()
        .route("/health", get(health))
        .route("/api/chat", post(chat_handler))
        .route("/api/users/:user_id/summaries", get(summaries_handler))
        .route(
            "/api/users/:user_id/summaries/:summary_id/promote",
            post(promote_handler),
        )
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// =============================
/// Server Startup
/// =============================

pub async fn start_server(
    orchestrator: Arc<Orchestrator>,
    port: u16,
) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let router = create_router(orchestrator);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;

    info!("API Server listening on http://0.0.0.0:{}", port);
    info!("Local: http://127.0.0.1:{}", port);

    axum::serve(listener, router).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_user_id_resolution() {
        let trial = Uuid::nil();
        let parsed = Uuid::new_v4();

        assert_eq!(resolve_user_id(Some(&parsed.to_string()), trial), parsed);
        assert_eq!(resolve_user_id(None, trial), trial);
        assert_eq!(resolve_user_id(Some("  "), trial), trial);

        let hashed = resolve_user_id(Some("jisoo"), trial);
        assert_eq!(hashed, resolve_user_id(Some("jisoo"), trial));
        assert_ne!(hashed, resolve_user_id(Some("minho"), trial));
        assert_eq!(hashed.get_version_num(), 4);
    }

    #[tokio::test]
    async fn test_chat_route_answers_general_chat() {
        use crate::config::OrchestratorConfig;
        use crate::memory::InMemoryStore;
        use crate::tools::InMemoryCatalog;
        use axum::body::Body;
        use axum::http::Request;
        use tower::ServiceExt;

        let orchestrator = Arc::new(Orchestrator::build(
            OrchestratorConfig::default(),
            Arc::new(InMemoryStore::new()),
            Arc::new(InMemoryCatalog::demo()),
        ));
        let request = Request::builder()
            .method("POST")
            .uri("/api/chat")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"user_id":"jisoo","message":"hello there!"}"#))
            .unwrap();

        let response = create_router(orchestrator).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
