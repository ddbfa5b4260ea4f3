//! Embedded HTTP server exposing the phase endpoints.
//!
//! Transport stays thin: handlers check the shared key, spend the
//! endpoint's rate budget, hand the typed request to the phase controller,
//! and map the error taxonomy onto status codes. All session continuity
//! lives in the snapshots the callers hold.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tower_http::cors::CorsLayer;

use crate::ratelimit::{RateLimiter, DEFAULT_WINDOW};
use crate::session::{
    CheckInRequest, DebriefRequest, LessonRequest, MissionRequest, PhaseController,
    RetrievalRequest, RoleplayRequest, SessionError, StartRequest,
};

/// Per-endpoint request budgets per window, reflecting call cost
const START_LIMIT: usize = 10;
const CHECKIN_LIMIT: usize = 10;
const LESSON_LIMIT: usize = 6;
const RETRIEVAL_LIMIT: usize = 10;
const ROLEPLAY_LIMIT: usize = 20;
const DEBRIEF_LIMIT: usize = 6;
const MISSION_LIMIT: usize = 6;
const STATUS_LIMIT: usize = 30;

/// Idle limiter keys are purged after twice the window
const SWEEP_EVERY: Duration = Duration::from_secs(120);

/// Server state shared across requests
pub struct ServerState {
    pub controller: PhaseController,
    pub limiter: RateLimiter,
    /// Pass-through shared key; `None` disables the check
    pub api_key: Option<String>,
}

/// Server handle for managing the lifecycle
pub struct EngineServer {
    pub port: u16,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl EngineServer {
    /// Stop the server gracefully
    pub fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

/// Start the phase-endpoint server and the limiter sweep task
pub async fn start_server(
    state: Arc<ServerState>,
    host: &str,
    port: u16,
) -> Result<EngineServer, Box<dyn std::error::Error + Send + Sync>> {
    let app = Router::new()
        .route("/api/session/start", post(start_session))
        .route("/api/session/checkin", post(check_in))
        .route("/api/session/lesson", post(lesson))
        .route("/api/session/retrieval", post(retrieval))
        .route("/api/session/roleplay", post(roleplay))
        .route("/api/session/debrief", post(debrief))
        .route("/api/session/mission", post(mission))
        .route("/api/status", get(status))
        .layer(CorsLayer::permissive())
        .with_state(Arc::clone(&state));

    let listener = TcpListener::bind((host, port)).await?;
    let addr = listener.local_addr()?;
    log::info!("Training server listening on http://{}", addr);

    // Best-effort sweep of idle rate-limit keys
    let sweep_state = Arc::clone(&state);
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(SWEEP_EVERY);
        loop {
            tick.tick().await;
            sweep_state.limiter.sweep(2 * DEFAULT_WINDOW);
        }
    });

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
                log::info!("Training server shutting down");
            })
            .await
            .ok();
    });

    Ok(EngineServer {
        port: addr.port(),
        shutdown_tx: Some(shutdown_tx),
    })
}

// ===== Handlers =====

async fn start_session(
    State(state): State<Arc<ServerState>>,
    headers: HeaderMap,
    Json(request): Json<StartRequest>,
) -> Response {
    if let Err(e) = gate(&state, &headers, "start", START_LIMIT) {
        return e.into_response();
    }
    respond(state.controller.start(request))
}

async fn check_in(
    State(state): State<Arc<ServerState>>,
    headers: HeaderMap,
    Json(request): Json<CheckInRequest>,
) -> Response {
    if let Err(e) = gate(&state, &headers, "checkin", CHECKIN_LIMIT) {
        return e.into_response();
    }
    respond(state.controller.check_in(request))
}

async fn lesson(
    State(state): State<Arc<ServerState>>,
    headers: HeaderMap,
    Json(request): Json<LessonRequest>,
) -> Response {
    if let Err(e) = gate(&state, &headers, "lesson", LESSON_LIMIT) {
        return e.into_response();
    }
    respond(state.controller.lesson(request).await)
}

async fn retrieval(
    State(state): State<Arc<ServerState>>,
    headers: HeaderMap,
    Json(request): Json<RetrievalRequest>,
) -> Response {
    if let Err(e) = gate(&state, &headers, "retrieval", RETRIEVAL_LIMIT) {
        return e.into_response();
    }
    respond(state.controller.retrieval(request).await)
}

async fn roleplay(
    State(state): State<Arc<ServerState>>,
    headers: HeaderMap,
    Json(request): Json<RoleplayRequest>,
) -> Response {
    if let Err(e) = gate(&state, &headers, "roleplay", ROLEPLAY_LIMIT) {
        return e.into_response();
    }
    respond(state.controller.roleplay(request).await)
}

async fn debrief(
    State(state): State<Arc<ServerState>>,
    headers: HeaderMap,
    Json(request): Json<DebriefRequest>,
) -> Response {
    if let Err(e) = gate(&state, &headers, "debrief", DEBRIEF_LIMIT) {
        return e.into_response();
    }
    respond(state.controller.debrief(request).await)
}

async fn mission(
    State(state): State<Arc<ServerState>>,
    headers: HeaderMap,
    Json(request): Json<MissionRequest>,
) -> Response {
    if let Err(e) = gate(&state, &headers, "mission", MISSION_LIMIT) {
        return e.into_response();
    }
    respond(state.controller.mission(request).await)
}

#[derive(Deserialize)]
struct StatusQuery {
    n: Option<usize>,
}

async fn status(
    State(state): State<Arc<ServerState>>,
    headers: HeaderMap,
    Query(query): Query<StatusQuery>,
) -> Response {
    if let Err(e) = gate(&state, &headers, "status", STATUS_LIMIT) {
        return e.into_response();
    }
    Json(state.controller.status(query.n.unwrap_or(7))).into_response()
}

// ===== Gate and error mapping =====

/// Key check plus the endpoint's rate budget, keyed by client identity
fn gate(
    state: &ServerState,
    headers: &HeaderMap,
    endpoint: &str,
    limit: usize,
) -> Result<(), ApiError> {
    let presented = headers
        .get("x-api-key")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    if let Some(expected) = &state.api_key {
        if presented != expected {
            return Err(ApiError::Unauthorized);
        }
    }

    let identity = if presented.is_empty() { "local" } else { presented };
    let decision = state.limiter.check(
        &format!("{}:{}", identity, endpoint),
        limit,
        DEFAULT_WINDOW,
    );
    if !decision.allowed {
        let retry_after = decision
            .retry_after
            .map(|d| d.as_secs().max(1))
            .unwrap_or(1);
        return Err(ApiError::RateLimited { retry_after });
    }
    Ok(())
}

fn respond<T: serde::Serialize>(result: Result<T, SessionError>) -> Response {
    match result {
        Ok(value) => Json(value).into_response(),
        Err(e) => ApiError::Session(e).into_response(),
    }
}

enum ApiError {
    Unauthorized,
    RateLimited { retry_after: u64 },
    Session(SessionError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Unauthorized => error_response(
                StatusCode::UNAUTHORIZED,
                "Invalid or missing API key",
                false,
            ),
            ApiError::RateLimited { retry_after } => {
                let mut response = (
                    StatusCode::TOO_MANY_REQUESTS,
                    Json(serde_json::json!({
                        "error": "Rate limit exceeded",
                        "retryable": true,
                        "retryAfterSecs": retry_after,
                    })),
                )
                    .into_response();
                if let Ok(value) = retry_after.to_string().parse() {
                    response.headers_mut().insert(header::RETRY_AFTER, value);
                }
                response
            }
            ApiError::Session(e) => {
                let (status, retryable) = match &e {
                    SessionError::Validation(_) => (StatusCode::UNPROCESSABLE_ENTITY, false),
                    SessionError::External(_) => (StatusCode::BAD_GATEWAY, true),
                    SessionError::RateLimited { .. } => (StatusCode::TOO_MANY_REQUESTS, true),
                    SessionError::Persistence(_) => (StatusCode::INTERNAL_SERVER_ERROR, false),
                    SessionError::StaleSnapshot => (StatusCode::GONE, false),
                    SessionError::SessionBusy => (StatusCode::CONFLICT, false),
                };
                error_response(status, &e.to_string(), retryable)
            }
        }
    }
}

fn error_response(status: StatusCode, message: &str, retryable: bool) -> Response {
    (
        status,
        Json(serde_json::json!({
            "error": message,
            "retryable": retryable,
        })),
    )
        .into_response()
}
