//! HTTP admin surface for session randomization and bias auditing.
//!
//! Thin adapter over `fairshuffle-core` for the exam-serving application and
//! its operators: create sessions, shuffle and restore questions, toggle
//! randomization, change strategy, read stat rows, and trigger or fetch bias
//! analysis. A strategy misconfiguration rejects session creation outright —
//! a session must never start silently unshuffled.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    Router,
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use uuid::Uuid;

use fairshuffle_core::{
    AnswerOption, BiasAnalyzer, Question, SessionRandomizer, ShuffleError, StatStore, Strategy,
};

/// Shared server state.
struct AppState {
    sessions: Mutex<HashMap<String, SessionRandomizer>>,
    stats: Arc<dyn StatStore>,
    analyzer: BiasAnalyzer,
}

#[derive(Deserialize)]
struct CreateSessionRequest {
    strategy: String,
}

#[derive(Serialize)]
struct SessionResponse {
    session_id: String,
    seed: u64,
    strategy: Strategy,
    enabled: bool,
    questions_shuffled: usize,
}

#[derive(Deserialize)]
struct RestoreRequest {
    question_id: String,
    options: Vec<AnswerOption>,
}

#[derive(Serialize)]
struct RestoreResponse {
    question_id: String,
    options: Vec<AnswerOption>,
}

#[derive(Deserialize)]
struct ToggleRequest {
    enabled: bool,
}

#[derive(Deserialize)]
struct StrategyRequest {
    strategy: String,
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    sessions: usize,
    tracked_options: usize,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, err: impl std::fmt::Display) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: err.to_string(),
        }),
    )
}

fn map_core_error(err: ShuffleError) -> ApiError {
    let status = match &err {
        ShuffleError::UnknownStrategy(_)
        | ShuffleError::TooManyOptions { .. }
        | ShuffleError::InvalidPosition { .. }
        | ShuffleError::AlreadyInitialized => StatusCode::BAD_REQUEST,
        ShuffleError::NotInitialized | ShuffleError::UnknownQuestion { .. } => {
            StatusCode::NOT_FOUND
        }
        ShuffleError::CorruptStatRow { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        ShuffleError::Io(_) | ShuffleError::Serde(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    api_error(status, err)
}

fn session_response(session_id: &str, session: &SessionRandomizer) -> Result<SessionResponse, ApiError> {
    let summary = session.randomization_summary().map_err(map_core_error)?;
    Ok(SessionResponse {
        session_id: session_id.to_string(),
        seed: summary.seed,
        strategy: summary.strategy,
        enabled: summary.enabled,
        questions_shuffled: summary.questions_shuffled,
    })
}

async fn handle_create_session(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateSessionRequest>,
) -> Result<(StatusCode, Json<SessionResponse>), ApiError> {
    let strategy: Strategy = req.strategy.parse().map_err(map_core_error)?;

    let mut session = SessionRandomizer::new().with_stats(Arc::clone(&state.stats));
    session
        .initialize_randomization(strategy)
        .map_err(map_core_error)?;

    let session_id = Uuid::new_v4().to_string();
    let response = session_response(&session_id, &session)?;
    state
        .sessions
        .lock()
        .await
        .insert(session_id.clone(), session);
    log::debug!("created session {session_id} with strategy {strategy}");
    Ok((StatusCode::CREATED, Json(response)))
}

async fn handle_get_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<SessionResponse>, ApiError> {
    let sessions = state.sessions.lock().await;
    let session = sessions
        .get(&id)
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, format!("unknown session {id}")))?;
    Ok(Json(session_response(&id, session)?))
}

async fn handle_shuffle(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(question): Json<Question>,
) -> Result<Json<fairshuffle_core::ShuffledQuestion>, ApiError> {
    let mut sessions = state.sessions.lock().await;
    let session = sessions
        .get_mut(&id)
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, format!("unknown session {id}")))?;
    let shuffled = session
        .randomize_question(&question)
        .map_err(map_core_error)?;
    Ok(Json(shuffled))
}

async fn handle_restore(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<RestoreRequest>,
) -> Result<Json<RestoreResponse>, ApiError> {
    let sessions = state.sessions.lock().await;
    let session = sessions
        .get(&id)
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, format!("unknown session {id}")))?;
    let options = session
        .restore_question_order(&req.question_id, &req.options)
        .map_err(map_core_error)?;
    Ok(Json(RestoreResponse {
        question_id: req.question_id,
        options,
    }))
}

async fn handle_toggle(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<ToggleRequest>,
) -> Result<Json<SessionResponse>, ApiError> {
    let mut sessions = state.sessions.lock().await;
    let session = sessions
        .get_mut(&id)
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, format!("unknown session {id}")))?;
    if req.enabled {
        session.enable_randomization().map_err(map_core_error)?;
    } else {
        session.disable_randomization().map_err(map_core_error)?;
    }
    Ok(Json(session_response(&id, session)?))
}

async fn handle_change_strategy(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<StrategyRequest>,
) -> Result<Json<SessionResponse>, ApiError> {
    let strategy: Strategy = req.strategy.parse().map_err(map_core_error)?;
    let mut sessions = state.sessions.lock().await;
    let session = sessions
        .get_mut(&id)
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, format!("unknown session {id}")))?;
    session.change_strategy(strategy).map_err(map_core_error)?;
    Ok(Json(session_response(&id, session)?))
}

async fn handle_stats(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<fairshuffle_core::RandomizationStat>>, ApiError> {
    let rows = state.stats.load_all().map_err(map_core_error)?;
    Ok(Json(rows))
}

async fn handle_analyze(
    State(state): State<Arc<AppState>>,
) -> Result<Json<fairshuffle_core::BatchSummary>, ApiError> {
    let summary = state
        .analyzer
        .analyze_all_questions()
        .map_err(map_core_error)?;
    Ok(Json(summary))
}

async fn handle_report(
    State(state): State<Arc<AppState>>,
) -> Result<Json<fairshuffle_core::BiasReport>, ApiError> {
    let report = state.analyzer.generate_report().map_err(map_core_error)?;
    Ok(Json(report))
}

async fn handle_health(State(state): State<Arc<AppState>>) -> Result<Json<HealthResponse>, ApiError> {
    let sessions = state.sessions.lock().await.len();
    let tracked = state.stats.load_all().map_err(map_core_error)?.len();
    Ok(Json(HealthResponse {
        status: "ok".to_string(),
        sessions,
        tracked_options: tracked,
    }))
}

async fn handle_index() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "name": "fairshuffle server",
        "version": fairshuffle_core::VERSION,
        "endpoints": {
            "/": "This API index",
            "/health": "Session and stat store overview",
            "/api/v1/sessions": {
                "method": "POST",
                "description": "Create a randomization session",
                "body": { "strategy": "full_random | constrained_random | block_random" }
            },
            "/api/v1/sessions/{id}": "GET randomization summary",
            "/api/v1/sessions/{id}/shuffle": "POST a question, get shuffled options + record",
            "/api/v1/sessions/{id}/restore": "POST shuffled options, get canonical order",
            "/api/v1/sessions/{id}/randomization": "POST {enabled} to toggle shuffling",
            "/api/v1/sessions/{id}/strategy": "POST {strategy} to switch (regenerates seed)",
            "/api/v1/stats": "GET all per-option position counters",
            "/api/v1/analyze": "POST to run the bias analyzer batch now",
            "/api/v1/report": "GET the operator bias report",
        }
    }))
}

/// Build the axum router.
fn build_router(stats: Arc<dyn StatStore>) -> Router {
    let analyzer = BiasAnalyzer::new(Arc::clone(&stats));
    let state = Arc::new(AppState {
        sessions: Mutex::new(HashMap::new()),
        stats,
        analyzer,
    });

    Router::new()
        .route("/", get(handle_index))
        .route("/health", get(handle_health))
        .route("/api/v1/sessions", post(handle_create_session))
        .route("/api/v1/sessions/{id}", get(handle_get_session))
        .route("/api/v1/sessions/{id}/shuffle", post(handle_shuffle))
        .route("/api/v1/sessions/{id}/restore", post(handle_restore))
        .route("/api/v1/sessions/{id}/randomization", post(handle_toggle))
        .route("/api/v1/sessions/{id}/strategy", post(handle_change_strategy))
        .route("/api/v1/stats", get(handle_stats))
        .route("/api/v1/analyze", post(handle_analyze))
        .route("/api/v1/report", get(handle_report))
        .with_state(state)
}

/// Run the HTTP admin server.
pub async fn run_server(stats: Arc<dyn StatStore>, host: &str, port: u16) {
    let app = build_router(stats);
    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await.unwrap();
    log::info!("fairshuffle server listening on {addr}");
    axum::serve(listener, app).await.unwrap();
}
