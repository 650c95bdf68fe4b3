//! HTTP surface for the ingestion pipeline: start/cancel parses, stream
//! progress events, query the graph, fetch statistics, and run analyses.
//! Thin handlers only; all logic lives in the library modules.

use crate::analyzer;
use crate::error::KgError;
use crate::ingest::{IngestService, ESTIMATED_DURATION};
use crate::languages;
use crate::progress::ProgressHub;
use crate::query::QueryEngine;
use crate::store::GraphStore;
use crate::types::{AnalysisKind, GraphQuery, ParseRequest};
use axum::extract::{Json, Path, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::Router;
use serde::Deserialize;
use serde_json::{json, Value};
use std::convert::Infallible;
use std::sync::Arc;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{Stream, StreamExt};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

/// Shared application state for all handlers.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<IngestService>,
    pub query: Arc<QueryEngine>,
    pub store: Arc<dyn GraphStore>,
    pub progress: Arc<ProgressHub>,
    pub start_time: std::time::Instant,
}

impl AppState {
    pub fn new(service: Arc<IngestService>) -> Self {
        let store = service.store();
        let progress = service.progress_hub();
        AppState {
            query: Arc::new(QueryEngine::new(Arc::clone(&store))),
            service,
            store,
            progress,
            start_time: std::time::Instant::now(),
        }
    }
}

/// Build the API router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/kg/health", get(api_health))
        .route("/api/kg/parse", post(api_parse))
        .route("/api/kg/parse/{parsing_id}/cancel", post(api_cancel_parse))
        .route("/api/kg/parse/{parsing_id}/events", get(api_parse_events))
        .route("/api/kg/query", post(api_query))
        .route("/api/kg/statistics/{repository_id}", get(api_statistics))
        .route("/api/kg/analyze", post(api_analyze))
        .route("/api/kg/repositories", get(api_repositories))
        .route(
            "/api/kg/repositories/{repository_id}",
            get(api_repository).delete(api_delete_repository),
        )
        .route("/api/kg/languages", get(api_languages))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

type ApiError = (StatusCode, Json<Value>);

fn error_response(status: StatusCode, message: impl Into<String>) -> ApiError {
    (status, Json(json!({ "success": false, "error": message.into() })))
}

fn kg_error_response(e: KgError) -> ApiError {
    let status = match e {
        KgError::Input(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    error_response(status, e.to_string())
}

// ---------------------------------------------------------------------------
// Health
// ---------------------------------------------------------------------------

/// Service health, including the number of active parse tasks.
pub async fn api_health(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "active_parses": state.service.active_parse_count(),
        "uptime_seconds": state.start_time.elapsed().as_secs(),
    }))
}

// ---------------------------------------------------------------------------
// Parse lifecycle
// ---------------------------------------------------------------------------

/// Start a parse job in the background; returns the parsing id immediately.
pub async fn api_parse(
    State(state): State<AppState>,
    Json(request): Json<ParseRequest>,
) -> Result<Json<Value>, ApiError> {
    if request.name.trim().is_empty() {
        return Err(error_response(StatusCode::BAD_REQUEST, "name is required"));
    }
    let parsing_id = state.service.start_parse(request).map_err(kg_error_response)?;
    Ok(Json(json!({
        "success": true,
        "parsing_id": parsing_id,
        "estimated_duration": ESTIMATED_DURATION,
        "message": "Repository parsing started",
    })))
}

/// Cancel a running parse. `cancelled` reports whether a task was active.
pub async fn api_cancel_parse(
    State(state): State<AppState>,
    Path(parsing_id): Path<Uuid>,
) -> Json<Value> {
    let cancelled = state.service.cancel_parse(parsing_id);
    Json(json!({
        "success": true,
        "parsing_id": parsing_id,
        "cancelled": cancelled,
    }))
}

/// Server-sent progress events for one parse job (`kg-parsing:<id>` room).
pub async fn api_parse_events(
    State(state): State<AppState>,
    Path(parsing_id): Path<Uuid>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let receiver = state.progress.subscribe(parsing_id);
    let stream = BroadcastStream::new(receiver).filter_map(|event| match event {
        Ok(event) => Event::default().json_data(&event).ok().map(Ok),
        // Lagged receivers skip ahead rather than ending the stream
        Err(_) => None,
    });
    Sse::new(stream).keep_alive(KeepAlive::default())
}

// ---------------------------------------------------------------------------
// Query and statistics
// ---------------------------------------------------------------------------

pub async fn api_query(
    State(state): State<AppState>,
    Json(query): Json<GraphQuery>,
) -> Result<Json<Value>, ApiError> {
    let result = state.query.query_graph(&query).map_err(kg_error_response)?;
    Ok(Json(json!({ "success": true, "result": result })))
}

pub async fn api_statistics(
    State(state): State<AppState>,
    Path(repository_id): Path<Uuid>,
) -> Result<Json<Value>, ApiError> {
    let repository = state
        .store
        .get_repository(repository_id)
        .map_err(kg_error_response)?
        .ok_or_else(|| error_response(StatusCode::NOT_FOUND, "repository not found"))?;
    let statistics = state.query.graph_statistics(repository_id).map_err(kg_error_response)?;
    Ok(Json(json!({
        "success": true,
        "repository_id": repository.id,
        "statistics": statistics,
    })))
}

// ---------------------------------------------------------------------------
// Analysis
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct AnalyzeRequest {
    pub repository_id: Uuid,
    pub analysis_type: String,
    #[serde(default)]
    pub parameters: Option<Value>,
}

pub async fn api_analyze(
    State(state): State<AppState>,
    Json(request): Json<AnalyzeRequest>,
) -> Result<Json<Value>, ApiError> {
    let kind = AnalysisKind::parse(&request.analysis_type).ok_or_else(|| {
        error_response(
            StatusCode::BAD_REQUEST,
            format!("unsupported analysis type: {}", request.analysis_type),
        )
    })?;
    let analysis = analyzer::run_analysis(
        Arc::clone(&state.store),
        request.repository_id,
        kind,
        request.parameters.unwrap_or_else(|| json!({})),
    )
    .map_err(|e| match e {
        KgError::Input(msg) => error_response(StatusCode::NOT_FOUND, msg),
        other => kg_error_response(other),
    })?;
    Ok(Json(json!({ "success": true, "analysis": analysis })))
}

// ---------------------------------------------------------------------------
// Repositories
// ---------------------------------------------------------------------------

pub async fn api_repositories(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let repositories = state.store.list_repositories().map_err(kg_error_response)?;
    Ok(Json(json!({
        "success": true,
        "total": repositories.len(),
        "repositories": repositories,
    })))
}

pub async fn api_repository(
    State(state): State<AppState>,
    Path(repository_id): Path<Uuid>,
) -> Result<Json<Value>, ApiError> {
    let repository = state
        .store
        .get_repository(repository_id)
        .map_err(kg_error_response)?
        .ok_or_else(|| error_response(StatusCode::NOT_FOUND, "repository not found"))?;
    Ok(Json(json!({ "success": true, "repository": repository })))
}

/// Delete a repository; nodes, relationships and analyses cascade with it.
pub async fn api_delete_repository(
    State(state): State<AppState>,
    Path(repository_id): Path<Uuid>,
) -> Result<Json<Value>, ApiError> {
    let deleted = state.store.delete_repository(repository_id).map_err(kg_error_response)?;
    if !deleted {
        return Err(error_response(StatusCode::NOT_FOUND, "repository not found"));
    }
    Ok(Json(json!({ "success": true, "deleted": true, "repository_id": repository_id })))
}

// ---------------------------------------------------------------------------
// Languages
// ---------------------------------------------------------------------------

/// The language registry: supported languages and their parsing config.
pub async fn api_languages() -> Json<Value> {
    Json(json!({
        "success": true,
        "total": languages::all().len(),
        "languages": languages::all(),
    }))
}
