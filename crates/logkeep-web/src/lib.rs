//! logkeep Web API
//!
//! Health and version endpoints plus time-range queries over the archive.

use axum::{
    extract::{Path, Query, Request as AxumRequest, State},
    http::{header::AUTHORIZATION, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Json, Response as AxumResponse},
    routing::get,
    Router,
};
use logkeep_core::{Error, TimeRange, VERSION};
use logkeep_logs::ArchiveReader;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

/// Successful query body
#[derive(Debug, Serialize, Deserialize)]
pub struct LogsResponse {
    pub logs: Vec<String>,
}

/// Error body
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
        }
    }
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    reader: Arc<ArchiveReader>,
    token: Option<String>,
}

impl AppState {
    pub fn new(reader: ArchiveReader, token: Option<String>) -> Self {
        Self {
            reader: Arc::new(reader),
            token: token.filter(|t| !t.is_empty()),
        }
    }
}

/// Bearer token middleware; a no-op when no token is configured
async fn bearer_auth(
    State(state): State<AppState>,
    request: AxumRequest,
    next: Next,
) -> AxumResponse {
    let Some(expected) = &state.token else {
        return next.run(request).await;
    };

    let provided = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    match provided {
        Some(token) if token == expected => next.run(request).await,
        _ => (StatusCode::UNAUTHORIZED, Json(ErrorResponse::new("Unauthorized"))).into_response(),
    }
}

/// Query string of a log request; a missing bound leaves that side open
#[derive(Debug, Default, Deserialize)]
pub struct LogsQuery {
    pub start: Option<String>,
    pub end: Option<String>,
}

impl LogsQuery {
    pub fn range(&self) -> logkeep_core::Result<TimeRange> {
        TimeRange::from_bounds(self.start.as_deref(), self.end.as_deref())
    }
}

/// Map an archive error onto a status code
pub fn status_for(err: &Error) -> StatusCode {
    match err {
        Error::WorkloadNotFound(_) => StatusCode::NOT_FOUND,
        e if e.is_bad_request() => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(err: Error) -> AxumResponse {
    let status = status_for(&err);
    if status.is_server_error() {
        error!("Query failed: {}", err);
    }
    (status, Json(ErrorResponse::new(err.to_string()))).into_response()
}

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    let protected_routes = Router::new()
        .route("/api/:workload", get(get_logs))
        .route_layer(middleware::from_fn_with_state(state.clone(), bearer_auth));

    let public_routes = Router::new()
        .route("/api/health", get(health_check))
        .route("/api/version", get(version));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the API until the future is dropped or the listener fails
pub async fn start_server(bind_addr: &str, state: AppState) -> std::io::Result<()> {
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    info!("logkeep API listening on {}", bind_addr);

    axum::serve(listener, app).await
}

// === API Handlers ===

async fn health_check() -> &'static str {
    "OK"
}

async fn version() -> &'static str {
    VERSION
}

async fn get_logs(
    State(state): State<AppState>,
    Path(workload): Path<String>,
    Query(query): Query<LogsQuery>,
) -> AxumResponse {
    let range = match query.range() {
        Ok(range) => range,
        Err(e) => return error_response(e),
    };

    // Archive reads are plain file I/O
    let reader = Arc::clone(&state.reader);
    let result = tokio::task::spawn_blocking(move || reader.query(&workload, &range)).await;

    match result {
        Ok(Ok(logs)) => Json(LogsResponse { logs }).into_response(),
        Ok(Err(e)) => error_response(e),
        Err(e) => error_response(Error::IoError(std::io::Error::other(e))),
    }
}
