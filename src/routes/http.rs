// HTTP handlers: thin mapping onto the connection manager and telemetry engine

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};

use super::AppState;
use crate::error::ConnectionError;
use crate::models::ConnectionStatus;
use crate::version::{NAME, VERSION};

/// GET /version
pub(super) async fn version_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "name": NAME,
        "version": VERSION,
    }))
}

#[derive(Debug, Serialize)]
pub(super) struct ServerSummary {
    id: String,
    status: ConnectionStatus,
}

/// GET /api/servers: every configured server with its current status.
pub(super) async fn list_servers(State(state): State<AppState>) -> impl IntoResponse {
    let servers: Vec<ServerSummary> = state
        .connections
        .configs()
        .server_ids()
        .into_iter()
        .map(|id| ServerSummary {
            status: state.connections.status(&id),
            id,
        })
        .collect();
    Json(servers)
}

fn error_body(status: StatusCode, message: impl ToString) -> Response {
    (
        status,
        Json(serde_json::json!({ "error": message.to_string() })),
    )
        .into_response()
}

fn unavailable() -> Response {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(serde_json::json!({ "status": "unavailable" })),
    )
        .into_response()
}

pub(super) async fn connect(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.connections.connect(&id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e @ ConnectionError::UnknownServer(_)) => error_body(StatusCode::NOT_FOUND, e),
        Err(e) => error_body(StatusCode::BAD_GATEWAY, e),
    }
}

pub(super) async fn disconnect(State(state): State<AppState>, Path(id): Path<String>) -> StatusCode {
    state.connections.disconnect(&id).await;
    state.telemetry.forget(&id).await;
    StatusCode::NO_CONTENT
}

#[derive(Debug, Deserialize)]
pub(super) struct CommandRequest {
    command: String,
}

/// POST /api/servers/{id}/command: always 200; failures are in the `CommandResult`.
pub(super) async fn command(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<CommandRequest>,
) -> impl IntoResponse {
    Json(state.connections.send(&id, &req.command).await)
}

pub(super) async fn health(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.telemetry.get_health(&id).await {
        Some(report) => Json(report).into_response(),
        None => unavailable(),
    }
}

pub(super) async fn tps(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.telemetry.get_tps(&id).await {
        Some(tps) => Json(tps).into_response(),
        None => unavailable(),
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct HistoryQuery {
    limit: Option<usize>,
}

/// GET /api/servers/{id}/history?limit=N: oldest first; `limit` defaults to the ring capacity.
pub(super) async fn history(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> impl IntoResponse {
    let limit = query.limit.unwrap_or_else(|| state.history.capacity());
    Json(state.history.recent(&id, limit).await)
}
