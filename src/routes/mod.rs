// HTTP + WebSocket routes

mod http;
mod ws;

use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use std::sync::atomic::AtomicUsize;
use tokio::sync::broadcast;
use tower_http::cors::{Any, CorsLayer};

use crate::connection::ConnectionManager;
use crate::history::HistoryStore;
use crate::models::{ServerSample, StatusEvent};
use crate::telemetry::TelemetryEngine;

#[derive(Clone)]
pub struct AppState {
    pub connections: Arc<ConnectionManager>,
    pub telemetry: Arc<TelemetryEngine>,
    pub history: Arc<HistoryStore>,
    pub status_tx: broadcast::Sender<StatusEvent>,
    pub samples_tx: broadcast::Sender<ServerSample>,
    pub ws_sample_connections: Arc<AtomicUsize>,
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/", get(|| async { "rconwatch: game server RCON and telemetry" })) // GET /
        .route("/version", get(http::version_handler)) // GET /version
        .route("/api/servers", get(http::list_servers)) // GET /api/servers
        .route("/api/servers/{id}/connect", post(http::connect)) // POST connect
        .route("/api/servers/{id}/disconnect", post(http::disconnect)) // POST disconnect
        .route("/api/servers/{id}/command", post(http::command)) // POST command
        .route("/api/servers/{id}/health", get(http::health)) // GET health
        .route("/api/servers/{id}/tps", get(http::tps)) // GET tps
        .route("/api/servers/{id}/history", get(http::history)) // GET history
        .route("/ws/status", get(ws::ws_status)) // WS /ws/status
        .route("/ws/samples", get(ws::ws_samples)) // WS /ws/samples
        .layer(CorsLayer::new().allow_origin(Any))
        .with_state(state)
}
