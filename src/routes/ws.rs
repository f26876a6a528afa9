// WebSocket handlers: forward broadcast channels to clients as JSON text frames

use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use bytes::Bytes;
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::broadcast;
use tokio::time::{Duration, MissedTickBehavior, interval, timeout};

use super::AppState;

pub(super) const WS_PING_INTERVAL: Duration = Duration::from_secs(30);
pub(super) const WS_SEND_TIMEOUT: Duration = Duration::from_secs(10);

/// Decrements the sample-stream connection count on drop (connect = +1, drop = -1).
struct ConnectionCountGuard(Arc<AtomicUsize>);

impl ConnectionCountGuard {
    fn register(count: Arc<AtomicUsize>) -> Self {
        count.fetch_add(1, Ordering::Relaxed);
        Self(count)
    }
}

impl Drop for ConnectionCountGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::Relaxed);
    }
}

/// Sends one frame; `false` when the client is gone or too slow.
async fn send_frame(socket: &mut WebSocket, message: Message) -> bool {
    matches!(timeout(WS_SEND_TIMEOUT, socket.send(message)).await, Ok(Ok(())))
}

pub(super) async fn ws_status(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let rx = state.status_tx.subscribe();
    ws.on_upgrade(move |socket| async move {
        tracing::info!("client connected to status stream");
        if let Err(e) = forward(socket, rx, "/ws/status").await {
            tracing::info!(error = %e, "status stream error");
        }
    })
}

pub(super) async fn ws_samples(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let rx = state.samples_tx.subscribe();
    let count = state.ws_sample_connections.clone();
    ws.on_upgrade(move |socket| async move {
        let _guard = ConnectionCountGuard::register(count);
        tracing::info!("client connected to sample stream");
        if let Err(e) = forward(socket, rx, "/ws/samples").await {
            tracing::info!(error = %e, "sample stream error");
        }
    })
}

async fn forward<T>(
    mut socket: WebSocket,
    mut rx: broadcast::Receiver<T>,
    path: &'static str,
) -> anyhow::Result<()>
where
    T: Serialize + Clone,
{
    let mut ping_interval = interval(WS_PING_INTERVAL);
    ping_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            result = rx.recv() => {
                match result {
                    Ok(item) => {
                        let json = serde_json::to_string(&item)?;
                        if !send_frame(&mut socket, Message::Text(json.into())).await {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!(path, skipped = n, "WebSocket client lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            _ = ping_interval.tick() => {
                if !send_frame(&mut socket, Message::Ping(Bytes::new())).await {
                    break;
                }
            }
        }
    }
    Ok(())
}
