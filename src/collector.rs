// Background collector: every tick, samples health and player list for each
// connected server, appends to history and broadcasts to /ws/samples.

use futures_util::future::join_all;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::{broadcast, oneshot};
use tokio::time::{Duration, Instant, MissedTickBehavior, interval};
use tracing::Instrument;

use crate::connection::ConnectionManager;
use crate::history::HistoryStore;
use crate::models::ServerSample;
use crate::telemetry::{TelemetryEngine, parse_player_list};

/// Rate limit for the "no receivers" debug line.
const NO_RECEIVERS_LOG_INTERVAL: Duration = Duration::from_secs(60);

pub struct CollectorDeps {
    pub connections: Arc<ConnectionManager>,
    pub telemetry: Arc<TelemetryEngine>,
    pub history: Arc<HistoryStore>,
    pub tx: broadcast::Sender<ServerSample>,
    pub ws_sample_connections: Arc<AtomicUsize>,
    pub shutdown_rx: oneshot::Receiver<()>,
}

pub struct CollectorConfig {
    pub sample_interval_ms: u64,
    /// How often to log collector stats (real seconds).
    pub stats_log_interval_secs: u64,
    pub player_list_command: String,
}

/// Collects one sample. Telemetry and player-list failures leave the field `None`.
pub async fn collect_once(
    connections: &ConnectionManager,
    telemetry: &TelemetryEngine,
    player_list_command: &str,
    server_id: &str,
) -> ServerSample {
    let health = telemetry.get_health(server_id).await;
    let list = connections.send(server_id, player_list_command).await;
    let players = if list.success {
        parse_player_list(&list.normalized_text)
    } else {
        None
    };
    if players.is_none() {
        tracing::debug!(
            server_id,
            operation = "player_list",
            response = %list.normalized_text,
            "player list unavailable"
        );
    }
    ServerSample {
        server_id: server_id.to_string(),
        timestamp: unix_millis(),
        health,
        players,
    }
}

fn unix_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_else(|e| {
            tracing::warn!(error = %e, operation = "get_timestamp", "system time error");
            0
        })
}

pub fn spawn(deps: CollectorDeps, config: CollectorConfig) -> tokio::task::JoinHandle<()> {
    let CollectorDeps {
        connections,
        telemetry,
        history,
        tx,
        ws_sample_connections,
        mut shutdown_rx,
    } = deps;
    let CollectorConfig {
        sample_interval_ms,
        stats_log_interval_secs,
        player_list_command,
    } = config;

    let span = tracing::span!(tracing::Level::DEBUG, "collector", sample_interval_ms);
    let task = async move {
        let mut tick = interval(Duration::from_millis(sample_interval_ms));
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut stats_log_tick = interval(Duration::from_secs(stats_log_interval_secs));
        stats_log_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut samples_total: u64 = 0;
        let mut health_unavailable_total: u64 = 0;
        let mut last_no_receivers_log: Option<Instant> = None;

        loop {
            tokio::select! {
                _ = tick.tick() => {
                    let servers = connections.connected_servers();
                    if servers.is_empty() {
                        continue;
                    }
                    let samples = join_all(servers.iter().map(|id| {
                        collect_once(&connections, &telemetry, &player_list_command, id)
                    }))
                    .await;

                    for sample in samples {
                        if sample.health.is_none() {
                            health_unavailable_total += 1;
                        }
                        samples_total += 1;
                        history.push(sample.clone()).await;
                        if tx.send(sample).is_err() {
                            let should_log = last_no_receivers_log
                                .is_none_or(|t| t.elapsed() >= NO_RECEIVERS_LOG_INTERVAL);
                            if should_log {
                                tracing::debug!(
                                    operation = "broadcast_sample",
                                    "no active sample subscribers"
                                );
                                last_no_receivers_log = Some(Instant::now());
                            }
                        }
                    }
                }
                _ = &mut shutdown_rx => {
                    tracing::debug!("collector shutting down");
                    break;
                }
                _ = stats_log_tick.tick() => {
                    tracing::info!(
                        connected_servers = connections.connected_servers().len(),
                        ws_sample_clients = ws_sample_connections.load(Ordering::Relaxed),
                        samples_total,
                        health_unavailable_total,
                        "collector stats"
                    );
                }
            }
        }
    };
    tokio::spawn(task.instrument(span))
}
