// Collector: per-server samples, history, broadcast, shutdown

mod common;

use common::{MockConnector, manager, server_config};
use rconwatch::collector::{self, CollectorConfig, CollectorDeps};
use rconwatch::config::TelemetryConfig;
use rconwatch::history::HistoryStore;
use rconwatch::log_monitor::LogTailMonitor;
use rconwatch::telemetry::TelemetryEngine;
use std::sync::Arc;
use std::sync::atomic::AtomicUsize;
use std::time::Duration;
use tokio::sync::{broadcast, oneshot};

const TPS_OUTPUT: &str = "TPS from last 5s, 10s, 1m, 5m, 15m: 20.0, 20.0, 19.8, 19.9, 20.0";

#[tokio::test]
async fn test_collect_once_builds_sample() {
    let connector = MockConnector::new();
    connector
        .respond("spark tps", TPS_OUTPUT)
        .respond("list", "There are 2 of a max of 20 players online: Alex, Steve");
    let connections = manager(vec![server_config("s1")], &connector);
    let monitor = Arc::new(LogTailMonitor::new(Duration::from_millis(50)));
    let telemetry =
        TelemetryEngine::new(connections.clone(), monitor, TelemetryConfig::default()).unwrap();
    connections.connect("s1").await.unwrap();

    let sample = collector::collect_once(&connections, &telemetry, "list", "s1").await;
    assert_eq!(sample.server_id, "s1");
    assert!(sample.timestamp > 0);
    assert_eq!(sample.health.unwrap().tps.last_1m, 19.8);
    let players = sample.players.unwrap();
    assert_eq!(players.online, 2);
    assert_eq!(players.players, vec!["Alex", "Steve"]);
}

#[tokio::test]
async fn test_collector_feeds_history_and_broadcast() {
    let connector = MockConnector::new();
    connector
        .respond("spark tps", TPS_OUTPUT)
        .respond("list", "There are 0 of a max of 10 players online:");
    let connections = manager(
        vec![server_config("s1"), server_config("s2")],
        &connector,
    );
    let monitor = Arc::new(LogTailMonitor::new(Duration::from_millis(50)));
    let telemetry = Arc::new(
        TelemetryEngine::new(connections.clone(), monitor, TelemetryConfig::default()).unwrap(),
    );
    let history = Arc::new(HistoryStore::new(10));
    connections.connect("s1").await.unwrap();

    let (tx, mut rx) = broadcast::channel(16);
    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let handle = collector::spawn(
        CollectorDeps {
            connections: connections.clone(),
            telemetry,
            history: history.clone(),
            tx,
            ws_sample_connections: Arc::new(AtomicUsize::new(0)),
            shutdown_rx,
        },
        CollectorConfig {
            sample_interval_ms: 50,
            stats_log_interval_secs: 60,
            player_list_command: "list".into(),
        },
    );

    let sample = tokio::time::timeout(Duration::from_secs(3), rx.recv())
        .await
        .expect("sample within timeout")
        .unwrap();
    assert_eq!(sample.server_id, "s1");
    assert_eq!(sample.players.unwrap().max, 10);

    let _ = shutdown_tx.send(());
    tokio::time::timeout(Duration::from_secs(3), handle)
        .await
        .expect("collector stops")
        .unwrap();

    assert!(!history.recent("s1", 10).await.is_empty());
    // s2 was never connected, so it is never sampled.
    assert!(history.recent("s2", 10).await.is_empty());
}
