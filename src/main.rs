use anyhow::Result;
use rconwatch::*;
use std::sync::Arc;
use std::sync::atomic::AtomicUsize;
use tokio::sync::broadcast;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::time::FormatTime;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(
            w,
            "{}",
            chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.3f%:z")
        )
    }
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(s) => s,
            Err(_) => {
                let _ = tokio::signal::ctrl_c().await;
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

/// Connects every `auto_connect` server and starts tailing its log when configured.
/// Failures are logged; the process keeps running and the server can be connected later.
async fn start_servers(
    app_config: &config::AppConfig,
    connections: &connection::ConnectionManager,
    monitor: &log_monitor::LogTailMonitor,
) {
    for server in &app_config.servers {
        if let Some(path) = &server.log_path
            && let Err(e) = monitor.start_monitoring(&server.id, path).await
        {
            tracing::warn!(server_id = %server.id, error = %e, "log monitoring not started");
        }
        if !server.auto_connect {
            continue;
        }
        if let Err(e) = connections.connect(&server.id).await {
            tracing::warn!(server_id = %server.id, error = %e, "auto-connect failed");
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_timer(LocalTimer)
        .with_env_filter(filter)
        .init();

    let app_config = config::AppConfig::load()?;
    tracing::info!(
        name = version::NAME,
        version = version::VERSION,
        servers = app_config.servers.len(),
        "starting"
    );

    let capacity = app_config.monitoring.broadcast_capacity;
    let (samples_tx, _) = broadcast::channel::<models::ServerSample>(capacity);
    let (status_tx, _) = broadcast::channel::<models::StatusEvent>(capacity);

    let provider = Arc::new(config::StaticConfigProvider::new(
        app_config.servers.iter().cloned(),
    ));
    let connections = Arc::new(connection::ConnectionManager::new(
        provider,
        Arc::new(connection::RconConnector),
    ));
    let status_forward = status_tx.clone();
    let _status_subscription = connections.on_status_change(move |event| {
        let _ = status_forward.send(event.clone());
    });

    let monitor = Arc::new(log_monitor::LogTailMonitor::new(
        app_config.telemetry.log_poll_interval(),
    ));
    let telemetry = Arc::new(telemetry::TelemetryEngine::new(
        connections.clone(),
        monitor.clone(),
        app_config.telemetry.clone(),
    )?);
    let history = Arc::new(history::HistoryStore::new(
        app_config.monitoring.history_capacity,
    ));

    start_servers(&app_config, &connections, &monitor).await;

    let ws_sample_connections = Arc::new(AtomicUsize::new(0));
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();

    let collector_handle = collector::spawn(
        collector::CollectorDeps {
            connections: connections.clone(),
            telemetry: telemetry.clone(),
            history: history.clone(),
            tx: samples_tx.clone(),
            ws_sample_connections: ws_sample_connections.clone(),
            shutdown_rx,
        },
        collector::CollectorConfig {
            sample_interval_ms: app_config.monitoring.sample_interval_ms,
            stats_log_interval_secs: app_config.monitoring.stats_log_interval_secs,
            player_list_command: app_config.monitoring.player_list_command.clone(),
        },
    );

    let app = routes::app(routes::AppState {
        connections: connections.clone(),
        telemetry,
        history,
        status_tx,
        samples_tx,
        ws_sample_connections,
    });
    let addr = format!("{}:{}", app_config.server.host, app_config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Received shutdown signal");
    let _ = shutdown_tx.send(());
    let _ = collector_handle.await;
    connections.disconnect_all().await;
    monitor.stop_all();
    tracing::info!("shutdown complete");

    Ok(())
}
