// Telemetry acquisition: health reports from the profiler plugin, obtained either
// by parsing its command output or by fetching the document behind an upload link.

mod players;
mod spark_json;
mod text;
mod upload;

pub use players::parse_player_list;
pub use spark_json::SparkDocument;
pub use text::{parse_command_report, parse_tps};
pub use upload::viewer_url_pattern;

use regex::Regex;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use crate::config::TelemetryConfig;
use crate::connection::ConnectionManager;
use crate::error::TelemetryError;
use crate::log_monitor::LogTailMonitor;
use crate::models::{HealthReport, TpsWindows};
use crate::version;

/// Outcome of one strategy.
#[derive(Debug)]
pub enum Acquisition {
    Parsed(HealthReport),
    Unavailable(String),
}

impl From<Result<HealthReport, TelemetryError>> for Acquisition {
    fn from(result: Result<HealthReport, TelemetryError>) -> Self {
        match result {
            Ok(report) => Acquisition::Parsed(report),
            Err(e) => Acquisition::Unavailable(e.to_string()),
        }
    }
}

struct CacheEntry {
    report: HealthReport,
    stored_at: Instant,
}

pub struct TelemetryEngine {
    connections: Arc<ConnectionManager>,
    monitor: Arc<LogTailMonitor>,
    settings: TelemetryConfig,
    http: reqwest::Client,
    viewer_url: Regex,
    cache: RwLock<HashMap<String, CacheEntry>>,
}

impl TelemetryEngine {
    pub fn new(
        connections: Arc<ConnectionManager>,
        monitor: Arc<LogTailMonitor>,
        settings: TelemetryConfig,
    ) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(version::user_agent())
            .timeout(settings.http_timeout())
            .build()?;
        let viewer_url = viewer_url_pattern(&settings.viewer_host)?;
        Ok(Self {
            connections,
            monitor,
            settings,
            http,
            viewer_url,
            cache: RwLock::new(HashMap::new()),
        })
    }

    /// Cached report younger than the TTL. Expired entries are dropped on read.
    pub async fn cached(&self, server_id: &str) -> Option<HealthReport> {
        {
            let cache = self.cache.read().await;
            match cache.get(server_id) {
                None => return None,
                Some(entry) if entry.stored_at.elapsed() <= self.settings.cache_ttl() => {
                    return Some(entry.report.clone());
                }
                Some(_) => {}
            }
        }
        let mut cache = self.cache.write().await;
        if cache
            .get(server_id)
            .is_some_and(|e| e.stored_at.elapsed() > self.settings.cache_ttl())
        {
            cache.remove(server_id);
        }
        None
    }

    /// Drops the cached report so the next `get_health` acquires fresh data.
    pub async fn forget(&self, server_id: &str) {
        self.cache.write().await.remove(server_id);
    }

    /// Cache, then command output, then upload link. `None` when every strategy fails;
    /// failures are never cached.
    #[instrument(skip(self))]
    pub async fn get_health(&self, server_id: &str) -> Option<HealthReport> {
        if let Some(report) = self.cached(server_id).await {
            debug!("serving cached health report");
            return Some(report);
        }

        let report = match self.acquire_from_commands(server_id).await {
            Acquisition::Parsed(report) => report,
            Acquisition::Unavailable(reason) => {
                debug!(%reason, "command strategy unavailable; trying upload");
                match self.acquire_from_upload(server_id).await {
                    Acquisition::Parsed(report) => report,
                    Acquisition::Unavailable(upload_reason) => {
                        warn!(
                            command_reason = %reason,
                            upload_reason = %upload_reason,
                            "health report unavailable"
                        );
                        return None;
                    }
                }
            }
        };

        self.cache.write().await.insert(
            server_id.to_string(),
            CacheEntry {
                report: report.clone(),
                stored_at: Instant::now(),
            },
        );
        Some(report)
    }

    /// TPS only, straight from the TPS command. Not cached.
    #[instrument(skip(self))]
    pub async fn get_tps(&self, server_id: &str) -> Option<TpsWindows> {
        let result = self
            .connections
            .send(server_id, &self.settings.tps_command)
            .await;
        if !result.success {
            debug!(reason = %result.normalized_text, "tps command failed");
            return None;
        }
        parse_tps(&result.normalized_text)
    }

    /// Strategy (a): both diagnostic commands, parsed as text.
    pub async fn acquire_from_commands(&self, server_id: &str) -> Acquisition {
        let (tps, health) = tokio::join!(
            self.connections.send(server_id, &self.settings.tps_command),
            self.connections.send(server_id, &self.settings.health_command),
        );
        if !tps.success && !health.success {
            return Acquisition::Unavailable(
                TelemetryError::Transport(tps.normalized_text).to_string(),
            );
        }
        let tps_text = tps.success.then_some(tps.normalized_text.as_str());
        let health_text = health.success.then_some(health.normalized_text.as_str());
        parse_command_report(tps_text, health_text).into()
    }

    /// Strategy (b): trigger an upload, find its link, fetch the raw document.
    pub async fn acquire_from_upload(&self, server_id: &str) -> Acquisition {
        let result: Result<HealthReport, TelemetryError> = async {
            let url = self.upload_url(server_id).await?;
            info!(server_id, %url, "fetching uploaded health report");
            let document =
                upload::fetch_document(&self.http, &url, self.settings.http_timeout()).await?;
            document.to_report()
        }
        .await;
        result.into()
    }

    fn log_path(&self, server_id: &str) -> Option<PathBuf> {
        self.connections
            .configs()
            .get_config(server_id)
            .and_then(|c| c.log_path)
            .map(PathBuf::from)
    }

    async fn upload_url(&self, server_id: &str) -> Result<String, TelemetryError> {
        // Subscribe before sending so the link line cannot slip past us.
        let subscription = self.monitor.subscribe(server_id);
        let log_path = self.log_path(server_id);
        let baseline = match (&subscription, &log_path) {
            (None, Some(path)) => upload::log_len(path).await.unwrap_or(0),
            _ => 0,
        };

        let result = self
            .connections
            .send(server_id, &self.settings.upload_command)
            .await;
        if !result.success {
            return Err(TelemetryError::Transport(result.normalized_text));
        }
        if let Some(url) = upload::find_url(&self.viewer_url, &result.normalized_text) {
            return Ok(url);
        }

        match (subscription, log_path) {
            (Some(subscription), _) => {
                let wait = self.settings.upload_wait_timeout();
                let pattern = &self.viewer_url;
                subscription
                    .wait_for(|line| pattern.is_match(&line.message), wait)
                    .await
                    .and_then(|line| upload::find_url(pattern, &line.message))
                    .ok_or(TelemetryError::Timeout(wait))
            }
            (None, Some(path)) => {
                tokio::time::sleep(self.settings.upload_grace()).await;
                let tail = upload::read_log_tail(&path, self.settings.log_tail_bytes, baseline)
                    .await
                    .map_err(|e| {
                        TelemetryError::Transport(format!("reading {}: {e}", path.display()))
                    })?;
                upload::find_last_url(&self.viewer_url, &tail)
                    .ok_or_else(|| TelemetryError::Parse("no upload link in log tail".into()))
            }
            (None, None) => Err(TelemetryError::NoLogSource),
        }
    }
}
