use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: HttpConfig,
    pub monitoring: MonitoringConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    #[serde(default)]
    pub servers: Vec<ServerConfig>,
}

/// HTTP/WebSocket listener.
#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    pub port: u16,
    pub host: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MonitoringConfig {
    pub sample_interval_ms: u64,
    /// How often to log collector stats at INFO level.
    pub stats_log_interval_secs: u64,
    /// Samples kept per server in the in-memory ring buffer.
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,
    #[serde(default = "default_player_list_command")]
    pub player_list_command: String,
    /// Max number of samples/status events buffered for slow WebSocket clients.
    #[serde(default = "default_broadcast_capacity")]
    pub broadcast_capacity: usize,
}

fn default_history_capacity() -> usize {
    120
}

fn default_player_list_command() -> String {
    "list".into()
}

fn default_broadcast_capacity() -> usize {
    64
}

/// Telemetry acquisition settings. Every key is optional.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    pub cache_ttl_ms: u64,
    pub tps_command: String,
    pub health_command: String,
    pub upload_command: String,
    /// Host of the viewer that upload links point at.
    pub viewer_host: String,
    pub http_timeout_ms: u64,
    /// How long to wait for the upload link to show up in a monitored log.
    pub upload_wait_timeout_ms: u64,
    /// Sleep before scanning the raw log when no monitor is running.
    pub upload_grace_ms: u64,
    /// Bytes read from the end of the raw log when scanning for the link.
    pub log_tail_bytes: u64,
    pub log_poll_interval_ms: u64,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            cache_ttl_ms: 5_000,
            tps_command: "spark tps".into(),
            health_command: "spark health".into(),
            upload_command: "spark health --upload".into(),
            viewer_host: "spark.lucko.me".into(),
            http_timeout_ms: 10_000,
            upload_wait_timeout_ms: 15_000,
            upload_grace_ms: 3_000,
            log_tail_bytes: 64 * 1024,
            log_poll_interval_ms: 500,
        }
    }
}

impl TelemetryConfig {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_millis(self.cache_ttl_ms)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_millis(self.http_timeout_ms)
    }

    pub fn upload_wait_timeout(&self) -> Duration {
        Duration::from_millis(self.upload_wait_timeout_ms)
    }

    pub fn upload_grace(&self) -> Duration {
        Duration::from_millis(self.upload_grace_ms)
    }

    pub fn log_poll_interval(&self) -> Duration {
        Duration::from_millis(self.log_poll_interval_ms)
    }
}

/// One remotely administered game server.
#[derive(Clone, Deserialize)]
pub struct ServerConfig {
    pub id: String,
    pub host: String,
    pub port: u16,
    /// RCON password.
    pub password: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    #[serde(default)]
    pub log_path: Option<String>,
    #[serde(default = "default_true")]
    pub auto_connect: bool,
    #[serde(default = "default_true")]
    pub auto_reconnect: bool,
}

fn default_timeout_ms() -> u64 {
    5_000
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    2_000
}

fn default_true() -> bool {
    true
}

impl fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerConfig")
            .field("id", &self.id)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("password", &"<redacted>")
            .field("timeout_ms", &self.timeout_ms)
            .field("retry_attempts", &self.retry_attempts)
            .field("retry_delay_ms", &self.retry_delay_ms)
            .field("log_path", &self.log_path)
            .field("auto_connect", &self.auto_connect)
            .field("auto_reconnect", &self.auto_reconnect)
            .finish()
    }
}

impl ServerConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Checks the fields a handshake needs. Returns a reason naming the bad key.
    pub fn check(&self) -> Result<(), String> {
        if self.host.trim().is_empty() {
            return Err(format!("servers[{}].host must be non-empty", self.id));
        }
        if self.port == 0 {
            return Err(format!(
                "servers[{}].port must be between 1 and 65535, got 0",
                self.id
            ));
        }
        if self.password.is_empty() {
            return Err(format!("servers[{}].password must be non-empty", self.id));
        }
        if self.timeout_ms == 0 {
            return Err(format!("servers[{}].timeout_ms must be > 0", self.id));
        }
        Ok(())
    }
}

impl AppConfig {
    pub fn load() -> anyhow::Result<Self> {
        let path = std::env::var("CONFIG_FILE").unwrap_or_else(|_| "config.toml".into());
        let s = std::fs::read_to_string(&path)?;
        Self::load_from_str(&s)
    }

    /// Parse and validate config from a string (e.g. for tests).
    pub fn load_from_str(s: &str) -> anyhow::Result<Self> {
        let config: AppConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            self.server.port > 0,
            "server.port must be between 1 and 65535, got {}",
            self.server.port
        );
        anyhow::ensure!(
            self.monitoring.sample_interval_ms > 0,
            "monitoring.sample_interval_ms must be > 0, got {}",
            self.monitoring.sample_interval_ms
        );
        anyhow::ensure!(
            self.monitoring.stats_log_interval_secs > 0,
            "monitoring.stats_log_interval_secs must be > 0, got {}",
            self.monitoring.stats_log_interval_secs
        );
        anyhow::ensure!(
            self.monitoring.history_capacity > 0,
            "monitoring.history_capacity must be > 0, got {}",
            self.monitoring.history_capacity
        );
        anyhow::ensure!(
            self.monitoring.broadcast_capacity > 0,
            "monitoring.broadcast_capacity must be > 0, got {}",
            self.monitoring.broadcast_capacity
        );
        anyhow::ensure!(
            self.telemetry.cache_ttl_ms > 0,
            "telemetry.cache_ttl_ms must be > 0, got {}",
            self.telemetry.cache_ttl_ms
        );
        anyhow::ensure!(
            self.telemetry.http_timeout_ms > 0,
            "telemetry.http_timeout_ms must be > 0, got {}",
            self.telemetry.http_timeout_ms
        );
        anyhow::ensure!(
            self.telemetry.log_poll_interval_ms > 0,
            "telemetry.log_poll_interval_ms must be > 0, got {}",
            self.telemetry.log_poll_interval_ms
        );
        anyhow::ensure!(
            !self.telemetry.viewer_host.is_empty(),
            "telemetry.viewer_host must be non-empty"
        );

        let mut seen = HashSet::new();
        for server in &self.servers {
            anyhow::ensure!(!server.id.is_empty(), "servers[].id must be non-empty");
            anyhow::ensure!(
                seen.insert(server.id.as_str()),
                "servers[].id must be unique, '{}' appears twice",
                server.id
            );
            server.check().map_err(anyhow::Error::msg)?;
        }
        Ok(())
    }
}

/// Source of per-server connection settings.
pub trait ConfigProvider: Send + Sync {
    fn get_config(&self, server_id: &str) -> Option<ServerConfig>;
    fn server_ids(&self) -> Vec<String>;
}

/// Provider over the `[[servers]]` table loaded at startup.
#[derive(Debug, Clone, Default)]
pub struct StaticConfigProvider {
    servers: BTreeMap<String, ServerConfig>,
}

impl StaticConfigProvider {
    pub fn new(servers: impl IntoIterator<Item = ServerConfig>) -> Self {
        Self {
            servers: servers.into_iter().map(|s| (s.id.clone(), s)).collect(),
        }
    }
}

impl ConfigProvider for StaticConfigProvider {
    fn get_config(&self, server_id: &str) -> Option<ServerConfig> {
        self.servers.get(server_id).cloned()
    }

    fn server_ids(&self) -> Vec<String> {
        self.servers.keys().cloned().collect()
    }
}
