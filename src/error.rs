// Error taxonomy. Each error is recovered at the component that detects it;
// only status-change events (with a reason string) cross component boundaries.

use std::path::PathBuf;
use std::time::Duration;

/// I/O-level failure of an established RCON transport.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("no response within {0:?}")]
    Timeout(Duration),
    #[error("transport closed")]
    Closed,
    /// The remote refused the request itself (e.g. command too long). Not retried.
    #[error("request rejected: {0}")]
    Rejected(String),
}

impl TransportError {
    /// Whether a send should be attempted again, on a new transport, after this error.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, TransportError::Rejected(_))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("unknown server '{0}'")]
    UnknownServer(String),
    #[error("invalid server config: {0}")]
    InvalidConfig(String),
    #[error("authentication failed")]
    Authentication,
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("handshake timed out after {0:?}")]
    Timeout(Duration),
}

impl ConnectionError {
    /// Authentication and config errors never succeed on retry.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ConnectionError::Authentication
                | ConnectionError::InvalidConfig(_)
                | ConnectionError::UnknownServer(_)
        )
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LogMonitorError {
    #[error("log file not found: {}", .0.display())]
    FileNotFound(PathBuf),
    #[error("log file I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Reasons a telemetry strategy produced nothing. Logged, never propagated.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("command failed: {0}")]
    Transport(String),
    #[error("unexpected output: {0}")]
    Parse(String),
    #[error("viewer fetch failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("no log monitor or log_path configured")]
    NoLogSource,
}
