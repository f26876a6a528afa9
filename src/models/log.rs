// Parsed server log lines

use serde::{Deserialize, Serialize};

/// One line matching `[HH:MM:SS] [<thread>/<LEVEL>]: <message>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogLine {
    /// Wall-clock time as printed by the server (`HH:MM:SS`).
    pub timestamp: String,
    pub level: String,
    pub thread: String,
    /// Present for builds that print `[thread/LEVEL] [logger]: message`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logger_name: Option<String>,
    pub message: String,
    pub raw: String,
}

/// A line together with the server whose log produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEvent {
    pub server_id: String,
    pub line: LogLine,
}
