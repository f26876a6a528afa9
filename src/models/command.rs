// Result of one command sent over a session

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandResult {
    pub success: bool,
    /// Sanitized response on success, a human-readable reason on failure.
    pub normalized_text: String,
    pub issued_at: DateTime<Utc>,
    pub execution_time_ms: u64,
}

impl CommandResult {
    pub fn success(text: String, issued_at: DateTime<Utc>, execution_time_ms: u64) -> Self {
        Self {
            success: true,
            normalized_text: text,
            issued_at,
            execution_time_ms,
        }
    }

    pub fn failure(reason: impl Into<String>, issued_at: DateTime<Utc>, execution_time_ms: u64) -> Self {
        Self {
            success: false,
            normalized_text: reason.into(),
            issued_at,
            execution_time_ms,
        }
    }

    /// Failure that was decided before any I/O happened.
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self::failure(reason, Utc::now(), 0)
    }
}
