// Collected per-server samples (history + /ws/samples)

use serde::{Deserialize, Serialize};

use super::HealthReport;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerList {
    pub online: u32,
    pub max: u32,
    pub players: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerSample {
    pub server_id: String,
    /// Unix millis.
    pub timestamp: u64,
    /// `None` when telemetry was unavailable for this tick.
    pub health: Option<HealthReport>,
    pub players: Option<PlayerList>,
}
