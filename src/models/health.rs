// Health report models. Unavailable sub-metrics carry sentinels (20.0 TPS, 0 elsewhere)
// so consumers only branch on `disk`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// TPS assumed when a window is missing (the game's nominal tick rate).
pub const TPS_SENTINEL: f64 = 20.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TpsWindows {
    pub last_5s: f64,
    pub last_10s: f64,
    pub last_1m: f64,
    pub last_5m: f64,
    pub last_15m: f64,
}

impl Default for TpsWindows {
    fn default() -> Self {
        Self {
            last_5s: TPS_SENTINEL,
            last_10s: TPS_SENTINEL,
            last_1m: TPS_SENTINEL,
            last_5m: TPS_SENTINEL,
            last_15m: TPS_SENTINEL,
        }
    }
}

impl TpsWindows {
    /// Builds from values ordered 5s, 10s, 1m, 5m, 15m.
    pub fn from_values(v: [f64; 5]) -> Self {
        Self {
            last_5s: non_negative_or(v[0], TPS_SENTINEL),
            last_10s: non_negative_or(v[1], TPS_SENTINEL),
            last_1m: non_negative_or(v[2], TPS_SENTINEL),
            last_5m: non_negative_or(v[3], TPS_SENTINEL),
            last_15m: non_negative_or(v[4], TPS_SENTINEL),
        }
    }
}

/// Milliseconds per tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MsptStats {
    pub min: f64,
    pub median: f64,
    pub p95: f64,
    pub max: f64,
}

/// CPU usage in percent over 10s, 1m and 15m.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CpuWindows {
    pub last_10s: f64,
    pub last_1m: f64,
    pub last_15m: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CpuUsage {
    pub process: CpuWindows,
    pub system: CpuWindows,
}

/// Memory figures in MB.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryUsage {
    pub used: f64,
    pub allocated: f64,
    pub max: f64,
}

/// Disk figures in GB.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiskUsage {
    pub used: f64,
    pub total: f64,
}

/// Which acquisition strategy produced a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthSource {
    Command,
    Upload,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub tps: TpsWindows,
    pub mspt: MsptStats,
    pub cpu: CpuUsage,
    pub memory: MemoryUsage,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disk: Option<DiskUsage>,
    pub source: HealthSource,
    pub captured_at: DateTime<Utc>,
}

impl HealthReport {
    /// Report with every metric at its sentinel, stamped now.
    pub fn empty(source: HealthSource) -> Self {
        Self {
            tps: TpsWindows::default(),
            mspt: MsptStats::default(),
            cpu: CpuUsage::default(),
            memory: MemoryUsage::default(),
            disk: None,
            source,
            captured_at: Utc::now(),
        }
    }
}

/// Clamps parsed values: NaN and negatives fall back to `fallback`.
pub fn non_negative_or(value: f64, fallback: f64) -> f64 {
    if value.is_finite() && value >= 0.0 {
        value
    } else {
        fallback
    }
}
