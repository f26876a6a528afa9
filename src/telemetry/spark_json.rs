// Raw JSON document served by the profiler viewer for an uploaded health report.
// Only the fields we map are modelled; numbers may arrive as JSON numbers or strings.

use serde::Deserialize;

use crate::error::TelemetryError;
use crate::models::{
    CpuUsage, CpuWindows, DiskUsage, HealthReport, HealthSource, MemoryUsage, MsptStats,
    TPS_SENTINEL, TpsWindows, non_negative_or,
};

const MB: f64 = 1024.0 * 1024.0;
const GB: f64 = MB * 1024.0;

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum LenientNumber {
    Number(f64),
    Text(String),
}

impl LenientNumber {
    pub fn value(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n).filter(|v| v.is_finite()),
            Self::Text(s) => s.trim().parse::<f64>().ok().filter(|v| v.is_finite()),
        }
    }
}

fn num(field: &Option<LenientNumber>) -> Option<f64> {
    field.as_ref().and_then(LenientNumber::value)
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SparkDocument {
    pub metadata: Option<Metadata>,
    pub platform_statistics: Option<PlatformStatistics>,
    pub system_statistics: Option<SystemStatistics>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Metadata {
    pub platform_statistics: Option<PlatformStatistics>,
    pub system_statistics: Option<SystemStatistics>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PlatformStatistics {
    pub memory: Option<PlatformMemory>,
    pub tps: Option<Tps>,
    pub mspt: Option<Mspt>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct PlatformMemory {
    pub heap: Option<MemoryPool>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct MemoryPool {
    pub used: Option<LenientNumber>,
    pub committed: Option<LenientNumber>,
    pub max: Option<LenientNumber>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Tps {
    pub last_5s: Option<LenientNumber>,
    pub last_10s: Option<LenientNumber>,
    pub last_1m: Option<LenientNumber>,
    pub last_5m: Option<LenientNumber>,
    pub last_15m: Option<LenientNumber>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Mspt {
    pub last_1m: Option<RollingValues>,
    pub last_5m: Option<RollingValues>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RollingValues {
    pub min: Option<LenientNumber>,
    pub median: Option<LenientNumber>,
    #[serde(alias = "percentile95th")]
    pub percentile95: Option<LenientNumber>,
    pub max: Option<LenientNumber>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SystemStatistics {
    pub cpu: Option<SystemCpu>,
    pub memory: Option<SystemMemory>,
    pub disk: Option<Disk>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SystemCpu {
    pub process_usage: Option<CpuFractions>,
    pub system_usage: Option<CpuFractions>,
}

/// CPU load as fractions of 1.0.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CpuFractions {
    pub last_10s: Option<LenientNumber>,
    pub last_1m: Option<LenientNumber>,
    pub last_15m: Option<LenientNumber>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SystemMemory {
    pub physical: Option<Physical>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Physical {
    pub used: Option<LenientNumber>,
    pub total: Option<LenientNumber>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Disk {
    pub used: Option<LenientNumber>,
    pub total: Option<LenientNumber>,
}

impl CpuFractions {
    fn percent(&self) -> CpuWindows {
        let pct = |f: &Option<LenientNumber>| non_negative_or(num(f).unwrap_or(0.0) * 100.0, 0.0);
        CpuWindows {
            last_10s: pct(&self.last_10s),
            last_1m: pct(&self.last_1m),
            last_15m: pct(&self.last_15m),
        }
    }
}

impl SparkDocument {
    pub fn from_slice(bytes: &[u8]) -> Result<Self, TelemetryError> {
        serde_json::from_slice(bytes)
            .map_err(|e| TelemetryError::Parse(format!("health document: {e}")))
    }

    fn platform(&self) -> Option<&PlatformStatistics> {
        self.metadata
            .as_ref()
            .and_then(|m| m.platform_statistics.as_ref())
            .or(self.platform_statistics.as_ref())
    }

    fn system(&self) -> Option<&SystemStatistics> {
        self.metadata
            .as_ref()
            .and_then(|m| m.system_statistics.as_ref())
            .or(self.system_statistics.as_ref())
    }

    /// Maps the document onto a report. Fails only when it carries no statistics at all.
    pub fn to_report(&self) -> Result<HealthReport, TelemetryError> {
        let platform = self.platform();
        let system = self.system();
        if platform.is_none() && system.is_none() {
            return Err(TelemetryError::Parse(
                "health document has no platform or system statistics".into(),
            ));
        }

        let mut report = HealthReport::empty(HealthSource::Upload);

        if let Some(tps) = platform.and_then(|p| p.tps.as_ref()) {
            let window = |f: &Option<LenientNumber>| num(f).unwrap_or(TPS_SENTINEL);
            report.tps = TpsWindows::from_values([
                window(&tps.last_5s),
                window(&tps.last_10s),
                window(&tps.last_1m),
                window(&tps.last_5m),
                window(&tps.last_15m),
            ]);
        }

        if let Some(values) = platform
            .and_then(|p| p.mspt.as_ref())
            .and_then(|m| m.last_1m.as_ref().or(m.last_5m.as_ref()))
        {
            let ms = |f: &Option<LenientNumber>| non_negative_or(num(f).unwrap_or(0.0), 0.0);
            report.mspt = MsptStats {
                min: ms(&values.min),
                median: ms(&values.median),
                p95: ms(&values.percentile95),
                max: ms(&values.max),
            };
        }

        if let Some(cpu) = system.and_then(|s| s.cpu.as_ref()) {
            report.cpu = CpuUsage {
                process: cpu
                    .process_usage
                    .as_ref()
                    .map(CpuFractions::percent)
                    .unwrap_or_default(),
                system: cpu
                    .system_usage
                    .as_ref()
                    .map(CpuFractions::percent)
                    .unwrap_or_default(),
            };
        }

        report.memory = memory(platform, system);

        report.disk = system
            .and_then(|s| s.disk.as_ref())
            .and_then(|d| {
                Some(DiskUsage {
                    used: non_negative_or(num(&d.used).unwrap_or(0.0) / GB, 0.0),
                    total: non_negative_or(num(&d.total)? / GB, 0.0),
                })
            });

        Ok(report)
    }
}

/// JVM heap when present, otherwise physical memory with `allocated = max = total`.
fn memory(
    platform: Option<&PlatformStatistics>,
    system: Option<&SystemStatistics>,
) -> MemoryUsage {
    let mb = |v: Option<f64>| non_negative_or(v.unwrap_or(0.0) / MB, 0.0);

    if let Some(heap) = platform
        .and_then(|p| p.memory.as_ref())
        .and_then(|m| m.heap.as_ref())
        .filter(|h| num(&h.used).is_some())
    {
        return MemoryUsage {
            used: mb(num(&heap.used)),
            allocated: mb(num(&heap.committed)),
            max: mb(num(&heap.max)),
        };
    }

    if let Some(physical) = system
        .and_then(|s| s.memory.as_ref())
        .and_then(|m| m.physical.as_ref())
    {
        let total = mb(num(&physical.total));
        return MemoryUsage {
            used: mb(num(&physical.used)),
            allocated: total,
            max: total,
        };
    }

    MemoryUsage::default()
}
