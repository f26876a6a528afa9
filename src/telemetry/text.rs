// Parsers for the diagnostic command output (`spark tps`, `spark health`).
// Every pattern accepts the emphasised variant where recent windows are
// wrapped in `*` markers; which variant a server prints is discovered per call.

use regex::{Captures, Regex};
use std::sync::LazyLock;

use crate::error::TelemetryError;
use crate::models::{
    CpuUsage, CpuWindows, DiskUsage, HealthReport, HealthSource, MemoryUsage, MsptStats,
    TpsWindows, non_negative_or,
};

/// A number optionally wrapped in emphasis markers.
const NUM: &str = r"\*?(\d+(?:\.\d+)?)\*?";
const SIZE: &str = r"(\d+(?:\.\d+)?)\s*([KMGT]?i?B)?";

static TPS_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?i)TPS from last 5s, 10s, 1m, 5m, 15m:\s*{NUM},\s*{NUM},\s*{NUM},\s*{NUM},\s*{NUM}"
    ))
    .expect("valid TPS pattern")
});

static MSPT_GROUP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"(?is)Tick durations.*?:\s*{NUM}/{NUM}/{NUM}/{NUM}"))
        .expect("valid MSPT pattern")
});

static CPU_SYSTEM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"(?i){NUM}%,\s*{NUM}%,\s*{NUM}%\s*\(system\)"))
        .expect("valid system CPU pattern")
});

static CPU_PROCESS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"(?i){NUM}%,\s*{NUM}%,\s*{NUM}%\s*\(process\)"))
        .expect("valid process CPU pattern")
});

static MEMORY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?i)Memory usage:\s*{SIZE}\s*/\s*{SIZE}(?:\s*/\s*{SIZE})?"
    ))
    .expect("valid memory pattern")
});

static DISK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"(?i)Disk usage:\s*{SIZE}\s*/\s*{SIZE}")).expect("valid disk pattern")
});

/// Parses a `.`-decimal string, ignoring emphasis markers. Non-finite values are rejected.
pub fn parse_decimal(s: &str) -> Option<f64> {
    s.trim()
        .trim_matches('*')
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
}

/// Numbers that stand alone as tokens: `20.0` and `*19.8` count, `5s`, `1m`
/// and `1.2/3.4` do not.
pub fn bare_numbers(text: &str) -> Vec<f64> {
    text.split(|c: char| c.is_whitespace() || c == ',' || c == ';')
        .map(|t| t.trim_matches('*'))
        .filter(|t| !t.is_empty() && t.chars().all(|c| c.is_ascii_digit() || c == '.'))
        .filter_map(parse_decimal)
        .collect()
}

fn capture_values<const N: usize>(caps: &Captures<'_>, first: usize) -> Option<[f64; N]> {
    let mut out = [0.0; N];
    for (i, slot) in out.iter_mut().enumerate() {
        *slot = parse_decimal(caps.get(first + i)?.as_str())?;
    }
    Some(out)
}

/// TPS over 5s, 10s, 1m, 5m, 15m. Falls back to the first five bare numbers.
pub fn parse_tps(text: &str) -> Option<TpsWindows> {
    if let Some(values) = TPS_LINE
        .captures(text)
        .and_then(|caps| capture_values::<5>(&caps, 1))
    {
        return Some(TpsWindows::from_values(values));
    }
    let bare = bare_numbers(text);
    let first: [f64; 5] = bare.get(..5)?.try_into().ok()?;
    Some(TpsWindows::from_values(first))
}

/// First `min/med/95%ile/max` group after the tick-duration header (the most recent window).
pub fn parse_mspt(text: &str) -> Option<MsptStats> {
    let caps = MSPT_GROUP.captures(text)?;
    let [min, median, p95, max] = capture_values::<4>(&caps, 1)?;
    Some(MsptStats {
        min: non_negative_or(min, 0.0),
        median: non_negative_or(median, 0.0),
        p95: non_negative_or(p95, 0.0),
        max: non_negative_or(max, 0.0),
    })
}

fn cpu_windows(re: &Regex, text: &str) -> Option<CpuWindows> {
    let caps = re.captures(text)?;
    let [last_10s, last_1m, last_15m] = capture_values::<3>(&caps, 1)?;
    Some(CpuWindows {
        last_10s: non_negative_or(last_10s, 0.0),
        last_1m: non_negative_or(last_1m, 0.0),
        last_15m: non_negative_or(last_15m, 0.0),
    })
}

pub fn parse_cpu(text: &str) -> Option<CpuUsage> {
    let system = cpu_windows(&CPU_SYSTEM, text);
    let process = cpu_windows(&CPU_PROCESS, text);
    if system.is_none() && process.is_none() {
        return None;
    }
    Some(CpuUsage {
        process: process.unwrap_or_default(),
        system: system.unwrap_or_default(),
    })
}

/// Bytes per unit; a missing unit means MB.
fn unit_bytes(unit: Option<&str>) -> f64 {
    const KB: f64 = 1024.0;
    match unit.map(|u| u.to_ascii_uppercase().replace('I', "")).as_deref() {
        Some("B") => 1.0,
        Some("KB") => KB,
        Some("GB") => KB * KB * KB,
        Some("TB") => KB * KB * KB * KB,
        _ => KB * KB,
    }
}

fn size_in(caps: &Captures<'_>, value: usize, target_unit_bytes: f64) -> Option<f64> {
    let number = parse_decimal(caps.get(value)?.as_str())?;
    let unit = caps.get(value + 1).map(|m| m.as_str());
    Some(non_negative_or(number * unit_bytes(unit) / target_unit_bytes, 0.0))
}

/// `used / max` or `used / allocated / max`, converted to MB. Allocated is 0 when not printed.
pub fn parse_memory(text: &str) -> Option<MemoryUsage> {
    let caps = MEMORY.captures(text)?;
    let mb = 1024.0 * 1024.0;
    let used = size_in(&caps, 1, mb)?;
    let second = size_in(&caps, 3, mb)?;
    Some(match size_in(&caps, 5, mb) {
        Some(max) => MemoryUsage {
            used,
            allocated: second,
            max,
        },
        None => MemoryUsage {
            used,
            allocated: 0.0,
            max: second,
        },
    })
}

/// `used / total`, converted to GB.
pub fn parse_disk(text: &str) -> Option<DiskUsage> {
    let caps = DISK.captures(text)?;
    let gb = 1024.0 * 1024.0 * 1024.0;
    Some(DiskUsage {
        used: size_in(&caps, 1, gb)?,
        total: size_in(&caps, 3, gb)?,
    })
}

/// Builds a report from the sanitized outputs of the two diagnostic commands.
/// TPS is required; every other metric falls back to its sentinel.
pub fn parse_command_report(
    tps_text: Option<&str>,
    health_text: Option<&str>,
) -> Result<HealthReport, TelemetryError> {
    let texts: Vec<&str> = [tps_text, health_text].into_iter().flatten().collect();

    // Only trust the health output for TPS when it carries the labelled line.
    let tps = tps_text
        .and_then(parse_tps)
        .or_else(|| health_text.filter(|t| TPS_LINE.is_match(t)).and_then(parse_tps))
        .ok_or_else(|| TelemetryError::Parse("no TPS figures in command output".into()))?;

    let mut report = HealthReport::empty(HealthSource::Command);
    report.tps = tps;
    report.mspt = texts.iter().find_map(|t| parse_mspt(t)).unwrap_or_default();
    report.cpu = texts.iter().find_map(|t| parse_cpu(t)).unwrap_or_default();
    report.memory = texts.iter().find_map(|t| parse_memory(t)).unwrap_or_default();
    report.disk = texts.iter().find_map(|t| parse_disk(t));
    Ok(report)
}
