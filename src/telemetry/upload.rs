// Upload flow helpers: locating the viewer link and fetching the raw document behind it.

use regex::Regex;
use reqwest::header::ACCEPT;
use std::io::SeekFrom;
use std::path::Path;
use std::time::Duration;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

use super::spark_json::SparkDocument;
use crate::error::TelemetryError;

/// Matches viewer links on `host`, e.g. `https://spark.lucko.me/AbC123`.
pub fn viewer_url_pattern(host: &str) -> Result<Regex, regex::Error> {
    Regex::new(&format!(r"https?://{}/[A-Za-z0-9]+", regex::escape(host)))
}

pub fn find_url(pattern: &Regex, text: &str) -> Option<String> {
    pattern.find(text).map(|m| m.as_str().to_string())
}

/// Most recent link in a chunk of log text.
pub fn find_last_url(pattern: &Regex, text: &str) -> Option<String> {
    text.lines().rev().find_map(|line| find_url(pattern, line))
}

/// Current length of the log, used as the scan baseline before triggering an upload.
pub async fn log_len(path: &Path) -> Option<u64> {
    tokio::fs::metadata(path).await.ok().map(|m| m.len())
}

/// At most the last `max_bytes` of the file, never starting before `not_before`
/// unless the file shrank below it. Decoded lossily; a leading partial line is
/// harmless since callers only look for whole links.
pub async fn read_log_tail(
    path: &Path,
    max_bytes: u64,
    not_before: u64,
) -> std::io::Result<String> {
    let mut file = File::open(path).await?;
    let len = file.metadata().await?.len();
    let baseline = if not_before <= len { not_before } else { 0 };
    let start = len.saturating_sub(max_bytes).max(baseline);
    if start > 0 {
        file.seek(SeekFrom::Start(start)).await?;
    }
    let mut content = Vec::new();
    file.read_to_end(&mut content).await?;
    Ok(String::from_utf8_lossy(&content).into_owned())
}

pub fn raw_document_url(url: &str) -> String {
    format!("{url}?raw=1")
}

pub async fn fetch_document(
    client: &reqwest::Client,
    url: &str,
    timeout: Duration,
) -> Result<SparkDocument, TelemetryError> {
    let body = client
        .get(raw_document_url(url))
        .header(ACCEPT, "application/json")
        .timeout(timeout)
        .send()
        .await?
        .error_for_status()?
        .bytes()
        .await?;
    SparkDocument::from_slice(&body)
}
