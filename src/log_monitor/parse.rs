// Server log line grammar: `[HH:MM:SS] [<thread>/<LEVEL>]: <message>`,
// optionally `[HH:MM:SS] [<thread>/<LEVEL>] [<logger>]: <message>`.

use regex::Regex;
use std::sync::LazyLock;

use crate::models::LogLine;

static LOG_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\[(\d{2}:\d{2}:\d{2})\] \[([^\]]+)/([A-Z]+)\](?: \[([^\]]+)\])?: (.*)$")
        .expect("valid log line pattern")
});

/// Parses one line; anything off-grammar (engine banners, stack traces) yields `None`.
pub fn parse_line(raw: &str) -> Option<LogLine> {
    let caps = LOG_LINE.captures(raw)?;
    Some(LogLine {
        timestamp: caps[1].to_string(),
        thread: caps[2].to_string(),
        level: caps[3].to_string(),
        logger_name: caps.get(4).map(|m| m.as_str().to_string()),
        message: caps[5].to_string(),
        raw: raw.to_string(),
    })
}
