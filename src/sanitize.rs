// Response sanitizer: every parser downstream works on clean text.

use regex::Regex;
use std::sync::LazyLock;

/// Returned instead of an empty string so callers always have something to display.
pub const EMPTY_PLACEHOLDER: &str = "(no response)";

/// Section-sign colour/format codes (`§a`, `§l`, `§r`, hex runs like `§x§f§f...`).
static COLOR_CODE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"§[0-9a-fk-orxA-FK-ORX]").expect("valid colour code pattern")
});

/// Strips colour codes, ANSI escapes and ASCII control characters, then trims.
///
/// Line breaks survive (CRLF and CR become `\n`) so multi-line diagnostic output
/// keeps its shape. Idempotent: `sanitize(&sanitize(x)) == sanitize(x)`.
pub fn sanitize(raw: &str) -> String {
    let without_ansi = strip_ansi_escapes::strip_str(raw);
    let unified = without_ansi.replace("\r\n", "\n").replace('\r', "\n");
    let mut cleaned: String = unified
        .chars()
        .filter(|c| *c == '\n' || !c.is_ascii_control())
        .collect();
    // Removing one code can splice a new one together ("§§aa").
    while COLOR_CODE.is_match(&cleaned) {
        cleaned = COLOR_CODE.replace_all(&cleaned, "").into_owned();
    }
    let trimmed = cleaned.trim();
    if trimmed.is_empty() {
        EMPTY_PLACEHOLDER.to_string()
    } else {
        trimmed.to_string()
    }
}
