// Player list response parser (`list` command).

use regex::Regex;
use std::sync::LazyLock;

use crate::models::PlayerList;

static OF_A_MAX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)There are (\d+) of a max(?: of)? (\d+) players online\.?:?\s*(.*)")
        .expect("valid player list pattern")
});

static SLASHED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)There are (\d+)/(\d+) players online\.?:?\s*(.*)")
        .expect("valid slashed player list pattern")
});

/// Parses `There are N of a max of M players online: a, b` and the `N/M` variant.
pub fn parse_player_list(text: &str) -> Option<PlayerList> {
    let caps = OF_A_MAX.captures(text).or_else(|| SLASHED.captures(text))?;
    let online = caps[1].parse().ok()?;
    let max = caps[2].parse().ok()?;
    let players = caps
        .get(3)
        .map(|m| {
            m.as_str()
                .split([',', '\n'])
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();
    Some(PlayerList {
        online,
        max,
        players,
    })
}
