// src/parse.rs
//! Parsers for the free-text set, rep and rest prescriptions found in
//! workout programs ("2 x 10-12, 1 x 15-20", "Pump Set + 3 x 8-12", "1-2 mins").

use regex::Regex;
use std::sync::OnceLock;

pub const DEFAULT_REST_SECONDS: u32 = 90;

/// Rep window applied to a pump (warm-up burn-out) set.
pub const PUMP_RANGE: RepRange = RepRange { min: 15, max: 25 };

/// Rest values that mean "no fixed rest".
const NO_REST_SENTINELS: [&str; 4] = ["", "-", "ALAN", "x"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RepRange {
    pub min: u32,
    pub max: u32,
}

impl RepRange {
    pub const fn new(min: u32, max: u32) -> Self {
        Self { min, max }
    }
}

fn set_group_regex() -> &'static Regex {
    static SET_GROUP: OnceLock<Regex> = OnceLock::new();
    SET_GROUP.get_or_init(|| {
        Regex::new(r"(?i)(\d+)\s*x(?:\s*(\d+)(?:\s*-\s*(\d+))?)?")
            .expect("set group pattern is valid")
    })
}

fn seconds_regex() -> &'static Regex {
    static SECONDS: OnceLock<Regex> = OnceLock::new();
    SECONDS.get_or_init(|| Regex::new(r"^(\d+)\s*s$").expect("seconds pattern is valid"))
}

fn minutes_regex() -> &'static Regex {
    static MINUTES: OnceLock<Regex> = OnceLock::new();
    MINUTES.get_or_init(|| Regex::new(r"^(\d+)\s*min").expect("minutes pattern is valid"))
}

/// One logical group of sets inside a prescription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SetGroup {
    count: u32,
    range: Option<RepRange>,
}

/// Walks the comma-separated segments in config order. A segment mentioning
/// "pump" contributes one pump set ahead of any `<count> x <reps>` groups it
/// also contains.
fn set_groups(config: &str) -> Vec<SetGroup> {
    let mut groups = Vec::new();
    for segment in config.split(',') {
        if segment.to_lowercase().contains("pump") {
            groups.push(SetGroup {
                count: 1,
                range: Some(PUMP_RANGE),
            });
        }
        for caps in set_group_regex().captures_iter(segment) {
            let Some(count) = caps.get(1).and_then(|m| m.as_str().parse::<u32>().ok()) else {
                continue;
            };
            let min = caps.get(2).and_then(|m| m.as_str().parse::<u32>().ok());
            let max = caps.get(3).and_then(|m| m.as_str().parse::<u32>().ok());
            let range = min.map(|min| RepRange::new(min, max.unwrap_or(min)));
            groups.push(SetGroup { count, range });
        }
    }
    groups
}

/// Number of working sets prescribed by `config`. Never less than one.
pub fn parse_set_count(config: &str) -> usize {
    let total: usize = set_groups(config).iter().map(|g| g.count as usize).sum();
    total.max(1)
}

/// Per-set rep window, index-aligned with the set array built from
/// [`parse_set_count`]. Sets without a derivable window are `None`.
pub fn parse_rep_ranges(config: &str) -> Vec<Option<RepRange>> {
    let mut ranges: Vec<Option<RepRange>> = set_groups(config)
        .into_iter()
        .flat_map(|g| std::iter::repeat(g.range).take(g.count as usize))
        .collect();
    let count = parse_set_count(config);
    if ranges.len() < count {
        ranges.resize(count, None);
    }
    ranges
}

/// Whether `rest` is one of the "no fixed rest" markers.
pub fn is_no_rest(rest: &str) -> bool {
    NO_REST_SENTINELS.contains(&rest.trim())
}

/// Rest period in seconds for a free-text rest prescription.
///
/// Checks run in a fixed order: sentinels, "2-3", "1-2", `<n>s`, `<n>min`.
pub fn parse_rest_seconds(rest: &str) -> u32 {
    parse_rest_seconds_or(rest, DEFAULT_REST_SECONDS)
}

/// [`parse_rest_seconds`] with `fallback` in place of the default for
/// sentinels and unrecognized text.
pub fn parse_rest_seconds_or(rest: &str, fallback: u32) -> u32 {
    if is_no_rest(rest) {
        return fallback;
    }
    let text = rest.trim().to_lowercase();
    if text.contains("2-3") {
        return 150;
    }
    if text.contains("1-2") {
        return 90;
    }
    if let Some(secs) = seconds_regex()
        .captures(&text)
        .and_then(|c| c[1].parse::<u32>().ok())
    {
        return secs;
    }
    if let Some(mins) = minutes_regex()
        .captures(&text)
        .and_then(|c| c[1].parse::<u32>().ok())
    {
        return mins.saturating_mul(60);
    }
    fallback
}
