//! Parsing of human-readable configuration values

use std::time::Duration;

use thiserror::Error;

/// A configuration value that could not be parsed
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid {kind} '{value}'")]
pub struct ParseValueError {
    kind: &'static str,
    value: String,
}

impl ParseValueError {
    fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

/// Parse a size string ("2MB", "512KB", "1GB", "1024B" or "1024") into bytes.
pub fn parse_size(s: &str) -> Result<usize, ParseValueError> {
    let upper = s.trim().to_uppercase();
    let (digits, multiplier) = split_unit(
        &upper,
        &[("GB", 1024 * 1024 * 1024), ("MB", 1024 * 1024), ("KB", 1024), ("B", 1)],
        1,
    );

    digits
        .trim()
        .parse::<usize>()
        .ok()
        .and_then(|n| n.checked_mul(multiplier))
        .ok_or_else(|| ParseValueError::new("size", s))
}

/// Parse a duration string ("100ms", "30s", "15m", "1h", "7d"; bare numbers are seconds).
pub fn parse_duration(s: &str) -> Result<Duration, ParseValueError> {
    let lower = s.trim().to_lowercase();
    let (digits, millis) = split_unit(
        &lower,
        &[
            ("ms", 1),
            ("s", 1000),
            ("m", 60 * 1000),
            ("h", 60 * 60 * 1000),
            ("d", 24 * 60 * 60 * 1000),
        ],
        1000,
    );

    digits
        .trim()
        .parse::<u64>()
        .ok()
        .and_then(|n| n.checked_mul(millis as u64))
        .map(Duration::from_millis)
        .ok_or_else(|| ParseValueError::new("duration", s))
}

/// Parse a boolean flag ("true"/"false", "1"/"0", "yes"/"no", "on"/"off").
pub fn parse_bool(s: &str) -> Result<bool, ParseValueError> {
    match s.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ParseValueError::new("boolean", s)),
    }
}

/// Parse a plain non-negative integer.
pub fn parse_count(s: &str) -> Result<usize, ParseValueError> {
    s.trim()
        .parse::<usize>()
        .map_err(|_| ParseValueError::new("count", s))
}

/// Split a comma-separated list, dropping blanks.
pub fn parse_list(s: &str) -> Vec<String> {
    s.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(String::from)
        .collect()
}

// Units are checked in order, so "ms" must precede "s" and "m".
fn split_unit<'a>(s: &'a str, units: &[(&str, usize)], default: usize) -> (&'a str, usize) {
    units
        .iter()
        .find_map(|(suffix, multiplier)| s.strip_suffix(suffix).map(|rest| (rest, *multiplier)))
        .unwrap_or((s, default))
}
