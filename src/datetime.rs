//! Duration and timestamp parsing for filedrop.
//!
//! Clients send expiry overrides as free-form strings, so two notations are
//! accepted for durations:
//!
//! - Go-style unit sequences: `90s`, `2h`, `1h30m`, `500ms`, `3d`
//! - ISO 8601 durations: `PT2H`, `P1DT12H`, `P2W`
//!
//! Timestamps are RFC 3339, or a naive `YYYY-MM-DDTHH:MM:SS` taken as UTC.

use std::time::Duration;

use chrono::{DateTime, NaiveDateTime, Utc};

use crate::{FiledropError, Result};

const SECS_PER_MINUTE: f64 = 60.0;
const SECS_PER_HOUR: f64 = 60.0 * SECS_PER_MINUTE;
const SECS_PER_DAY: f64 = 24.0 * SECS_PER_HOUR;
const SECS_PER_WEEK: f64 = 7.0 * SECS_PER_DAY;

/// Parse a duration string.
pub fn parse_duration(input: &str) -> Result<Duration> {
    let s = input.trim();
    if s.is_empty() {
        return Err(invalid_duration(input));
    }
    if s.starts_with('P') || s.starts_with('p') {
        return parse_iso8601_duration(s).ok_or_else(|| invalid_duration(input));
    }
    if s == "0" {
        return Ok(Duration::ZERO);
    }
    parse_unit_duration(s).ok_or_else(|| invalid_duration(input))
}

fn invalid_duration(input: &str) -> FiledropError {
    FiledropError::Validation(format!("invalid duration: {input:?}"))
}

fn unit_seconds(unit: &str) -> Option<f64> {
    match unit {
        "ns" => Some(1e-9),
        "us" | "µs" => Some(1e-6),
        "ms" => Some(1e-3),
        "s" => Some(1.0),
        "m" => Some(SECS_PER_MINUTE),
        "h" => Some(SECS_PER_HOUR),
        "d" => Some(SECS_PER_DAY),
        "w" => Some(SECS_PER_WEEK),
        _ => None,
    }
}

fn parse_unit_duration(s: &str) -> Option<Duration> {
    let mut total = 0.0_f64;
    let mut rest = s;

    while !rest.is_empty() {
        let number_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        if number_len == 0 {
            return None;
        }
        let value: f64 = rest[..number_len].parse().ok()?;
        rest = &rest[number_len..];

        let unit_len = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let factor = unit_seconds(&rest[..unit_len])?;
        rest = &rest[unit_len..];

        total += value * factor;
    }

    Duration::try_from_secs_f64(total).ok()
}

fn parse_iso8601_duration(s: &str) -> Option<Duration> {
    let body = &s[1..];
    if body.is_empty() {
        return None;
    }

    let mut total = 0.0_f64;
    let mut in_time = false;
    let mut number = String::new();
    let mut seen_component = false;

    for c in body.chars() {
        match c.to_ascii_uppercase() {
            'T' => {
                if in_time || !number.is_empty() {
                    return None;
                }
                in_time = true;
            }
            d if d.is_ascii_digit() || d == '.' || d == ',' => {
                number.push(if d == ',' { '.' } else { d });
            }
            designator => {
                let value: f64 = number.parse().ok()?;
                number.clear();
                let factor = match (in_time, designator) {
                    (false, 'W') => SECS_PER_WEEK,
                    (false, 'D') => SECS_PER_DAY,
                    (true, 'H') => SECS_PER_HOUR,
                    (true, 'M') => SECS_PER_MINUTE,
                    (true, 'S') => 1.0,
                    // Years and months have no fixed length.
                    _ => return None,
                };
                total += value * factor;
                seen_component = true;
            }
        }
    }

    if !number.is_empty() || !seen_component {
        return None;
    }
    Duration::try_from_secs_f64(total).ok()
}

/// Parse an absolute timestamp.
pub fn parse_time(input: &str) -> Result<DateTime<Utc>> {
    let s = input.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }

    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S") {
        return Ok(naive.and_utc());
    }

    Err(FiledropError::Validation(format!("invalid time: {input:?}")))
}

/// Add a standard duration to a timestamp, failing on overflow.
pub fn add_duration(at: DateTime<Utc>, duration: Duration) -> Result<DateTime<Utc>> {
    chrono::Duration::from_std(duration)
        .ok()
        .and_then(|delta| at.checked_add_signed(delta))
        .ok_or_else(|| FiledropError::Validation(format!("duration out of range: {duration:?}")))
}

/// Format a duration the way it is written in configuration (`1h30m`).
pub fn format_duration(duration: Duration) -> String {
    let mut secs = duration.as_secs();
    if secs == 0 {
        return "0s".to_string();
    }

    let mut out = String::new();
    for (unit, size) in [("d", 86_400), ("h", 3_600), ("m", 60), ("s", 1)] {
        if secs >= size {
            out.push_str(&format!("{}{}", secs / size, unit));
            secs %= size;
        }
    }
    out
}
