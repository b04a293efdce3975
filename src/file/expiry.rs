//! Expiry overrides sent by clients.
//!
//! Uploads and updates may carry an expiry under several historical field
//! names. They are normalized here in one pass, in a fixed order: absolute
//! times first, then relative durations.
//!
//! | priority | field         | kind     |
//! |----------|---------------|----------|
//! | 1        | `deleteAt`    | time     |
//! | 2        | `deleteOn`    | time     |
//! | 3        | `purgeAt`     | time     |
//! | 4        | `purgeOn`     | time     |
//! | 5        | `deleteIn`    | duration |
//! | 6        | `deleteAfter` | duration |
//! | 7        | `purgeIn`     | duration |
//! | 8        | `purgeAfter`  | duration |
//!
//! The first field that is present and parses wins. Values that fail to
//! parse are logged and skipped.

use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::datetime::{add_duration, parse_duration, parse_time};

/// Field names carrying an absolute deletion time, in priority order.
pub const TIME_ALIASES: &[&str] = &["deleteAt", "deleteOn", "purgeAt", "purgeOn"];

/// Field names carrying a time-to-live, in priority order.
pub const DURATION_ALIASES: &[&str] = &["deleteIn", "deleteAfter", "purgeIn", "purgeAfter"];

/// A normalized expiry override.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expiry {
    /// Delete once this much time has passed.
    After(Duration),
    /// Delete at this instant.
    At(DateTime<Utc>),
}

impl Expiry {
    /// Find the first usable expiry among the known aliases.
    ///
    /// `lookup` returns the raw value of a field, if present. Empty values
    /// count as absent.
    pub fn from_fields<F>(lookup: F) -> Option<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        for &key in TIME_ALIASES {
            let Some(value) = lookup(key).filter(|v| !v.trim().is_empty()) else {
                continue;
            };
            match parse_time(&value) {
                Ok(at) => return Some(Expiry::At(at)),
                Err(e) => tracing::warn!(field = key, "Ignoring expiry override: {}", e),
            }
        }

        for &key in DURATION_ALIASES {
            let Some(value) = lookup(key).filter(|v| !v.trim().is_empty()) else {
                continue;
            };
            match parse_duration(&value) {
                Ok(ttl) => return Some(Expiry::After(ttl)),
                Err(e) => tracing::warn!(field = key, "Ignoring expiry override: {}", e),
            }
        }

        None
    }

    /// Absolute deletion time relative to `now`.
    pub fn deadline(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match *self {
            Expiry::At(at) => Some(at),
            Expiry::After(ttl) => add_duration(now, ttl).ok(),
        }
    }

    /// Time-to-live relative to `now`, or `None` when the override cannot
    /// apply to a new upload (a time already in the past, or a zero TTL).
    pub fn ttl(&self, now: DateTime<Utc>) -> Option<Duration> {
        match *self {
            Expiry::After(ttl) => (!ttl.is_zero()).then_some(ttl),
            Expiry::At(at) => (at - now).to_std().ok().filter(|ttl| !ttl.is_zero()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::collections::HashMap;

    fn fields(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn parse(pairs: &[(&str, &str)]) -> Option<Expiry> {
        let map = fields(pairs);
        Expiry::from_fields(|key| map.get(key).cloned())
    }

    #[test]
    fn test_no_fields() {
        assert_eq!(parse(&[]), None);
        assert_eq!(parse(&[("password", "x")]), None);
    }

    #[test]
    fn test_duration_aliases() {
        for &alias in DURATION_ALIASES {
            assert_eq!(
                parse(&[(alias, "2h")]),
                Some(Expiry::After(Duration::from_secs(7200))),
                "alias {alias}"
            );
        }
    }

    #[test]
    fn test_time_aliases() {
        let at = Utc.with_ymd_and_hms(2031, 5, 1, 12, 0, 0).unwrap();
        for &alias in TIME_ALIASES {
            assert_eq!(
                parse(&[(alias, "2031-05-01T12:00:00Z")]),
                Some(Expiry::At(at)),
                "alias {alias}"
            );
        }
    }

    #[test]
    fn test_time_beats_duration() {
        let at = Utc.with_ymd_and_hms(2031, 5, 1, 12, 0, 0).unwrap();
        let expiry = parse(&[("purgeAfter", "1h"), ("purgeOn", "2031-05-01T12:00:00Z")]);
        assert_eq!(expiry, Some(Expiry::At(at)));
    }

    #[test]
    fn test_priority_within_kind() {
        let expiry = parse(&[("purgeAfter", "3h"), ("deleteIn", "1h")]);
        assert_eq!(expiry, Some(Expiry::After(Duration::from_secs(3600))));
    }

    #[test]
    fn test_invalid_values_are_skipped() {
        let expiry = parse(&[("deleteIn", "soon"), ("purgeIn", "10m")]);
        assert_eq!(expiry, Some(Expiry::After(Duration::from_secs(600))));

        assert_eq!(parse(&[("deleteAt", "someday")]), None);
        assert_eq!(parse(&[("deleteAt", "  ")]), None);
    }

    #[test]
    fn test_ttl_and_deadline() {
        let now = Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap();

        let after = Expiry::After(Duration::from_secs(60));
        assert_eq!(after.ttl(now), Some(Duration::from_secs(60)));
        assert_eq!(
            after.deadline(now),
            Some(Utc.with_ymd_and_hms(2030, 1, 1, 0, 1, 0).unwrap())
        );

        let future = Expiry::At(Utc.with_ymd_and_hms(2030, 1, 1, 1, 0, 0).unwrap());
        assert_eq!(future.ttl(now), Some(Duration::from_secs(3600)));

        let past = Expiry::At(Utc.with_ymd_and_hms(2029, 12, 31, 0, 0, 0).unwrap());
        assert_eq!(past.ttl(now), None);
        assert!(past.deadline(now).unwrap() < now);

        assert_eq!(Expiry::After(Duration::ZERO).ttl(now), None);
    }
}
