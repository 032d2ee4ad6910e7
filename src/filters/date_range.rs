//! Date range resolution
//!
//! Bounds arrive as local wall-clock strings in the compact form
//! `YYYY-MM-DD[THH:MM[:SS[.mmm]]]` plus the caller's timezone offset in
//! minutes (positive west of UTC). Anything else falls back to RFC 3339
//! or RFC 2822 parsing.

use bson::{doc, Document};
use chrono::{DateTime, NaiveDate, NaiveTime, TimeDelta, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

/// Window used when the caller supplies no dates
pub const DEFAULT_WINDOW_DAYS: i64 = 7;

static DATE_TIME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d{4})-(\d{2})-(\d{2})(?:[T\s](\d{2}):(\d{2})(?::(\d{2})(?:\.(\d{1,3}))?)?)?$")
        .expect("Valid compact date-time regex")
});

/// Inclusive UTC bounds on `createdAt`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub gte: DateTime<Utc>,
    pub lte: DateTime<Utc>,
}

impl DateRange {
    /// The default window ending at `now`
    pub fn default_window(now: DateTime<Utc>) -> Self {
        Self {
            gte: now - TimeDelta::days(DEFAULT_WINDOW_DAYS),
            lte: now,
        }
    }

    /// `{ $gte, $lte }` condition for a date field
    pub fn to_condition(&self) -> Document {
        doc! {
            "$gte": bson::DateTime::from_chrono(self.gte),
            "$lte": bson::DateTime::from_chrono(self.lte),
        }
    }
}

/// Offsets beyond a day are not time zones and are ignored
const MAX_OFFSET_MINUTES: i64 = 24 * 60;

/// Resolve request bounds into a UTC range
///
/// Returns `None` when a supplied bound cannot be parsed. When either bound
/// is absent the default window ending at `now` is used.
pub fn resolve(
    start: Option<&str>,
    end: Option<&str>,
    offset_minutes: Option<i64>,
    now: DateTime<Utc>,
) -> Option<DateRange> {
    let start = start.map(str::trim).filter(|s| !s.is_empty());
    let end = end.map(str::trim).filter(|s| !s.is_empty());

    let (Some(start), Some(end)) = (start, end) else {
        return Some(DateRange::default_window(now));
    };

    let offset = offset_minutes
        .filter(|m| (-MAX_OFFSET_MINUTES..=MAX_OFFSET_MINUTES).contains(m))
        .unwrap_or(0);
    let gte = parse_bound(start, offset, false)?;
    let lte = parse_bound(end, offset, true)?;
    Some(DateRange { gte, lte })
}

fn parse_bound(value: &str, offset_minutes: i64, end_of_day: bool) -> Option<DateTime<Utc>> {
    if DATE_TIME.is_match(value) {
        // A compact value with bad components is a failure, not a fallback
        return parse_local(value, offset_minutes, end_of_day);
    }
    parse_fallback(value)
}

/// Parse a compact local date-time and shift it to UTC
pub fn parse_local(value: &str, offset_minutes: i64, end_of_day: bool) -> Option<DateTime<Utc>> {
    let caps = DATE_TIME.captures(value)?;
    let num = |i: usize| caps.get(i).and_then(|m| m.as_str().parse::<u32>().ok());

    let year: i32 = caps.get(1)?.as_str().parse().ok()?;
    let date = NaiveDate::from_ymd_opt(year, num(2)?, num(3)?)?;

    let time = match (num(4), num(5)) {
        (Some(hour), Some(minute)) => {
            let second = num(6).unwrap_or(0);
            let millis = match caps.get(7) {
                Some(m) => fraction_millis(m.as_str())?,
                None => 0,
            };
            if second > 59 {
                return None;
            }
            NaiveTime::from_hms_milli_opt(hour, minute, second, millis)?
        }
        _ if end_of_day => NaiveTime::from_hms_milli_opt(23, 59, 59, 999)?,
        _ => NaiveTime::from_hms_opt(0, 0, 0)?,
    };

    let local = date.and_time(time).and_utc();
    local.checked_add_signed(TimeDelta::try_minutes(offset_minutes)?)
}

/// ".5" is half a second, ".05" fifty milliseconds
fn fraction_millis(digits: &str) -> Option<u32> {
    let padded = format!("{:0<3}", digits);
    padded.parse().ok()
}

fn parse_fallback(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .or_else(|_| DateTime::parse_from_rfc2822(value))
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32, ms: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap() + TimeDelta::milliseconds(ms as i64)
    }

    fn now() -> DateTime<Utc> {
        utc(2025, 6, 1, 12, 0, 0, 0)
    }

    #[test]
    fn test_date_only_bounds_expand_to_whole_days() {
        let range = resolve(Some("2025-01-01"), Some("2025-01-02"), None, now()).unwrap();
        assert_eq!(range.gte, utc(2025, 1, 1, 0, 0, 0, 0));
        assert_eq!(range.lte, utc(2025, 1, 2, 23, 59, 59, 999));
    }

    #[test]
    fn test_offset_is_applied() {
        let range = resolve(Some("2025-01-01"), Some("2025-01-02"), Some(300), now()).unwrap();
        assert_eq!(range.gte, utc(2025, 1, 1, 5, 0, 0, 0));
        assert_eq!(range.lte, utc(2025, 1, 3, 4, 59, 59, 999));
    }

    #[test]
    fn test_unusable_offset_is_ignored() {
        for offset in [i64::MAX, i64::MIN, 100_000] {
            let range = resolve(Some("2025-01-01"), Some("2025-01-02"), Some(offset), now()).unwrap();
            assert_eq!(range.gte, utc(2025, 1, 1, 0, 0, 0, 0));
            assert_eq!(range.lte, utc(2025, 1, 2, 23, 59, 59, 999));
        }
    }

    #[test]
    fn test_explicit_times() {
        let range = resolve(
            Some("2025-01-01T08:30"),
            Some("2025-01-01 17:45:10.5"),
            None,
            now(),
        )
        .unwrap();
        assert_eq!(range.gte, utc(2025, 1, 1, 8, 30, 0, 0));
        assert_eq!(range.lte, utc(2025, 1, 1, 17, 45, 10, 500));
    }

    #[test]
    fn test_invalid_components_fail() {
        assert!(resolve(Some("2025-13-01"), Some("2025-01-02"), None, now()).is_none());
        assert!(resolve(Some("2025-01-01"), Some("2025-02-30"), None, now()).is_none());
        assert!(resolve(Some("2025-01-01T24:00"), Some("2025-01-02"), None, now()).is_none());
        assert!(resolve(Some("2025-01-01T10:60"), Some("2025-01-02"), None, now()).is_none());
        assert!(resolve(Some("2025-01-01T10:00:61"), Some("2025-01-02"), None, now()).is_none());
    }

    #[test]
    fn test_fallback_parsing() {
        let range = resolve(
            Some("2025-01-01T10:00:00Z"),
            Some("Thu, 02 Jan 2025 10:00:00 +0000"),
            None,
            now(),
        )
        .unwrap();
        assert_eq!(range.gte, utc(2025, 1, 1, 10, 0, 0, 0));
        assert_eq!(range.lte, utc(2025, 1, 2, 10, 0, 0, 0));
        assert!(resolve(Some("yesterday"), Some("2025-01-02"), None, now()).is_none());
    }

    #[test]
    fn test_missing_dates_use_default_window() {
        let range = resolve(None, None, None, now()).unwrap();
        assert_eq!(range.lte, now());
        assert_eq!(range.gte, now() - TimeDelta::days(7));

        let range = resolve(Some("2025-01-01"), Some(""), None, now()).unwrap();
        assert_eq!(range, DateRange::default_window(now()));
    }

    #[test]
    fn test_condition_document() {
        let range = DateRange::default_window(now());
        let cond = range.to_condition();
        assert!(cond.get_datetime("$gte").is_ok());
        assert!(cond.get_datetime("$lte").is_ok());
    }
}
