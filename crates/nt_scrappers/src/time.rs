//! Publish-time normalization.
//!
//! Pages express publish times either as relative phrases ("3h ago") or as
//! absolute dates in whatever format the site prefers. Everything comes out
//! as a UTC instant; values without an offset are taken to be UTC.

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveDateTime, TimeZone, Utc};
use lazy_static::lazy_static;
use nt_core::dates::start_of_day;
use nt_core::{Error, Result};
use regex::Regex;

lazy_static! {
    static ref RELATIVE: Regex = Regex::new(r"(\d+)\s*([mhdy])").unwrap();
    static ref LEADING_LABEL: Regex =
        Regex::new(r"(?i)^(published|updated|posted)(\s+on)?\s*:?\s*").unwrap();
}

const OFFSET_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f%z",
    "%Y-%m-%d %H:%M:%S%.f%z",
    "%Y-%m-%dT%H:%M%z",
    "%Y-%m-%d %H:%M:%S %z",
];

const NAIVE_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
    "%B %d, %Y %I:%M %p",
    "%b %d, %Y %I:%M %p",
    "%b. %d, %Y %I:%M %p",
    "%B %d, %Y %H:%M",
    "%b %d, %Y %H:%M",
    "%B %d, %Y at %I:%M %p",
    "%d %B %Y %H:%M",
    "%d %b %Y %H:%M",
    "%m/%d/%Y %I:%M %p",
    "%m/%d/%Y %H:%M",
];

const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%B %d, %Y",
    "%b %d, %Y",
    "%b. %d, %Y",
    "%A, %B %d, %Y",
    "%d %B %Y",
    "%d %b %Y",
    "%m/%d/%Y",
];

fn unparseable(text: &str) -> Error {
    Error::UnparseableTime(text.to_string())
}

fn relative_offset(value: i64, unit: &str) -> Option<Duration> {
    match unit {
        "m" => Duration::try_minutes(value),
        "h" => Duration::try_hours(value),
        "d" => Duration::try_days(value),
        "y" => value.checked_mul(365).and_then(Duration::try_days),
        _ => None,
    }
}

/// Resolve `text` against `now`.
///
/// The first `<n><unit>` group wins (`m`, `h`, `d`, `y` = 365 days), so
/// "1d 3h ago" means one day. "just now" and "a few seconds ago" are `now`.
/// Anything else goes through [`parse_absolute`].
pub fn normalize(text: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
    let lowered = text.trim().to_lowercase();

    if let Some(caps) = RELATIVE.captures(&lowered) {
        let value: i64 = caps[1].parse().map_err(|_| unparseable(text))?;
        let offset = relative_offset(value, &caps[2]).ok_or_else(|| unparseable(text))?;
        return now.checked_sub_signed(offset).ok_or_else(|| unparseable(text));
    }

    if lowered.contains("a few seconds ago") || lowered.contains("just now") {
        return Ok(now);
    }

    parse_absolute(text)
}

fn with_offset(dt: DateTime<FixedOffset>) -> DateTime<Utc> {
    dt.with_timezone(&Utc)
}

/// Parse an absolute date or date-time. Date-only values are midnight UTC.
pub fn parse_absolute(text: &str) -> Result<DateTime<Utc>> {
    let trimmed = LEADING_LABEL.replace(text.trim(), "");
    let mut candidate = trimmed.trim();
    if candidate.is_empty() {
        return Err(unparseable(text));
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(candidate) {
        return Ok(with_offset(dt));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(candidate) {
        return Ok(with_offset(dt));
    }
    for format in OFFSET_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(candidate, format) {
            return Ok(with_offset(dt));
        }
    }

    // Explicit UTC designators carry no extra information for naive formats.
    for suffix in [" UTC", " GMT", "Z"] {
        if let Some(stripped) = candidate.strip_suffix(suffix) {
            candidate = stripped.trim_end();
            break;
        }
    }

    for format in NAIVE_DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(candidate, format) {
            return Ok(Utc.from_utc_datetime(&naive));
        }
    }
    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(candidate, format) {
            return Ok(start_of_day(date));
        }
    }

    Err(unparseable(text))
}

/// Publish-time routing used by the article extractor: text mentioning "ago"
/// is relative, everything else absolute.
pub fn parse_publish_time(text: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
    if text.to_lowercase().contains("ago") {
        normalize(text, now)
    } else {
        parse_absolute(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 15, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_relative_units() {
        assert_eq!(normalize("50m ago", now()).unwrap(), now() - Duration::minutes(50));
        assert_eq!(normalize("3h ago", now()).unwrap(), now() - Duration::hours(3));
        assert_eq!(normalize("1d ago", now()).unwrap(), now() - Duration::days(1));
        assert_eq!(normalize("2 Y AGO", now()).unwrap(), now() - Duration::days(730));
        assert_eq!(normalize("5 hours ago", now()).unwrap(), now() - Duration::hours(5));
    }

    #[test]
    fn test_first_relative_unit_wins() {
        assert_eq!(normalize("1d 3h ago", now()).unwrap(), now() - Duration::days(1));
    }

    #[test]
    fn test_just_now() {
        assert_eq!(normalize("Just now", now()).unwrap(), now());
        assert_eq!(normalize("a few seconds ago", now()).unwrap(), now());
    }

    #[test]
    fn test_relative_overflow_is_unparseable() {
        let err = normalize("99999999999999999d ago", now()).unwrap_err();
        assert!(matches!(err, Error::UnparseableTime(_)));
    }

    #[test]
    fn test_absolute_with_offset_converts_to_utc() {
        let expected = Utc.with_ymd_and_hms(2024, 3, 1, 14, 30, 0).unwrap();
        assert_eq!(parse_absolute("2024-03-01T09:30:00-05:00").unwrap(), expected);
        assert_eq!(parse_absolute("Fri, 01 Mar 2024 14:30:00 +0000").unwrap(), expected);
        assert_eq!(parse_absolute("2024-03-01T14:30:00Z").unwrap(), expected);
    }

    #[test]
    fn test_absolute_without_offset_is_utc() {
        assert_eq!(
            parse_absolute("2024-03-01 14:30:00").unwrap(),
            Utc.with_ymd_and_hms(2024, 3, 1, 14, 30, 0).unwrap()
        );
        assert_eq!(
            parse_absolute("Published March 1, 2024 2:30 PM").unwrap(),
            Utc.with_ymd_and_hms(2024, 3, 1, 14, 30, 0).unwrap()
        );
        assert_eq!(
            parse_absolute("Updated: Mar 1, 2024 14:30 UTC").unwrap(),
            Utc.with_ymd_and_hms(2024, 3, 1, 14, 30, 0).unwrap()
        );
        assert_eq!(
            parse_absolute("March 1, 2024").unwrap(),
            Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_garbage_is_unparseable() {
        assert!(matches!(parse_absolute("sometime soon"), Err(Error::UnparseableTime(_))));
        assert!(matches!(parse_absolute("   "), Err(Error::UnparseableTime(_))));
        assert!(normalize("yesterday", now()).is_err());
    }

    #[test]
    fn test_publish_time_routing() {
        assert_eq!(parse_publish_time("2h ago", now()).unwrap(), now() - Duration::hours(2));
        // Without "ago" a leading day number is not read as minutes.
        assert_eq!(
            parse_publish_time("1 March 2024", now()).unwrap(),
            Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap()
        );
    }
}
