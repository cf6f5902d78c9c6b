//! Timestamp formatting and inclusive UTC date ranges.
//!
//! Every instant that reaches storage is UTC and rendered as
//! `YYYY-MM-DD HH:MM:SS`, so lexical order of the stored strings matches
//! chronological order.

use chrono::{DateTime, Days, Duration, NaiveDate, NaiveDateTime, NaiveTime, Timelike, Utc};

use crate::{Error, Result};

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
pub const DATE_FORMAT: &str = "%Y-%m-%d";

pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

pub fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(s.trim(), TIMESTAMP_FORMAT)
        .map(|naive| naive.and_utc())
        .map_err(|e| Error::Storage(format!("Malformed stored timestamp {:?}: {}", s, e)))
}

/// Drops sub-second precision, which the storage format cannot represent.
pub fn truncate_to_seconds(ts: DateTime<Utc>) -> DateTime<Utc> {
    ts.with_nanosecond(0).unwrap_or(ts)
}

/// Parses a user supplied `YYYY-MM-DD` date.
pub fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), DATE_FORMAT)
        .map_err(|e| Error::InvalidDateInput(format!("{:?} is not a YYYY-MM-DD date: {}", s, e)))
}

pub fn start_of_day(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::MIN).and_utc()
}

pub fn end_of_day(date: NaiveDate) -> DateTime<Utc> {
    // 23:59:59 always exists
    date.and_hms_opt(23, 59, 59)
        .map(|naive| naive.and_utc())
        .unwrap_or_else(|| start_of_day(date))
}

/// Inclusive `[start, end]` interval of UTC instants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl DateRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self> {
        if start > end {
            return Err(Error::InvalidDateInput(format!(
                "start {} is after end {}",
                format_timestamp(&start),
                format_timestamp(&end)
            )));
        }
        Ok(Self { start, end })
    }

    /// Whole calendar days: `start` at 00:00:00, `end` at 23:59:59.
    pub fn from_dates(start: &str, end: &str) -> Result<Self> {
        let start = parse_date(start)?;
        let end = parse_date(end)?;
        Self::new(start_of_day(start), end_of_day(end))
    }

    /// The trailing `days` days ending exactly at `now`.
    pub fn last_days(now: DateTime<Utc>, days: i64) -> Result<Self> {
        let start = Duration::try_days(days)
            .filter(|_| days >= 0)
            .and_then(|span| now.checked_sub_signed(span))
            .ok_or_else(|| invalid_day_count(days))?;
        Self::new(start, now)
    }

    /// Widens the range to the whole calendar days it touches.
    pub fn whole_days(&self) -> Self {
        Self {
            start: start_of_day(self.start.date_naive()),
            end: end_of_day(self.end.date_naive()),
        }
    }

    /// Window used by ingestion runs. Missing bounds default to `now` and
    /// `now - days`; given bounds are whole days.
    pub fn ingest_window(
        start: Option<&str>,
        end: Option<&str>,
        now: DateTime<Utc>,
        days: i64,
    ) -> Result<Self> {
        let end = match non_blank(end) {
            Some(end) => end_of_day(parse_date(end)?),
            None => now,
        };
        let start = match non_blank(start) {
            Some(start) => start_of_day(parse_date(start)?),
            None => Self::last_days(now, days)?.start,
        };
        Self::new(start, end)
    }

    /// Window used by reports. Always whole days; a missing end means today,
    /// a missing start means `days` before the end date.
    pub fn report_window(
        start: Option<&str>,
        end: Option<&str>,
        now: DateTime<Utc>,
        days: i64,
    ) -> Result<Self> {
        let end_date = match non_blank(end) {
            Some(end) => parse_date(end)?,
            None => now.date_naive(),
        };
        let start_date = match non_blank(start) {
            Some(start) => parse_date(start)?,
            None => u64::try_from(days)
                .ok()
                .and_then(|days| end_date.checked_sub_days(Days::new(days)))
                .ok_or_else(|| invalid_day_count(days))?,
        };
        Self::new(start_of_day(start_date), end_of_day(end_date))
    }

    pub fn contains(&self, ts: &DateTime<Utc>) -> bool {
        self.start <= *ts && *ts <= self.end
    }

    /// Every calendar day touched by the range, in order.
    pub fn days(&self) -> Vec<NaiveDate> {
        let last = self.end.date_naive();
        let mut day = self.start.date_naive();
        let mut days = Vec::new();
        while day <= last {
            days.push(day);
            match day.succ_opt() {
                Some(next) => day = next,
                None => break,
            }
        }
        days
    }

    pub fn start_date(&self) -> String {
        self.start.format(DATE_FORMAT).to_string()
    }

    pub fn end_date(&self) -> String {
        self.end.format(DATE_FORMAT).to_string()
    }
}

fn invalid_day_count(days: i64) -> Error {
    Error::InvalidDateInput(format!("{} is not a usable number of days", days))
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Serde adapter writing timestamps in the storage format.
pub mod timestamp_format {
    use chrono::{DateTime, NaiveDateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    use super::{format_timestamp, TIMESTAMP_FORMAT};

    pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format_timestamp(ts))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        NaiveDateTime::parse_from_str(&raw, TIMESTAMP_FORMAT)
            .map(|naive| naive.and_utc())
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_single_day_range_covers_whole_day() {
        let range = DateRange::from_dates("2024-01-01", "2024-01-01").unwrap();
        assert_eq!(range.start, Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
        assert_eq!(range.end, Utc.with_ymd_and_hms(2024, 1, 1, 23, 59, 59).unwrap());
        assert!(range.contains(&Utc.with_ymd_and_hms(2024, 1, 1, 23, 59, 59).unwrap()));
        assert!(!range.contains(&Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap()));
        assert!(!range.contains(&Utc.with_ymd_and_hms(2023, 12, 31, 23, 59, 59).unwrap()));
    }

    #[test]
    fn test_invalid_dates_are_rejected() {
        assert!(matches!(
            DateRange::from_dates("2024-13-01", "2024-12-01"),
            Err(Error::InvalidDateInput(_))
        ));
        assert!(matches!(
            DateRange::from_dates("yesterday", "2024-12-01"),
            Err(Error::InvalidDateInput(_))
        ));
        assert!(matches!(
            DateRange::from_dates("2024-02-01", "2024-01-01"),
            Err(Error::InvalidDateInput(_))
        ));
    }

    #[test]
    fn test_days_enumerates_inclusive_calendar_days() {
        let range = DateRange::from_dates("2024-02-27", "2024-03-01").unwrap();
        let days: Vec<String> = range.days().iter().map(|d| d.to_string()).collect();
        assert_eq!(days, vec!["2024-02-27", "2024-02-28", "2024-02-29", "2024-03-01"]);
    }

    #[test]
    fn test_ingest_window_defaults() {
        let now = Utc.with_ymd_and_hms(2024, 5, 10, 12, 30, 0).unwrap();
        let range = DateRange::ingest_window(None, Some(""), now, 7).unwrap();
        assert_eq!(range.end, now);
        assert_eq!(range.start, Utc.with_ymd_and_hms(2024, 5, 3, 12, 30, 0).unwrap());

        let range = DateRange::ingest_window(Some("2024-05-01"), Some("2024-05-02"), now, 7).unwrap();
        assert_eq!(range.start, Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap());
        assert_eq!(range.end, Utc.with_ymd_and_hms(2024, 5, 2, 23, 59, 59).unwrap());
    }

    #[test]
    fn test_report_window_defaults() {
        let now = Utc.with_ymd_and_hms(2024, 5, 10, 12, 30, 0).unwrap();

        let range = DateRange::report_window(None, None, now, 7).unwrap();
        assert_eq!(range.start_date(), "2024-05-03");
        assert_eq!(range.end, Utc.with_ymd_and_hms(2024, 5, 10, 23, 59, 59).unwrap());

        let range = DateRange::report_window(None, Some("2024-04-08"), now, 7).unwrap();
        assert_eq!(range.start_date(), "2024-04-01");
        assert_eq!(range.end_date(), "2024-04-08");

        let range = DateRange::report_window(Some("2024-05-09"), None, now, 7).unwrap();
        assert_eq!(range.start_date(), "2024-05-09");
        assert_eq!(range.end_date(), "2024-05-10");
    }

    #[test]
    fn test_out_of_range_day_counts_are_invalid_input() {
        let now = Utc.with_ymd_and_hms(2024, 5, 10, 12, 30, 0).unwrap();
        for days in [10_000_000_000_000, i64::MAX, -1] {
            assert!(matches!(
                DateRange::ingest_window(None, None, now, days),
                Err(Error::InvalidDateInput(_))
            ));
            assert!(matches!(
                DateRange::report_window(None, None, now, days),
                Err(Error::InvalidDateInput(_))
            ));
        }
        // An explicit start makes the day count irrelevant.
        assert!(DateRange::ingest_window(Some("2024-05-01"), None, now, i64::MAX).is_ok());
    }

    #[test]
    fn test_whole_days_widens_to_midnight() {
        let now = Utc.with_ymd_and_hms(2024, 5, 10, 12, 30, 0).unwrap();
        let range = DateRange::last_days(now, 7).unwrap().whole_days();
        assert_eq!(range.start, Utc.with_ymd_and_hms(2024, 5, 3, 0, 0, 0).unwrap());
        assert_eq!(range.end, Utc.with_ymd_and_hms(2024, 5, 10, 23, 59, 59).unwrap());
    }

    #[test]
    fn test_timestamp_format_round_trip() {
        let ts = Utc.with_ymd_and_hms(2024, 3, 9, 7, 5, 1).unwrap();
        let rendered = format_timestamp(&ts);
        assert_eq!(rendered, "2024-03-09 07:05:01");
        assert_eq!(parse_timestamp(&rendered).unwrap(), ts);
    }

    #[test]
    fn test_truncate_to_seconds() {
        let ts = Utc.timestamp_opt(1_700_000_000, 987_654_321).unwrap();
        let truncated = truncate_to_seconds(ts);
        assert_eq!(truncated.timestamp(), 1_700_000_000);
        assert_eq!(truncated.timestamp_subsec_nanos(), 0);
    }
}
