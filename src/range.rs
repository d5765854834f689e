use std::sync::LazyLock;

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use regex::Regex;
use serde::Serialize;

use crate::date_util::last_day_of_month;
use crate::error::{Error, Result};

static RE_DAY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{4})-(\d{2})-(\d{2})$").unwrap());
static RE_WEEK: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(\d{4})-W(\d{1,2})$").unwrap());
static RE_MONTH: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(\d{4})-(\d{2})$").unwrap());
static RE_ROLLING: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(\d{1,4})[dD]$").unwrap());

/// An inclusive calendar-date range `[start, end]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    /// Build a range, rejecting `end < start`.
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self> {
        if end < start {
            return Err(Error::InvalidRange(format!(
                "end date {end} is before start date {start}"
            )));
        }
        Ok(Self { start, end })
    }

    pub fn single(date: NaiveDate) -> Self {
        Self {
            start: date,
            end: date,
        }
    }

    /// Number of calendar days covered, both endpoints included.
    pub fn num_days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }

    pub fn is_single_day(&self) -> bool {
        self.start == self.end
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }

    /// Iterate the dates of the range in order.
    pub fn dates(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.start
            .iter_days()
            .take_while(move |d| *d <= self.end)
    }

    /// Parse a period expression relative to `today`.
    ///
    /// Supported formats:
    /// - `2025-06-02`: a single day
    /// - `2025-06`: calendar month
    /// - `2025-W23`: ISO week
    /// - `7d`: rolling last N days ending today
    /// - `today`, `wtd`, `mtd`: to-date ranges
    pub fn parse_period(s: &str, today: NaiveDate) -> Result<Self> {
        let s = s.trim();

        match s.to_lowercase().as_str() {
            "today" => return Ok(Self::single(today)),
            "wtd" => {
                let monday = today - Duration::days(today.weekday().num_days_from_monday() as i64);
                return Self::new(monday, today);
            }
            "mtd" => {
                let first = today.with_day(1).unwrap_or(today);
                return Self::new(first, today);
            }
            _ => {}
        }

        if let Some(caps) = RE_ROLLING.captures(s) {
            let n: i64 = caps[1]
                .parse()
                .map_err(|_| Error::PeriodParse(format!("invalid day count: {s}")))?;
            if n == 0 {
                return Err(Error::PeriodParse(format!("empty rolling period: {s}")));
            }
            return Self::new(today - Duration::days(n - 1), today);
        }

        if RE_DAY.is_match(s) {
            let date = NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .map_err(|_| Error::PeriodParse(format!("invalid date: {s}")))?;
            return Ok(Self::single(date));
        }

        if let Some(caps) = RE_WEEK.captures(s) {
            let year: i32 = caps[1]
                .parse()
                .map_err(|_| Error::PeriodParse(format!("invalid year: {s}")))?;
            let week: u32 = caps[2]
                .parse()
                .map_err(|_| Error::PeriodParse(format!("invalid week: {s}")))?;
            let start = NaiveDate::from_isoywd_opt(year, week, Weekday::Mon)
                .ok_or_else(|| Error::PeriodParse(format!("week out of range: {s}")))?;
            return Self::new(start, start + Duration::days(6));
        }

        if let Some(caps) = RE_MONTH.captures(s) {
            let year: i32 = caps[1]
                .parse()
                .map_err(|_| Error::PeriodParse(format!("invalid year: {s}")))?;
            let month: u32 = caps[2]
                .parse()
                .map_err(|_| Error::PeriodParse(format!("invalid month: {s}")))?;
            let start = NaiveDate::from_ymd_opt(year, month, 1)
                .ok_or_else(|| Error::PeriodParse(format!("month out of range: {s}")))?;
            let end = last_day_of_month(year, month)
                .ok_or_else(|| Error::PeriodParse(format!("month out of range: {s}")))?;
            return Self::new(start, end);
        }

        Err(Error::PeriodParse(format!("unrecognized period: {s}")))
    }
}

impl std::fmt::Display for DateRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_single_day() {
            write!(f, "{}", self.start)
        } else {
            write!(f, "{}..{}", self.start, self.end)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_new_rejects_inverted_range() {
        let err = DateRange::new(d(2025, 6, 5), d(2025, 6, 1)).unwrap_err();
        assert!(err.is_invalid_request());
        assert!(DateRange::new(d(2025, 6, 1), d(2025, 6, 1)).is_ok());
    }

    #[test]
    fn test_num_days_and_dates() {
        let r = DateRange::new(d(2025, 2, 27), d(2025, 3, 2)).unwrap();
        assert_eq!(r.num_days(), 4);
        let dates: Vec<_> = r.dates().collect();
        assert_eq!(dates, vec![d(2025, 2, 27), d(2025, 2, 28), d(2025, 3, 1), d(2025, 3, 2)]);
    }

    #[test]
    fn test_parse_day() {
        let today = d(2025, 6, 10);
        assert_eq!(
            DateRange::parse_period("2025-06-02", today).unwrap(),
            DateRange::single(d(2025, 6, 2))
        );
        assert!(DateRange::parse_period("2025-02-30", today).is_err());
    }

    #[test]
    fn test_parse_month() {
        let today = d(2025, 6, 10);
        let r = DateRange::parse_period("2024-02", today).unwrap();
        assert_eq!(r.start, d(2024, 2, 1));
        assert_eq!(r.end, d(2024, 2, 29));
        assert!(DateRange::parse_period("2025-13", today).is_err());
    }

    #[test]
    fn test_parse_week() {
        let r = DateRange::parse_period("2025-W01", d(2025, 6, 10)).unwrap();
        assert_eq!(r.start.weekday(), Weekday::Mon);
        assert_eq!(r.num_days(), 7);
    }

    #[test]
    fn test_parse_rolling_and_to_date() {
        let today = d(2025, 6, 11); // Wednesday
        let r = DateRange::parse_period("7d", today).unwrap();
        assert_eq!(r.start, d(2025, 6, 5));
        assert_eq!(r.end, today);

        let r = DateRange::parse_period("wtd", today).unwrap();
        assert_eq!(r.start, d(2025, 6, 9));

        let r = DateRange::parse_period("mtd", today).unwrap();
        assert_eq!(r.start, d(2025, 6, 1));

        assert_eq!(
            DateRange::parse_period("today", today).unwrap(),
            DateRange::single(today)
        );
        assert!(DateRange::parse_period("0d", today).is_err());
    }

    #[test]
    fn test_parse_invalid() {
        assert!(DateRange::parse_period("garbage", d(2025, 6, 10)).is_err());
    }

    #[test]
    fn test_display() {
        assert_eq!(DateRange::single(d(2025, 6, 2)).to_string(), "2025-06-02");
        assert_eq!(
            DateRange::new(d(2025, 6, 1), d(2025, 6, 7)).unwrap().to_string(),
            "2025-06-01..2025-06-07"
        );
    }
}
