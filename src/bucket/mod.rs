//! Partitioning of a request range into day or round buckets, and
//! assignment of events to those buckets.

pub mod schedule;

pub use schedule::{RoundSchedule, RoundWindow};

use chrono::{Datelike, FixedOffset, NaiveDate, NaiveDateTime, Weekday};
use serde::Serialize;

use crate::collector::{Event, TimeRange};
use crate::date_util::{end_of_day, local_to_utc, start_of_day, utc_to_local};
use crate::metrics::MetricType;
use crate::range::DateRange;

/// Weekday classification that drives goal-table selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WeekdayClass {
    Weekday,
    Saturday,
    Sunday,
}

impl WeekdayClass {
    pub fn of(date: NaiveDate) -> Self {
        match date.weekday() {
            Weekday::Sat => WeekdayClass::Saturday,
            Weekday::Sun => WeekdayClass::Sunday,
            _ => WeekdayClass::Weekday,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            WeekdayClass::Weekday => "weekday",
            WeekdayClass::Saturday => "saturday",
            WeekdayClass::Sunday => "sunday",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BucketKind {
    Day,
    Round,
}

/// A half-open local wall-clock interval `[start, end)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Bucket {
    pub kind: BucketKind,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub weekday_class: WeekdayClass,
    pub label: String,
}

impl Bucket {
    pub fn day(date: NaiveDate) -> Self {
        Self {
            kind: BucketKind::Day,
            start: start_of_day(date),
            end: end_of_day(date),
            weekday_class: WeekdayClass::of(date),
            label: date.format("%Y-%m-%d").to_string(),
        }
    }

    pub fn date(&self) -> NaiveDate {
        self.start.date()
    }

    pub fn is_sunday(&self) -> bool {
        self.weekday_class == WeekdayClass::Sunday
    }

    pub fn contains(&self, local: NaiveDateTime) -> bool {
        local >= self.start && local < self.end
    }
}

/// One bucket per calendar date of `range`, both endpoints included.
/// Dates after `today` are dropped so no bucket reaches into the future.
pub fn build_day_buckets(range: &DateRange, today: NaiveDate) -> Vec<Bucket> {
    range
        .dates()
        .take_while(|d| *d <= today)
        .map(Bucket::day)
        .collect()
}

/// One bucket per window of `schedule` on `date`.
pub fn build_round_buckets(date: NaiveDate, schedule: &RoundSchedule) -> Vec<Bucket> {
    let weekday_class = WeekdayClass::of(date);
    schedule
        .windows()
        .iter()
        .map(|w| {
            let (start, end) = w.bounds_on(date);
            Bucket {
                kind: BucketKind::Round,
                start,
                end,
                weekday_class,
                label: w.name.clone(),
            }
        })
        .collect()
}

/// The UTC interval spanning every bucket, used as the retrieval date filter.
pub fn covering_range(buckets: &[Bucket], offset: FixedOffset) -> Option<TimeRange> {
    let first = buckets.first()?;
    let last = buckets.last()?;
    Some(TimeRange {
        start: local_to_utc(first.start, offset),
        end: local_to_utc(last.end, offset),
    })
}

/// Index of the bucket holding `event` for `metric`, or `None` when the event
/// is of the wrong type for the metric or falls outside every bucket.
///
/// `buckets` must be ordered and non-overlapping, as the builders produce them.
pub fn assign(
    event: &Event,
    buckets: &[Bucket],
    metric: MetricType,
    offset: FixedOffset,
) -> Option<usize> {
    if metric.event_type()? != event.event_type {
        return None;
    }
    let local = utc_to_local(event.occurred_at, offset);
    let idx = buckets.partition_point(|b| b.end <= local);
    buckets
        .get(idx)
        .filter(|b| b.contains(local))
        .map(|_| idx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::EventType;
    use crate::dimensions::Dimensions;
    use chrono::{NaiveTime, TimeZone, Utc};

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn utc() -> FixedOffset {
        FixedOffset::east_opt(0).unwrap()
    }

    fn event(event_type: EventType, y: i32, m: u32, day: u32, h: u32) -> Event {
        Event {
            id: format!("{y}{m}{day}{h}"),
            event_type,
            occurred_at: Utc.with_ymd_and_hms(y, m, day, h, 0, 0).unwrap(),
            amount: 100.0,
            dimensions: Dimensions::default(),
        }
    }

    fn six_rounds() -> RoundSchedule {
        RoundSchedule::new(vec![
            RoundWindow::new("R1", t(8, 0), t(10, 0)),
            RoundWindow::new("R2", t(10, 0), t(12, 0)),
            RoundWindow::new("R3", t(12, 0), t(14, 0)),
            RoundWindow::new("R4", t(14, 0), t(16, 0)),
            RoundWindow::new("R5", t(16, 0), t(18, 0)),
            RoundWindow::new("R6", t(18, 0), t(20, 0)),
        ])
        .unwrap()
    }

    #[test]
    fn test_weekday_class() {
        assert_eq!(WeekdayClass::of(d(2025, 6, 2)), WeekdayClass::Weekday); // Monday
        assert_eq!(WeekdayClass::of(d(2025, 6, 7)), WeekdayClass::Saturday);
        assert_eq!(WeekdayClass::of(d(2025, 6, 8)), WeekdayClass::Sunday);
    }

    #[test]
    fn test_day_buckets_inclusive_and_contiguous() {
        let range = DateRange::new(d(2025, 6, 2), d(2025, 6, 8)).unwrap();
        let buckets = build_day_buckets(&range, d(2025, 12, 31));
        assert_eq!(buckets.len(), 7);
        assert_eq!(buckets[0].label, "2025-06-02");
        assert_eq!(buckets[6].label, "2025-06-08");
        assert!(buckets[6].is_sunday());
        for pair in buckets.windows(2) {
            assert_eq!(pair[0].end, pair[1].start);
        }
    }

    #[test]
    fn test_day_buckets_clipped_at_today() {
        let range = DateRange::new(d(2025, 6, 2), d(2025, 6, 8)).unwrap();
        let buckets = build_day_buckets(&range, d(2025, 6, 4));
        assert_eq!(buckets.len(), 3);
        assert_eq!(buckets.last().unwrap().end, end_of_day(d(2025, 6, 4)));

        let future = build_day_buckets(&range, d(2025, 5, 1));
        assert!(future.is_empty());
    }

    #[test]
    fn test_round_buckets_follow_schedule() {
        let buckets = build_round_buckets(d(2025, 6, 7), &six_rounds());
        assert_eq!(buckets.len(), 6);
        assert!(buckets.iter().all(|b| b.kind == BucketKind::Round));
        assert!(buckets
            .iter()
            .all(|b| b.weekday_class == WeekdayClass::Saturday));
        assert_eq!(buckets[0].label, "R1");
        assert_eq!(buckets[5].end.time(), t(20, 0));
    }

    #[test]
    fn test_assign_by_metric_timestamp() {
        let range = DateRange::new(d(2025, 6, 2), d(2025, 6, 8)).unwrap();
        let buckets = build_day_buckets(&range, d(2025, 12, 31));

        let created = event(EventType::Created, 2025, 6, 3, 9);
        let won = event(EventType::Won, 2025, 6, 6, 15);

        assert_eq!(assign(&created, &buckets, MetricType::Leads, utc()), Some(1));
        assert_eq!(assign(&created, &buckets, MetricType::Sales, utc()), None);
        assert_eq!(assign(&won, &buckets, MetricType::Sales, utc()), Some(4));
        assert_eq!(assign(&won, &buckets, MetricType::Revenue, utc()), Some(4));
        assert_eq!(assign(&won, &buckets, MetricType::Leads, utc()), None);
        // Ratio metrics are derived, never assigned directly.
        assert_eq!(assign(&won, &buckets, MetricType::AvgTicket, utc()), None);
    }

    #[test]
    fn test_assign_outside_range_is_dropped() {
        let range = DateRange::new(d(2025, 6, 2), d(2025, 6, 3)).unwrap();
        let buckets = build_day_buckets(&range, d(2025, 12, 31));
        let early = event(EventType::Created, 2025, 6, 1, 23);
        let late = event(EventType::Created, 2025, 6, 4, 0);
        assert_eq!(assign(&early, &buckets, MetricType::Leads, utc()), None);
        assert_eq!(assign(&late, &buckets, MetricType::Leads, utc()), None);
        assert_eq!(assign(&early, &[], MetricType::Leads, utc()), None);
    }

    #[test]
    fn test_assign_boundaries_are_half_open() {
        let buckets = build_round_buckets(d(2025, 6, 2), &six_rounds());
        let at_ten = event(EventType::Created, 2025, 6, 2, 10);
        let at_eight = event(EventType::Created, 2025, 6, 2, 8);
        let at_twenty = event(EventType::Created, 2025, 6, 2, 20);
        let before_open = event(EventType::Created, 2025, 6, 2, 7);
        assert_eq!(assign(&at_ten, &buckets, MetricType::Leads, utc()), Some(1));
        assert_eq!(assign(&at_eight, &buckets, MetricType::Leads, utc()), Some(0));
        assert_eq!(assign(&at_twenty, &buckets, MetricType::Leads, utc()), None);
        assert_eq!(assign(&before_open, &buckets, MetricType::Leads, utc()), None);
    }

    #[test]
    fn test_assign_uses_local_offset() {
        let range = DateRange::new(d(2025, 6, 2), d(2025, 6, 3)).unwrap();
        let buckets = build_day_buckets(&range, d(2025, 12, 31));
        // 01:00 UTC on the 3rd is 22:00 on the 2nd at UTC-3.
        let e = event(EventType::Created, 2025, 6, 3, 1);
        let brt = FixedOffset::west_opt(3 * 3600).unwrap();
        assert_eq!(assign(&e, &buckets, MetricType::Leads, brt), Some(0));
        assert_eq!(assign(&e, &buckets, MetricType::Leads, utc()), Some(1));
    }

    #[test]
    fn test_every_event_lands_in_at_most_one_bucket() {
        let range = DateRange::new(d(2025, 6, 1), d(2025, 6, 10)).unwrap();
        let buckets = build_day_buckets(&range, d(2025, 12, 31));
        for day in 1..=12 {
            for hour in [0, 6, 12, 23] {
                let e = event(EventType::Created, 2025, 6, day, hour);
                let local = utc_to_local(e.occurred_at, utc());
                let containing = buckets.iter().filter(|b| b.contains(local)).count();
                assert!(containing <= 1);
                let assigned = assign(&e, &buckets, MetricType::Leads, utc());
                assert_eq!(assigned.is_some(), containing == 1);
            }
        }
    }

    #[test]
    fn test_covering_range() {
        let range = DateRange::new(d(2025, 6, 2), d(2025, 6, 3)).unwrap();
        let buckets = build_day_buckets(&range, d(2025, 12, 31));
        let brt = FixedOffset::west_opt(3 * 3600).unwrap();
        let covering = covering_range(&buckets, brt).unwrap();
        assert_eq!(covering.start, Utc.with_ymd_and_hms(2025, 6, 2, 3, 0, 0).unwrap());
        assert_eq!(covering.end, Utc.with_ymd_and_hms(2025, 6, 4, 3, 0, 0).unwrap());
        assert!(covering_range(&[], brt).is_none());
    }
}
