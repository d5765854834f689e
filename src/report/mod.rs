//! Goal-vs-actual reports: validation, concurrent retrieval, bucketing, goal
//! resolution, per-bucket metrics, and the period summary.

use chrono::{FixedOffset, NaiveDate};
use serde::Serialize;

use crate::bucket::{self, build_day_buckets, build_round_buckets, BucketKind, RoundSchedule, WeekdayClass};
use crate::collector::{collect, Collected, Event, EventType, RecordSource, SourceQuery};
use crate::config::EngineConfig;
use crate::dimensions::{DimensionFilters, DimensionKind};
use crate::error::{Error, Result};
use crate::goals::{dashboards_for, goal_values, DefaultGoals, GoalIndex, GoalResolver, GoalSource};
use crate::metrics::{compute, summarize, BucketReport, MetricType, PeriodSummary, Realized};
use crate::range::DateRange;

/// Bucket granularity of a report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Granularity {
    /// One bucket per calendar day.
    Day,
    /// One bucket per round of the supplied schedule, on a single day.
    Round(RoundSchedule),
}

impl Granularity {
    pub fn kind(&self) -> BucketKind {
        match self {
            Granularity::Day => BucketKind::Day,
            Granularity::Round(_) => BucketKind::Round,
        }
    }

    fn rounds(&self) -> usize {
        match self {
            Granularity::Day => 0,
            Granularity::Round(schedule) => schedule.len(),
        }
    }
}

/// What the caller wants reported.
#[derive(Debug, Clone)]
pub struct ReportRequest {
    pub range: DateRange,
    pub filters: DimensionFilters,
    pub granularity: Granularity,
}

impl ReportRequest {
    pub fn daily(range: DateRange, filters: DimensionFilters) -> Self {
        Self {
            range,
            filters: filters.normalized(),
            granularity: Granularity::Day,
        }
    }

    pub fn rounds(date: NaiveDate, filters: DimensionFilters, schedule: RoundSchedule) -> Self {
        Self {
            range: DateRange::single(date),
            filters: filters.normalized(),
            granularity: Granularity::Round(schedule),
        }
    }
}

/// Engine settings for one run.
#[derive(Debug, Clone)]
pub struct ReportOptions {
    pub page_size: u32,
    pub offset: FixedOffset,
    pub defaults: DefaultGoals,
    /// Last day that may produce a day bucket.
    pub today: NaiveDate,
}

impl ReportOptions {
    pub fn from_config(config: &EngineConfig, today: NaiveDate) -> Self {
        Self {
            page_size: config.page_size,
            offset: config.offset(),
            defaults: config.defaults,
            today,
        }
    }
}

/// Checks that dimension ids named in a filter exist.
#[allow(async_fn_in_trait)]
pub trait DimensionCatalog {
    async fn dimension_exists(&self, kind: DimensionKind, id: &str) -> Result<bool>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ReportStatus {
    Complete,
    /// Some retrieval stream was truncated or goals could not be fetched.
    Partial,
}

/// Per-bucket results plus the period summary.
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub range: DateRange,
    pub granularity: BucketKind,
    pub filters: DimensionFilters,
    pub status: ReportStatus,
    pub warnings: Vec<String>,
    pub buckets: Vec<BucketReport>,
    pub summary: PeriodSummary,
}

/// Reject a request before any retrieval starts.
pub async fn validate<C: DimensionCatalog>(request: &ReportRequest, catalog: &C) -> Result<()> {
    if request.range.end < request.range.start {
        return Err(Error::InvalidRange(format!(
            "end date {} is before start date {}",
            request.range.end, request.range.start
        )));
    }
    if let Granularity::Round(schedule) = &request.granularity {
        if !request.range.is_single_day() {
            return Err(Error::InvalidRange(format!(
                "round reports cover a single day, got {}",
                request.range
            )));
        }
        if schedule.is_empty() {
            return Err(Error::InvalidSchedule("no rounds configured".into()));
        }
    }
    for (kind, id) in request.filters.active() {
        if !catalog.dimension_exists(kind, id).await? {
            return Err(Error::InvalidFilter(format!("unknown {kind} '{id}'")));
        }
    }
    Ok(())
}

/// Produce a report.
///
/// Both event streams and the goal rows are fetched concurrently, once each.
/// Retrieval failures degrade the report to [`ReportStatus::Partial`]; only
/// an invalid request is an error.
pub async fn run<R, G, C>(
    records: &R,
    goals: &G,
    catalog: &C,
    request: &ReportRequest,
    options: &ReportOptions,
) -> Result<Report>
where
    R: RecordSource,
    G: GoalSource,
    C: DimensionCatalog,
{
    validate(request, catalog).await?;
    if options.page_size == 0 {
        return Err(Error::InvalidPageSize(options.page_size));
    }

    let buckets = match &request.granularity {
        Granularity::Day => build_day_buckets(&request.range, options.today),
        Granularity::Round(schedule) => build_round_buckets(request.range.start, schedule),
    };
    let rounds = request.granularity.rounds();

    log::info!(
        "Building {:?} report for {} ({} buckets)",
        request.granularity.kind(),
        request.range,
        buckets.len()
    );

    let mut warnings = Vec::new();
    let mut status = ReportStatus::Complete;

    let Some(covering) = bucket::covering_range(&buckets, options.offset) else {
        warnings.push(format!("{} lies entirely in the future", request.range));
        return Ok(Report {
            range: request.range,
            granularity: request.granularity.kind(),
            filters: request.filters.clone(),
            status,
            warnings,
            buckets: Vec::new(),
            summary: summarize(&[]),
        });
    };

    let query_for = |event_type| SourceQuery {
        event_type,
        range: covering,
        filters: request.filters.clone(),
        page_size: options.page_size,
    };
    let created_query = query_for(EventType::Created);
    let won_query = query_for(EventType::Won);

    let mut classes: Vec<WeekdayClass> = buckets.iter().map(|b| b.weekday_class).collect();
    classes.dedup();
    let dashboards = dashboards_for(&classes);

    let goal_fetch = async {
        if dashboards.is_empty() {
            Ok(Vec::new())
        } else {
            goals.query_goals(&dashboards, &request.filters).await
        }
    };

    let (created, won, goal_rows) = tokio::join!(
        collect(records, &created_query),
        collect(records, &won_query),
        goal_fetch
    );
    let created = created?;
    let won = won?;

    for (label, stream) in [("created", &created), ("won", &won)] {
        if let Some(reason) = &stream.truncated {
            log::warn!(
                "{label} events truncated after {} pages ({} records): {reason}",
                stream.pages,
                stream.records.len()
            );
            warnings.push(format!(
                "{label} events are incomplete ({} records retrieved): {reason}",
                stream.records.len()
            ));
            status = ReportStatus::Partial;
        }
    }

    let index = match goal_rows {
        Ok(rows) => GoalIndex::build(rows),
        Err(e) => {
            log::warn!("Goal fetch failed, resolving from fallbacks: {e}");
            warnings.push(format!("goals unavailable: {e}"));
            status = ReportStatus::Partial;
            GoalIndex::default()
        }
    };
    log::debug!(
        "Fetched {} created, {} won events and {} goal rows",
        created.records.len(),
        won.records.len(),
        index.len()
    );

    let realized = tally(&buckets, &created, &won, options.offset);
    let resolver = GoalResolver::new(&index, options.defaults);

    let bucket_reports: Vec<BucketReport> = buckets
        .into_iter()
        .zip(realized)
        .map(|(bucket, realized)| {
            let specs = resolver.resolve_bucket(&bucket, &request.filters, rounds);
            let metrics = compute(&realized, &goal_values(&specs));
            BucketReport {
                bucket,
                realized,
                metrics,
            }
        })
        .collect();

    let summary = summarize(&bucket_reports);

    Ok(Report {
        range: request.range,
        granularity: request.granularity.kind(),
        filters: request.filters.clone(),
        status,
        warnings,
        buckets: bucket_reports,
        summary,
    })
}

/// Realized components per bucket. Events outside every bucket are dropped.
fn tally(
    buckets: &[bucket::Bucket],
    created: &Collected,
    won: &Collected,
    offset: FixedOffset,
) -> Vec<Realized> {
    let mut realized = vec![Realized::default(); buckets.len()];
    let mut dropped = 0usize;

    let mut place = |event: &Event, metric: MetricType| -> Option<usize> {
        let idx = bucket::assign(event, buckets, metric, offset);
        if idx.is_none() {
            dropped += 1;
        }
        idx
    };

    for event in &created.records {
        if let Some(i) = place(event, MetricType::Leads) {
            realized[i].leads += 1;
        }
    }
    for event in &won.records {
        if let Some(i) = place(event, MetricType::Sales) {
            realized[i].sales += 1;
            realized[i].revenue += event.amount;
        }
    }

    if dropped > 0 {
        log::debug!("{dropped} events fell outside every bucket");
    }
    realized
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use chrono::{NaiveTime, TimeZone, Utc};

    use crate::bucket::RoundWindow;
    use crate::collector::{Page, TimeRange};
    use crate::dimensions::Dimensions;
    use crate::goals::{DimensionKey, GoalRow};

    /// Serves events from memory, honouring type, range, filters and paging.
    #[derive(Default)]
    struct MemorySource {
        events: Vec<Event>,
        fail_won_from_offset: Option<u64>,
        calls: Mutex<Vec<(EventType, u64)>>,
    }

    impl RecordSource for MemorySource {
        async fn query(
            &self,
            event_type: EventType,
            range: &TimeRange,
            filters: &DimensionFilters,
            offset: u64,
            page_size: u32,
        ) -> Result<Page> {
            self.calls.lock().unwrap().push((event_type, offset));
            if event_type == EventType::Won && self.fail_won_from_offset.is_some_and(|o| offset >= o) {
                return Err(Error::Source("timeout".into()));
            }
            let records: Vec<Event> = self
                .events
                .iter()
                .filter(|e| e.event_type == event_type)
                .filter(|e| range.contains(e.occurred_at))
                .filter(|e| filters.matches(&e.dimensions))
                .skip(offset as usize)
                .take(page_size as usize)
                .cloned()
                .collect();
            Ok(Page {
                records,
                is_last_page: false,
            })
        }
    }

    #[derive(Default)]
    struct MemoryGoals {
        rows: Vec<GoalRow>,
        fail: bool,
        calls: AtomicUsize,
    }

    impl GoalSource for MemoryGoals {
        async fn query_goals(
            &self,
            dashboards: &[&str],
            filters: &DimensionFilters,
        ) -> Result<Vec<GoalRow>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(Error::Source("goal service unavailable".into()));
            }
            Ok(self
                .rows
                .iter()
                .filter(|r| dashboards.contains(&r.dashboard.as_str()) && r.key.matches(filters))
                .cloned()
                .collect())
        }
    }

    /// Knows a fixed set of dimension ids.
    struct Catalog(Vec<(DimensionKind, &'static str)>);

    impl DimensionCatalog for Catalog {
        async fn dimension_exists(&self, kind: DimensionKind, id: &str) -> Result<bool> {
            Ok(self.0.iter().any(|(k, i)| *k == kind && *i == id))
        }
    }

    fn catalog() -> Catalog {
        Catalog(vec![
            (DimensionKind::Funnel, "f1"),
            (DimensionKind::Funnel, "f2"),
            (DimensionKind::Seller, "s1"),
        ])
    }

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, day).unwrap()
    }

    fn event(id: usize, event_type: EventType, day: u32, hour: u32, amount: f64) -> Event {
        Event {
            id: format!("{}-{id}", event_type.as_str()),
            event_type,
            occurred_at: Utc.with_ymd_and_hms(2025, 6, day, hour, 0, 0).unwrap(),
            amount,
            dimensions: Dimensions {
                funnel_id: Some("f1".into()),
                ..Default::default()
            },
        }
    }

    fn goal(dashboard: &str, value: f64, funnel: Option<&str>) -> GoalRow {
        GoalRow {
            dashboard: dashboard.into(),
            value,
            key: DimensionKey {
                funnel_id: funnel.map(String::from),
                ..Default::default()
            },
        }
    }

    fn options(today: NaiveDate) -> ReportOptions {
        ReportOptions {
            page_size: 1000,
            offset: FixedOffset::east_opt(0).unwrap(),
            defaults: DefaultGoals::default(),
            today,
        }
    }

    fn daily(start: u32, end: u32) -> ReportRequest {
        ReportRequest::daily(
            DateRange::new(d(start), d(end)).unwrap(),
            DimensionFilters::default(),
        )
    }

    #[tokio::test]
    async fn test_single_day_conversion_and_ticket() {
        // Monday 2025-06-02: 40 leads, 10 sales worth 30000 in total.
        let mut events: Vec<Event> = (0..40)
            .map(|i| event(i, EventType::Created, 2, 9 + (i as u32 % 8), 0.0))
            .collect();
        events.extend((0..10).map(|i| event(i, EventType::Won, 2, 14, 3000.0)));
        let source = MemorySource {
            events,
            ..Default::default()
        };
        let goals = MemoryGoals::default();

        let report = run(&source, &goals, &catalog(), &daily(2, 2), &options(d(30)))
            .await
            .unwrap();

        assert_eq!(report.status, ReportStatus::Complete);
        assert_eq!(report.buckets.len(), 1);
        let metrics = &report.buckets[0].metrics;
        assert_eq!(metrics.leads.realized, 40.0);
        assert_eq!(metrics.sales.realized, 10.0);
        assert_eq!(metrics.conversion_rate.realized, 25.0);
        assert_eq!(metrics.avg_ticket.realized, 3000.0);
        // No rows configured: aggregate defaults apply.
        assert_eq!(metrics.leads.goal, 80.0);
        assert_eq!(metrics.leads.gap, -40.0);
        assert_eq!(metrics.leads.gap_percent, -50.0);
    }

    #[tokio::test]
    async fn test_week_goal_excludes_sunday() {
        // Sunday 2025-06-01 through Saturday 2025-06-07.
        let source = MemorySource {
            events: vec![
                event(0, EventType::Created, 1, 10, 0.0),
                event(1, EventType::Created, 3, 10, 0.0),
            ],
            ..Default::default()
        };
        let goals = MemoryGoals {
            rows: vec![goal("leads_weekday", 80.0, None)],
            ..Default::default()
        };

        let report = run(&source, &goals, &catalog(), &daily(1, 7), &options(d(30)))
            .await
            .unwrap();

        assert_eq!(report.buckets.len(), 7);
        let sunday = &report.buckets[0];
        assert!(sunday.bucket.is_sunday());
        for (_, result) in sunday.metrics.iter() {
            assert_eq!(result.goal, 0.0);
        }
        // 5 weekdays from rows + Saturday from the default.
        assert_eq!(report.summary.get(MetricType::Leads).goal, 480.0);
        // Sunday activity still counts as realized.
        assert_eq!(report.summary.realized.leads, 2);
        assert_eq!(report.summary.non_sunday_buckets, 6);
    }

    #[tokio::test]
    async fn test_goals_fetched_once_per_request() {
        let source = MemorySource::default();
        let goals = MemoryGoals::default();

        run(&source, &goals, &catalog(), &daily(1, 30), &options(d(30)))
            .await
            .unwrap();

        assert_eq!(goals.calls.load(Ordering::SeqCst), 1);
        let calls = source.calls.lock().unwrap();
        assert_eq!(calls.iter().filter(|(t, _)| *t == EventType::Created).count(), 1);
        assert_eq!(calls.iter().filter(|(t, _)| *t == EventType::Won).count(), 1);
    }

    #[tokio::test]
    async fn test_events_conserved_across_buckets() {
        let events: Vec<Event> = (0..30)
            .map(|i| event(i, EventType::Created, 2 + (i as u32 % 5), 12, 0.0))
            .chain((0..9).map(|i| event(i, EventType::Won, 2 + (i as u32 % 3), 16, 100.0)))
            .collect();
        let source = MemorySource {
            events,
            ..Default::default()
        };

        let report = run(
            &source,
            &MemoryGoals::default(),
            &catalog(),
            &daily(2, 6),
            &options(d(30)),
        )
        .await
        .unwrap();

        let leads: u64 = report.buckets.iter().map(|b| b.realized.leads).sum();
        let sales: u64 = report.buckets.iter().map(|b| b.realized.sales).sum();
        assert_eq!(leads, 30);
        assert_eq!(sales, 9);
        assert_eq!(report.summary.realized.revenue, 900.0);
    }

    #[tokio::test]
    async fn test_truncated_stream_marks_partial() {
        let events: Vec<Event> = (0..5)
            .map(|i| event(i, EventType::Won, 2, 10, 50.0))
            .collect();
        let source = MemorySource {
            events,
            fail_won_from_offset: Some(2),
            ..Default::default()
        };
        let mut opts = options(d(30));
        opts.page_size = 2;

        let report = run(&source, &MemoryGoals::default(), &catalog(), &daily(2, 2), &opts)
            .await
            .unwrap();

        assert_eq!(report.status, ReportStatus::Partial);
        assert_eq!(report.summary.realized.sales, 2);
        assert!(report.warnings.iter().any(|w| w.contains("won events")));
    }

    #[tokio::test]
    async fn test_goal_failure_degrades_to_fallbacks() {
        let goals = MemoryGoals {
            rows: vec![goal("leads_weekday", 10.0, None)],
            fail: true,
            ..Default::default()
        };

        let report = run(
            &MemorySource::default(),
            &goals,
            &catalog(),
            &daily(2, 2),
            &options(d(30)),
        )
        .await
        .unwrap();

        assert_eq!(report.status, ReportStatus::Partial);
        assert_eq!(report.buckets[0].metrics.leads.goal, 80.0);
    }

    #[tokio::test]
    async fn test_specific_funnel_without_rows_has_no_target() {
        let goals = MemoryGoals {
            rows: vec![goal("leads_weekday", 50.0, Some("f1"))],
            ..Default::default()
        };
        let request = ReportRequest::daily(
            DateRange::single(d(2)),
            DimensionFilters {
                funnel_id: Some("f2".into()),
                ..Default::default()
            },
        );

        let report = run(&MemorySource::default(), &goals, &catalog(), &request, &options(d(30)))
            .await
            .unwrap();

        assert_eq!(report.buckets[0].metrics.leads.goal, 0.0);
        assert_eq!(report.buckets[0].metrics.leads.gap_percent, 0.0);
    }

    #[tokio::test]
    async fn test_unknown_filter_rejected_before_retrieval() {
        let source = MemorySource::default();
        let goals = MemoryGoals::default();
        let request = ReportRequest::daily(
            DateRange::single(d(2)),
            DimensionFilters {
                seller_id: Some("ghost".into()),
                ..Default::default()
            },
        );

        let err = run(&source, &goals, &catalog(), &request, &options(d(30)))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::InvalidFilter(_)));
        assert!(err.is_invalid_request());
        assert!(source.calls.lock().unwrap().is_empty());
        assert_eq!(goals.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_zero_page_size_rejected_before_retrieval() {
        let source = MemorySource::default();
        let goals = MemoryGoals::default();
        let mut opts = options(d(30));
        opts.page_size = 0;

        let err = run(&source, &goals, &catalog(), &daily(2, 3), &opts)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::InvalidPageSize(0)));
        assert!(err.is_invalid_request());
        assert!(source.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_all_filter_is_unfiltered() {
        let request = ReportRequest::daily(
            DateRange::single(d(2)),
            DimensionFilters {
                funnel_id: Some("all".into()),
                ..Default::default()
            },
        );
        assert!(request.filters.funnel_id.is_none());
        assert!(validate(&request, &Catalog(vec![])).await.is_ok());
    }

    fn two_rounds() -> RoundSchedule {
        let t = |h| NaiveTime::from_hms_opt(h, 0, 0).unwrap();
        RoundSchedule::new(vec![
            RoundWindow::new("Morning", t(0), t(12)),
            RoundWindow::new("Afternoon", t(12), NaiveTime::MIN),
        ])
        .unwrap()
    }

    #[tokio::test]
    async fn test_round_report_splits_volume_goals() {
        let source = MemorySource {
            events: vec![
                event(0, EventType::Created, 2, 9, 0.0),
                event(1, EventType::Created, 2, 15, 0.0),
                event(2, EventType::Created, 2, 16, 0.0),
                event(0, EventType::Won, 2, 17, 2000.0),
            ],
            ..Default::default()
        };
        let goals = MemoryGoals {
            rows: vec![
                goal("leads_weekday", 25.0, None),
                goal("conversion_rate_weekday", 12.5, None),
            ],
            ..Default::default()
        };
        let request = ReportRequest::rounds(d(2), DimensionFilters::default(), two_rounds());

        let report = run(&source, &goals, &catalog(), &request, &options(d(30)))
            .await
            .unwrap();

        assert_eq!(report.granularity, BucketKind::Round);
        assert_eq!(report.buckets.len(), 2);
        assert_eq!(report.buckets[0].label(), "Morning");
        assert_eq!(report.buckets[0].realized.leads, 1);
        assert_eq!(report.buckets[1].realized.leads, 2);
        assert_eq!(report.buckets[1].realized.sales, 1);
        // 25 / 2 rounds to 13; rates apply unchanged.
        assert_eq!(report.buckets[0].metrics.leads.goal, 13.0);
        assert_eq!(report.buckets[1].metrics.conversion_rate.goal, 12.5);
    }

    #[tokio::test]
    async fn test_round_request_must_cover_one_day() {
        let request = ReportRequest {
            range: DateRange::new(d(2), d(3)).unwrap(),
            filters: DimensionFilters::default(),
            granularity: Granularity::Round(two_rounds()),
        };
        let err = run(
            &MemorySource::default(),
            &MemoryGoals::default(),
            &catalog(),
            &request,
            &options(d(30)),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::InvalidRange(_)));
    }

    #[tokio::test]
    async fn test_future_range_retrieves_nothing() {
        let source = MemorySource::default();
        let goals = MemoryGoals::default();

        let report = run(&source, &goals, &catalog(), &daily(10, 12), &options(d(5)))
            .await
            .unwrap();

        assert!(report.buckets.is_empty());
        assert_eq!(report.summary.bucket_count, 0);
        assert!(source.calls.lock().unwrap().is_empty());
        assert_eq!(goals.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_offset_moves_event_to_local_day() {
        // 01:00 UTC on the 3rd is 22:00 on the 2nd at UTC-3.
        let source = MemorySource {
            events: vec![event(0, EventType::Created, 3, 1, 0.0)],
            ..Default::default()
        };
        let mut opts = options(d(30));
        opts.offset = FixedOffset::west_opt(3 * 3600).unwrap();

        let report = run(&source, &MemoryGoals::default(), &catalog(), &daily(2, 3), &opts)
            .await
            .unwrap();

        assert_eq!(report.buckets[0].realized.leads, 1);
        assert_eq!(report.buckets[1].realized.leads, 0);
    }
}
