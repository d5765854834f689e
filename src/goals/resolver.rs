use std::collections::{BTreeMap, HashMap};

use crate::bucket::{Bucket, BucketKind, WeekdayClass};
use crate::dimensions::DimensionFilters;
use crate::metrics::{GoalSet, MetricType, PerMetric};

use super::{dashboard_for, DefaultGoals, DimensionKey, GoalAggregation, GoalOrigin, GoalRow, GoalSpec};

/// Goal rows for one request, indexed by dashboard and dimension key.
///
/// Built once from a single bulk fetch; resolution afterwards is purely
/// in-memory.
#[derive(Debug, Clone, Default)]
pub struct GoalIndex {
    by_dashboard: HashMap<String, BTreeMap<DimensionKey, Vec<f64>>>,
    rows: usize,
}

impl GoalIndex {
    pub fn build(rows: Vec<GoalRow>) -> Self {
        let mut index = GoalIndex::default();
        for row in rows {
            index
                .by_dashboard
                .entry(row.dashboard)
                .or_default()
                .entry(row.key)
                .or_default()
                .push(row.value);
            index.rows += 1;
        }
        index
    }

    pub fn len(&self) -> usize {
        self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    /// Values of all rows in `dashboard` whose key matches `filters`.
    pub fn matching(&self, dashboard: &str, filters: &DimensionFilters) -> Vec<f64> {
        self.by_dashboard
            .get(dashboard)
            .map(|keys| {
                keys.iter()
                    .filter(|(key, _)| key.matches(filters))
                    .flat_map(|(_, values)| values.iter().copied())
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Answers goal lookups for one request from a prebuilt [`GoalIndex`].
#[derive(Debug, Clone, Copy)]
pub struct GoalResolver<'a> {
    index: &'a GoalIndex,
    defaults: DefaultGoals,
}

impl<'a> GoalResolver<'a> {
    pub fn new(index: &'a GoalIndex, defaults: DefaultGoals) -> Self {
        Self { index, defaults }
    }

    /// Daily goal for `metric` on a day of class `class`.
    ///
    /// Sundays are always 0. Otherwise rows matching `filters` in the
    /// `(metric, class)` table are summed (counts, sums) or averaged over
    /// positive values (ratios). Without rows, a specific funnel filter means
    /// no target (0) and the aggregate view falls back to the metric default.
    pub fn resolve(
        &self,
        metric: MetricType,
        class: WeekdayClass,
        filters: &DimensionFilters,
    ) -> GoalSpec {
        let aggregation = GoalAggregation::for_metric(metric);
        let dashboard = match dashboard_for(metric, class) {
            Some(d) => d,
            None => {
                return GoalSpec {
                    value: 0.0,
                    aggregation,
                    origin: GoalOrigin::Sunday,
                    rows: 0,
                }
            }
        };

        let values = self.index.matching(dashboard, filters);
        if !values.is_empty() {
            let value = match aggregation {
                GoalAggregation::Sum => values.iter().sum::<f64>(),
                GoalAggregation::Average => {
                    let positive: Vec<f64> = values.iter().copied().filter(|v| *v > 0.0).collect();
                    if positive.is_empty() {
                        0.0
                    } else {
                        positive.iter().sum::<f64>() / positive.len() as f64
                    }
                }
            };
            return GoalSpec {
                value,
                aggregation,
                origin: GoalOrigin::Configured,
                rows: values.len(),
            };
        }

        // TODO: confirm with product whether a specific funnel without rows
        // should fall back to the default like the aggregate view does.
        if filters.has_specific_funnel() {
            GoalSpec {
                value: 0.0,
                aggregation,
                origin: GoalOrigin::NoTarget,
                rows: 0,
            }
        } else {
            GoalSpec {
                value: self.defaults.get(metric),
                aggregation,
                origin: GoalOrigin::Default,
                rows: 0,
            }
        }
    }

    /// Goal for `metric` on `bucket`. Round buckets split volume goals evenly
    /// across `rounds`; rate goals apply unchanged to every round.
    pub fn resolve_for_bucket(
        &self,
        metric: MetricType,
        bucket: &Bucket,
        filters: &DimensionFilters,
        rounds: usize,
    ) -> GoalSpec {
        let mut spec = self.resolve(metric, bucket.weekday_class, filters);
        if bucket.kind == BucketKind::Round && !metric.is_ratio() {
            spec.value = split_daily_goal(spec.value, rounds);
        }
        spec
    }

    /// Resolved specs for every metric on `bucket`.
    pub fn resolve_bucket(
        &self,
        bucket: &Bucket,
        filters: &DimensionFilters,
        rounds: usize,
    ) -> PerMetric<GoalSpec> {
        PerMetric::from_fn(|metric| self.resolve_for_bucket(metric, bucket, filters, rounds))
    }
}

/// Per-round share of a daily volume goal, rounded to the nearest integer.
pub fn split_daily_goal(daily: f64, rounds: usize) -> f64 {
    if rounds == 0 {
        return daily;
    }
    (daily / rounds as f64).round()
}

/// Flatten resolved specs to their values.
pub fn goal_values(specs: &PerMetric<GoalSpec>) -> GoalSet {
    PerMetric::from_fn(|metric| specs.get(metric).value)
}
