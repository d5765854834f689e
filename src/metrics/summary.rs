use serde::Serialize;

use crate::bucket::Bucket;

use super::types::{MetricKind, MetricResult, MetricSet, MetricType, Realized};
use super::realized_value;

/// Results for a single bucket, as handed to the rendering layer.
#[derive(Debug, Clone, Serialize)]
pub struct BucketReport {
    pub bucket: Bucket,
    pub realized: Realized,
    pub metrics: MetricSet,
}

impl BucketReport {
    pub fn label(&self) -> &str {
        &self.bucket.label
    }
}

/// Period-level aggregate with the same metric shape as a bucket.
#[derive(Debug, Clone, Serialize)]
pub struct PeriodSummary {
    pub bucket_count: usize,
    pub non_sunday_buckets: usize,
    pub realized: Realized,
    pub metrics: MetricSet,
}

/// Roll per-bucket results into one summary.
///
/// Count and sum metrics add realized values over every bucket and goals over
/// non-Sunday buckets. Ratio metrics recompute realized from the summed
/// components; their goal is the sum of non-zero bucket goals divided by the
/// number of non-Sunday buckets.
pub fn summarize(buckets: &[BucketReport]) -> PeriodSummary {
    // TODO: confirm with product whether Sunday activity belongs in the period
    // totals; it is counted here, while Sunday goals are not.
    let mut realized = Realized::default();
    for b in buckets {
        realized.add(&b.realized);
    }

    let working: Vec<&BucketReport> = buckets.iter().filter(|b| !b.bucket.is_sunday()).collect();
    let non_sunday = working.len();

    let metrics = MetricSet::from_fn(|metric| {
        let goal_total: f64 = working
            .iter()
            .map(|b| b.metrics.get(metric).goal)
            .filter(|g| *g != 0.0)
            .sum();
        let goal = match metric.kind() {
            MetricKind::Count | MetricKind::Sum => goal_total,
            MetricKind::Ratio => {
                if non_sunday > 0 {
                    goal_total / non_sunday as f64
                } else {
                    0.0
                }
            }
        };
        MetricResult::new(metric, realized_value(&realized, metric), goal)
    });

    PeriodSummary {
        bucket_count: buckets.len(),
        non_sunday_buckets: non_sunday,
        realized,
        metrics,
    }
}

impl PeriodSummary {
    pub fn get(&self, metric: MetricType) -> &MetricResult {
        self.metrics.get(metric)
    }
}
