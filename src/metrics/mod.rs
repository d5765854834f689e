pub mod format;
pub mod summary;
pub mod types;

pub use summary::{summarize, BucketReport, PeriodSummary};
pub use types::*;

/// Realized value of `metric` derived from a bucket's components.
///
/// Conversion rate is `sales / leads * 100` and average ticket is
/// `revenue / sales`; both are 0 when their denominator is 0.
pub fn realized_value(realized: &Realized, metric: MetricType) -> f64 {
    match metric {
        MetricType::Leads => realized.leads as f64,
        MetricType::Sales => realized.sales as f64,
        MetricType::Revenue => realized.revenue,
        MetricType::ConversionRate => {
            safe_div(realized.sales as f64 * 100.0, realized.leads as f64)
        }
        MetricType::AvgTicket => safe_div(realized.revenue, realized.sales as f64),
    }
}

/// Combine a bucket's realized components with its resolved goals.
pub fn compute(realized: &Realized, goals: &GoalSet) -> MetricSet {
    MetricSet::from_fn(|metric| {
        MetricResult::new(metric, realized_value(realized, metric), *goals.get(metric))
    })
}
