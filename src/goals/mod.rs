//! Goal tables ("dashboards"), goal rows, and resolution of the goal that
//! applies to a bucket.

pub mod resolver;

pub use resolver::{goal_values, split_daily_goal, GoalIndex, GoalResolver};

use serde::{Deserialize, Serialize};

use crate::bucket::WeekdayClass;
use crate::dimensions::DimensionFilters;
use crate::error::Result;
use crate::metrics::{MetricType, PerMetric};

/// Name of the goal table for a metric on a class of day. Sundays have none.
pub fn dashboard_for(metric: MetricType, class: WeekdayClass) -> Option<&'static str> {
    let name = match (metric, class) {
        (_, WeekdayClass::Sunday) => return None,
        (MetricType::Leads, WeekdayClass::Weekday) => "leads_weekday",
        (MetricType::Leads, WeekdayClass::Saturday) => "leads_saturday",
        (MetricType::Sales, WeekdayClass::Weekday) => "sales_weekday",
        (MetricType::Sales, WeekdayClass::Saturday) => "sales_saturday",
        (MetricType::Revenue, WeekdayClass::Weekday) => "revenue_weekday",
        (MetricType::Revenue, WeekdayClass::Saturday) => "revenue_saturday",
        (MetricType::ConversionRate, WeekdayClass::Weekday) => "conversion_rate_weekday",
        (MetricType::ConversionRate, WeekdayClass::Saturday) => "conversion_rate_saturday",
        (MetricType::AvgTicket, WeekdayClass::Weekday) => "avg_ticket_weekday",
        (MetricType::AvgTicket, WeekdayClass::Saturday) => "avg_ticket_saturday",
    };
    Some(name)
}

/// Every dashboard needed to resolve goals for the given day classes.
pub fn dashboards_for(classes: &[WeekdayClass]) -> Vec<&'static str> {
    let mut names: Vec<&'static str> = classes
        .iter()
        .flat_map(|c| MetricType::ALL.into_iter().filter_map(move |m| dashboard_for(m, *c)))
        .collect();
    names.sort_unstable();
    names.dedup();
    names
}

/// True when `name` is one of the known goal tables.
pub fn is_known_dashboard(name: &str) -> bool {
    dashboards_for(&[WeekdayClass::Weekday, WeekdayClass::Saturday]).contains(&name)
}

/// The dimensions a goal row is configured for. `None` means the row is not
/// specific to that dimension.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DimensionKey {
    pub funnel_id: Option<String>,
    pub unit_id: Option<String>,
    pub seller_id: Option<String>,
}

impl DimensionKey {
    /// A row matches when every active filter equals the row's value for it.
    pub fn matches(&self, filters: &DimensionFilters) -> bool {
        fn ok(filter: &Option<String>, value: &Option<String>) -> bool {
            filter.is_none() || filter == value
        }
        ok(&filters.funnel_id, &self.funnel_id)
            && ok(&filters.unit_id, &self.unit_id)
            && ok(&filters.seller_id, &self.seller_id)
    }
}

/// One configured goal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoalRow {
    pub dashboard: String,
    pub value: f64,
    #[serde(flatten)]
    pub key: DimensionKey,
}

/// Where goal rows come from. Queried once per report.
#[allow(async_fn_in_trait)]
pub trait GoalSource {
    async fn query_goals(
        &self,
        dashboards: &[&str],
        filters: &DimensionFilters,
    ) -> Result<Vec<GoalRow>>;
}

/// How multiple matching rows combine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GoalAggregation {
    Sum,
    Average,
}

impl GoalAggregation {
    pub fn for_metric(metric: MetricType) -> Self {
        if metric.is_ratio() {
            GoalAggregation::Average
        } else {
            GoalAggregation::Sum
        }
    }
}

/// Which resolution rule produced a goal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GoalOrigin {
    /// Sunday override.
    Sunday,
    /// Aggregated from configured rows.
    Configured,
    /// A specific funnel was requested and has no rows.
    NoTarget,
    /// Aggregate view with no rows; the metric's default.
    Default,
}

/// The goal resolved for one metric on one bucket.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GoalSpec {
    pub value: f64,
    pub aggregation: GoalAggregation,
    pub origin: GoalOrigin,
    /// Number of rows that contributed.
    pub rows: usize,
}

/// Fallback daily goals for the aggregate view when nothing is configured.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DefaultGoals(pub PerMetric<f64>);

impl Default for DefaultGoals {
    fn default() -> Self {
        DefaultGoals(PerMetric {
            leads: 80.0,
            sales: 10.0,
            revenue: 30000.0,
            conversion_rate: 12.5,
            avg_ticket: 3000.0,
        })
    }
}

impl DefaultGoals {
    pub fn get(&self, metric: MetricType) -> f64 {
        *self.0.get(metric)
    }

    pub fn set(&mut self, metric: MetricType, value: f64) {
        let slot = match metric {
            MetricType::Leads => &mut self.0.leads,
            MetricType::Sales => &mut self.0.sales,
            MetricType::Revenue => &mut self.0.revenue,
            MetricType::ConversionRate => &mut self.0.conversion_rate,
            MetricType::AvgTicket => &mut self.0.avg_ticket,
        };
        *slot = value;
    }
}
