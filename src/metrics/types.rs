use serde::Serialize;

use crate::collector::EventType;
use crate::error::{Error, Result};

/// The closed set of tracked metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricType {
    Leads,
    Sales,
    Revenue,
    ConversionRate,
    AvgTicket,
}

/// How a metric behaves under aggregation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    /// Number of events; adds across buckets.
    Count,
    /// Sum of event amounts; adds across buckets.
    Sum,
    /// Derived from other realized values; recomputed, never added.
    Ratio,
}

impl MetricType {
    pub const ALL: [MetricType; 5] = [
        MetricType::Leads,
        MetricType::Sales,
        MetricType::Revenue,
        MetricType::ConversionRate,
        MetricType::AvgTicket,
    ];

    pub fn kind(&self) -> MetricKind {
        match self {
            MetricType::Leads | MetricType::Sales => MetricKind::Count,
            MetricType::Revenue => MetricKind::Sum,
            MetricType::ConversionRate | MetricType::AvgTicket => MetricKind::Ratio,
        }
    }

    pub fn is_ratio(&self) -> bool {
        self.kind() == MetricKind::Ratio
    }

    /// Whether values of this metric are amounts of money.
    pub fn is_monetary(&self) -> bool {
        matches!(self, MetricType::Revenue | MetricType::AvgTicket)
    }

    /// The event stream whose timestamp places records for this metric.
    /// Ratio metrics have none: they are derived per bucket.
    pub fn event_type(&self) -> Option<EventType> {
        match self {
            MetricType::Leads => Some(EventType::Created),
            MetricType::Sales | MetricType::Revenue => Some(EventType::Won),
            MetricType::ConversionRate | MetricType::AvgTicket => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MetricType::Leads => "leads",
            MetricType::Sales => "sales",
            MetricType::Revenue => "revenue",
            MetricType::ConversionRate => "conversion_rate",
            MetricType::AvgTicket => "avg_ticket",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        MetricType::ALL
            .into_iter()
            .find(|m| m.as_str() == s.trim())
            .ok_or_else(|| {
                Error::Config(format!(
                    "unknown metric '{s}'. Use: leads, sales, revenue, conversion_rate, avg_ticket"
                ))
            })
    }
}

impl std::fmt::Display for MetricType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One value per metric type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct PerMetric<T> {
    pub leads: T,
    pub sales: T,
    pub revenue: T,
    pub conversion_rate: T,
    pub avg_ticket: T,
}

impl<T> PerMetric<T> {
    pub fn from_fn(mut f: impl FnMut(MetricType) -> T) -> Self {
        Self {
            leads: f(MetricType::Leads),
            sales: f(MetricType::Sales),
            revenue: f(MetricType::Revenue),
            conversion_rate: f(MetricType::ConversionRate),
            avg_ticket: f(MetricType::AvgTicket),
        }
    }

    pub fn get(&self, metric: MetricType) -> &T {
        match metric {
            MetricType::Leads => &self.leads,
            MetricType::Sales => &self.sales,
            MetricType::Revenue => &self.revenue,
            MetricType::ConversionRate => &self.conversion_rate,
            MetricType::AvgTicket => &self.avg_ticket,
        }
    }

    /// `(metric, value)` pairs in display order.
    pub fn iter(&self) -> impl Iterator<Item = (MetricType, &T)> {
        MetricType::ALL.into_iter().map(move |m| (m, self.get(m)))
    }
}

/// Goal value per metric for one bucket.
pub type GoalSet = PerMetric<f64>;

/// Realized-vs-goal comparison for one metric.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MetricResult {
    pub metric: MetricType,
    pub realized: f64,
    pub goal: f64,
    pub gap: f64,
    pub gap_percent: f64,
}

impl MetricResult {
    pub fn new(metric: MetricType, realized: f64, goal: f64) -> Self {
        let gap = realized - goal;
        Self {
            metric,
            realized,
            goal,
            gap,
            gap_percent: gap_percent(gap, goal),
        }
    }
}

/// One result per metric.
pub type MetricSet = PerMetric<MetricResult>;

/// Raw realized components of one bucket, from which every metric derives.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Realized {
    pub leads: u64,
    pub sales: u64,
    pub revenue: f64,
}

impl Realized {
    pub fn add(&mut self, other: &Realized) {
        self.leads += other.leads;
        self.sales += other.sales;
        self.revenue += other.revenue;
    }
}

/// `gap / goal * 100`, or 0 when there is no goal.
pub fn gap_percent(gap: f64, goal: f64) -> f64 {
    if goal != 0.0 {
        gap / goal * 100.0
    } else {
        0.0
    }
}

/// `numerator / denominator`, or 0 when the denominator is 0.
pub fn safe_div(numerator: f64, denominator: f64) -> f64 {
    if denominator != 0.0 {
        numerator / denominator
    } else {
        0.0
    }
}
