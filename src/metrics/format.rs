//! Display helpers. Values keep full precision internally; rounding here is
//! presentation only.

use super::types::{MetricKind, MetricType};

/// Format a realized or goal value for display.
pub fn format_value(metric: MetricType, value: f64) -> String {
    magnitude(metric, value.abs())
        .map(|m| if value < 0.0 { format!("-{m}") } else { m })
        .unwrap_or_else(|| "n/a".to_string())
}

/// Format a gap with an explicit sign. Monetary gaps round to whole units.
pub fn format_gap(metric: MetricType, gap: f64) -> String {
    match magnitude(metric, gap.abs()) {
        Some(m) => format!("{}{m}", sign(gap)),
        None => "n/a".to_string(),
    }
}

/// Format a gap percentage with an explicit sign and one decimal.
pub fn format_gap_percent(gap_percent: f64) -> String {
    if !gap_percent.is_finite() {
        return "n/a".to_string();
    }
    format!("{}{:.1}%", sign(gap_percent), gap_percent.abs())
}

fn sign(v: f64) -> char {
    if v < 0.0 {
        '-'
    } else {
        '+'
    }
}

fn magnitude(metric: MetricType, abs: f64) -> Option<String> {
    if !abs.is_finite() {
        return None;
    }
    let s = if metric.is_monetary() {
        format!("{:.0}", abs.round())
    } else {
        match metric.kind() {
            MetricKind::Count | MetricKind::Sum => format!("{:.0}", abs.round()),
            MetricKind::Ratio => format!("{abs:.1}%"),
        }
    };
    Some(s)
}
