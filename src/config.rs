use chrono::{FixedOffset, Offset, Utc};
use serde::Serialize;

use crate::bucket::RoundSchedule;
use crate::collector::DEFAULT_PAGE_SIZE;
use crate::date_util::{local_offset_minutes, offset_from_minutes};
use crate::error::{Error, Result};
use crate::goals::DefaultGoals;
use crate::metrics::MetricType;

pub const KEY_PAGE_SIZE: &str = "page_size";
/// Offset used to map every timestamp to a local day. It applies to all dates
/// alike; historical dates are not shifted for daylight saving.
pub const KEY_UTC_OFFSET: &str = "utc_offset_minutes";
pub const KEY_ROUNDS: &str = "rounds";
pub const DEFAULT_GOAL_PREFIX: &str = "default_goal.";

/// Engine settings, loaded from the `app_config` key/value table.
#[derive(Debug, Clone, Serialize)]
pub struct EngineConfig {
    pub page_size: u32,
    pub utc_offset_minutes: i32,
    pub rounds: Option<RoundSchedule>,
    pub defaults: DefaultGoals,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            utc_offset_minutes: local_offset_minutes(),
            rounds: None,
            defaults: DefaultGoals::default(),
        }
    }
}

impl EngineConfig {
    /// Build from stored pairs; unknown keys are ignored, malformed known
    /// keys are an error.
    pub fn from_pairs(pairs: &[(String, String)]) -> Result<Self> {
        let mut config = EngineConfig::default();
        for (key, value) in pairs {
            config.apply(key, value)?;
        }
        Ok(config)
    }

    fn apply(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            KEY_PAGE_SIZE => self.page_size = parse_page_size(value)?,
            KEY_UTC_OFFSET => self.utc_offset_minutes = parse_offset(value)?,
            KEY_ROUNDS => self.rounds = Some(RoundSchedule::from_json(value)?),
            _ => {
                if let Some(metric) = key.strip_prefix(DEFAULT_GOAL_PREFIX) {
                    let metric = MetricType::parse(metric)?;
                    self.defaults.set(metric, parse_goal(key, value)?);
                } else {
                    log::debug!("Ignoring unknown config key: {key}");
                }
            }
        }
        Ok(())
    }

    pub fn offset(&self) -> FixedOffset {
        offset_from_minutes(self.utc_offset_minutes).unwrap_or_else(|| Utc.fix())
    }
}

/// Check a value before it is stored, so `config set` cannot poison later loads.
pub fn validate_entry(key: &str, value: &str) -> Result<()> {
    EngineConfig::default().apply(key, value)
}

fn parse_page_size(value: &str) -> Result<u32> {
    match value.trim().parse::<u32>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(Error::Config(format!(
            "{KEY_PAGE_SIZE} must be a positive integer, got '{value}'"
        ))),
    }
}

fn parse_offset(value: &str) -> Result<i32> {
    let minutes: i32 = value.trim().parse().map_err(|_| {
        Error::Config(format!("{KEY_UTC_OFFSET} must be an integer, got '{value}'"))
    })?;
    offset_from_minutes(minutes)
        .map(|_| minutes)
        .ok_or_else(|| Error::Config(format!("{KEY_UTC_OFFSET} out of range: {minutes}")))
}

fn parse_goal(key: &str, value: &str) -> Result<f64> {
    match value.trim().parse::<f64>() {
        Ok(v) if v.is_finite() && v >= 0.0 => Ok(v),
        _ => Err(Error::Config(format!(
            "{key} must be a non-negative number, got '{value}'"
        ))),
    }
}
