use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::date_util::end_of_day;
use crate::error::{Error, Result};

/// A named intraday window. An `end` of `00:00` means midnight at the end of the day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundWindow {
    pub name: String,
    #[serde(serialize_with = "ser_time", deserialize_with = "de_time")]
    pub start: NaiveTime,
    #[serde(serialize_with = "ser_time", deserialize_with = "de_time")]
    pub end: NaiveTime,
}

impl RoundWindow {
    pub fn new(name: impl Into<String>, start: NaiveTime, end: NaiveTime) -> Self {
        Self {
            name: name.into(),
            start,
            end,
        }
    }

    fn ends_at_midnight(&self) -> bool {
        self.end == NaiveTime::MIN
    }

    /// Concrete `[start, end)` on `date`.
    pub fn bounds_on(&self, date: NaiveDate) -> (NaiveDateTime, NaiveDateTime) {
        let end = if self.ends_at_midnight() {
            end_of_day(date)
        } else {
            date.and_time(self.end)
        };
        (date.and_time(self.start), end)
    }
}

/// An externally supplied, validated list of contiguous rounds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct RoundSchedule {
    windows: Vec<RoundWindow>,
}

impl RoundSchedule {
    /// Validate and wrap a list of windows.
    ///
    /// Windows must be non-empty, each must end after it starts, and each must
    /// start exactly where the previous one ended.
    pub fn new(windows: Vec<RoundWindow>) -> Result<Self> {
        if windows.is_empty() {
            return Err(Error::InvalidSchedule("no rounds configured".into()));
        }
        for (i, w) in windows.iter().enumerate() {
            if w.name.trim().is_empty() {
                return Err(Error::InvalidSchedule(format!("round {} has no name", i + 1)));
            }
            if !w.ends_at_midnight() && w.end <= w.start {
                return Err(Error::InvalidSchedule(format!(
                    "round '{}' ends at {} before it starts at {}",
                    w.name, w.end, w.start
                )));
            }
            if let Some(prev) = i.checked_sub(1).map(|p| &windows[p]) {
                if prev.ends_at_midnight() || prev.end != w.start {
                    return Err(Error::InvalidSchedule(format!(
                        "round '{}' does not start where '{}' ends",
                        w.name, prev.name
                    )));
                }
            }
        }
        Ok(Self { windows })
    }

    /// Parse a JSON array of `{"name", "start", "end"}` objects (`HH:MM` times).
    pub fn from_json(s: &str) -> Result<Self> {
        let windows: Vec<RoundWindow> = serde_json::from_str(s)
            .map_err(|e| Error::InvalidSchedule(format!("malformed schedule: {e}")))?;
        Self::new(windows)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.windows)?)
    }

    pub fn windows(&self) -> &[RoundWindow] {
        &self.windows
    }

    /// Number of rounds; the divisor for splitting daily volume goals.
    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }
}

fn ser_time<S: Serializer>(t: &NaiveTime, s: S) -> std::result::Result<S::Ok, S::Error> {
    s.serialize_str(&t.format("%H:%M").to_string())
}

fn de_time<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<NaiveTime, D::Error> {
    let raw = String::deserialize(d)?;
    NaiveTime::parse_from_str(&raw, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(&raw, "%H:%M:%S"))
        .map_err(|_| serde::de::Error::custom(format!("invalid time of day: {raw}")))
}
