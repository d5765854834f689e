//! Retrieval of complete record sets from a paginating source.
//!
//! Callers describe what they want with a [`SourceQuery`]; [`collect`] walks
//! the pages until the source signals the end, and hands back everything it
//! managed to fetch. A failed page ends the walk early but is not an error:
//! the partial set is returned with the failure recorded in
//! [`Collected::truncated`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::dimensions::{DimensionFilters, Dimensions};
use crate::error::{Error, Result};

/// Page size used when the configuration does not override it.
pub const DEFAULT_PAGE_SIZE: u32 = 1000;

/// Which timestamp of an opportunity an event is keyed by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    /// Opportunity creation (a lead).
    Created,
    /// Opportunity reaching the won state (a sale).
    Won,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Created => "created",
            EventType::Won => "won",
        }
    }
}

/// One pipeline occurrence relevant to a metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub event_type: EventType,
    /// Creation time for `Created` events, win time for `Won` events.
    pub occurred_at: DateTime<Utc>,
    pub amount: f64,
    pub dimensions: Dimensions,
}

/// A half-open UTC interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeRange {
    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        ts >= self.start && ts < self.end
    }
}

/// One page returned by a [`RecordSource`].
#[derive(Debug, Clone, Default)]
pub struct Page {
    pub records: Vec<Event>,
    /// Set when the source knows no records exist past this page.
    pub is_last_page: bool,
}

/// A remote store that returns filtered events one range-bounded page at a time.
#[allow(async_fn_in_trait)]
pub trait RecordSource {
    async fn query(
        &self,
        event_type: EventType,
        range: &TimeRange,
        filters: &DimensionFilters,
        offset: u64,
        page_size: u32,
    ) -> Result<Page>;
}

/// Everything needed to walk one event stream.
#[derive(Debug, Clone)]
pub struct SourceQuery {
    pub event_type: EventType,
    pub range: TimeRange,
    pub filters: DimensionFilters,
    pub page_size: u32,
}

/// Outcome of a collection run.
#[derive(Debug, Clone, Default)]
pub struct Collected {
    pub records: Vec<Event>,
    /// Number of pages that came back successfully.
    pub pages: u32,
    /// Error message of the page request that ended the walk early, if any.
    pub truncated: Option<String>,
}

impl Collected {
    pub fn is_complete(&self) -> bool {
        self.truncated.is_none()
    }
}

/// Fetch every record matching `query`, in source order.
///
/// Returns `Err` only for a query that can never succeed (a zero page size);
/// transport failures truncate the result instead.
pub async fn collect<S: RecordSource>(source: &S, query: &SourceQuery) -> Result<Collected> {
    if query.page_size == 0 {
        return Err(Error::InvalidPageSize(query.page_size));
    }

    let mut out = Collected::default();
    let mut offset: u64 = 0;

    loop {
        let page = match source
            .query(
                query.event_type,
                &query.range,
                &query.filters,
                offset,
                query.page_size,
            )
            .await
        {
            Ok(page) => page,
            Err(e) => {
                out.truncated = Some(e.to_string());
                break;
            }
        };

        let fetched = page.records.len();
        out.pages += 1;
        out.records.extend(page.records);
        log::debug!(
            "{} events: page {} at offset {offset} returned {fetched} records",
            query.event_type.as_str(),
            out.pages
        );

        if fetched < query.page_size as usize || page.is_last_page {
            break;
        }
        offset += query.page_size as u64;
    }

    Ok(out)
}
