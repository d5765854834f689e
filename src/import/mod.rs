//! Loads opportunities, goal rows and dimension entries from JSON arrays into
//! the warehouse. A malformed item is counted and skipped; it never aborts
//! the rest of the file.

use rusqlite::Connection;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::dimensions::DimensionKind;
use crate::error::{Error, Result};
use crate::goals::{is_known_dashboard, GoalRow};
use crate::storage::repository::{self, Opportunity};
use crate::storage::Database;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportKind {
    Events,
    Goals,
    Dimensions,
}

impl ImportKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImportKind::Events => "events",
            ImportKind::Goals => "goals",
            ImportKind::Dimensions => "dimensions",
        }
    }
}

impl std::fmt::Display for ImportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ImportStatus {
    Success,
    PartialFailure,
    Failed,
}

impl ImportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImportStatus::Success => "Success",
            ImportStatus::PartialFailure => "PartialFailure",
            ImportStatus::Failed => "Failed",
        }
    }
}

/// Report returned after an import completes.
#[derive(Debug, Clone, Serialize)]
pub struct ImportReport {
    pub kind: ImportKind,
    pub source: String,
    pub status: ImportStatus,
    pub items_imported: u64,
    pub items_failed: u64,
    pub error: Option<String>,
    /// Why individual items were rejected.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub rejected: Vec<String>,
}

impl ImportReport {
    /// Create an ImportReport with the status derived from counts.
    pub fn from_counts(
        kind: ImportKind,
        source: String,
        items_imported: u64,
        items_failed: u64,
        rejected: Vec<String>,
    ) -> Self {
        let status = if items_failed == 0 {
            ImportStatus::Success
        } else if items_imported > 0 {
            ImportStatus::PartialFailure
        } else {
            ImportStatus::Failed
        };
        let error = if items_failed > 0 {
            Some(format!("{items_failed} items failed"))
        } else {
            None
        };
        Self {
            kind,
            source,
            status,
            items_imported,
            items_failed,
            error,
            rejected,
        }
    }
}

/// One entry of a dimension file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimensionRecord {
    pub kind: DimensionKind,
    pub id: String,
    pub name: String,
}

/// Import opportunities. Each must have `id` and `created_at`; `won_at`, when
/// present, may not precede `created_at`.
pub async fn import_events(db: &Database, source: &str, json: &str) -> Result<ImportReport> {
    let (items, rejected) = parse_items::<Opportunity>(ImportKind::Events, json, |opp| {
        if opp.id.trim().is_empty() {
            return Err("missing id".into());
        }
        if !opp.amount.is_finite() || opp.amount < 0.0 {
            return Err(format!("{}: amount must be a non-negative number", opp.id));
        }
        if opp.won_at.is_some_and(|won| won < opp.created_at) {
            return Err(format!("{}: won_at precedes created_at", opp.id));
        }
        Ok(())
    })?;
    store(db, ImportKind::Events, source, items, rejected, repository::upsert_opportunity).await
}

/// Import goal rows. Rows replace existing rows with the same dashboard and
/// dimension key.
pub async fn import_goals(db: &Database, source: &str, json: &str) -> Result<ImportReport> {
    let (items, rejected) = parse_items::<GoalRow>(ImportKind::Goals, json, validate_goal)?;
    store(db, ImportKind::Goals, source, items, rejected, |conn, goal| {
        repository::upsert_goal(conn, goal).map(|_| ())
    })
    .await
}

pub async fn import_dimensions(db: &Database, source: &str, json: &str) -> Result<ImportReport> {
    let (items, rejected) =
        parse_items::<DimensionRecord>(ImportKind::Dimensions, json, |rec| {
            if rec.id.trim().is_empty() || rec.name.trim().is_empty() {
                return Err(format!("{} entry needs both id and name", rec.kind));
            }
            Ok(())
        })?;
    store(db, ImportKind::Dimensions, source, items, rejected, |conn, rec| {
        repository::upsert_dimension(conn, rec.kind, &rec.id, &rec.name)
    })
    .await
}

/// Check a goal row before it is stored.
pub fn validate_goal(goal: &GoalRow) -> std::result::Result<(), String> {
    if !is_known_dashboard(&goal.dashboard) {
        return Err(format!("unknown dashboard '{}'", goal.dashboard));
    }
    if !goal.value.is_finite() || goal.value < 0.0 {
        return Err(format!(
            "{}: value must be a non-negative number",
            goal.dashboard
        ));
    }
    Ok(())
}

/// Split a JSON array into valid items and rejection messages. Anything other
/// than an array is an error for the whole file.
fn parse_items<T: DeserializeOwned>(
    kind: ImportKind,
    json: &str,
    validate: impl Fn(&T) -> std::result::Result<(), String>,
) -> Result<(Vec<T>, Vec<String>)> {
    let values: Vec<serde_json::Value> =
        serde_json::from_str(json).map_err(|e| Error::Import {
            kind: kind.to_string(),
            message: format!("expected a JSON array: {e}"),
        })?;

    let mut items = Vec::with_capacity(values.len());
    let mut rejected = Vec::new();
    for (i, value) in values.into_iter().enumerate() {
        let parsed = serde_json::from_value::<T>(value)
            .map_err(|e| e.to_string())
            .and_then(|item| validate(&item).map(|_| item));
        match parsed {
            Ok(item) => items.push(item),
            Err(reason) => {
                log::warn!("Skipping {kind} item {i}: {reason}");
                rejected.push(format!("item {i}: {reason}"));
            }
        }
    }
    Ok((items, rejected))
}

/// Write `items` in one transaction and record the job.
async fn store<T, F>(
    db: &Database,
    kind: ImportKind,
    source: &str,
    items: Vec<T>,
    mut rejected: Vec<String>,
    upsert: F,
) -> Result<ImportReport>
where
    T: Send + 'static,
    F: Fn(&Connection, &T) -> std::result::Result<(), rusqlite::Error> + Send + 'static,
{
    let source = source.to_string();
    let total = items.len() + rejected.len();
    log::info!("Importing {total} {kind} from {source}");

    let (job_id, imported, write_failures) = db
        .writer()
        .call({
            let source = source.clone();
            move |conn| {
                let job_id = repository::insert_import_job(conn, kind.as_str(), &source)?;
                let tx = conn.transaction()?;
                let mut imported = 0u64;
                let mut failures = Vec::new();
                for item in &items {
                    match upsert(&tx, item) {
                        Ok(()) => imported += 1,
                        Err(e) => failures.push(e.to_string()),
                    }
                }
                tx.commit()?;
                Ok::<_, rusqlite::Error>((job_id, imported, failures))
            }
        })
        .await?;

    for failure in &write_failures {
        log::warn!("Failed to store {kind} item: {failure}");
    }
    rejected.extend(write_failures);

    let report = ImportReport::from_counts(kind, source, imported, rejected.len() as u64, rejected);

    db.writer()
        .call({
            let status = report.status.as_str();
            let (ok, failed) = (report.items_imported, report.items_failed);
            let error = report.error.clone();
            move |conn| repository::update_import_job(conn, job_id, status, ok, failed, error.as_deref())
        })
        .await?;

    log::info!(
        "Imported {} {kind} ({} failed)",
        report.items_imported,
        report.items_failed
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dimensions::DimensionFilters;

    #[test]
    fn test_report_status_from_counts() {
        let ok = ImportReport::from_counts(ImportKind::Goals, "g.json".into(), 3, 0, vec![]);
        assert_eq!(ok.status, ImportStatus::Success);
        assert!(ok.error.is_none());

        let partial =
            ImportReport::from_counts(ImportKind::Goals, "g.json".into(), 3, 1, vec!["x".into()]);
        assert_eq!(partial.status, ImportStatus::PartialFailure);
        assert_eq!(partial.error.as_deref(), Some("1 items failed"));

        let failed = ImportReport::from_counts(ImportKind::Goals, "g.json".into(), 0, 2, vec![]);
        assert_eq!(failed.status, ImportStatus::Failed);
    }

    #[tokio::test]
    async fn test_import_events_skips_bad_items() {
        let db = Database::open_memory().await.unwrap();
        let json = r#"[
            {"id": "o1", "created_at": "2025-06-02T09:00:00-03:00", "amount": 0, "funnel_id": "f1"},
            {"id": "o2", "created_at": "2025-06-02T10:00:00Z", "won_at": "2025-06-03T10:00:00Z", "amount": 2500.5},
            {"id": "o3", "created_at": "2025-06-04T10:00:00Z", "won_at": "2025-06-01T10:00:00Z"},
            {"id": "o4"}
        ]"#;

        let report = import_events(&db, "deals.json", json).await.unwrap();

        assert_eq!(report.items_imported, 2);
        assert_eq!(report.items_failed, 2);
        assert_eq!(report.status, ImportStatus::PartialFailure);
        assert!(report.rejected[0].contains("won_at precedes created_at"));

        let stats = db
            .reader()
            .call(|conn| repository::warehouse_stats(conn))
            .await
            .unwrap();
        assert_eq!(stats.opportunities, 2);
        assert_eq!(stats.won, 1);
    }

    #[tokio::test]
    async fn test_import_goals_validates_dashboard() {
        let db = Database::open_memory().await.unwrap();
        let json = r#"[
            {"dashboard": "leads_weekday", "value": 40, "funnel_id": "f1"},
            {"dashboard": "leads_weekday", "value": 20, "funnel_id": "f2", "seller_id": "s1"},
            {"dashboard": "leads_sunday", "value": 5},
            {"dashboard": "sales_weekday", "value": -1}
        ]"#;

        let report = import_goals(&db, "goals.json", json).await.unwrap();
        assert_eq!(report.items_imported, 2);
        assert_eq!(report.items_failed, 2);

        let rows = db
            .reader()
            .call(|conn| {
                repository::query_goals(
                    conn,
                    &["leads_weekday".to_string()],
                    &DimensionFilters::default(),
                )
            })
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].key.seller_id.as_deref(), Some("s1"));
    }

    #[tokio::test]
    async fn test_import_dimensions() {
        let db = Database::open_memory().await.unwrap();
        let json = r#"[
            {"kind": "funnel", "id": "f1", "name": "Inbound"},
            {"kind": "seller", "id": "s1", "name": "Ana"},
            {"kind": "region", "id": "r1", "name": "South"},
            {"kind": "unit", "id": "u1", "name": ""}
        ]"#;

        let report = import_dimensions(&db, "dims.json", json).await.unwrap();
        assert_eq!(report.items_imported, 2);
        assert_eq!(report.items_failed, 2);

        let jobs = db
            .reader()
            .call(|conn| repository::last_import_jobs(conn))
            .await
            .unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].0, "dimensions");
        assert_eq!(jobs[0].1, "PartialFailure");
        assert!(jobs[0].2.is_some());
    }

    #[tokio::test]
    async fn test_import_rejects_non_array() {
        let db = Database::open_memory().await.unwrap();
        let err = import_goals(&db, "goals.json", r#"{"dashboard": "leads_weekday"}"#)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Import { .. }));
    }
}
