pub mod bucket;
pub mod collector;
pub mod config;
pub mod date_util;
pub mod dimensions;
pub mod error;
pub mod goals;
pub mod import;
pub mod metrics;
pub mod range;
pub mod report;
pub mod storage;

pub use bucket::{RoundSchedule, RoundWindow};
pub use config::EngineConfig;
pub use dimensions::{DimensionFilters, DimensionKind};
pub use error::{Error, Result};
pub use goals::{DimensionKey, GoalRow};
pub use import::{ImportReport, ImportStatus};
pub use metrics::{MetricType, PeriodSummary};
pub use range::DateRange;
pub use report::{Granularity, Report, ReportOptions, ReportRequest, ReportStatus};
pub use storage::Database;

// Re-export repository types needed by the binary crate, but not the module itself
pub use storage::repository::{DimensionEntry, StoredGoal, WarehouseStats};

use std::path::Path;

use chrono::{NaiveDate, Utc};
use serde::Serialize;

use storage::repository;

/// Warehouse summary shown by `status`.
#[derive(Debug, Clone, Serialize)]
pub struct WarehouseStatus {
    pub stats: WarehouseStats,
    /// Latest import per kind: `(kind, status, completed_at)`.
    pub last_imports: Vec<(String, String, Option<String>)>,
    pub config: EngineConfig,
}

/// Main entry point: goal-vs-actual reporting over the local warehouse.
pub struct GoalTracker {
    db: Database,
}

impl GoalTracker {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Access the database (for direct queries in the CLI).
    pub fn db(&self) -> &Database {
        &self.db
    }

    /// Typed engine settings from `app_config`.
    pub async fn engine_config(&self) -> Result<EngineConfig> {
        let pairs = self.config_list().await?;
        EngineConfig::from_pairs(&pairs)
    }

    /// Today's date at the configured UTC offset.
    pub async fn today(&self) -> Result<NaiveDate> {
        let config = self.engine_config().await?;
        Ok(Utc::now().with_timezone(&config.offset()).date_naive())
    }

    // ── Reports ────────────────────────────────────────────────────

    /// Run a report with "today" taken from the clock.
    pub async fn report(&self, request: &ReportRequest) -> Result<Report> {
        let today = self.today().await?;
        self.report_as_of(request, today).await
    }

    /// Run a report treating `today` as the last day that can have activity.
    pub async fn report_as_of(&self, request: &ReportRequest, today: NaiveDate) -> Result<Report> {
        let config = self.engine_config().await?;
        let options = ReportOptions::from_config(&config, today);
        report::run(&self.db, &self.db, &self.db, request, &options).await
    }

    /// The configured round schedule, or an error when none is set.
    pub async fn round_schedule(&self) -> Result<RoundSchedule> {
        self.engine_config().await?.rounds.ok_or_else(|| {
            Error::InvalidSchedule(format!(
                "no rounds configured. Run: pipegoals config set {} '<json>' or pass --rounds",
                config::KEY_ROUNDS
            ))
        })
    }

    // ── Import commands ────────────────────────────────────────────

    pub async fn import_events(&self, path: &Path) -> Result<ImportReport> {
        let json = std::fs::read_to_string(path)?;
        import::import_events(&self.db, &path.display().to_string(), &json).await
    }

    pub async fn import_goals(&self, path: &Path) -> Result<ImportReport> {
        let json = std::fs::read_to_string(path)?;
        import::import_goals(&self.db, &path.display().to_string(), &json).await
    }

    pub async fn import_dimensions(&self, path: &Path) -> Result<ImportReport> {
        let json = std::fs::read_to_string(path)?;
        import::import_dimensions(&self.db, &path.display().to_string(), &json).await
    }

    // ── Goal commands ──────────────────────────────────────────────

    pub async fn goals_list(&self, dashboard: Option<&str>) -> Result<Vec<StoredGoal>> {
        let dashboard = dashboard.map(|d| d.to_string());
        let goals = self
            .db
            .reader()
            .call(move |conn| repository::list_goals(conn, dashboard.as_deref()))
            .await?;
        Ok(goals)
    }

    /// Store one goal row, replacing a row with the same dashboard and key.
    pub async fn goal_set(&self, goal: GoalRow) -> Result<i64> {
        import::validate_goal(&goal).map_err(Error::Config)?;
        let id = self
            .db
            .writer()
            .call(move |conn| repository::upsert_goal(conn, &goal))
            .await?;
        Ok(id)
    }

    pub async fn goals_clear(&self, dashboard: &str) -> Result<usize> {
        if !goals::is_known_dashboard(dashboard) {
            return Err(Error::NotFound(format!("dashboard '{dashboard}'")));
        }
        let dashboard = dashboard.to_string();
        let removed = self
            .db
            .writer()
            .call(move |conn| repository::clear_goals(conn, &dashboard))
            .await?;
        Ok(removed)
    }

    // ── Dimension commands ─────────────────────────────────────────

    pub async fn dims_list(&self, kind: DimensionKind) -> Result<Vec<DimensionEntry>> {
        let entries = self
            .db
            .reader()
            .call(move |conn| repository::list_dimensions(conn, kind))
            .await?;
        Ok(entries)
    }

    pub async fn dim_add(&self, kind: DimensionKind, id: &str, name: &str) -> Result<()> {
        if id.trim().is_empty() {
            return Err(Error::InvalidFilter(format!("{kind} id cannot be empty")));
        }
        let (id, name) = (id.trim().to_string(), name.to_string());
        self.db
            .writer()
            .call(move |conn| repository::upsert_dimension(conn, kind, &id, &name))
            .await?;
        Ok(())
    }

    // ── Config commands ────────────────────────────────────────────

    pub async fn config_get(&self, key: &str) -> Result<Option<String>> {
        self.db
            .reader()
            .call({
                let key = key.to_string();
                move |conn| repository::get_config(conn, &key)
            })
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }

    /// Store a setting. Known keys are validated first.
    pub async fn config_set(&self, key: &str, value: &str) -> Result<()> {
        config::validate_entry(key, value)?;
        self.db
            .writer()
            .call({
                let key = key.to_string();
                let value = value.to_string();
                move |conn| repository::set_config(conn, &key, &value)
            })
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }

    pub async fn config_list(&self) -> Result<Vec<(String, String)>> {
        self.db
            .reader()
            .call(|conn| repository::list_config(conn))
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }

    // ── Status ─────────────────────────────────────────────────────

    pub async fn status(&self) -> Result<WarehouseStatus> {
        let (stats, last_imports) = self
            .db
            .reader()
            .call(|conn| {
                Ok::<_, rusqlite::Error>((
                    repository::warehouse_stats(conn)?,
                    repository::last_import_jobs(conn)?,
                ))
            })
            .await?;
        Ok(WarehouseStatus {
            stats,
            last_imports,
            config: self.engine_config().await?,
        })
    }
}
