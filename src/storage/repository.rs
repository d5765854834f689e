use chrono::{DateTime, Utc};
use rusqlite::types::{ToSql, Type};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::collector::{Event, EventType, TimeRange};
use crate::date_util::{format_timestamp, parse_timestamp};
use crate::dimensions::{DimensionFilters, DimensionKind, Dimensions};
use crate::goals::{DimensionKey, GoalRow};

/// One deal as stored in the warehouse. Yields a created event, and a won
/// event once `won_at` is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Opportunity {
    pub id: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub won_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub amount: f64,
    #[serde(flatten)]
    pub dimensions: Dimensions,
}

// ── Opportunities ──────────────────────────────────────────────────

pub fn upsert_opportunity(conn: &Connection, opp: &Opportunity) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT INTO fact_opportunities (
            opportunity_id, created_at, won_at, amount,
            funnel_id, unit_id, seller_id, origin_id, imported_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, datetime('now'))
        ON CONFLICT(opportunity_id) DO UPDATE SET
            created_at=excluded.created_at, won_at=excluded.won_at, amount=excluded.amount,
            funnel_id=excluded.funnel_id, unit_id=excluded.unit_id,
            seller_id=excluded.seller_id, origin_id=excluded.origin_id,
            imported_at=excluded.imported_at",
        params![
            opp.id,
            format_timestamp(opp.created_at),
            opp.won_at.map(format_timestamp),
            opp.amount,
            opp.dimensions.funnel_id,
            opp.dimensions.unit_id,
            opp.dimensions.seller_id,
            opp.dimensions.origin_id,
        ],
    )?;
    Ok(())
}

/// One page of events of `event_type` inside `range`, ordered by event time.
pub fn query_events(
    conn: &Connection,
    event_type: EventType,
    range: &TimeRange,
    filters: &DimensionFilters,
    offset: u64,
    limit: u32,
) -> Result<Vec<Event>, rusqlite::Error> {
    let ts_col = match event_type {
        EventType::Created => "created_at",
        EventType::Won => "won_at",
    };

    let mut params: Vec<Box<dyn ToSql>> = vec![
        Box::new(format_timestamp(range.start)),
        Box::new(format_timestamp(range.end)),
    ];
    let mut wheres = vec![format!("{ts_col} >= ?1"), format!("{ts_col} < ?2")];
    push_filter_clauses(&mut wheres, &mut params, filters, &DimensionKind::ALL);

    let limit_idx = params.len() + 1;
    params.push(Box::new(limit as i64));
    params.push(Box::new(offset as i64));

    let sql = format!(
        "SELECT opportunity_id, {ts_col}, amount, funnel_id, unit_id, seller_id, origin_id
         FROM fact_opportunities
         WHERE {}
         ORDER BY {ts_col}, opportunity_id
         LIMIT ?{limit_idx} OFFSET ?{}",
        wheres.join(" AND "),
        limit_idx + 1
    );

    let param_refs: Vec<&dyn ToSql> = params.iter().map(|p| p.as_ref()).collect();
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(param_refs.as_slice(), |row| {
        let id: String = row.get(0)?;
        let ts: String = row.get(1)?;
        // Rows are never skipped: paging offsets count raw rows.
        let occurred_at = parse_timestamp(&ts).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                1,
                Type::Text,
                format!("opportunity {id}: unparseable timestamp '{ts}'").into(),
            )
        })?;
        Ok(Event {
            id,
            event_type,
            occurred_at,
            amount: row.get(2)?,
            dimensions: Dimensions {
                funnel_id: row.get(3)?,
                unit_id: row.get(4)?,
                seller_id: row.get(5)?,
                origin_id: row.get(6)?,
            },
        })
    })?;
    rows.collect()
}

// ── Goals ──────────────────────────────────────────────────────────

/// A goal row with its storage id.
#[derive(Debug, Clone, Serialize)]
pub struct StoredGoal {
    pub goal_id: i64,
    #[serde(flatten)]
    pub row: GoalRow,
    pub updated_at: String,
}

/// Insert a goal row, replacing any row on the same dashboard with the same
/// dimension key.
pub fn upsert_goal(conn: &Connection, goal: &GoalRow) -> Result<i64, rusqlite::Error> {
    let key = &goal.key;
    conn.execute(
        "DELETE FROM fact_goals
         WHERE dashboard = ?1 AND funnel_id IS ?2 AND unit_id IS ?3 AND seller_id IS ?4",
        params![goal.dashboard, key.funnel_id, key.unit_id, key.seller_id],
    )?;
    conn.execute(
        "INSERT INTO fact_goals (dashboard, value, funnel_id, unit_id, seller_id, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, datetime('now'))",
        params![
            goal.dashboard,
            goal.value,
            key.funnel_id,
            key.unit_id,
            key.seller_id
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Every goal row on `dashboards` that matches the funnel, unit and seller filters.
pub fn query_goals(
    conn: &Connection,
    dashboards: &[String],
    filters: &DimensionFilters,
) -> Result<Vec<GoalRow>, rusqlite::Error> {
    if dashboards.is_empty() {
        return Ok(Vec::new());
    }

    let mut params: Vec<Box<dyn ToSql>> = Vec::new();
    let placeholders: Vec<String> = dashboards
        .iter()
        .map(|d| {
            params.push(Box::new(d.clone()));
            format!("?{}", params.len())
        })
        .collect();
    let mut wheres = vec![format!("dashboard IN ({})", placeholders.join(", "))];
    push_filter_clauses(
        &mut wheres,
        &mut params,
        filters,
        &[DimensionKind::Funnel, DimensionKind::Unit, DimensionKind::Seller],
    );

    let sql = format!(
        "SELECT dashboard, value, funnel_id, unit_id, seller_id
         FROM fact_goals WHERE {} ORDER BY goal_id",
        wheres.join(" AND ")
    );
    let param_refs: Vec<&dyn ToSql> = params.iter().map(|p| p.as_ref()).collect();
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(param_refs.as_slice(), row_to_goal)?;
    rows.collect()
}

pub fn list_goals(
    conn: &Connection,
    dashboard: Option<&str>,
) -> Result<Vec<StoredGoal>, rusqlite::Error> {
    let mut stmt = conn.prepare(
        "SELECT dashboard, value, funnel_id, unit_id, seller_id, goal_id, updated_at
         FROM fact_goals
         WHERE ?1 IS NULL OR dashboard = ?1
         ORDER BY dashboard, funnel_id, unit_id, seller_id",
    )?;
    let rows = stmt.query_map(params![dashboard], |row| {
        Ok(StoredGoal {
            row: row_to_goal(row)?,
            goal_id: row.get(5)?,
            updated_at: row.get(6)?,
        })
    })?;
    rows.collect()
}

/// Delete every row of a dashboard. Returns the number removed.
pub fn clear_goals(conn: &Connection, dashboard: &str) -> Result<usize, rusqlite::Error> {
    conn.execute(
        "DELETE FROM fact_goals WHERE dashboard = ?1",
        params![dashboard],
    )
}

fn row_to_goal(row: &rusqlite::Row<'_>) -> Result<GoalRow, rusqlite::Error> {
    Ok(GoalRow {
        dashboard: row.get(0)?,
        value: row.get(1)?,
        key: DimensionKey {
            funnel_id: row.get(2)?,
            unit_id: row.get(3)?,
            seller_id: row.get(4)?,
        },
    })
}

// ── Dimensions ─────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DimensionEntry {
    pub id: String,
    pub name: String,
}

fn dim_table(kind: DimensionKind) -> (&'static str, &'static str) {
    match kind {
        DimensionKind::Funnel => ("dim_funnels", "funnel_id"),
        DimensionKind::Unit => ("dim_units", "unit_id"),
        DimensionKind::Seller => ("dim_sellers", "seller_id"),
        DimensionKind::Origin => ("dim_origins", "origin_id"),
    }
}

pub fn upsert_dimension(
    conn: &Connection,
    kind: DimensionKind,
    id: &str,
    name: &str,
) -> Result<(), rusqlite::Error> {
    let (table, col) = dim_table(kind);
    conn.execute(
        &format!(
            "INSERT INTO {table} ({col}, name, cached_at) VALUES (?1, ?2, datetime('now'))
             ON CONFLICT({col}) DO UPDATE SET name=excluded.name, cached_at=excluded.cached_at"
        ),
        params![id, name],
    )?;
    Ok(())
}

pub fn list_dimensions(
    conn: &Connection,
    kind: DimensionKind,
) -> Result<Vec<DimensionEntry>, rusqlite::Error> {
    let (table, col) = dim_table(kind);
    let mut stmt = conn.prepare(&format!("SELECT {col}, name FROM {table} ORDER BY name, {col}"))?;
    let rows = stmt.query_map([], |row| {
        Ok(DimensionEntry {
            id: row.get(0)?,
            name: row.get(1)?,
        })
    })?;
    rows.collect()
}

pub fn dimension_exists(
    conn: &Connection,
    kind: DimensionKind,
    id: &str,
) -> Result<bool, rusqlite::Error> {
    let (table, col) = dim_table(kind);
    let found: Option<i64> = conn
        .query_row(
            &format!("SELECT 1 FROM {table} WHERE {col} = ?1"),
            params![id],
            |row| row.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

// ── Config ─────────────────────────────────────────────────────────

pub fn get_config(conn: &Connection, key: &str) -> Result<Option<String>, rusqlite::Error> {
    conn.query_row(
        "SELECT value FROM app_config WHERE key = ?1",
        params![key],
        |row| row.get(0),
    )
    .optional()
}

pub fn set_config(conn: &Connection, key: &str, value: &str) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT OR REPLACE INTO app_config (key, value, updated_at)
         VALUES (?1, ?2, datetime('now'))",
        params![key, value],
    )?;
    Ok(())
}

pub fn list_config(conn: &Connection) -> Result<Vec<(String, String)>, rusqlite::Error> {
    let mut stmt = conn.prepare("SELECT key, value FROM app_config ORDER BY key")?;
    let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
    rows.collect()
}

// ── Import Jobs ────────────────────────────────────────────────────

pub fn insert_import_job(conn: &Connection, kind: &str, source: &str) -> Result<i64, rusqlite::Error> {
    conn.execute(
        "INSERT INTO import_jobs (kind, source, status, started_at)
         VALUES (?1, ?2, 'running', datetime('now'))",
        params![kind, source],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn update_import_job(
    conn: &Connection,
    job_id: i64,
    status: &str,
    items_imported: u64,
    items_failed: u64,
    error_message: Option<&str>,
) -> Result<(), rusqlite::Error> {
    conn.execute(
        "UPDATE import_jobs SET
            status = ?2, completed_at = datetime('now'),
            items_imported = ?3, items_failed = ?4, error_message = ?5
         WHERE job_id = ?1",
        params![
            job_id,
            status,
            items_imported as i64,
            items_failed as i64,
            error_message
        ],
    )?;
    Ok(())
}

/// Most recent import job per kind: `(kind, status, completed_at)`.
pub fn last_import_jobs(
    conn: &Connection,
) -> Result<Vec<(String, String, Option<String>)>, rusqlite::Error> {
    let mut stmt = conn.prepare(
        "SELECT kind, status, completed_at FROM import_jobs
         WHERE job_id IN (SELECT MAX(job_id) FROM import_jobs GROUP BY kind)
         ORDER BY kind",
    )?;
    let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?;
    rows.collect()
}

// ── Stats ──────────────────────────────────────────────────────────

/// Row counts shown by `status`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct WarehouseStats {
    pub opportunities: i64,
    pub won: i64,
    pub goals: i64,
    pub funnels: i64,
    pub units: i64,
    pub sellers: i64,
    pub origins: i64,
}

pub fn warehouse_stats(conn: &Connection) -> Result<WarehouseStats, rusqlite::Error> {
    let count = |sql: &str| conn.query_row(sql, [], |row| row.get::<_, i64>(0));
    Ok(WarehouseStats {
        opportunities: count("SELECT COUNT(*) FROM fact_opportunities")?,
        won: count("SELECT COUNT(*) FROM fact_opportunities WHERE won_at IS NOT NULL")?,
        goals: count("SELECT COUNT(*) FROM fact_goals")?,
        funnels: count("SELECT COUNT(*) FROM dim_funnels")?,
        units: count("SELECT COUNT(*) FROM dim_units")?,
        sellers: count("SELECT COUNT(*) FROM dim_sellers")?,
        origins: count("SELECT COUNT(*) FROM dim_origins")?,
    })
}

// ── Helpers ────────────────────────────────────────────────────────

/// Append `col = ?n` for each active filter among `kinds`.
fn push_filter_clauses(
    wheres: &mut Vec<String>,
    params: &mut Vec<Box<dyn ToSql>>,
    filters: &DimensionFilters,
    kinds: &[DimensionKind],
) {
    for kind in kinds {
        if let Some(id) = filters.get(*kind) {
            params.push(Box::new(id.to_string()));
            wheres.push(format!("{} = ?{}", dim_table(*kind).1, params.len()));
        }
    }
}
