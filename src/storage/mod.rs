pub mod repository;

use rusqlite_migration::{Migrations, M};

use crate::collector::{EventType, Page, RecordSource, TimeRange};
use crate::dimensions::{DimensionFilters, DimensionKind};
use crate::error::{Error, Result};
use crate::goals::{GoalRow, GoalSource};
use crate::report::DimensionCatalog;

/// Database wraps two `tokio_rusqlite::Connection` instances (writer + reader)
/// using WAL mode for concurrent access. The writer serializes writes via
/// `tokio_rusqlite`'s internal channel; the reader can proceed without blocking.
#[derive(Clone)]
pub struct Database {
    writer: tokio_rusqlite::Connection,
    reader: tokio_rusqlite::Connection,
}

impl Database {
    /// Open the database at the default path (`~/.pipegoals/pipegoals.db`).
    pub async fn open() -> Result<Self> {
        let dir = dirs::home_dir()
            .ok_or_else(|| Error::Config("cannot determine home directory".into()))?
            .join(".pipegoals");
        std::fs::create_dir_all(&dir)?;
        Self::open_at(dir.join("pipegoals.db")).await
    }

    /// Open the database at the given path.
    pub async fn open_at(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let writer = tokio_rusqlite::Connection::open(&path).await?;
        Self::init_writer(&writer).await?;

        let reader = tokio_rusqlite::Connection::open(&path).await?;
        Self::init_reader(&reader).await?;

        log::debug!("Opened warehouse at {}", path.display());
        Ok(Self { writer, reader })
    }

    /// Open an in-memory database (for testing).
    pub async fn open_memory() -> Result<Self> {
        let writer = tokio_rusqlite::Connection::open_in_memory().await?;
        Self::init_writer(&writer).await?;

        // In-memory DBs are per-connection, so reader and writer share one.
        Ok(Self {
            reader: writer.clone(),
            writer,
        })
    }

    async fn init_writer(conn: &tokio_rusqlite::Connection) -> Result<()> {
        conn.call(|conn| {
            conn.execute_batch(
                "PRAGMA journal_mode=WAL;\
                 PRAGMA foreign_keys=ON;\
                 PRAGMA busy_timeout=5000;",
            )
            .map_err(|e| e.to_string())?;
            let migrations = Migrations::new(vec![M::up(include_str!("migrations/001_initial.sql"))]);
            migrations.to_latest(conn).map_err(|e| e.to_string())?;
            Ok::<(), String>(())
        })
        .await
        .map_err(|e| Error::Migration(e.to_string()))
    }

    async fn init_reader(conn: &tokio_rusqlite::Connection) -> Result<()> {
        conn.call(|conn| {
            conn.execute_batch(
                "PRAGMA journal_mode=WAL;\
                 PRAGMA foreign_keys=ON;\
                 PRAGMA busy_timeout=5000;",
            )?;
            Ok::<(), rusqlite::Error>(())
        })
        .await?;
        Ok(())
    }

    /// Get a reference to the writer connection.
    pub fn writer(&self) -> &tokio_rusqlite::Connection {
        &self.writer
    }

    /// Get a reference to the reader connection.
    pub fn reader(&self) -> &tokio_rusqlite::Connection {
        &self.reader
    }
}

// The warehouse serves as record source, goal source and dimension catalog.

impl RecordSource for Database {
    async fn query(
        &self,
        event_type: EventType,
        range: &TimeRange,
        filters: &DimensionFilters,
        offset: u64,
        page_size: u32,
    ) -> Result<Page> {
        let range = *range;
        let filters = filters.clone();
        let records = self
            .reader
            .call(move |conn| {
                repository::query_events(conn, event_type, &range, &filters, offset, page_size)
            })
            .await?;
        let is_last_page = records.len() < page_size as usize;
        Ok(Page {
            records,
            is_last_page,
        })
    }
}

impl GoalSource for Database {
    async fn query_goals(
        &self,
        dashboards: &[&str],
        filters: &DimensionFilters,
    ) -> Result<Vec<GoalRow>> {
        let dashboards: Vec<String> = dashboards.iter().map(|d| d.to_string()).collect();
        let filters = filters.clone();
        let rows = self
            .reader
            .call(move |conn| repository::query_goals(conn, &dashboards, &filters))
            .await?;
        Ok(rows)
    }
}

impl DimensionCatalog for Database {
    async fn dimension_exists(&self, kind: DimensionKind, id: &str) -> Result<bool> {
        let id = id.to_string();
        let exists = self
            .reader
            .call(move |conn| repository::dimension_exists(conn, kind, &id))
            .await?;
        Ok(exists)
    }
}
