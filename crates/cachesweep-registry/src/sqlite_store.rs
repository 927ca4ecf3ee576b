//! SQLite-backed repository registry and task queue.
//!
//! Timestamps are stored as INTEGER unix seconds so the database stays
//! readable by the analyzer, which shares these tables.

use cachesweep_core::record::STATUS_ACTIVE;
use cachesweep_core::{QueueItem, RepositoryRecord, SweepResult};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;
use std::path::Path;
use time::OffsetDateTime;

const SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS repositories (
    id TEXT PRIMARY KEY,
    path TEXT NOT NULL UNIQUE,
    name TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'active',
    auto_scan_enabled INTEGER NOT NULL DEFAULT 0,
    scan_interval_minutes INTEGER NOT NULL DEFAULT 60,
    last_scan_check INTEGER,
    last_analyzed INTEGER,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_repositories_name ON repositories(name);

CREATE TABLE IF NOT EXISTS queue (
    id TEXT PRIMARY KEY,
    title TEXT NOT NULL,
    description TEXT,
    priority INTEGER NOT NULL DEFAULT 3,
    stage TEXT NOT NULL DEFAULT 'inbox',
    repo_path TEXT,
    file_path TEXT,
    created_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_queue_order ON queue(priority, created_at);
";

const REPO_COLUMNS: &str = "id, path, name, status, auto_scan_enabled, scan_interval_minutes,
     last_scan_check, last_analyzed, created_at, updated_at";

/// Local-filesystem paths only (see `record::is_local_path`).
const LOCAL_FILTER: &str = "(path LIKE '/%' OR path LIKE '~/%') AND path NOT LIKE '%://%'";

/// Result of `add_repo`.
#[derive(Debug, Clone, PartialEq)]
pub enum AddOutcome {
    Added(RepositoryRecord),
    AlreadyExists,
}

/// Result of a by-name mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    Updated,
    NotFound,
}

impl UpdateOutcome {
    fn from_rows(rows: usize) -> Self {
        if rows > 0 {
            UpdateOutcome::Updated
        } else {
            UpdateOutcome::NotFound
        }
    }
}

/// Counts over local repositories.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RegistryStats {
    pub total: u64,
    pub active: u64,
    pub scanning: u64,
}

/// SQLite-backed registry.
pub struct RegistryStore {
    conn: Connection,
}

impl RegistryStore {
    /// Open or create the database with full schema.
    pub fn open_or_create(db_path: &Path) -> SweepResult<Self> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(db_path)?;
        let store = Self { conn };
        store.apply_pragmas()?;
        store.conn.execute_batch(SCHEMA_SQL)?;
        Ok(store)
    }

    fn apply_pragmas(&self) -> SweepResult<()> {
        self.conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA busy_timeout = 5000;",
        )?;
        Ok(())
    }

    // ── Repositories ────────────────────────────────────────────────

    /// Register `path` under `name`. Duplicate paths are rejected.
    pub fn add_repo(&self, path: &str, name: &str, now: OffsetDateTime) -> SweepResult<AddOutcome> {
        let tx = self.conn.unchecked_transaction()?;
        let exists: bool = tx.query_row(
            "SELECT EXISTS(SELECT 1 FROM repositories WHERE path = ?1)",
            params![path],
            |row| row.get(0),
        )?;
        if exists {
            return Ok(AddOutcome::AlreadyExists);
        }

        let record = RepositoryRecord::new(
            ulid::Ulid::new().to_string(),
            path.to_string(),
            name.to_string(),
            now,
        );
        tx.execute(
            "INSERT INTO repositories
             (id, path, name, status, auto_scan_enabled, scan_interval_minutes, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                record.id,
                record.path,
                record.name,
                record.status,
                record.auto_scan_enabled,
                record.scan_interval_minutes,
                record.created_at.unix_timestamp(),
                record.updated_at.unix_timestamp(),
            ],
        )?;
        tx.commit()?;
        tracing::info!(name, path, "repository added");
        Ok(AddOutcome::Added(record))
    }

    pub fn enable_scan(
        &self,
        name: &str,
        interval_minutes: i64,
        now: OffsetDateTime,
    ) -> SweepResult<UpdateOutcome> {
        let rows = self.conn.execute(
            "UPDATE repositories
             SET auto_scan_enabled = 1, scan_interval_minutes = ?1, updated_at = ?2
             WHERE name = ?3",
            params![interval_minutes, now.unix_timestamp(), name],
        )?;
        Ok(UpdateOutcome::from_rows(rows))
    }

    pub fn disable_scan(&self, name: &str, now: OffsetDateTime) -> SweepResult<UpdateOutcome> {
        let rows = self.conn.execute(
            "UPDATE repositories SET auto_scan_enabled = 0, updated_at = ?1 WHERE name = ?2",
            params![now.unix_timestamp(), name],
        )?;
        Ok(UpdateOutcome::from_rows(rows))
    }

    /// Clear `last_scan_check` so the repository is due on the next pass.
    pub fn force_scan(&self, name: &str, now: OffsetDateTime) -> SweepResult<UpdateOutcome> {
        let rows = self.conn.execute(
            "UPDATE repositories SET last_scan_check = NULL, updated_at = ?1 WHERE name = ?2",
            params![now.unix_timestamp(), name],
        )?;
        Ok(UpdateOutcome::from_rows(rows))
    }

    /// Local repositories ordered by name.
    pub fn list_repos(&self, active_only: bool) -> SweepResult<Vec<RepositoryRecord>> {
        let mut sql = format!("SELECT {REPO_COLUMNS} FROM repositories WHERE {LOCAL_FILTER}");
        if active_only {
            sql.push_str(" AND status = ?1");
        }
        sql.push_str(" ORDER BY name");

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = if active_only {
            stmt.query_map(params![STATUS_ACTIVE], row_to_record)?
                .collect::<Result<Vec<_>, _>>()?
        } else {
            stmt.query_map([], row_to_record)?
                .collect::<Result<Vec<_>, _>>()?
        };
        Ok(rows)
    }

    pub fn get_repo(&self, name: &str) -> SweepResult<Option<RepositoryRecord>> {
        let record = self
            .conn
            .query_row(
                &format!("SELECT {REPO_COLUMNS} FROM repositories WHERE name = ?1 LIMIT 1"),
                params![name],
                row_to_record,
            )
            .optional()?;
        Ok(record)
    }

    pub fn stats(&self) -> SweepResult<RegistryStats> {
        let stats = self.conn.query_row(
            &format!(
                "SELECT COUNT(*),
                        COALESCE(SUM(CASE WHEN status = ?1 THEN 1 ELSE 0 END), 0),
                        COALESCE(SUM(CASE WHEN auto_scan_enabled = 1 THEN 1 ELSE 0 END), 0)
                 FROM repositories WHERE {LOCAL_FILTER}"
            ),
            params![STATUS_ACTIVE],
            |row| {
                Ok(RegistryStats {
                    total: row.get::<_, i64>(0)? as u64,
                    active: row.get::<_, i64>(1)? as u64,
                    scanning: row.get::<_, i64>(2)? as u64,
                })
            },
        )?;
        Ok(stats)
    }

    /// Delete records whose path is a URL. Returns the number removed.
    pub fn cleanup_invalid(&self) -> SweepResult<usize> {
        let rows = self.conn.execute(
            "DELETE FROM repositories WHERE path LIKE 'http%' OR path LIKE '%://%'",
            [],
        )?;
        if rows > 0 {
            tracing::info!("removed {rows} repositories with URL paths");
        }
        Ok(rows)
    }

    /// Advance `last_scan_check` from `previous` to `now`. Returns false when
    /// another process changed it first.
    pub fn claim_scan(
        &self,
        id: &str,
        previous: Option<OffsetDateTime>,
        now: OffsetDateTime,
    ) -> SweepResult<bool> {
        let rows = self.conn.execute(
            "UPDATE repositories SET last_scan_check = ?1, updated_at = ?1
             WHERE id = ?2 AND last_scan_check IS ?3",
            params![
                now.unix_timestamp(),
                id,
                previous.map(OffsetDateTime::unix_timestamp)
            ],
        )?;
        Ok(rows == 1)
    }

    /// Undo a `claim_scan` after a failed dispatch. A no-op if the claim has
    /// since been superseded.
    pub fn revert_scan_claim(
        &self,
        id: &str,
        claimed: OffsetDateTime,
        previous: Option<OffsetDateTime>,
    ) -> SweepResult<bool> {
        let rows = self.conn.execute(
            "UPDATE repositories SET last_scan_check = ?1
             WHERE id = ?2 AND last_scan_check = ?3",
            params![
                previous.map(OffsetDateTime::unix_timestamp),
                id,
                claimed.unix_timestamp()
            ],
        )?;
        Ok(rows == 1)
    }

    pub fn mark_analyzed(&self, id: &str, now: OffsetDateTime) -> SweepResult<()> {
        self.conn.execute(
            "UPDATE repositories SET last_analyzed = ?1, updated_at = ?1 WHERE id = ?2",
            params![now.unix_timestamp(), id],
        )?;
        Ok(())
    }

    // ── Queue ───────────────────────────────────────────────────────

    /// Queue items ordered by `(priority, created_at)`.
    pub fn queue_items(&self, limit: usize) -> SweepResult<Vec<QueueItem>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, title, description, priority, stage, repo_path, file_path, created_at
             FROM queue ORDER BY priority, created_at LIMIT ?1",
        )?;
        let items = stmt
            .query_map(params![limit as i64], |row| {
                Ok(QueueItem {
                    id: row.get(0)?,
                    title: row.get(1)?,
                    description: row.get(2)?,
                    priority: row.get(3)?,
                    stage: row.get(4)?,
                    repo_path: row.get(5)?,
                    file_path: row.get(6)?,
                    created_at: from_epoch(row.get(7)?, 7)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(items)
    }

    /// Insert a queue item. Queue items are normally produced by the analyzer.
    pub fn enqueue(&self, item: &QueueItem) -> SweepResult<()> {
        self.conn.execute(
            "INSERT INTO queue (id, title, description, priority, stage, repo_path, file_path, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                item.id,
                item.title,
                item.description,
                item.priority,
                item.stage,
                item.repo_path,
                item.file_path,
                item.created_at.unix_timestamp(),
            ],
        )?;
        Ok(())
    }
}

fn from_epoch(secs: i64, column: usize) -> rusqlite::Result<OffsetDateTime> {
    OffsetDateTime::from_unix_timestamp(secs)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(column, Type::Integer, Box::new(e)))
}

fn from_epoch_opt(secs: Option<i64>, column: usize) -> rusqlite::Result<Option<OffsetDateTime>> {
    secs.map(|s| from_epoch(s, column)).transpose()
}

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<RepositoryRecord> {
    Ok(RepositoryRecord {
        id: row.get(0)?,
        path: row.get(1)?,
        name: row.get(2)?,
        status: row.get(3)?,
        auto_scan_enabled: row.get::<_, i64>(4)? != 0,
        scan_interval_minutes: row.get(5)?,
        last_scan_check: from_epoch_opt(row.get(6)?, 6)?,
        last_analyzed: from_epoch_opt(row.get(7)?, 7)?,
        created_at: from_epoch(row.get(8)?, 8)?,
        updated_at: from_epoch(row.get(9)?, 9)?,
    })
}
