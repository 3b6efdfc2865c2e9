//! SQLite datastore for sources, content items, jobs, stories and tenants.
//!
//! Every state change that matters for correctness is one conditional
//! `UPDATE ... WHERE id = ? AND status = ?`; the affected-row count decides
//! whether the caller won. Nothing is read-then-written across two statements.

mod content;
mod jobs;
mod sources;
mod stories;

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task;

use crate::error::{PipelineError, Result};

pub use jobs::QueueStats;
pub use sources::SourceReport;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS tenants (
    id TEXT PRIMARY KEY,
    auto_approve_threshold REAL
);
CREATE TABLE IF NOT EXISTS sources (
    id TEXT PRIMARY KEY,
    tenant_id TEXT NOT NULL,
    url TEXT NOT NULL,
    region TEXT,
    topic_id TEXT,
    last_method TEXT,
    success_rate REAL NOT NULL DEFAULT 50
        CHECK (success_rate >= 0 AND success_rate <= 100),
    last_successful_method TEXT,
    last_execution_ms INTEGER,
    quality_metrics TEXT NOT NULL DEFAULT 'null',
    active INTEGER NOT NULL DEFAULT 1,
    last_run_at INTEGER
);
CREATE TABLE IF NOT EXISTS content_items (
    id TEXT PRIMARY KEY,
    source_id TEXT NOT NULL,
    url TEXT NOT NULL UNIQUE,
    title TEXT NOT NULL,
    body TEXT NOT NULL DEFAULT '',
    published_at INTEGER NOT NULL DEFAULT 0,
    status TEXT NOT NULL DEFAULT 'new',
    created_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_content_source_status ON content_items(source_id, status);
CREATE TABLE IF NOT EXISTS jobs (
    id TEXT PRIMARY KEY,
    content_id TEXT NOT NULL,
    kind TEXT NOT NULL,
    params TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'pending',
    attempts INTEGER NOT NULL DEFAULT 0,
    max_attempts INTEGER NOT NULL,
    scheduled_at INTEGER NOT NULL,
    started_at INTEGER,
    result TEXT,
    error TEXT,
    created_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_jobs_claim ON jobs(status, scheduled_at, created_at);
CREATE TABLE IF NOT EXISTS stories (
    id TEXT PRIMARY KEY,
    content_id TEXT NOT NULL,
    tenant_id TEXT NOT NULL,
    quality_score REAL,
    slide_count INTEGER NOT NULL DEFAULT 0,
    status TEXT NOT NULL DEFAULT 'draft',
    updated_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_stories_content ON stories(content_id);
";

/// Shared handle to the pipeline database.
///
/// Cheap to share behind an `Arc`; all access goes through one connection
/// guarded by a mutex. Separate processes coordinate through SQLite locking.
pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    /// Open (or create) the database file and apply the schema.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(crate::error::ConfigError::from)?;
            }
        }
        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |_| Ok(()))?;
        Self::init(conn)
    }

    /// Private in-memory database, mostly for tests.
    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub(crate) fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| PipelineError::Poisoned)
    }

    /// Run `f` against the store on tokio's blocking pool.
    ///
    /// A rusqlite call can wait on the connection lock or on `busy_timeout`;
    /// async code goes through here so that wait never holds a runtime worker.
    pub async fn call<T, F>(self: &Arc<Self>, f: F) -> Result<T>
    where
        F: FnOnce(&Store) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let store = Arc::clone(self);
        task::spawn_blocking(move || f(&store)).await?
    }

    /// Insert or update a tenant's auto-approval threshold.
    pub fn upsert_tenant(&self, tenant_id: &str, threshold: Option<f64>) -> Result<()> {
        self.conn()?.execute(
            "INSERT INTO tenants (id, auto_approve_threshold) VALUES (?1, ?2)
             ON CONFLICT(id) DO UPDATE SET auto_approve_threshold = excluded.auto_approve_threshold",
            rusqlite::params![tenant_id, threshold],
        )?;
        Ok(())
    }

    /// The tenant's configured threshold, if any.
    pub fn tenant_threshold(&self, tenant_id: &str) -> Result<Option<f64>> {
        use rusqlite::OptionalExtension;
        let v: Option<Option<f64>> = self
            .conn()?
            .query_row(
                "SELECT auto_approve_threshold FROM tenants WHERE id = ?1",
                [tenant_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(v.flatten())
    }
}

pub(crate) fn to_millis(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_millis()
}

pub(crate) fn from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}

/// Wrap a parse failure of a stored column as a rusqlite conversion error.
pub(crate) fn conversion_err<E>(col: usize, e: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(col, rusqlite::types::Type::Text, Box::new(e))
}

#[derive(Debug)]
pub(crate) struct BadValue(pub String);

impl std::fmt::Display for BadValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for BadValue {}
