use chrono::Utc;
use rusqlite::{params, OptionalExtension, Row};
use serde::Serialize;

use super::{conversion_err, to_millis, BadValue, Store};
use crate::error::{PipelineError, Result};
use crate::ingest::methods::ExtractionMethod;
use crate::ingest::performance::{
    clamp_rate, MemoryUpdate, PerformanceStore, PerformanceUpdate, SMOOTHING,
};
use crate::ingest::strategy::MethodHistory;
use crate::models::Source;

const SOURCE_COLUMNS: &str = "id, tenant_id, url, region, topic_id, last_method, success_rate,
    last_successful_method, last_execution_ms, quality_metrics, active, last_run_at";

/// One row of the operator source report; weakest sources sort first.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceReport {
    pub id: String,
    pub url: String,
    pub active: bool,
    pub success_rate: f64,
    pub last_method: Option<ExtractionMethod>,
    pub last_successful_method: Option<ExtractionMethod>,
    pub last_execution_ms: Option<i64>,
    pub last_run_at: Option<i64>,
    pub content_items: i64,
}

fn method_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<ExtractionMethod>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|s| s.parse::<ExtractionMethod>().map_err(|e| conversion_err(idx, e)))
        .transpose()
}

fn row_to_source(row: &Row<'_>) -> rusqlite::Result<Source> {
    let metrics_raw: String = row.get(9)?;
    let quality_metrics = serde_json::from_str(&metrics_raw)
        .map_err(|e| conversion_err(9, BadValue(e.to_string())))?;
    Ok(Source {
        id: row.get(0)?,
        tenant_id: row.get(1)?,
        url: row.get(2)?,
        region: row.get(3)?,
        topic_id: row.get(4)?,
        last_method: method_col(row, 5)?,
        success_rate: row.get(6)?,
        last_successful_method: method_col(row, 7)?,
        last_execution_ms: row.get(8)?,
        quality_metrics,
        active: row.get(10)?,
        last_run_at: row.get(11)?,
    })
}

impl Store {
    /// Insert a source or replace its configuration fields.
    ///
    /// Performance fields are only written on insert; re-importing a source
    /// must not wipe its history.
    pub fn upsert_source(&self, s: &Source) -> Result<()> {
        let metrics = serde_json::to_string(&s.quality_metrics)?;
        self.conn()?.execute(
            "INSERT INTO sources (id, tenant_id, url, region, topic_id, last_method, success_rate,
                 last_successful_method, last_execution_ms, quality_metrics, active, last_run_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
             ON CONFLICT(id) DO UPDATE SET
                 tenant_id = excluded.tenant_id,
                 url = excluded.url,
                 region = excluded.region,
                 topic_id = excluded.topic_id,
                 active = excluded.active",
            params![
                s.id,
                s.tenant_id,
                s.url,
                s.region,
                s.topic_id,
                s.last_method.map(|m| m.as_str()),
                clamp_rate(s.success_rate),
                s.last_successful_method.map(|m| m.as_str()),
                s.last_execution_ms,
                metrics,
                s.active,
                s.last_run_at,
            ],
        )?;
        Ok(())
    }

    pub fn get_source(&self, id: &str) -> Result<Option<Source>> {
        let conn = self.conn()?;
        let sql = format!("SELECT {SOURCE_COLUMNS} FROM sources WHERE id = ?1");
        let s = conn.query_row(&sql, [id], row_to_source).optional()?;
        Ok(s)
    }

    /// Active sources, least recently run first (never-run sources lead).
    pub fn due_sources(&self, limit: usize) -> Result<Vec<Source>> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {SOURCE_COLUMNS} FROM sources WHERE active = 1
             ORDER BY last_run_at IS NOT NULL, last_run_at, id LIMIT ?1"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map([limit as i64], row_to_source)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Success-rate trends per source, for operators.
    pub fn source_report(&self) -> Result<Vec<SourceReport>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT s.id, s.url, s.active, s.success_rate, s.last_method,
                    s.last_successful_method, s.last_execution_ms, s.last_run_at,
                    (SELECT COUNT(*) FROM content_items c WHERE c.source_id = s.id)
             FROM sources s ORDER BY s.success_rate, s.id",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok(SourceReport {
                    id: row.get(0)?,
                    url: row.get(1)?,
                    active: row.get(2)?,
                    success_rate: row.get(3)?,
                    last_method: method_col(row, 4)?,
                    last_successful_method: method_col(row, 5)?,
                    last_execution_ms: row.get(6)?,
                    last_run_at: row.get(7)?,
                    content_items: row.get(8)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Sources are never deleted, only deactivated.
    pub fn deactivate_source(&self, id: &str) -> Result<()> {
        let n = self
            .conn()?
            .execute("UPDATE sources SET active = 0 WHERE id = ?1", [id])?;
        if n == 0 {
            return Err(PipelineError::NotFound {
                kind: "source",
                id: id.to_string(),
            });
        }
        Ok(())
    }

    /// Average success rate per method across all sources that last used it.
    pub fn method_history(&self) -> Result<MethodHistory> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT last_method, AVG(success_rate) FROM sources
             WHERE last_method IS NOT NULL GROUP BY last_method",
        )?;
        let mut out = MethodHistory::new();
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, f64>(1)?))
        })?;
        for r in rows {
            let (name, avg) = r?;
            if let Ok(m) = name.parse::<ExtractionMethod>() {
                out.insert(m, clamp_rate(avg));
            }
        }
        Ok(out)
    }

    /// Apply the one performance write an acquisition run produces.
    ///
    /// The moving-average step runs against the stored rate inside the
    /// UPDATE, so overlapping runs on one source compose instead of
    /// overwriting each other.
    pub fn record_acquisition_outcome(
        &self,
        source_id: &str,
        update: &PerformanceUpdate,
    ) -> Result<()> {
        let (memory_op, remembered) = match update.memory {
            MemoryUpdate::Set(m) => ("set", Some(m.as_str())),
            MemoryUpdate::Clear => ("clear", None),
            MemoryUpdate::Keep => ("keep", None),
        };
        let metrics = serde_json::to_string(&update.quality_metrics)?;
        let n = self.conn()?.execute(
            "UPDATE sources SET
                 success_rate = MIN(100.0, MAX(0.0, success_rate + (?2 - success_rate) * ?3)),
                 last_method = ?4,
                 last_successful_method = CASE ?5
                     WHEN 'set' THEN ?6
                     WHEN 'clear' THEN NULL
                     ELSE last_successful_method
                 END,
                 last_execution_ms = ?7,
                 quality_metrics = ?8,
                 last_run_at = ?9
             WHERE id = ?1",
            params![
                source_id,
                update.outcome.target(),
                SMOOTHING,
                update.last_method.as_str(),
                memory_op,
                remembered,
                update.execution_ms,
                metrics,
                to_millis(Utc::now()),
            ],
        )?;
        if n == 0 {
            return Err(PipelineError::NotFound {
                kind: "source",
                id: source_id.to_string(),
            });
        }
        Ok(())
    }
}

impl PerformanceStore for Store {
    fn record_performance(
        &self,
        source_id: &str,
        update: &PerformanceUpdate,
    ) -> std::result::Result<(), PipelineError> {
        self.record_acquisition_outcome(source_id, update)
    }
}
