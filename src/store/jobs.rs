use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;
use std::time::Duration;

use super::{conversion_err, from_millis, to_millis, BadValue, Store};
use crate::error::{PipelineError, Result};
use crate::queue::{Job, JobKind, JobStatus};

const JOB_COLUMNS: &str = "id, content_id, params, status, attempts, max_attempts,
    scheduled_at, started_at, result, error, created_at";

/// Row counts per job status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueStats {
    pub pending: u64,
    pub processing: u64,
    pub completed: u64,
    pub failed: u64,
    /// Pending jobs whose visibility time has not yet arrived.
    pub scheduled: u64,
}

fn row_to_job(row: &Row<'_>) -> rusqlite::Result<Job> {
    let params_raw: String = row.get(2)?;
    let status_raw: String = row.get(3)?;
    let result_raw: Option<String> = row.get(8)?;
    let result = result_raw
        .map(|r| serde_json::from_str(&r))
        .transpose()
        .map_err(|e| conversion_err(8, BadValue(e.to_string())))?;
    Ok(Job {
        id: row.get(0)?,
        content_id: row.get(1)?,
        params: serde_json::from_str(&params_raw)
            .map_err(|e| conversion_err(2, BadValue(e.to_string())))?,
        status: status_raw
            .parse::<JobStatus>()
            .map_err(|e| conversion_err(3, BadValue(e)))?,
        attempts: row.get(4)?,
        max_attempts: row.get(5)?,
        scheduled_at: from_millis(row.get(6)?),
        started_at: row.get::<_, Option<i64>>(7)?.map(from_millis),
        result,
        error: row.get(9)?,
        created_at: from_millis(row.get(10)?),
    })
}

pub(super) fn insert_job(conn: &Connection, job: &Job) -> Result<()> {
    let params_json = serde_json::to_string(&job.params)?;
    let result_json = job.result.as_ref().map(serde_json::to_string).transpose()?;
    conn.execute(
        "INSERT INTO jobs (id, content_id, kind, params, status, attempts, max_attempts,
             scheduled_at, started_at, result, error, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        params![
            job.id,
            job.content_id,
            job.params.kind().as_str(),
            params_json,
            job.status.as_str(),
            job.attempts,
            job.max_attempts,
            to_millis(job.scheduled_at),
            job.started_at.map(to_millis),
            result_json,
            job.error,
            to_millis(job.created_at),
        ],
    )?;
    Ok(())
}

fn current_status(conn: &Connection, id: &str) -> Result<Option<JobStatus>> {
    let raw: Option<String> = conn
        .query_row("SELECT status FROM jobs WHERE id = ?1", [id], |row| row.get(0))
        .optional()?;
    raw.map(|s| {
        s.parse::<JobStatus>()
            .map_err(|e| PipelineError::Store(conversion_err(0, BadValue(e))))
    })
    .transpose()
}

/// Explain why a guarded update matched no row.
fn missed_update(conn: &Connection, id: &str, to: JobStatus) -> PipelineError {
    match current_status(conn, id) {
        Ok(Some(from)) => PipelineError::InvalidTransition {
            job_id: id.to_string(),
            from,
            to,
        },
        Ok(None) => PipelineError::NotFound {
            kind: "job",
            id: id.to_string(),
        },
        Err(e) => e,
    }
}

impl Store {
    pub fn enqueue_job(&self, job: &Job) -> Result<()> {
        let conn = self.conn()?;
        insert_job(&conn, job)
    }

    pub fn get_job(&self, id: &str) -> Result<Option<Job>> {
        let conn = self.conn()?;
        let sql = format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = ?1");
        let job = conn.query_row(&sql, [id], row_to_job).optional()?;
        Ok(job)
    }

    /// Candidate ids for claiming, oldest first. Reading them does not claim
    /// anything; each one still has to win [`Store::try_claim`].
    pub fn claimable_job_ids(
        &self,
        now: DateTime<Utc>,
        limit: usize,
        kind: Option<JobKind>,
    ) -> Result<Vec<String>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id FROM jobs
             WHERE status = 'pending' AND attempts < max_attempts AND scheduled_at <= ?1
               AND (?2 IS NULL OR kind = ?2)
             ORDER BY created_at, rowid LIMIT ?3",
        )?;
        let ids = stmt
            .query_map(
                params![to_millis(now), kind.map(|k| k.as_str()), limit as i64],
                |row| row.get(0),
            )?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(ids)
    }

    /// Compare-and-swap claim: `pending -> processing`, attempts incremented,
    /// start time stamped. `None` means another worker got there first or the
    /// job is no longer claimable.
    pub fn try_claim(&self, id: &str, now: DateTime<Utc>) -> Result<Option<Job>> {
        JobStatus::Pending.transition(id, JobStatus::Processing)?;
        let conn = self.conn()?;
        let sql = format!(
            "UPDATE jobs SET status = 'processing', started_at = ?2, attempts = attempts + 1
             WHERE id = ?1 AND status = 'pending' AND attempts < max_attempts
               AND scheduled_at <= ?2
             RETURNING {JOB_COLUMNS}"
        );
        let job = conn
            .query_row(&sql, params![id, to_millis(now)], row_to_job)
            .optional()?;
        Ok(job)
    }

    /// Reset every job stuck in `processing` since before `now - stale_after`.
    /// Attempts are left as they are. Returns how many rows were reset.
    pub fn recover_stale(&self, now: DateTime<Utc>, stale_after: Duration) -> Result<usize> {
        let window = chrono::Duration::from_std(stale_after).unwrap_or(chrono::Duration::MAX);
        let cutoff = now.checked_sub_signed(window).unwrap_or(DateTime::<Utc>::MIN_UTC);
        let n = self.conn()?.execute(
            "UPDATE jobs SET status = 'pending', started_at = NULL
             WHERE status = 'processing' AND started_at IS NOT NULL AND started_at < ?1",
            [to_millis(cutoff)],
        )?;
        Ok(n)
    }

    /// Pending jobs that can never be claimed again.
    pub fn exhausted_pending_ids(&self) -> Result<Vec<String>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id FROM jobs WHERE status = 'pending' AND attempts >= max_attempts
             ORDER BY created_at, rowid",
        )?;
        let ids = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(ids)
    }

    /// `processing -> completed` with the result summary.
    pub fn complete_job(&self, id: &str, result: &serde_json::Value) -> Result<()> {
        JobStatus::Processing.transition(id, JobStatus::Completed)?;
        let conn = self.conn()?;
        let n = conn.execute(
            "UPDATE jobs SET status = 'completed', result = ?2, error = NULL
             WHERE id = ?1 AND status = 'processing'",
            params![id, serde_json::to_string(result)?],
        )?;
        if n == 0 {
            return Err(missed_update(&conn, id, JobStatus::Completed));
        }
        Ok(())
    }

    /// `processing -> pending`, invisible to claims until `visible_at`.
    pub fn schedule_retry(&self, id: &str, error: &str, visible_at: DateTime<Utc>) -> Result<()> {
        JobStatus::Processing.transition(id, JobStatus::Pending)?;
        let conn = self.conn()?;
        let n = conn.execute(
            "UPDATE jobs SET status = 'pending', started_at = NULL, error = ?2, scheduled_at = ?3
             WHERE id = ?1 AND status = 'processing'",
            params![id, error, to_millis(visible_at)],
        )?;
        if n == 0 {
            return Err(missed_update(&conn, id, JobStatus::Pending));
        }
        Ok(())
    }

    /// Delete the job and hand its content item back to acquisition as `new`,
    /// in one transaction. The job must still be in `expected`. Returns the
    /// content id that was reset.
    pub fn abandon_and_requeue(&self, id: &str, expected: JobStatus) -> Result<String> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let row: Option<(String, String)> = tx
            .query_row(
                "SELECT content_id, status FROM jobs WHERE id = ?1",
                [id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        let Some((content_id, status_raw)) = row else {
            return Err(PipelineError::NotFound {
                kind: "job",
                id: id.to_string(),
            });
        };
        let status = status_raw
            .parse::<JobStatus>()
            .map_err(|e| PipelineError::Store(conversion_err(1, BadValue(e))))?;
        if status != expected {
            return Err(PipelineError::InvalidTransition {
                job_id: id.to_string(),
                from: status,
                to: expected,
            });
        }
        let deleted = tx.execute(
            "DELETE FROM jobs WHERE id = ?1 AND status = ?2",
            params![id, expected.as_str()],
        )?;
        if deleted == 0 {
            // dropping `tx` rolls back; the content item keeps its status
            return Err(PipelineError::InvalidTransition {
                job_id: id.to_string(),
                from: status,
                to: expected,
            });
        }
        tx.execute(
            "UPDATE content_items SET status = 'new' WHERE id = ?1",
            [&content_id],
        )?;
        tx.commit()?;
        Ok(content_id)
    }

    pub fn queue_stats(&self, now: DateTime<Utc>) -> Result<QueueStats> {
        let conn = self.conn()?;
        let mut stats = QueueStats::default();
        let mut stmt = conn.prepare("SELECT status, COUNT(*) FROM jobs GROUP BY status")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;
        for r in rows {
            let (status, count) = r?;
            let count = count.max(0) as u64;
            match status.parse::<JobStatus>() {
                Ok(JobStatus::Pending) => stats.pending = count,
                Ok(JobStatus::Processing) => stats.processing = count,
                Ok(JobStatus::Completed) => stats.completed = count,
                Ok(JobStatus::Failed) => stats.failed = count,
                Err(_) => {}
            }
        }
        let scheduled: i64 = conn.query_row(
            "SELECT COUNT(*) FROM jobs WHERE status = 'pending' AND scheduled_at > ?1",
            [to_millis(now)],
            |row| row.get(0),
        )?;
        stats.scheduled = scheduled.max(0) as u64;
        Ok(stats)
    }
}
