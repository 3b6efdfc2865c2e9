use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};
use uuid::Uuid;

use super::jobs::insert_job;
use super::{conversion_err, to_millis, Store};
use crate::error::{PipelineError, Result};
use crate::ingest::types::ContentItem;
use crate::models::{ContentStatus, StoredContent};
use crate::queue::{Job, JobParams, JobStatus};

impl Store {
    /// Persist acquired items, skipping URLs already known. Returns the ids of
    /// rows actually inserted.
    pub fn insert_content_items(
        &self,
        source_id: &str,
        items: &[ContentItem],
        now: DateTime<Utc>,
    ) -> Result<Vec<String>> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let mut inserted = Vec::new();
        {
            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO content_items
                     (id, source_id, url, title, body, published_at, status, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'new', ?7)",
            )?;
            for item in items {
                let id = Uuid::new_v4().to_string();
                let n = stmt.execute(params![
                    id,
                    source_id,
                    item.url,
                    item.title,
                    item.body,
                    item.published_at,
                    to_millis(now),
                ])?;
                if n == 1 {
                    inserted.push(id);
                }
            }
        }
        tx.commit()?;
        Ok(inserted)
    }

    pub fn get_content(&self, id: &str) -> Result<Option<StoredContent>> {
        let conn = self.conn()?;
        let c = conn
            .query_row(
                "SELECT id, source_id, url, title, status FROM content_items WHERE id = ?1",
                [id],
                |row| {
                    let status: String = row.get(4)?;
                    Ok(StoredContent {
                        id: row.get(0)?,
                        source_id: row.get(1)?,
                        url: row.get(2)?,
                        title: row.get(3)?,
                        status: status
                            .parse::<ContentStatus>()
                            .map_err(|e| conversion_err(4, super::BadValue(e)))?,
                    })
                },
            )
            .optional()?;
        Ok(c)
    }

    pub fn set_content_status(&self, id: &str, status: ContentStatus) -> Result<()> {
        let n = self.conn()?.execute(
            "UPDATE content_items SET status = ?2 WHERE id = ?1",
            params![id, status.as_str()],
        )?;
        if n == 0 {
            return Err(PipelineError::NotFound {
                kind: "content item",
                id: id.to_string(),
            });
        }
        Ok(())
    }

    /// Move every `new` item of the source to `queued` and create one job per
    /// item moved. Items handed back by an exhausted job are picked up here too.
    pub fn enqueue_new_content(
        &self,
        source_id: &str,
        params: &JobParams,
        max_attempts: u32,
        now: DateTime<Utc>,
    ) -> Result<Vec<Job>> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let ids: Vec<String> = {
            let mut stmt = tx.prepare(
                "SELECT id FROM content_items WHERE source_id = ?1 AND status = 'new'
                 ORDER BY created_at, rowid",
            )?;
            let rows = stmt
                .query_map([source_id], |row| row.get(0))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows
        };

        let mut jobs = Vec::with_capacity(ids.len());
        for content_id in ids {
            let moved = tx.execute(
                "UPDATE content_items SET status = 'queued' WHERE id = ?1 AND status = 'new'",
                [&content_id],
            )?;
            if moved == 0 {
                continue;
            }
            let job = Job {
                id: Uuid::new_v4().to_string(),
                content_id,
                params: params.clone(),
                status: JobStatus::Pending,
                attempts: 0,
                max_attempts,
                scheduled_at: now,
                started_at: None,
                result: None,
                error: None,
                created_at: now,
            };
            insert_job(&tx, &job)?;
            jobs.push(job);
        }
        tx.commit()?;
        Ok(jobs)
    }

    /// Tenant owning the content item, via its source.
    pub fn tenant_for_content(&self, content_id: &str) -> Result<Option<String>> {
        let conn = self.conn()?;
        let t = conn
            .query_row(
                "SELECT s.tenant_id FROM content_items c
                 JOIN sources s ON s.id = c.source_id WHERE c.id = ?1",
                [content_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(t)
    }
}
