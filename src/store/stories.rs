use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};

use super::{conversion_err, to_millis, BadValue, Store};
use crate::error::Result;
use crate::models::{Story, StoryStatus};

const STORY_COLUMNS: &str = "id, content_id, tenant_id, quality_score, slide_count, status";

fn row_to_story(row: &Row<'_>) -> rusqlite::Result<Story> {
    let status: String = row.get(5)?;
    Ok(Story {
        id: row.get(0)?,
        content_id: row.get(1)?,
        tenant_id: row.get(2)?,
        quality_score: row.get(3)?,
        slide_count: row.get(4)?,
        status: status
            .parse::<StoryStatus>()
            .map_err(|e| conversion_err(5, BadValue(e)))?,
    })
}

impl Store {
    /// Most recently written story for a content item.
    pub fn story_for_content(&self, content_id: &str) -> Result<Option<Story>> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {STORY_COLUMNS} FROM stories WHERE content_id = ?1
             ORDER BY updated_at DESC, rowid DESC LIMIT 1"
        );
        let s = conn.query_row(&sql, [content_id], row_to_story).optional()?;
        Ok(s)
    }

    pub fn get_story(&self, id: &str) -> Result<Option<Story>> {
        let conn = self.conn()?;
        let sql = format!("SELECT {STORY_COLUMNS} FROM stories WHERE id = ?1");
        let s = conn.query_row(&sql, [id], row_to_story).optional()?;
        Ok(s)
    }

    /// Write a freshly generated story. A regenerated story replaces the old
    /// row and goes back to whatever status the caller passes (normally draft).
    pub fn upsert_story(&self, story: &Story, now: DateTime<Utc>) -> Result<()> {
        self.conn()?.execute(
            "INSERT INTO stories (id, content_id, tenant_id, quality_score, slide_count, status, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(id) DO UPDATE SET
                 content_id = excluded.content_id,
                 tenant_id = excluded.tenant_id,
                 quality_score = excluded.quality_score,
                 slide_count = excluded.slide_count,
                 status = excluded.status,
                 updated_at = excluded.updated_at",
            params![
                story.id,
                story.content_id,
                story.tenant_id,
                story.quality_score,
                story.slide_count,
                story.status.as_str(),
                to_millis(now),
            ],
        )?;
        Ok(())
    }

    /// `draft -> ready`. Returns false when the story was not a draft.
    pub fn promote_story(&self, id: &str) -> Result<bool> {
        let n = self.conn()?.execute(
            "UPDATE stories SET status = 'ready' WHERE id = ?1 AND status = 'draft'",
            [id],
        )?;
        Ok(n == 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn story(id: &str, status: StoryStatus) -> Story {
        Story {
            id: id.into(),
            content_id: "c1".into(),
            tenant_id: "t1".into(),
            quality_score: Some(70.0),
            slide_count: 6,
            status,
        }
    }

    #[test]
    fn promote_only_moves_drafts() {
        let store = Store::open_in_memory().unwrap();
        let now = Utc::now();
        store.upsert_story(&story("a", StoryStatus::Draft), now).unwrap();
        store
            .upsert_story(&story("b", StoryStatus::Published), now)
            .unwrap();
        assert!(store.promote_story("a").unwrap());
        assert!(!store.promote_story("a").unwrap());
        assert!(!store.promote_story("b").unwrap());
        assert_eq!(
            store.get_story("b").unwrap().unwrap().status,
            StoryStatus::Published
        );
    }

    #[test]
    fn latest_story_wins_for_content() {
        let store = Store::open_in_memory().unwrap();
        let now = Utc::now();
        store.upsert_story(&story("a", StoryStatus::Draft), now).unwrap();
        store
            .upsert_story(
                &story("b", StoryStatus::Ready),
                now + chrono::Duration::seconds(1),
            )
            .unwrap();
        assert_eq!(store.story_for_content("c1").unwrap().unwrap().id, "b");
        assert!(store.story_for_content("c2").unwrap().is_none());
    }
}
