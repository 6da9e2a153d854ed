//! Photo records and their tagging state machine.
//!
//! Status moves `pending -> processing -> completed | failed` and never
//! re-enters an earlier state within one job. Status fields are written
//! only by the tagging worker and the terminal-failure notifier; the
//! queue's one-attempt-per-job guarantee serializes those writes, so no
//! row locking is needed beyond the connection mutex.

use crate::error::PipelineError;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};

pub const MAX_TITLE_LEN: usize = 200;
pub const MAX_DESCRIPTION_LEN: usize = 1000;

/// Photo categories of the forum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Freshwater,
    Saltwater,
    Planted,
    Other,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Freshwater => "freshwater",
            Category::Saltwater => "saltwater",
            Category::Planted => "planted",
            Category::Other => "other",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "freshwater" => Some(Category::Freshwater),
            "saltwater" => Some(Category::Saltwater),
            "planted" => Some(Category::Planted),
            "other" => Some(Category::Other),
            _ => None,
        }
    }
}

/// Tagging status on a photo, observable mid-flight by the owning user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TagStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl TagStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TagStatus::Pending => "pending",
            TagStatus::Processing => "processing",
            TagStatus::Completed => "completed",
            TagStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(TagStatus::Pending),
            "processing" => Some(TagStatus::Processing),
            "completed" => Some(TagStatus::Completed),
            "failed" => Some(TagStatus::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TagStatus::Completed | TagStatus::Failed)
    }
}

/// A persisted photo.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhotoRecord {
    pub id: String,
    pub user_id: String,
    pub url: Option<String>,
    pub thumbnail_url: Option<String>,
    pub original_url: Option<String>,
    pub title: String,
    pub description: Option<String>,
    pub category: Category,
    /// Display tag list: manual, vision and text tags unioned,
    /// case-insensitively deduplicated, first-seen casing kept
    pub tags: Vec<String>,
    pub tag_status: TagStatus,
    pub tagging_started_at: Option<String>,
    pub tagging_completed_at: Option<String>,
    pub tagging_error: Option<String>,
    /// Informational note, e.g. for a completed job with zero tags
    pub tagging_note: Option<String>,
    pub tagging_model: Option<String>,
    pub tagging_ms: Option<u64>,
    pub views: u64,
    pub liked_by: Vec<String>,
    pub created_at: Option<String>,
}

impl PhotoRecord {
    pub fn like_count(&self) -> usize {
        self.liked_by.len()
    }

    pub fn liked_by(&self, user_id: &str) -> bool {
        self.liked_by.iter().any(|u| u == user_id)
    }
}

/// Fields supplied at upload time.
#[derive(Debug, Clone)]
pub struct NewPhoto {
    pub user_id: String,
    pub title: String,
    pub description: Option<String>,
    pub category: Category,
    /// Manually entered tags
    pub tags: Vec<String>,
    pub url: Option<String>,
    pub thumbnail_url: Option<String>,
    pub original_url: Option<String>,
}

/// Store for photo records.
#[derive(Clone)]
pub struct PhotoStore {
    db: Arc<Mutex<Connection>>,
}

const PHOTO_COLUMNS: &str = "id, user_id, url, thumbnail_url, original_url, title, description, \
     category, tags_json, tag_status, tagging_started_at, tagging_completed_at, tagging_error, \
     tagging_note, tagging_model, tagging_ms, views, liked_by_json, created_at";

fn photo_from_row(row: &Row<'_>) -> rusqlite::Result<PhotoRecord> {
    let category: String = row.get(7)?;
    let tags_json: String = row.get(8)?;
    let status: String = row.get(9)?;
    let liked_by_json: String = row.get(17)?;
    Ok(PhotoRecord {
        id: row.get(0)?,
        user_id: row.get(1)?,
        url: row.get(2)?,
        thumbnail_url: row.get(3)?,
        original_url: row.get(4)?,
        title: row.get(5)?,
        description: row.get(6)?,
        category: Category::parse(&category).unwrap_or(Category::Other),
        tags: serde_json::from_str(&tags_json).unwrap_or_default(),
        tag_status: TagStatus::parse(&status).unwrap_or(TagStatus::Pending),
        tagging_started_at: row.get(10)?,
        tagging_completed_at: row.get(11)?,
        tagging_error: row.get(12)?,
        tagging_note: row.get(13)?,
        tagging_model: row.get(14)?,
        tagging_ms: row.get(15)?,
        views: row.get(16)?,
        liked_by: serde_json::from_str(&liked_by_json).unwrap_or_default(),
        created_at: row.get(18)?,
    })
}

/// Union `additions` into `existing`, case-insensitively, keeping order
/// and first-seen casing. Returns the lowercase-normalized forms of the
/// tags that were actually new.
fn union_tags(existing: &mut Vec<String>, additions: &[String]) -> Vec<String> {
    let mut seen: std::collections::HashSet<String> =
        existing.iter().map(|t| t.to_lowercase()).collect();
    let mut added = Vec::new();
    for tag in additions {
        let trimmed = tag.trim();
        if trimmed.is_empty() {
            continue;
        }
        let normalized = trimmed.to_lowercase();
        if seen.insert(normalized.clone()) {
            existing.push(trimmed.to_string());
            added.push(normalized);
        }
    }
    added
}

impl PhotoStore {
    pub fn new(db: Arc<Mutex<Connection>>) -> Self {
        Self { db }
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, PipelineError> {
        self.db
            .lock()
            .map_err(|e| PipelineError::Other(e.to_string()))
    }

    pub(crate) fn validate(photo: &NewPhoto) -> Result<(), PipelineError> {
        let title = photo.title.trim();
        if title.is_empty() {
            return Err(PipelineError::Validation("title is required".to_string()));
        }
        if title.chars().count() > MAX_TITLE_LEN {
            return Err(PipelineError::Validation(format!(
                "title exceeds {} characters",
                MAX_TITLE_LEN
            )));
        }
        if let Some(desc) = &photo.description {
            if desc.chars().count() > MAX_DESCRIPTION_LEN {
                return Err(PipelineError::Validation(format!(
                    "description exceeds {} characters",
                    MAX_DESCRIPTION_LEN
                )));
            }
        }
        Ok(())
    }

    /// Create a photo in `pending` tagging state. Manual tags are
    /// deduplicated case-insensitively at write time.
    pub fn create(&self, photo: NewPhoto) -> Result<PhotoRecord, PipelineError> {
        Self::validate(&photo)?;

        let mut tags = Vec::new();
        union_tags(&mut tags, &photo.tags);

        let id = uuid::Uuid::new_v4().to_string();
        self.conn()?.execute(
            "INSERT INTO photos
                 (id, user_id, url, thumbnail_url, original_url, title, description, category,
                  tags_json, tag_status)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 'pending')",
            params![
                id,
                photo.user_id,
                photo.url,
                photo.thumbnail_url,
                photo.original_url,
                photo.title.trim(),
                photo.description,
                photo.category.as_str(),
                serde_json::to_string(&tags)?,
            ],
        )?;
        self.get(&id)?
            .ok_or_else(|| PipelineError::NotFound(id))
    }

    pub fn get(&self, id: &str) -> Result<Option<PhotoRecord>, PipelineError> {
        let sql = format!("SELECT {} FROM photos WHERE id = ?1", PHOTO_COLUMNS);
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&sql)?;
        Ok(stmt.query_row(params![id], photo_from_row).optional()?)
    }

    pub fn exists(&self, id: &str) -> Result<bool, PipelineError> {
        let count: u32 = self.conn()?.query_row(
            "SELECT COUNT(*) FROM photos WHERE id = ?1",
            params![id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Worker picked the job up: status `processing`, start timestamp.
    pub fn mark_tagging_processing(&self, id: &str) -> Result<(), PipelineError> {
        self.conn()?.execute(
            "UPDATE photos
             SET tag_status = 'processing', tagging_started_at = ?1
             WHERE id = ?2",
            params![chrono::Utc::now().to_rfc3339(), id],
        )?;
        Ok(())
    }

    /// Tagging finished. Zero extracted tags still completes, with an
    /// informational note instead of an error.
    pub fn mark_tagging_completed(
        &self,
        id: &str,
        model: &str,
        processing_ms: u64,
        note: Option<&str>,
    ) -> Result<(), PipelineError> {
        self.conn()?.execute(
            "UPDATE photos
             SET tag_status = 'completed', tagging_completed_at = ?1, tagging_model = ?2,
                 tagging_ms = ?3, tagging_note = ?4, tagging_error = NULL
             WHERE id = ?5",
            params![chrono::Utc::now().to_rfc3339(), model, processing_ms, note, id],
        )?;
        Ok(())
    }

    /// Record a non-terminal attempt failure. The status stays
    /// `processing`; queue-level retries are invisible apart from the
    /// error string.
    pub fn record_tagging_error(&self, id: &str, error: &str) -> Result<(), PipelineError> {
        self.conn()?.execute(
            "UPDATE photos SET tagging_error = ?1 WHERE id = ?2",
            params![error, id],
        )?;
        Ok(())
    }

    /// The retry budget is exhausted: terminal `failed`.
    pub fn mark_tagging_failed(&self, id: &str, error: &str) -> Result<(), PipelineError> {
        self.conn()?.execute(
            "UPDATE photos
             SET tag_status = 'failed', tagging_completed_at = ?1, tagging_error = ?2
             WHERE id = ?3",
            params![chrono::Utc::now().to_rfc3339(), error, id],
        )?;
        Ok(())
    }

    /// Set-union new tags into the photo's tag list. Returns the
    /// lowercase-normalized tags that were actually added, which is what
    /// the tag usage index counts (one increment per distinct photo
    /// association).
    pub fn merge_tags(&self, id: &str, new_tags: &[String]) -> Result<Vec<String>, PipelineError> {
        let conn = self.conn()?;
        let tags_json: Option<String> = conn
            .query_row(
                "SELECT tags_json FROM photos WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()?;
        let Some(tags_json) = tags_json else {
            return Err(PipelineError::NotFound(id.to_string()));
        };

        let mut tags: Vec<String> = serde_json::from_str(&tags_json).unwrap_or_default();
        let added = union_tags(&mut tags, new_tags);
        if !added.is_empty() {
            conn.execute(
                "UPDATE photos SET tags_json = ?1 WHERE id = ?2",
                params![serde_json::to_string(&tags)?, id],
            )?;
        }
        Ok(added)
    }

    pub fn add_view(&self, id: &str) -> Result<(), PipelineError> {
        self.conn()?.execute(
            "UPDATE photos SET views = views + 1 WHERE id = ?1",
            params![id],
        )?;
        Ok(())
    }

    /// Toggle the user's like. Returns `true` when the photo is liked
    /// after the call. Membership in the liker set is the whole truth;
    /// toggling twice is a no-op.
    pub fn toggle_like(&self, id: &str, user_id: &str) -> Result<bool, PipelineError> {
        let conn = self.conn()?;
        let liked_by_json: Option<String> = conn
            .query_row(
                "SELECT liked_by_json FROM photos WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()?;
        let Some(liked_by_json) = liked_by_json else {
            return Err(PipelineError::NotFound(id.to_string()));
        };

        let mut liked_by: Vec<String> = serde_json::from_str(&liked_by_json).unwrap_or_default();
        let now_liked = match liked_by.iter().position(|u| u == user_id) {
            Some(idx) => {
                liked_by.remove(idx);
                false
            }
            None => {
                liked_by.push(user_id.to_string());
                true
            }
        };
        conn.execute(
            "UPDATE photos SET liked_by_json = ?1 WHERE id = ?2",
            params![serde_json::to_string(&liked_by)?, id],
        )?;
        Ok(now_liked)
    }

    /// Delete the record. Returns `false` if it was already gone.
    pub fn delete(&self, id: &str) -> Result<bool, PipelineError> {
        let changed = self
            .conn()?
            .execute("DELETE FROM photos WHERE id = ?1", params![id])?;
        Ok(changed == 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_database;

    fn store() -> PhotoStore {
        PhotoStore::new(open_database(None).unwrap())
    }

    fn new_photo(title: &str) -> NewPhoto {
        NewPhoto {
            user_id: "u1".to_string(),
            title: title.to_string(),
            description: None,
            category: Category::Freshwater,
            tags: vec![],
            url: Some("/uploads/u1/a.jpg".to_string()),
            thumbnail_url: Some("/uploads/u1/a.jpg".to_string()),
            original_url: Some("/uploads/u1/a.jpg".to_string()),
        }
    }

    #[test]
    fn create_starts_pending() {
        let store = store();
        let photo = store.create(new_photo("My betta")).unwrap();
        assert_eq!(photo.tag_status, TagStatus::Pending);
        assert_eq!(photo.user_id, "u1");
        assert_eq!(photo.views, 0);
        assert!(photo.tags.is_empty());
        assert!(store.exists(&photo.id).unwrap());
    }

    #[test]
    fn create_dedups_manual_tags() {
        let store = store();
        let mut photo = new_photo("Tank shot");
        photo.tags = vec![
            "Betta".to_string(),
            "betta".to_string(),
            " planted tank ".to_string(),
        ];
        let created = store.create(photo).unwrap();
        assert_eq!(created.tags, vec!["Betta", "planted tank"]);
    }

    #[test]
    fn validation_limits() {
        let store = store();
        assert!(matches!(
            store.create(new_photo("")),
            Err(PipelineError::Validation(_))
        ));
        assert!(matches!(
            store.create(new_photo(&"x".repeat(201))),
            Err(PipelineError::Validation(_))
        ));

        let mut photo = new_photo("ok");
        photo.description = Some("y".repeat(1001));
        assert!(matches!(
            store.create(photo),
            Err(PipelineError::Validation(_))
        ));

        // Boundary values pass.
        assert!(store.create(new_photo(&"t".repeat(200))).is_ok());
    }

    #[test]
    fn status_walk_to_completed() {
        let store = store();
        let photo = store.create(new_photo("p")).unwrap();

        store.mark_tagging_processing(&photo.id).unwrap();
        let mid = store.get(&photo.id).unwrap().unwrap();
        assert_eq!(mid.tag_status, TagStatus::Processing);
        assert!(mid.tagging_started_at.is_some());

        store
            .mark_tagging_completed(&photo.id, "llava", 1234, None)
            .unwrap();
        let done = store.get(&photo.id).unwrap().unwrap();
        assert_eq!(done.tag_status, TagStatus::Completed);
        assert_eq!(done.tagging_model.as_deref(), Some("llava"));
        assert_eq!(done.tagging_ms, Some(1234));
        assert!(done.tagging_error.is_none());
    }

    #[test]
    fn zero_tag_completion_keeps_note() {
        let store = store();
        let photo = store.create(new_photo("p")).unwrap();
        store.mark_tagging_processing(&photo.id).unwrap();
        store
            .mark_tagging_completed(&photo.id, "llava", 10, Some("no tags suggested"))
            .unwrap();

        let done = store.get(&photo.id).unwrap().unwrap();
        assert_eq!(done.tag_status, TagStatus::Completed);
        assert_eq!(done.tagging_note.as_deref(), Some("no tags suggested"));
    }

    #[test]
    fn attempt_error_does_not_change_status() {
        let store = store();
        let photo = store.create(new_photo("p")).unwrap();
        store.mark_tagging_processing(&photo.id).unwrap();
        store
            .record_tagging_error(&photo.id, "endpoint unreachable")
            .unwrap();

        let mid = store.get(&photo.id).unwrap().unwrap();
        assert_eq!(mid.tag_status, TagStatus::Processing);
        assert_eq!(mid.tagging_error.as_deref(), Some("endpoint unreachable"));

        store.mark_tagging_failed(&photo.id, "retries exhausted").unwrap();
        let failed = store.get(&photo.id).unwrap().unwrap();
        assert_eq!(failed.tag_status, TagStatus::Failed);
        assert_eq!(failed.tagging_error.as_deref(), Some("retries exhausted"));
    }

    #[test]
    fn merge_tags_is_idempotent() {
        let store = store();
        let photo = store.create(new_photo("p")).unwrap();

        let added = store
            .merge_tags(&photo.id, &["Betta".to_string(), "driftwood".to_string()])
            .unwrap();
        assert_eq!(added, vec!["betta", "driftwood"]);

        // Same tags again: nothing new, no duplicates.
        let added = store
            .merge_tags(&photo.id, &["betta".to_string(), "Driftwood".to_string()])
            .unwrap();
        assert!(added.is_empty());

        let record = store.get(&photo.id).unwrap().unwrap();
        assert_eq!(record.tags, vec!["Betta", "driftwood"]);
    }

    #[test]
    fn merge_preserves_manual_tags_and_order() {
        let store = store();
        let mut photo = new_photo("p");
        photo.tags = vec!["Manual".to_string()];
        let created = store.create(photo).unwrap();

        let added = store
            .merge_tags(&created.id, &["manual".to_string(), "new".to_string()])
            .unwrap();
        assert_eq!(added, vec!["new"]);
        assert_eq!(
            store.get(&created.id).unwrap().unwrap().tags,
            vec!["Manual", "new"]
        );
    }

    #[test]
    fn views_and_likes() {
        let store = store();
        let photo = store.create(new_photo("p")).unwrap();

        store.add_view(&photo.id).unwrap();
        store.add_view(&photo.id).unwrap();
        assert_eq!(store.get(&photo.id).unwrap().unwrap().views, 2);

        assert!(store.toggle_like(&photo.id, "u2").unwrap());
        let liked = store.get(&photo.id).unwrap().unwrap();
        assert_eq!(liked.like_count(), 1);
        assert!(liked.liked_by("u2"));

        // Toggling again removes the like.
        assert!(!store.toggle_like(&photo.id, "u2").unwrap());
        assert_eq!(store.get(&photo.id).unwrap().unwrap().like_count(), 0);
    }

    #[test]
    fn delete_and_missing_lookups() {
        let store = store();
        let photo = store.create(new_photo("p")).unwrap();

        assert!(store.delete(&photo.id).unwrap());
        assert!(!store.delete(&photo.id).unwrap());
        assert!(store.get(&photo.id).unwrap().is_none());
        assert!(!store.exists(&photo.id).unwrap());
        assert!(matches!(
            store.merge_tags(&photo.id, &["x".to_string()]),
            Err(PipelineError::NotFound(_))
        ));
    }
}
