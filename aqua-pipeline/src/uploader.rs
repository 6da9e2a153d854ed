//! Upload and delete flows tying media storage, photo records and the
//! job queue together.
//!
//! Upload is the fast path: store the bytes, create the pending record,
//! enqueue the tagging job and return immediately. Tagging happens
//! later, off the request path.

use crate::error::PipelineError;
use crate::photos::{Category, NewPhoto, PhotoRecord, PhotoStore};
use crate::worker::{vision_job_id, VisionTagJob};
use aqua_media::{is_remote_url, DeleteOutcome, LocalStorage, MediaStorage, UploadResult};
use aqua_queue::{JobPriority, QueueJob, QueueManager};
use std::sync::Arc;

/// An incoming upload, already validated as an image by the web layer.
#[derive(Debug, Clone)]
pub struct PhotoUpload {
    pub user_id: String,
    pub filename: String,
    pub bytes: Vec<u8>,
    pub title: String,
    pub description: Option<String>,
    pub category: Category,
    pub tags: Vec<String>,
    pub priority: JobPriority,
}

/// What happened to a photo and its stored bytes on delete.
///
/// Storage cleanup failure never blocks record deletion; it is carried
/// here instead of propagated.
#[derive(Debug, Clone)]
pub struct PhotoDeleteReport {
    pub photo_id: String,
    pub record_deleted: bool,
    pub storage: Option<DeleteOutcome>,
    pub storage_error: Option<String>,
}

impl PhotoDeleteReport {
    /// The photo is gone from the caller's perspective. `NotFound` and
    /// `Unsupported` storage outcomes still count as success.
    pub fn success(&self) -> bool {
        self.record_deleted
    }
}

/// Orchestrates the upload fast path and the delete flow.
pub struct PhotoUploader<S> {
    storage: S,
    store: PhotoStore,
    queue: Arc<QueueManager>,
    /// Used when a record's URL is local-shaped but the configured
    /// provider is remote (provider changed after upload).
    local_fallback: Option<LocalStorage>,
}

impl<S: MediaStorage> PhotoUploader<S> {
    pub fn new(storage: S, store: PhotoStore, queue: Arc<QueueManager>) -> Self {
        Self {
            storage,
            store,
            queue,
            local_fallback: None,
        }
    }

    pub fn with_local_fallback(mut self, local: LocalStorage) -> Self {
        self.local_fallback = Some(local);
        self
    }

    /// Store the image, create the pending record and enqueue the
    /// tagging job. Returns the record (tagging status `pending`) and
    /// the provider's upload result so the HTTP response never waits for
    /// the LLM.
    pub async fn upload(
        &self,
        upload: PhotoUpload,
    ) -> Result<(PhotoRecord, UploadResult), PipelineError> {
        // Validate before touching storage so a rejected upload never
        // leaves orphaned bytes behind.
        let mut new_photo = NewPhoto {
            user_id: upload.user_id.clone(),
            title: upload.title,
            description: upload.description,
            category: upload.category,
            tags: upload.tags,
            url: None,
            thumbnail_url: None,
            original_url: None,
        };
        PhotoStore::validate(&new_photo)?;

        let stored = self
            .storage
            .upload(&upload.bytes, &upload.filename, &upload.user_id)
            .await?;

        new_photo.url = Some(stored.url.clone());
        new_photo.thumbnail_url = Some(stored.thumbnail_url.clone());
        new_photo.original_url = Some(stored.original_url.clone());
        let record = self.store.create(new_photo)?;

        let image_url = is_remote_url(&stored.original_url).then(|| stored.original_url.clone());
        let payload = VisionTagJob {
            photo_id: record.id.clone(),
            image_path: self.storage.local_path(&stored.original_url),
            image_url,
            user_id: upload.user_id,
        };
        self.queue.enqueue(
            QueueJob::new(payload)
                .with_id(vision_job_id(&record.id))
                .with_priority(upload.priority),
        )?;

        tracing::info!(
            photo_id = %record.id,
            provider = self.storage.provider_name(),
            "photo uploaded, tagging job enqueued"
        );
        Ok((record, stored))
    }

    /// Delete a photo and its stored bytes. The storage provider is
    /// routed by URL shape: `http`-prefixed URLs go to the configured
    /// remote provider, anything else to local disk.
    pub async fn delete(&self, photo_id: &str) -> Result<PhotoDeleteReport, PipelineError> {
        let record = self
            .store
            .get(photo_id)?
            .ok_or_else(|| PipelineError::NotFound(photo_id.to_string()))?;

        let url = record.original_url.as_deref().or(record.url.as_deref());
        let (storage, storage_error) = match url {
            Some(url) => match self.delete_from_storage(url).await {
                Ok(outcome) => (Some(outcome), None),
                Err(e) => {
                    tracing::warn!(
                        photo_id = %photo_id,
                        url = %url,
                        error = %e,
                        "storage cleanup failed, deleting record anyway"
                    );
                    (None, Some(e.to_string()))
                }
            },
            None => (None, None),
        };

        let record_deleted = self.store.delete(photo_id)?;
        Ok(PhotoDeleteReport {
            photo_id: photo_id.to_string(),
            record_deleted,
            storage,
            storage_error,
        })
    }

    async fn delete_from_storage(&self, url: &str) -> Result<DeleteOutcome, PipelineError> {
        if !is_remote_url(url) {
            if let Some(local) = &self.local_fallback {
                return Ok(local.delete(url).await?);
            }
        }
        Ok(self.storage.delete(url).await?)
    }
}
