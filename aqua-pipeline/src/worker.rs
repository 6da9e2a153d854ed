//! The vision tagging worker: the queue handler that turns a pending
//! photo into a tagged one.

use crate::photos::PhotoStore;
use crate::tags::TagUsageIndex;
use aqua_queue::{JobContext, JobHandler, JobResult, QueueError};
use aqua_vision::{TagOptions, VisionTagger};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Queue payload for one tagging job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisionTagJob {
    pub photo_id: String,
    /// Local path to the image, preferred when present
    pub image_path: Option<PathBuf>,
    /// Remote URL, downloaded to a temp file when no local path works
    pub image_url: Option<String>,
    pub user_id: String,
}

/// Stable job id for a photo, the dedup key: re-enqueueing a photo whose
/// job is pending or in-flight is a no-op.
pub fn vision_job_id(photo_id: &str) -> String {
    format!("vision-{}", photo_id)
}

/// Photo id back out of a job id, if it is a vision job.
pub fn photo_id_of_job(job_id: &str) -> Option<&str> {
    job_id.strip_prefix("vision-")
}

/// Handler processing [`VisionTagJob`]s.
///
/// Generic over the tagger so tests can run the full worker flow against
/// a stub instead of a live endpoint.
pub struct VisionWorker<T> {
    store: PhotoStore,
    index: TagUsageIndex,
    tagger: T,
    options: TagOptions,
    http: reqwest::Client,
}

impl<T: VisionTagger> VisionWorker<T> {
    pub fn new(store: PhotoStore, index: TagUsageIndex, tagger: T, options: TagOptions) -> Self {
        Self {
            store,
            index,
            tagger,
            options,
            http: reqwest::Client::new(),
        }
    }

    /// Resolve the job's image to a local file the tagger can encode.
    /// Remote images land in a temp file that is removed when the guard
    /// drops, whatever the attempt's outcome.
    async fn source_image(
        &self,
        job: &VisionTagJob,
    ) -> Result<(PathBuf, Option<tempfile::NamedTempFile>), String> {
        if let Some(path) = &job.image_path {
            if path.exists() {
                return Ok((path.clone(), None));
            }
        }

        let Some(url) = &job.image_url else {
            return Err(format!(
                "no usable image source for photo {}",
                job.photo_id
            ));
        };

        let resp = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| format!("failed to download {}: {}", url, e))?;
        if !resp.status().is_success() {
            return Err(format!(
                "failed to download {}: HTTP {}",
                url,
                resp.status().as_u16()
            ));
        }
        let bytes = resp
            .bytes()
            .await
            .map_err(|e| format!("failed to download {}: {}", url, e))?;

        let temp = tempfile::NamedTempFile::new()
            .map_err(|e| format!("failed to create temp file: {}", e))?;
        tokio::fs::write(temp.path(), &bytes)
            .await
            .map_err(|e| format!("failed to write temp file: {}", e))?;
        Ok((temp.path().to_path_buf(), Some(temp)))
    }

    fn db_err(e: crate::error::PipelineError) -> QueueError {
        QueueError::Execution(e.to_string())
    }

    /// Record an attempt's error on the photo before re-raising it.
    /// Non-final attempts keep the status at `processing` with the error
    /// visible; the last attempt settles the row as terminally failed.
    fn record_attempt_failure(
        &self,
        ctx: &JobContext,
        photo_id: &str,
        error: &str,
    ) -> Result<(), QueueError> {
        if !self.store.exists(photo_id).map_err(Self::db_err)? {
            return Ok(());
        }
        if ctx.is_last_attempt() {
            self.store
                .mark_tagging_failed(photo_id, error)
                .map_err(Self::db_err)
        } else {
            self.store
                .record_tagging_error(photo_id, error)
                .map_err(Self::db_err)
        }
    }

    async fn run_attempt(
        &self,
        ctx: &JobContext,
        job: &VisionTagJob,
    ) -> Result<JobResult, QueueError> {
        let photo_id = &job.photo_id;

        // Deleted before we got to it: nothing to do, complete quietly.
        if !self.store.exists(photo_id).map_err(Self::db_err)? {
            tracing::info!(photo_id = %photo_id, "photo deleted before tagging, skipping");
            return Ok(JobResult::success_with_output(
                "photo deleted before tagging".to_string(),
            ));
        }

        self.store
            .mark_tagging_processing(photo_id)
            .map_err(Self::db_err)?;

        // Every attempt error, sourcing included, goes through the same
        // record-then-re-raise path so retries stay visible on the photo.
        let (image_path, _temp_guard) = match self.source_image(job).await {
            Ok(sourced) => sourced,
            Err(error) => {
                self.record_attempt_failure(ctx, photo_id, &error)?;
                return Err(QueueError::Execution(error));
            }
        };
        let report = self.tagger.tag_image(&image_path, &self.options).await;

        if !report.success {
            let error = report
                .error
                .unwrap_or_else(|| "tagging failed".to_string());
            self.record_attempt_failure(ctx, photo_id, &error)?;
            return Err(QueueError::Execution(error));
        }

        // Deleted while the model was thinking: drop the result.
        if !self.store.exists(photo_id).map_err(Self::db_err)? {
            tracing::info!(photo_id = %photo_id, "photo deleted mid-tagging, discarding result");
            return Ok(JobResult::success_with_output(
                "photo deleted during tagging".to_string(),
            ));
        }

        let model = report.metadata.model.clone();
        let elapsed = report.metadata.processing_ms;

        if report.tags.is_empty() {
            self.store
                .mark_tagging_completed(photo_id, &model, elapsed, Some("no tags suggested"))
                .map_err(Self::db_err)?;
            return Ok(JobResult::success_with_output("0 tags".to_string()));
        }

        let tag_names: Vec<String> = report.tags.iter().map(|t| t.tag.clone()).collect();
        let newly_added = self
            .store
            .merge_tags(photo_id, &tag_names)
            .map_err(Self::db_err)?;
        // One increment per distinct new association; re-runs that add
        // nothing leave the index untouched.
        self.index
            .record_uses(&newly_added)
            .map_err(Self::db_err)?;

        self.store
            .mark_tagging_completed(photo_id, &model, elapsed, None)
            .map_err(Self::db_err)?;

        tracing::info!(
            photo_id = %photo_id,
            tags = tag_names.len(),
            new = newly_added.len(),
            model = %model,
            "photo tagged"
        );
        Ok(JobResult::success_with_output(format!(
            "{} tags",
            tag_names.len()
        )))
    }
}

impl<T: VisionTagger> JobHandler for VisionWorker<T> {
    type Payload = VisionTagJob;

    async fn execute(
        &self,
        ctx: &JobContext,
        payload: VisionTagJob,
    ) -> Result<JobResult, QueueError> {
        self.run_attempt(ctx, &payload).await
    }

    fn job_type(&self) -> &str {
        "vision-tag"
    }
}
