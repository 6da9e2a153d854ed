//! Local filesystem storage: per-user directories under a configured
//! root, served under a configured base URL path.

use crate::error::StorageError;
use crate::types::{DeleteOutcome, ImageVariants, NativeTag, UploadMetadata, UploadResult};
use crate::MediaStorage;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct LocalConfig {
    /// Directory files are written under
    pub root: PathBuf,
    /// URL path prefix the web layer serves `root` from
    pub base_url: String,
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("uploads"),
            base_url: "/uploads".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LocalStorage {
    config: LocalConfig,
}

impl LocalStorage {
    pub fn new(config: LocalConfig) -> Self {
        Self { config }
    }

    /// Collision-resistant stored filename: millisecond timestamp plus a
    /// short random suffix, keeping the original extension.
    fn stored_filename(original: &str) -> String {
        let ext = Path::new(original)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("jpg");
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        format!(
            "{}_{}.{}",
            chrono::Utc::now().timestamp_millis(),
            &suffix[..8],
            ext
        )
    }

    /// Map a serving URL back to the filesystem path it was stored at.
    /// Rejects URLs outside the configured base and path-traversal
    /// segments.
    fn url_to_path(&self, url: &str) -> Result<PathBuf, StorageError> {
        let base = self.config.base_url.trim_end_matches('/');
        let rest = url
            .strip_prefix(base)
            .and_then(|r| r.strip_prefix('/'))
            .ok_or_else(|| StorageError::InvalidUrl(url.to_string()))?;
        if rest.is_empty() || rest.split('/').any(|seg| seg == ".." || seg.is_empty()) {
            return Err(StorageError::InvalidUrl(url.to_string()));
        }
        Ok(self.config.root.join(rest))
    }
}

impl MediaStorage for LocalStorage {
    fn provider_name(&self) -> &'static str {
        "local"
    }

    async fn upload(
        &self,
        bytes: &[u8],
        filename: &str,
        user_id: &str,
    ) -> Result<UploadResult, StorageError> {
        let stored = Self::stored_filename(filename);
        let dir = self.config.root.join(user_id);
        tokio::fs::create_dir_all(&dir).await?;
        tokio::fs::write(dir.join(&stored), bytes).await?;

        let url = format!(
            "{}/{}/{}",
            self.config.base_url.trim_end_matches('/'),
            user_id,
            stored
        );
        tracing::debug!(url = %url, size = bytes.len(), "stored file locally");

        // No real resizing locally: every variant is the original.
        Ok(UploadResult {
            url: url.clone(),
            thumbnail_url: url.clone(),
            original_url: url,
            provider: "local".to_string(),
            metadata: UploadMetadata {
                filename: stored,
                size: bytes.len() as u64,
            },
        })
    }

    async fn delete(&self, url: &str) -> Result<DeleteOutcome, StorageError> {
        let path = self.url_to_path(url)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(DeleteOutcome::Deleted),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(DeleteOutcome::NotFound),
            Err(e) => Err(e.into()),
        }
    }

    fn image_variants(&self, url: &str) -> ImageVariants {
        ImageVariants::uniform(url)
    }

    async fn native_tags(&self, _url: &str) -> Result<Vec<NativeTag>, StorageError> {
        Ok(Vec::new())
    }

    fn local_path(&self, url: &str) -> Option<PathBuf> {
        self.url_to_path(url).ok()
    }
}
