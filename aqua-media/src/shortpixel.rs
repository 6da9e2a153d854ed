//! ShortPixel-style optimize-and-deliver provider.
//!
//! The optimizer ingests the raw bytes, serves them from its CDN with
//! format/quality auto-negotiation, and derives size variants through
//! query parameters. It does not own the asset lifecycle, so delete is
//! reported as [`DeleteOutcome::Unsupported`] rather than pretending
//! success.

use crate::error::StorageError;
use crate::retry;
use crate::types::{DeleteOutcome, ImageVariants, NativeTag, UploadMetadata, UploadResult};
use crate::MediaStorage;
use serde::Deserialize;
use std::time::Duration;

const UPLOAD_MAX_ATTEMPTS: u32 = 4;
const UPLOAD_BACKOFF_BASE: Duration = Duration::from_millis(500);

#[derive(Debug, Clone)]
pub struct ShortPixelConfig {
    pub api_key: String,
    /// API base, overridable for tests
    pub api_base: String,
}

impl ShortPixelConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            api_base: "https://api.shortpixel.com/v2".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ShortPixelStorage {
    client: reqwest::Client,
    config: ShortPixelConfig,
}

#[derive(Deserialize)]
struct ShortPixelUploadResponse {
    url: String,
    #[serde(default)]
    size: u64,
}

impl ShortPixelStorage {
    pub fn new(config: ShortPixelConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    async fn upload_once(
        &self,
        bytes: &[u8],
        filename: &str,
        user_id: &str,
    ) -> Result<ShortPixelUploadResponse, StorageError> {
        let endpoint = format!(
            "{}/upload?key={}&folder={}&name={}&lossy=1&convertto=auto",
            self.config.api_base, self.config.api_key, user_id, filename
        );
        let resp = self
            .client
            .post(&endpoint)
            .header("Content-Type", "application/octet-stream")
            .body(bytes.to_vec())
            .send()
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(StorageError::Http(status, body));
        }
        resp.json()
            .await
            .map_err(|e| StorageError::InvalidResponse(e.to_string()))
    }
}

impl MediaStorage for ShortPixelStorage {
    fn provider_name(&self) -> &'static str {
        "shortpixel"
    }

    async fn upload(
        &self,
        bytes: &[u8],
        filename: &str,
        user_id: &str,
    ) -> Result<UploadResult, StorageError> {
        let response = retry::with_backoff(UPLOAD_MAX_ATTEMPTS, UPLOAD_BACKOFF_BASE, || {
            self.upload_once(bytes, filename, user_id)
        })
        .await?;

        let size = if response.size > 0 {
            response.size
        } else {
            bytes.len() as u64
        };
        Ok(UploadResult {
            thumbnail_url: with_params(&response.url, "w=300&h=300&q=auto"),
            original_url: response.url.clone(),
            url: response.url,
            provider: "shortpixel".to_string(),
            metadata: UploadMetadata {
                filename: filename.to_string(),
                size,
            },
        })
    }

    /// The optimizer serves a copy; the caller keeps owning the source
    /// asset, so there is nothing to delete on the provider side.
    async fn delete(&self, _url: &str) -> Result<DeleteOutcome, StorageError> {
        Ok(DeleteOutcome::Unsupported)
    }

    fn image_variants(&self, url: &str) -> ImageVariants {
        if !crate::types::is_remote_url(url) {
            return ImageVariants::uniform(url);
        }
        ImageVariants {
            thumbnail: with_params(url, "w=150&h=150&q=auto"),
            medium: with_params(url, "w=600&q=auto"),
            large: with_params(url, "w=1200&q=auto"),
            original: url.to_string(),
        }
    }

    async fn native_tags(&self, _url: &str) -> Result<Vec<NativeTag>, StorageError> {
        Ok(Vec::new())
    }
}

/// Append resize parameters to a CDN URL, respecting an existing query
/// string.
fn with_params(url: &str, params: &str) -> String {
    if url.contains('?') {
        format!("{}&{}", url, params)
    } else {
        format!("{}?{}", url, params)
    }
}
