//! Cloudinary-style transformation CDN provider.
//!
//! Uploads go to the signed upload API as a base64 data URI; size
//! variants are derived by inserting a transformation segment after
//! `/upload/` in the delivery URL, so no variant ever touches the
//! network. Deletes resolve the public id back out of the URL structure.

use crate::error::StorageError;
use crate::retry;
use crate::types::{DeleteOutcome, ImageVariants, NativeTag, UploadMetadata, UploadResult};
use crate::MediaStorage;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::Deserialize;
use sha1::{Digest, Sha1};
use std::time::Duration;

const UPLOAD_MAX_ATTEMPTS: u32 = 3;
const UPLOAD_BACKOFF_BASE: Duration = Duration::from_secs(1);

const THUMBNAIL_TRANSFORM: &str = "w_300,h_300,c_fill,q_auto,f_auto";
const MEDIUM_TRANSFORM: &str = "w_600,q_auto,f_auto";
const LARGE_TRANSFORM: &str = "w_1200,q_auto,f_auto";
const AUTO_TRANSFORM: &str = "q_auto,f_auto";

/// Confidence assigned to provider-native tags, which arrive unscored.
const NATIVE_TAG_CONFIDENCE: f32 = 0.9;

#[derive(Debug, Clone)]
pub struct CloudinaryConfig {
    pub cloud_name: String,
    pub api_key: String,
    pub api_secret: String,
    /// Folder namespace uploads land under; the user id is appended
    pub folder: String,
    /// API base, overridable for tests
    pub api_base: String,
}

impl CloudinaryConfig {
    pub fn new(
        cloud_name: impl Into<String>,
        api_key: impl Into<String>,
        api_secret: impl Into<String>,
    ) -> Self {
        Self {
            cloud_name: cloud_name.into(),
            api_key: api_key.into(),
            api_secret: api_secret.into(),
            folder: "aqua-forum".to_string(),
            api_base: "https://api.cloudinary.com/v1_1".to_string(),
        }
    }

    pub fn folder(mut self, folder: impl Into<String>) -> Self {
        self.folder = folder.into();
        self
    }
}

#[derive(Debug, Clone)]
pub struct CloudinaryStorage {
    client: reqwest::Client,
    config: CloudinaryConfig,
}

#[derive(Deserialize)]
struct CloudinaryUploadResponse {
    secure_url: String,
    public_id: String,
    bytes: u64,
}

#[derive(Deserialize)]
struct CloudinaryDestroyResponse {
    result: String,
}

#[derive(Deserialize)]
struct CloudinaryResourceResponse {
    #[serde(default)]
    tags: Vec<String>,
}

impl CloudinaryStorage {
    pub fn new(config: CloudinaryConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    /// Request signature per the signed-API rules: the alphabetically
    /// sorted `key=value` pairs (excluding `file` and `api_key`) with the
    /// secret appended, SHA-1, hex.
    fn sign(&self, sorted_params: &str) -> String {
        let mut hasher = Sha1::new();
        hasher.update(sorted_params.as_bytes());
        hasher.update(self.config.api_secret.as_bytes());
        hex::encode(hasher.finalize())
    }

    async fn upload_once(
        &self,
        bytes: &[u8],
        user_id: &str,
    ) -> Result<CloudinaryUploadResponse, StorageError> {
        let folder = format!("{}/{}", self.config.folder, user_id);
        let timestamp = chrono::Utc::now().timestamp().to_string();
        let signature = self.sign(&format!("folder={}&timestamp={}", folder, timestamp));
        let data_uri = format!("data:image/jpeg;base64,{}", BASE64.encode(bytes));

        let url = format!(
            "{}/{}/image/upload",
            self.config.api_base, self.config.cloud_name
        );
        let resp = self
            .client
            .post(&url)
            .form(&[
                ("file", data_uri.as_str()),
                ("folder", folder.as_str()),
                ("timestamp", timestamp.as_str()),
                ("api_key", self.config.api_key.as_str()),
                ("signature", signature.as_str()),
            ])
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

impl MediaStorage for CloudinaryStorage {
    fn provider_name(&self) -> &'static str {
        "cloudinary"
    }

    async fn upload(
        &self,
        bytes: &[u8],
        _filename: &str,
        user_id: &str,
    ) -> Result<UploadResult, StorageError> {
        let response = retry::with_backoff(UPLOAD_MAX_ATTEMPTS, UPLOAD_BACKOFF_BASE, || {
            self.upload_once(bytes, user_id)
        })
        .await?;

        Ok(UploadResult {
            url: insert_transform(&response.secure_url, AUTO_TRANSFORM),
            thumbnail_url: insert_transform(&response.secure_url, THUMBNAIL_TRANSFORM),
            original_url: response.secure_url,
            provider: "cloudinary".to_string(),
            metadata: UploadMetadata {
                filename: response.public_id,
                size: response.bytes,
            },
        })
    }

    async fn delete(&self, url: &str) -> Result<DeleteOutcome, StorageError> {
        let public_id =
            extract_public_id(url).ok_or_else(|| StorageError::InvalidUrl(url.to_string()))?;
        let timestamp = chrono::Utc::now().timestamp().to_string();
        let signature = self.sign(&format!("public_id={}&timestamp={}", public_id, timestamp));

        let endpoint = format!(
            "{}/{}/image/destroy",
            self.config.api_base, self.config.cloud_name
        );
        let resp = self
            .client
            .post(&endpoint)
            .form(&[
                ("public_id", public_id.as_str()),
                ("timestamp", timestamp.as_str()),
                ("api_key", self.config.api_key.as_str()),
                ("signature", signature.as_str()),
            ])
            .send()
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(StorageError::Http(status, body));
        }
        let body: CloudinaryDestroyResponse = resp
            .json()
            .await
            .map_err(|e| StorageError::InvalidResponse(e.to_string()))?;

        match body.result.as_str() {
            "ok" => Ok(DeleteOutcome::Deleted),
            "not found" => Ok(DeleteOutcome::NotFound),
            other => Err(StorageError::InvalidResponse(format!(
                "unexpected destroy result: {}",
                other
            ))),
        }
    }

    fn image_variants(&self, url: &str) -> ImageVariants {
        if !crate::types::is_remote_url(url) {
            return ImageVariants::uniform(url);
        }
        ImageVariants {
            thumbnail: insert_transform(url, THUMBNAIL_TRANSFORM),
            medium: insert_transform(url, MEDIUM_TRANSFORM),
            large: insert_transform(url, LARGE_TRANSFORM),
            original: url.to_string(),
        }
    }

    async fn native_tags(&self, url: &str) -> Result<Vec<NativeTag>, StorageError> {
        let public_id =
            extract_public_id(url).ok_or_else(|| StorageError::InvalidUrl(url.to_string()))?;
        // The Admin API takes basic auth rather than a request signature.
        let endpoint = format!(
            "{}/{}/resources/image/upload/{}",
            self.config.api_base, self.config.cloud_name, public_id
        );
        let resp = self
            .client
            .get(&endpoint)
            .basic_auth(&self.config.api_key, Some(&self.config.api_secret))
            .send()
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(StorageError::Http(status, body));
        }
        let body: CloudinaryResourceResponse = resp
            .json()
            .await
            .map_err(|e| StorageError::InvalidResponse(e.to_string()))?;

        Ok(body
            .tags
            .into_iter()
            .map(|tag| NativeTag {
                tag,
                confidence: NATIVE_TAG_CONFIDENCE,
                auto_generated: true,
            })
            .collect())
    }
}

/// Insert a transformation segment after `/upload/` in a delivery URL.
/// URLs without that marker pass through unchanged.
fn insert_transform(url: &str, transform: &str) -> String {
    match url.find("/upload/") {
        Some(idx) => {
            let split = idx + "/upload/".len();
            format!("{}{}/{}", &url[..split], transform, &url[split..])
        }
        None => url.to_string(),
    }
}

/// Recover the public id from a delivery URL: everything after
/// `/upload/`, minus any transformation segments, the `v<digits>`
/// version and the file extension.
fn extract_public_id(url: &str) -> Option<String> {
    let idx = url.find("/upload/")?;
    let rest = &url[idx + "/upload/".len()..];

    let segments: Vec<&str> = rest
        .split('/')
        .skip_while(|seg| {
            seg.contains(',')
                || (seg.len() > 1
                    && seg.starts_with('v')
                    && seg[1..].chars().all(|c| c.is_ascii_digit()))
        })
        .collect();
    if segments.is_empty() {
        return None;
    }

    let joined = segments.join("/");
    let without_ext = match joined.rfind('.') {
        Some(dot) if dot > joined.rfind('/').map_or(0, |s| s + 1) => &joined[..dot],
        _ => joined.as_str(),
    };
    if without_ext.is_empty() {
        None
    } else {
        Some(without_ext.to_string())
    }
}
