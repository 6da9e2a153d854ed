use serde::{Deserialize, Serialize};

/// Result of a successful upload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadResult {
    /// Canonical serving URL (may carry auto-format/quality parameters)
    pub url: String,
    /// Derived thumbnail URL
    pub thumbnail_url: String,
    /// URL of the stored original, without transformations
    pub original_url: String,
    /// Provider that produced the URLs ("local", "cloudinary", "shortpixel")
    pub provider: String,
    pub metadata: UploadMetadata,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadMetadata {
    /// Filename as stored (local) or resource id (remote)
    pub filename: String,
    /// Size of the uploaded bytes
    pub size: u64,
}

/// Size-variant URLs for an already-stored image. Derivation is pure URL
/// rewriting; no network call and no re-upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageVariants {
    pub thumbnail: String,
    pub medium: String,
    pub large: String,
    /// Always the input URL, unchanged
    pub original: String,
}

impl ImageVariants {
    /// All variants resolve to the same URL (providers without real
    /// resizing).
    pub fn uniform(url: &str) -> Self {
        Self {
            thumbnail: url.to_string(),
            medium: url.to_string(),
            large: url.to_string(),
            original: url.to_string(),
        }
    }
}

/// What actually happened on delete. Callers treat `NotFound` as success
/// (the asset is gone either way) and `Unsupported` as
/// success-without-effect, but the three cases stay distinguishable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeleteOutcome {
    /// The provider removed the asset
    Deleted,
    /// Nothing to remove at that URL
    NotFound,
    /// The provider does not own the asset lifecycle and cannot delete
    Unsupported,
}

/// A tag sourced from a storage provider's own classifier, as opposed to
/// the LLM tagging services.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NativeTag {
    pub tag: String,
    pub confidence: f32,
    pub auto_generated: bool,
}

/// URL-shape routing used for delete: remote providers produce absolute
/// `http(s)` URLs, the local provider produces rooted paths.
pub fn is_remote_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}
