//! # aqua-media
//!
//! Pluggable media storage for the Aqua Forum photo pipeline: one
//! capability trait, three providers, selected once at startup from
//! configuration.
//!
//! ## Features
//!
//! - **Local filesystem** storage with per-user directories and
//!   collision-resistant filenames
//! - **Cloudinary-style CDN** with signed uploads, URL-segment
//!   transformations and provider-native AI tags
//! - **ShortPixel-style optimizer** with binary uploads and query-string
//!   resize parameters
//! - **Pure variant derivation**: thumbnail/medium/large URLs are
//!   rewritten from the original URL, never re-uploaded
//! - **Bounded exponential-backoff retry** on transient upload failures
//! - **Distinguishable delete outcomes**: `Deleted`, `NotFound` and
//!   `Unsupported` are separate results, not a collapsed boolean
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use aqua_media::{from_config, LocalConfig, MediaConfig, MediaStorage};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), aqua_media::StorageError> {
//!     let storage = from_config(MediaConfig::Local(LocalConfig::default()));
//!
//!     let bytes = std::fs::read("betta.jpg")?;
//!     let result = storage.upload(&bytes, "betta.jpg", "user-42").await?;
//!     println!("stored at {}", result.url);
//!
//!     let variants = storage.image_variants(&result.url);
//!     println!("thumbnail: {}", variants.thumbnail);
//!     Ok(())
//! }
//! ```

pub mod cloudinary;
pub mod error;
pub mod local;
mod retry;
pub mod shortpixel;
pub mod types;

pub use cloudinary::{CloudinaryConfig, CloudinaryStorage};
pub use error::StorageError;
pub use local::{LocalConfig, LocalStorage};
pub use shortpixel::{ShortPixelConfig, ShortPixelStorage};
pub use types::{
    is_remote_url, DeleteOutcome, ImageVariants, NativeTag, UploadMetadata, UploadResult,
};

/// Capability contract every provider implements.
///
/// `upload` and `delete` reach the provider; `image_variants` is pure
/// URL rewriting and must not touch the network.
pub trait MediaStorage: Send + Sync {
    fn provider_name(&self) -> &'static str;

    /// Store raw image bytes under the given user's namespace and return
    /// the canonical plus variant URLs.
    fn upload(
        &self,
        bytes: &[u8],
        filename: &str,
        user_id: &str,
    ) -> impl std::future::Future<Output = Result<UploadResult, StorageError>> + Send;

    /// Remove the asset a URL points at. Missing assets are
    /// [`DeleteOutcome::NotFound`], not errors; providers that cannot
    /// delete report [`DeleteOutcome::Unsupported`].
    fn delete(
        &self,
        url: &str,
    ) -> impl std::future::Future<Output = Result<DeleteOutcome, StorageError>> + Send;

    /// Derive size-variant URLs by rewriting. Non-remote URLs come back
    /// unchanged for every variant.
    fn image_variants(&self, url: &str) -> ImageVariants;

    /// Tags from the provider's own classifier, empty for providers
    /// without one. Distinct from the LLM tagging services.
    fn native_tags(
        &self,
        url: &str,
    ) -> impl std::future::Future<Output = Result<Vec<NativeTag>, StorageError>> + Send;

    /// The filesystem path behind a URL, for providers that store on
    /// local disk. Remote providers return `None`.
    fn local_path(&self, _url: &str) -> Option<std::path::PathBuf> {
        None
    }
}

/// Deployment-time provider selection.
#[derive(Debug, Clone)]
pub enum MediaConfig {
    Local(LocalConfig),
    Cloudinary(CloudinaryConfig),
    ShortPixel(ShortPixelConfig),
}

/// The configured provider as a tagged variant. Callers hold one of
/// these and stay unaware of which backend is active.
#[derive(Debug, Clone)]
pub enum AnyStorage {
    Local(LocalStorage),
    Cloudinary(CloudinaryStorage),
    ShortPixel(ShortPixelStorage),
}

/// Build the active provider from configuration. Called once at process
/// start; the result is passed into whatever needs storage.
pub fn from_config(config: MediaConfig) -> AnyStorage {
    match config {
        MediaConfig::Local(c) => AnyStorage::Local(LocalStorage::new(c)),
        MediaConfig::Cloudinary(c) => AnyStorage::Cloudinary(CloudinaryStorage::new(c)),
        MediaConfig::ShortPixel(c) => AnyStorage::ShortPixel(ShortPixelStorage::new(c)),
    }
}

impl MediaStorage for AnyStorage {
    fn provider_name(&self) -> &'static str {
        match self {
            AnyStorage::Local(s) => s.provider_name(),
            AnyStorage::Cloudinary(s) => s.provider_name(),
            AnyStorage::ShortPixel(s) => s.provider_name(),
        }
    }

    async fn upload(
        &self,
        bytes: &[u8],
        filename: &str,
        user_id: &str,
    ) -> Result<UploadResult, StorageError> {
        match self {
            AnyStorage::Local(s) => s.upload(bytes, filename, user_id).await,
            AnyStorage::Cloudinary(s) => s.upload(bytes, filename, user_id).await,
            AnyStorage::ShortPixel(s) => s.upload(bytes, filename, user_id).await,
        }
    }

    async fn delete(&self, url: &str) -> Result<DeleteOutcome, StorageError> {
        match self {
            AnyStorage::Local(s) => s.delete(url).await,
            AnyStorage::Cloudinary(s) => s.delete(url).await,
            AnyStorage::ShortPixel(s) => s.delete(url).await,
        }
    }

    fn image_variants(&self, url: &str) -> ImageVariants {
        match self {
            AnyStorage::Local(s) => s.image_variants(url),
            AnyStorage::Cloudinary(s) => s.image_variants(url),
            AnyStorage::ShortPixel(s) => s.image_variants(url),
        }
    }

    async fn native_tags(&self, url: &str) -> Result<Vec<NativeTag>, StorageError> {
        match self {
            AnyStorage::Local(s) => s.native_tags(url).await,
            AnyStorage::Cloudinary(s) => s.native_tags(url).await,
            AnyStorage::ShortPixel(s) => s.native_tags(url).await,
        }
    }

    fn local_path(&self, url: &str) -> Option<std::path::PathBuf> {
        match self {
            AnyStorage::Local(s) => s.local_path(url),
            AnyStorage::Cloudinary(s) => s.local_path(url),
            AnyStorage::ShortPixel(s) => s.local_path(url),
        }
    }
}
