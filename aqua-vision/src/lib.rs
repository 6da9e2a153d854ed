//! # aqua-vision
//!
//! LLM-backed image and text tagging services for the Aqua Forum
//! photo pipeline.
//!
//! ## Features
//!
//! - **Image tagging** against a vision-capable LLM endpoint, with the
//!   image sent as inline base64 (optionally downscaled and re-encoded
//!   as JPEG first)
//! - **Text tagging** for post title/body content using the same
//!   endpoint
//! - **Two protocol shapes** chosen by configuration: an Ollama-style
//!   `/api/generate` call with an inline `images` array, or an
//!   OpenAI-compatible `/chat/completions` call with an image content
//!   block
//! - **Availability probe** before the expensive tagging call, so an
//!   unreachable endpoint fails fast instead of burning the retry budget
//! - **Linear-backoff retry** on network errors and timeouts
//! - **Tiered response parser** that salvages tags from JSON objects,
//!   bare arrays, arrays embedded in prose, and free text
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use aqua_vision::{LlmTagger, TagOptions, VisionConfig, VisionTagger};
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = VisionConfig::with_model("llava");
//!     let tagger = LlmTagger::new(config);
//!
//!     let report = tagger
//!         .tag_image(Path::new("betta.jpg"), &TagOptions::default())
//!         .await;
//!
//!     if report.success {
//!         for tag in &report.tags {
//!             println!("{} ({:.2})", tag.tag, tag.confidence);
//!         }
//!     } else {
//!         eprintln!("tagging failed: {:?}", report.error);
//!     }
//! }
//! ```
//!
//! Tagging never returns an error: the [`TagReport`] carries a `success`
//! flag, the extracted tags and an error string, so callers decide what a
//! failure means for them. The queue worker in `aqua-pipeline` re-raises
//! failures to trigger queue-level retries; an HTTP handler might just
//! show the message.

pub mod client;
pub mod encode;
pub mod parser;
pub mod tagger;
pub mod text;
pub mod types;

pub use client::ServiceError;
pub use encode::EncodeError;
pub use parser::{parse_scored_tags, parse_text_tags, strip_think_tags, ParseError};
pub use types::{Protocol, ScoredTag, TagOptions, TagReport, VisionConfig};

use std::path::Path;

/// Capability seam for image tagging.
///
/// The pipeline worker is generic over this trait so tests can inject a
/// stub instead of a live endpoint.
pub trait VisionTagger: Send + Sync {
    /// Tag an image on the local filesystem. Never fails; check
    /// [`TagReport::success`].
    fn tag_image(
        &self,
        image_path: &Path,
        options: &TagOptions,
    ) -> impl std::future::Future<Output = TagReport> + Send;
}

/// Capability seam for text tagging.
pub trait TextTagger: Send + Sync {
    /// Tag a post's title and body. Never fails; check
    /// [`TagReport::success`].
    fn tag_text(
        &self,
        title: &str,
        content: &str,
        options: &TagOptions,
    ) -> impl std::future::Future<Output = TagReport> + Send;
}

/// The live LLM-backed tagger. Wraps a shared [`reqwest::Client`] and a
/// [`VisionConfig`]; cheap to clone.
#[derive(Clone)]
pub struct LlmTagger {
    client: reqwest::Client,
    config: VisionConfig,
}

impl LlmTagger {
    pub fn new(config: VisionConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    /// Reuse an existing HTTP client (connection pooling).
    pub fn with_client(client: reqwest::Client, config: VisionConfig) -> Self {
        Self { client, config }
    }

    pub fn config(&self) -> &VisionConfig {
        &self.config
    }
}

impl VisionTagger for LlmTagger {
    async fn tag_image(&self, image_path: &Path, options: &TagOptions) -> TagReport {
        tagger::generate_tags(&self.client, &self.config, image_path, options).await
    }
}

impl TextTagger for LlmTagger {
    async fn tag_text(&self, title: &str, content: &str, options: &TagOptions) -> TagReport {
        text::generate_text_tags(&self.client, &self.config, title, content, options).await
    }
}
