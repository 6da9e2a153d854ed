use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Wire protocol the tagging endpoint speaks. Chosen by configuration,
/// never auto-detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Protocol {
    /// Ollama-style single-turn `/api/generate` with an inline `images`
    /// array of base64 strings.
    Ollama,
    /// OpenAI-compatible `/chat/completions` with a multi-part user
    /// message carrying an `image_url` data URI.
    OpenAiChat,
}

/// Configuration for the tagging endpoint client.
#[derive(Debug, Clone)]
pub struct VisionConfig {
    /// Base URL (e.g. "http://localhost:11434")
    pub endpoint: String,
    /// Model identifier (e.g. "llava", "gpt-4o-mini")
    pub model: String,
    /// Optional bearer token sent as `Authorization: Bearer ...`
    pub api_key: Option<String>,
    /// Request/response shape
    pub protocol: Protocol,
    /// Per-request timeout (default: 120s)
    pub timeout: Duration,
    /// Maximum send attempts for the tagging call (default: 3)
    pub max_retries: u32,
    /// Backoff base; attempt N sleeps `base * N` before retrying
    pub retry_backoff: Duration,
    /// Probe the model-listing endpoint before tagging (default: true)
    pub probe_availability: bool,
    /// Images whose long side exceeds this are downscaled before
    /// encoding (default: 1024)
    pub max_long_side: u32,
    /// JPEG quality used when re-encoding (default: 85)
    pub jpeg_quality: u8,
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:11434".to_string(),
            model: "llava".to_string(),
            api_key: None,
            protocol: Protocol::Ollama,
            timeout: Duration::from_secs(120),
            max_retries: 3,
            retry_backoff: Duration::from_secs(2),
            probe_availability: true,
            max_long_side: 1024,
            jpeg_quality: 85,
        }
    }
}

impl VisionConfig {
    /// Create a config with the given model name.
    pub fn with_model(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ..Default::default()
        }
    }

    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn protocol(mut self, protocol: Protocol) -> Self {
        self.protocol = protocol;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    pub fn probe_availability(mut self, probe: bool) -> Self {
        self.probe_availability = probe;
        self
    }

    pub fn max_long_side(mut self, pixels: u32) -> Self {
        self.max_long_side = pixels;
        self
    }

    pub fn jpeg_quality(mut self, quality: u8) -> Self {
        self.jpeg_quality = quality;
        self
    }
}

/// Controls for tag extraction.
#[derive(Debug, Clone)]
pub struct TagOptions {
    /// Keep at most this many tags (default: 10)
    pub max_tags: usize,
    /// Drop tags scored below this (default: 0.3)
    pub min_confidence: f32,
    /// Custom prompt overriding the built-in one
    pub prompt: Option<String>,
}

impl Default for TagOptions {
    fn default() -> Self {
        Self {
            max_tags: 10,
            min_confidence: 0.3,
            prompt: None,
        }
    }
}

/// Confidence attached to tags the model did not score itself
/// (text tagging, free-text fallbacks).
pub const DEFAULT_CONFIDENCE: f32 = 0.7;

/// A single extracted tag with its confidence score (0-1).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredTag {
    pub tag: String,
    pub confidence: f32,
}

impl ScoredTag {
    pub fn new(tag: impl Into<String>, confidence: f32) -> Self {
        Self {
            tag: tag.into(),
            confidence,
        }
    }
}

/// Timing and provenance for a tagging call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TagMetadata {
    /// Model identifier that produced (or failed to produce) the tags
    pub model: String,
    /// Wall-clock duration of the call in milliseconds
    pub processing_ms: u64,
}

/// Outcome of a tagging call. Tagging never raises: callers must check
/// [`success`](TagReport::success).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TagReport {
    pub success: bool,
    pub tags: Vec<ScoredTag>,
    /// Present when `success` is false
    pub error: Option<String>,
    pub metadata: TagMetadata,
}

impl TagReport {
    pub fn success(tags: Vec<ScoredTag>, model: &str, processing_ms: u64) -> Self {
        Self {
            success: true,
            tags,
            error: None,
            metadata: TagMetadata {
                model: model.to_string(),
                processing_ms,
            },
        }
    }

    pub fn failure(error: impl Into<String>, model: &str, processing_ms: u64) -> Self {
        Self {
            success: false,
            tags: Vec::new(),
            error: Some(error.into()),
            metadata: TagMetadata {
                model: model.to_string(),
                processing_ms,
            },
        }
    }
}
