//! Environment-driven configuration for the whole pipeline.
//!
//! Every knob has a default good enough for local development, so a bare
//! `PipelineConfig::from_env()` with an Ollama instance on the default
//! port is a working setup. Malformed values fall back to defaults;
//! missing credentials for a remote media provider are an error, not a
//! silent fallback.

use crate::error::PipelineError;
use aqua_media::{CloudinaryConfig, LocalConfig, MediaConfig, ShortPixelConfig};
use aqua_queue::QueueConfig;
use aqua_vision::{Protocol, TagOptions, VisionConfig};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub vision: VisionConfig,
    pub tag_options: TagOptions,
    pub queue: QueueConfig,
    pub media: MediaConfig,
    /// Forum database; `None` keeps it in memory.
    pub forum_db: Option<PathBuf>,
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

/// Protocol names accepted in `AQUA_LLM_PROTOCOL`. Unknown values keep
/// the Ollama default.
pub(crate) fn parse_protocol(value: &str) -> Protocol {
    match value.to_ascii_lowercase().as_str() {
        "openai" | "openai_chat" => Protocol::OpenAiChat,
        _ => Protocol::Ollama,
    }
}

/// Provider names accepted in `AQUA_MEDIA_PROVIDER`.
pub(crate) fn media_from_env(provider: &str) -> Result<MediaConfig, PipelineError> {
    match provider.to_ascii_lowercase().as_str() {
        "local" | "" => {
            let mut config = LocalConfig::default();
            if let Some(root) = env_opt("AQUA_UPLOAD_ROOT") {
                config.root = PathBuf::from(root);
            }
            if let Some(base) = env_opt("AQUA_UPLOAD_BASE_URL") {
                config.base_url = base;
            }
            Ok(MediaConfig::Local(config))
        }
        "cloudinary" => {
            let cloud = env_opt("AQUA_CLOUDINARY_CLOUD")
                .ok_or_else(|| PipelineError::Config("AQUA_CLOUDINARY_CLOUD not set".into()))?;
            let key = env_opt("AQUA_CLOUDINARY_KEY")
                .ok_or_else(|| PipelineError::Config("AQUA_CLOUDINARY_KEY not set".into()))?;
            let secret = env_opt("AQUA_CLOUDINARY_SECRET")
                .ok_or_else(|| PipelineError::Config("AQUA_CLOUDINARY_SECRET not set".into()))?;
            let mut config = CloudinaryConfig::new(&cloud, &key, &secret);
            if let Some(folder) = env_opt("AQUA_CLOUDINARY_FOLDER") {
                config = config.folder(&folder);
            }
            Ok(MediaConfig::Cloudinary(config))
        }
        "shortpixel" => {
            let key = env_opt("AQUA_SHORTPIXEL_KEY")
                .ok_or_else(|| PipelineError::Config("AQUA_SHORTPIXEL_KEY not set".into()))?;
            Ok(MediaConfig::ShortPixel(ShortPixelConfig::new(&key)))
        }
        other => Err(PipelineError::Config(format!(
            "unknown media provider: {other}"
        ))),
    }
}

impl PipelineConfig {
    pub fn from_env() -> Result<Self, PipelineError> {
        let vision = VisionConfig::with_model(&env_or("AQUA_LLM_MODEL", "llava"))
            .endpoint(&env_or("AQUA_LLM_URL", "http://localhost:11434"))
            .protocol(parse_protocol(&env_or("AQUA_LLM_PROTOCOL", "ollama")))
            .timeout(Duration::from_secs(env_parse("AQUA_LLM_TIMEOUT_SECS", 120)))
            .max_retries(env_parse("AQUA_LLM_MAX_RETRIES", 3))
            .max_long_side(env_parse("AQUA_MAX_LONG_SIDE", 1024))
            .jpeg_quality(env_parse("AQUA_JPEG_QUALITY", 85));
        let vision = match env_opt("AQUA_LLM_API_KEY") {
            Some(key) => vision.api_key(&key),
            None => vision,
        };

        let tag_options = TagOptions {
            max_tags: env_parse("AQUA_MAX_TAGS", 10),
            min_confidence: env_parse("AQUA_MIN_CONFIDENCE", 0.3),
            prompt: None,
        };

        let mut queue = QueueConfig::builder()
            .with_concurrency(env_parse("AQUA_QUEUE_CONCURRENCY", 2))
            .with_max_attempts(env_parse("AQUA_QUEUE_MAX_ATTEMPTS", 3))
            .with_backoff_base(Duration::from_secs(env_parse("AQUA_QUEUE_BACKOFF_SECS", 5)))
            .with_job_timeout(Duration::from_secs(env_parse("AQUA_JOB_TIMEOUT_SECS", 120)))
            .with_retention_days(env_parse("AQUA_QUEUE_RETENTION_DAYS", 7));
        if let Some(db) = env_opt("AQUA_QUEUE_DB") {
            queue = queue.with_db_path(PathBuf::from(db));
        }
        let queue = queue.build();

        let media = media_from_env(&env_or("AQUA_MEDIA_PROVIDER", "local"))?;
        let forum_db = env_opt("AQUA_FORUM_DB").map(PathBuf::from);

        Ok(Self {
            vision,
            tag_options,
            queue,
            media,
            forum_db,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protocol_parsing() {
        assert_eq!(parse_protocol("openai"), Protocol::OpenAiChat);
        assert_eq!(parse_protocol("OpenAI_Chat"), Protocol::OpenAiChat);
        assert_eq!(parse_protocol("ollama"), Protocol::Ollama);
        assert_eq!(parse_protocol("anything-else"), Protocol::Ollama);
    }

    #[test]
    fn unknown_provider_rejected() {
        assert!(matches!(
            media_from_env("s3"),
            Err(PipelineError::Config(_))
        ));
    }

    #[test]
    fn cloudinary_requires_credentials() {
        // Env untouched in tests, so the credential vars are unset.
        assert!(matches!(
            media_from_env("cloudinary"),
            Err(PipelineError::Config(_))
        ));
    }

    #[test]
    fn local_provider_is_default_shaped() {
        let config = media_from_env("local").unwrap();
        assert!(matches!(config, MediaConfig::Local(_)));
    }
}
