//! Vision tagging: encode an image inline and ask a vision-capable
//! model for scored tags.

use crate::client::{self, ServiceError};
use crate::encode;
use crate::parser;
use crate::types::{ScoredTag, TagOptions, TagReport, VisionConfig};
use reqwest::Client;
use std::path::Path;
use std::time::Instant;

const DEFAULT_VISION_PROMPT: &str = r#"You are tagging photos for an aquarium hobbyist community. Analyze the image and return a JSON object with a "tags" array. Each entry must have a "tag" (a single word or short phrase) and a "confidence" between 0 and 1.

Example: {"tags": [{"tag": "betta", "confidence": 0.95}, {"tag": "planted tank", "confidence": 0.8}]}

Focus on:
- Species (betta, guppy, cichlid, shrimp, coral)
- Setup (planted tank, reef, aquascape, nano tank)
- Equipment (heater, filter, co2 diffuser)
- Water type (freshwater, saltwater, brackish)
- Composition (close-up, full tank shot, macro)

Return ONLY the JSON object, no other text."#;

/// Tag an image file. This call never fails: the returned [`TagReport`]
/// carries a `success` flag and an error string for the failure case.
///
/// The sequence is availability probe (fail fast when the endpoint is
/// down), downscale + JPEG re-encode + base64, protocol-shaped request
/// with retries, then the tiered parse with confidence filtering.
pub async fn generate_tags(
    client: &Client,
    config: &VisionConfig,
    image_path: &Path,
    options: &TagOptions,
) -> TagReport {
    let started = Instant::now();
    match try_generate_tags(client, config, image_path, options).await {
        Ok(tags) => {
            let elapsed = started.elapsed().as_millis() as u64;
            tracing::debug!(
                path = %image_path.display(),
                tag_count = tags.len(),
                elapsed_ms = elapsed,
                "vision tagging succeeded"
            );
            TagReport::success(tags, &config.model, elapsed)
        }
        Err(e) => {
            let elapsed = started.elapsed().as_millis() as u64;
            tracing::warn!(
                path = %image_path.display(),
                error = %e,
                "vision tagging failed"
            );
            TagReport::failure(e.to_string(), &config.model, elapsed)
        }
    }
}

async fn try_generate_tags(
    client: &Client,
    config: &VisionConfig,
    image_path: &Path,
    options: &TagOptions,
) -> Result<Vec<ScoredTag>, ServiceError> {
    if config.probe_availability {
        client::probe(client, config).await?;
    }

    let (image_b64, _mime) =
        encode::read_image_base64(image_path, config.max_long_side, config.jpeg_quality)?;

    let prompt = options.prompt.as_deref().unwrap_or(DEFAULT_VISION_PROMPT);
    let response = client::send_request(client, config, prompt, Some(&image_b64)).await?;

    Ok(parser::parse_scored_tags(&response, options)?)
}
