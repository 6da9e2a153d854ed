//! Text tagging: derive tags from a post's title and body.
//!
//! Same external shape as the vision path, but the model gets no image
//! and returns a flat array of strings, so every tag carries the default
//! confidence.

use crate::client::{self, ServiceError};
use crate::parser;
use crate::types::{ScoredTag, TagOptions, TagReport, VisionConfig, DEFAULT_CONFIDENCE};
use reqwest::Client;
use std::time::Instant;

const TEXT_PROMPT_TEMPLATE: &str = r#"You are tagging forum posts for an aquarium hobbyist community. Based on the post below, return a JSON array of up to {max_tags} relevant tag strings. Tags should be lowercase single words or short phrases about species, equipment, water chemistry, diseases, or techniques.

Example: ["betta", "fin rot", "water change"]

Title: {title}

Post: {content}

Return ONLY the JSON array, no other text."#;

/// Tag a post's title and body. Never fails; check
/// [`TagReport::success`].
pub async fn generate_text_tags(
    client: &Client,
    config: &VisionConfig,
    title: &str,
    content: &str,
    options: &TagOptions,
) -> TagReport {
    let started = Instant::now();
    match try_generate_text_tags(client, config, title, content, options).await {
        Ok(tags) => TagReport::success(tags, &config.model, started.elapsed().as_millis() as u64),
        Err(e) => {
            tracing::warn!(error = %e, "text tagging failed");
            TagReport::failure(
                e.to_string(),
                &config.model,
                started.elapsed().as_millis() as u64,
            )
        }
    }
}

async fn try_generate_text_tags(
    client: &Client,
    config: &VisionConfig,
    title: &str,
    content: &str,
    options: &TagOptions,
) -> Result<Vec<ScoredTag>, ServiceError> {
    if config.probe_availability {
        client::probe(client, config).await?;
    }

    let prompt = match &options.prompt {
        Some(p) => p.clone(),
        None => TEXT_PROMPT_TEMPLATE
            .replace("{max_tags}", &options.max_tags.to_string())
            .replace("{title}", title)
            .replace("{content}", content),
    };

    let response = client::send_request(client, config, &prompt, None).await?;
    let tags = parser::parse_text_tags(&response, options)?;

    Ok(tags
        .into_iter()
        .map(|t| ScoredTag::new(t, DEFAULT_CONFIDENCE))
        .collect())
}
