//! Tiered LLM response parser.
//!
//! Models are prompted for JSON but comply erratically, so extraction
//! falls through three tiers from most to least structured:
//!
//! 1. JSON object with a `tags` array of `{tag, confidence}` entries
//! 2. Bare JSON array (scored objects or plain strings), including
//!    arrays embedded in surrounding prose
//! 3. Free-text fallback: quoted substrings, else word-like tokens
//!
//! The text-tagging variant adds a final whitespace-split tier.
//!
//! `<think>...</think>` reasoning blocks and markdown code fences are
//! stripped before any tier runs. Every tier filters entries below
//! `min_confidence` and truncates to `max_tags`.

use crate::types::{ScoredTag, TagOptions, DEFAULT_CONFIDENCE};

/// Parse a vision-model response into scored tags.
pub fn parse_scored_tags(
    response: &str,
    options: &TagOptions,
) -> Result<Vec<ScoredTag>, ParseError> {
    let trimmed = response.trim();
    if trimmed.is_empty() {
        return Err(ParseError::EmptyResponse);
    }

    let cleaned = strip_think_tags(trimmed);
    let cleaned = cleaned.trim();
    let unfenced = extract_code_block(cleaned);
    let cleaned = unfenced.as_deref().unwrap_or(cleaned);

    // Tier 1: JSON object with a "tags" key
    if let Some(tags) = object_tags(cleaned) {
        return finish(tags, options);
    }

    // Tier 2: bare JSON array, direct or embedded in prose
    if let Some(tags) = array_tags(cleaned) {
        return finish(tags, options);
    }
    if let Some(tags) = find_embedded_tags(cleaned) {
        return finish(tags, options);
    }

    // Tier 3: quoted substrings, else word-like tokens
    let tags = quoted_strings(cleaned)
        .or_else(|| word_tokens(cleaned))
        .unwrap_or_default();
    if tags.is_empty() {
        return Err(ParseError::Unparseable(cleaned.to_string()));
    }
    finish(tags, options)
}

/// Parse a text-model response into lowercase tag strings.
///
/// Mirrors [`parse_scored_tags`] but targets a flat array of strings and
/// adds a final whitespace/punctuation-split tier, since the text path
/// gets no per-tag confidence from the model.
pub fn parse_text_tags(response: &str, options: &TagOptions) -> Result<Vec<String>, ParseError> {
    let trimmed = response.trim();
    if trimmed.is_empty() {
        return Err(ParseError::EmptyResponse);
    }

    let cleaned = strip_think_tags(trimmed);
    let cleaned = cleaned.trim();
    let unfenced = extract_code_block(cleaned);
    let cleaned = unfenced.as_deref().unwrap_or(cleaned);

    let scored = object_tags(cleaned)
        .or_else(|| array_tags(cleaned))
        .or_else(|| find_embedded_tags(cleaned))
        .or_else(|| quoted_strings(cleaned))
        // Tier 4: split on whitespace/punctuation and deduplicate
        .or_else(|| word_tokens(cleaned));

    match scored {
        Some(tags) => {
            let tags = finish(tags, options)?;
            Ok(tags.into_iter().map(|t| t.tag.to_lowercase()).collect())
        }
        None => Err(ParseError::Unparseable(cleaned.to_string())),
    }
}

/// Strip `<think>...</think>` blocks emitted by reasoning models.
///
/// An unclosed block is stripped to the end of the text.
pub fn strip_think_tags(text: &str) -> String {
    let mut result = text.to_string();
    while let Some(start) = result.find("<think>") {
        if let Some(end) = result[start..].find("</think>") {
            result = format!("{}{}", &result[..start], &result[start + end + 8..]);
        } else {
            result = result[..start].to_string();
            break;
        }
    }
    result
}

/// Parse error for tag extraction.
#[derive(Debug)]
pub enum ParseError {
    /// The response was empty or whitespace-only
    EmptyResponse,
    /// No tier could extract any tags
    Unparseable(String),
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParseError::EmptyResponse => write!(f, "Empty LLM response"),
            ParseError::Unparseable(s) => {
                write!(f, "Could not parse tags from LLM response: {}", s)
            }
        }
    }
}

impl std::error::Error for ParseError {}

/// Normalize, filter by confidence, deduplicate case-insensitively and
/// truncate. Applied at the end of every tier.
fn finish(tags: Vec<ScoredTag>, options: &TagOptions) -> Result<Vec<ScoredTag>, ParseError> {
    let mut seen = std::collections::HashSet::new();
    let kept: Vec<ScoredTag> = tags
        .into_iter()
        .map(|t| ScoredTag {
            tag: t.tag.trim().to_string(),
            confidence: t.confidence,
        })
        .filter(|t| {
            !t.tag.is_empty()
                && t.tag.len() < 50
                && t.confidence >= options.min_confidence
                && seen.insert(t.tag.to_lowercase())
        })
        .take(options.max_tags)
        .collect();
    Ok(kept)
}

/// Interpret a JSON value as a tag entry: either a plain string (default
/// confidence) or an object with `tag` and optional `confidence` keys.
fn value_to_tag(value: &serde_json::Value) -> Option<ScoredTag> {
    if let Some(s) = value.as_str() {
        return Some(ScoredTag::new(s, DEFAULT_CONFIDENCE));
    }
    let obj = value.as_object()?;
    let tag = obj.get("tag").and_then(|v| v.as_str())?;
    let confidence = obj
        .get("confidence")
        .and_then(|v| v.as_f64())
        .map(|c| c as f32)
        .unwrap_or(DEFAULT_CONFIDENCE);
    Some(ScoredTag::new(tag, confidence))
}

fn values_to_tags(values: &[serde_json::Value]) -> Option<Vec<ScoredTag>> {
    let tags: Vec<ScoredTag> = values.iter().filter_map(value_to_tag).collect();
    if tags.is_empty() {
        None
    } else {
        Some(tags)
    }
}

/// Tier 1: parse as a JSON object and read its `tags` array. Also finds
/// an object embedded in prose by brace matching.
fn object_tags(text: &str) -> Option<Vec<ScoredTag>> {
    if let Ok(val) = serde_json::from_str::<serde_json::Value>(text) {
        if let Some(arr) = val.get("tags").and_then(|v| v.as_array()) {
            return values_to_tags(arr);
        }
    }

    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end <= start {
        return None;
    }
    let val: serde_json::Value = serde_json::from_str(&text[start..=end]).ok()?;
    let arr = val.get("tags").and_then(|v| v.as_array())?;
    values_to_tags(arr)
}

/// Tier 2a: the whole response is a JSON array.
fn array_tags(text: &str) -> Option<Vec<ScoredTag>> {
    let val: serde_json::Value = serde_json::from_str(text).ok()?;
    values_to_tags(val.as_array()?)
}

/// Tier 2b: bracket-matched array search through surrounding prose,
/// preferring later occurrences (models often restate the answer last).
fn find_embedded_tags(text: &str) -> Option<Vec<ScoredTag>> {
    let starts: Vec<usize> = text.match_indices('[').map(|(i, _)| i).collect();
    let ends: Vec<usize> = text.match_indices(']').map(|(i, _)| i).collect();

    for &start in starts.iter().rev() {
        for &end in ends.iter().rev() {
            if end <= start {
                continue;
            }
            if let Ok(val) = serde_json::from_str::<serde_json::Value>(&text[start..=end]) {
                if let Some(arr) = val.as_array() {
                    if let Some(tags) = values_to_tags(arr) {
                        return Some(tags);
                    }
                }
            }
        }
    }
    None
}

/// Tier 3a: collect double-quoted substrings.
fn quoted_strings(text: &str) -> Option<Vec<ScoredTag>> {
    let mut tags = Vec::new();
    let mut rest = text;
    while let Some(open) = rest.find('"') {
        let after = &rest[open + 1..];
        match after.find('"') {
            Some(close) => {
                let inner = after[..close].trim();
                if !inner.is_empty() {
                    tags.push(ScoredTag::new(inner, DEFAULT_CONFIDENCE));
                }
                rest = &after[close + 1..];
            }
            None => break,
        }
    }
    if tags.is_empty() {
        None
    } else {
        Some(tags)
    }
}

/// Tier 3b/4: split on whitespace and punctuation, keeping word-like
/// tokens of three or more characters.
fn word_tokens(text: &str) -> Option<Vec<ScoredTag>> {
    let tags: Vec<ScoredTag> = text
        .split(|c: char| c.is_whitespace() || (c.is_ascii_punctuation() && c != '-'))
        .map(|s| s.trim())
        .filter(|s| s.len() >= 3 && s.chars().all(|c| c.is_alphanumeric() || c == '-'))
        .map(|s| ScoredTag::new(s, DEFAULT_CONFIDENCE))
        .collect();
    if tags.is_empty() {
        None
    } else {
        Some(tags)
    }
}

/// Return the contents of the first markdown code fence, if any.
fn extract_code_block(text: &str) -> Option<String> {
    for marker in ["```json", "```JSON", "```"] {
        if let Some(start) = text.find(marker) {
            let content_start = start + marker.len();
            if let Some(end) = text[content_start..].find("```") {
                return Some(text[content_start..content_start + end].trim().to_string());
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opts() -> TagOptions {
        TagOptions::default()
    }

    fn names(tags: &[ScoredTag]) -> Vec<&str> {
        tags.iter().map(|t| t.tag.as_str()).collect()
    }

    // -- Tier 1: JSON object --

    #[test]
    fn parse_scored_object() {
        let input = r#"{"tags": [{"tag": "betta", "confidence": 0.9}, {"tag": "freshwater", "confidence": 0.8}]}"#;
        let tags = parse_scored_tags(input, &opts()).unwrap();
        assert_eq!(names(&tags), vec!["betta", "freshwater"]);
        assert!((tags[0].confidence - 0.9).abs() < 1e-6);
    }

    #[test]
    fn parse_object_with_string_entries() {
        let input = r#"{"tags": ["betta", "aquascape"]}"#;
        let tags = parse_scored_tags(input, &opts()).unwrap();
        assert_eq!(names(&tags), vec!["betta", "aquascape"]);
        assert!((tags[0].confidence - DEFAULT_CONFIDENCE).abs() < 1e-6);
    }

    #[test]
    fn parse_object_embedded_in_prose() {
        let input = r#"Here you go: {"tags": [{"tag": "coral", "confidence": 0.8}]} hope that helps"#;
        let tags = parse_scored_tags(input, &opts()).unwrap();
        assert_eq!(names(&tags), vec!["coral"]);
    }

    #[test]
    fn confidence_filter_applies() {
        let input = r#"{"tags": [{"tag": "betta", "confidence": 0.9}, {"tag": "freshwater", "confidence": 0.3}]}"#;
        let options = TagOptions {
            min_confidence: 0.5,
            ..TagOptions::default()
        };
        let tags = parse_scored_tags(input, &options).unwrap();
        assert_eq!(names(&tags), vec!["betta"]);
    }

    // -- Tier 2: bare and embedded arrays --

    #[test]
    fn parse_bare_array() {
        let input = r#"["guppy", "planted tank", "moss"]"#;
        let tags = parse_scored_tags(input, &opts()).unwrap();
        assert_eq!(names(&tags), vec!["guppy", "planted tank", "moss"]);
    }

    #[test]
    fn parse_array_in_prose() {
        let input = r#"Sure! The tags are ["cichlid", "rockscape"] based on the image."#;
        let tags = parse_scored_tags(input, &opts()).unwrap();
        assert_eq!(names(&tags), vec!["cichlid", "rockscape"]);
    }

    #[test]
    fn embedded_array_truncates_to_max_tags() {
        let input = r#"Tags: ["a1a", "b2b", "c3c", "d4d", "e5e"] done."#;
        let options = TagOptions {
            max_tags: 3,
            ..TagOptions::default()
        };
        let tags = parse_scored_tags(input, &options).unwrap();
        assert_eq!(tags.len(), 3);
        assert_eq!(names(&tags), vec!["a1a", "b2b", "c3c"]);
    }

    #[test]
    fn parse_with_think_block() {
        let input = "<think>\nlet me look at the fish...\n</think>\n[\"betta\", \"macro\"]";
        let tags = parse_scored_tags(input, &opts()).unwrap();
        assert_eq!(names(&tags), vec!["betta", "macro"]);
    }

    #[test]
    fn parse_code_fence() {
        let input = "```json\n{\"tags\": [{\"tag\": \"shrimp\", \"confidence\": 0.95}]}\n```";
        let tags = parse_scored_tags(input, &opts()).unwrap();
        assert_eq!(names(&tags), vec!["shrimp"]);
    }

    // -- Tier 3: free text --

    #[test]
    fn parse_quoted_substrings() {
        let input = r#"The relevant tags would be "driftwood" and "blackwater"."#;
        let tags = parse_scored_tags(input, &opts()).unwrap();
        assert_eq!(names(&tags), vec!["driftwood", "blackwater"]);
    }

    #[test]
    fn parse_word_tokens_last_resort() {
        let input = "nano reef zoanthid";
        let tags = parse_scored_tags(input, &opts()).unwrap();
        assert_eq!(names(&tags), vec!["nano", "reef", "zoanthid"]);
    }

    // -- Hygiene --

    #[test]
    fn deduplicates_case_insensitively() {
        let input = r#"["Betta", "betta", "BETTA", "guppy"]"#;
        let tags = parse_scored_tags(input, &opts()).unwrap();
        assert_eq!(names(&tags), vec!["Betta", "guppy"]);
    }

    #[test]
    fn empty_response_fails() {
        assert!(matches!(
            parse_scored_tags("", &opts()),
            Err(ParseError::EmptyResponse)
        ));
        assert!(matches!(
            parse_scored_tags("   \n ", &opts()),
            Err(ParseError::EmptyResponse)
        ));
    }

    #[test]
    fn strip_think_tags_variants() {
        assert_eq!(strip_think_tags("<think>x</think>rest"), "rest");
        assert_eq!(strip_think_tags("<think>never closed"), "");
        assert_eq!(strip_think_tags("<think>a</think>m<think>b</think>e"), "me");
        assert_eq!(strip_think_tags("plain"), "plain");
    }

    // -- Text variant --

    #[test]
    fn text_tags_are_lowercased() {
        let input = r#"["Betta Care", "Water Changes"]"#;
        let tags = parse_text_tags(input, &opts()).unwrap();
        assert_eq!(tags, vec!["betta care", "water changes"]);
    }

    #[test]
    fn text_tags_whitespace_fallback() {
        let input = "substrate lighting co2-injection";
        let tags = parse_text_tags(input, &opts()).unwrap();
        assert_eq!(tags, vec!["substrate", "lighting", "co2-injection"]);
    }

    #[test]
    fn text_tags_object_form() {
        let input = r#"{"tags": ["Cycling", "ammonia"]}"#;
        let tags = parse_text_tags(input, &opts()).unwrap();
        assert_eq!(tags, vec!["cycling", "ammonia"]);
    }
}
