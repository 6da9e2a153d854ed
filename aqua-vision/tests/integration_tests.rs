//! Integration tests exercising the public surface of aqua-vision
//! without a live endpoint: the tiered parser, the encode path, and the
//! tagger traits with a stub implementation.

use aqua_vision::{
    parse_scored_tags, parse_text_tags, LlmTagger, Protocol, ScoredTag, TagOptions, TagReport,
    TextTagger, VisionConfig, VisionTagger,
};
use std::path::Path;

#[test]
fn parses_well_formed_object_response() {
    let response = r#"{"tags": [
        {"tag": "betta", "confidence": 0.95},
        {"tag": "planted tank", "confidence": 0.8},
        {"tag": "driftwood", "confidence": 0.55}
    ]}"#;

    let tags = parse_scored_tags(response, &TagOptions::default()).unwrap();
    assert_eq!(tags.len(), 3);
    assert_eq!(tags[0], ScoredTag::new("betta", 0.95));
}

#[test]
fn parses_object_wrapped_in_prose_and_code_fence() {
    let response = r#"Sure! Here are the tags for your photo:

```json
{"tags": [{"tag": "reef", "confidence": 0.9}, {"tag": "coral", "confidence": 0.85}]}
```

Let me know if you need anything else."#;

    let tags = parse_scored_tags(response, &TagOptions::default()).unwrap();
    let names: Vec<&str> = tags.iter().map(|t| t.tag.as_str()).collect();
    assert_eq!(names, vec!["reef", "coral"]);
}

#[test]
fn confidence_filter_applies_across_tiers() {
    let options = TagOptions {
        min_confidence: 0.5,
        ..Default::default()
    };
    let response =
        r#"{"tags": [{"tag": "guppy", "confidence": 0.9}, {"tag": "gravel", "confidence": 0.3}]}"#;

    let tags = parse_scored_tags(response, &options).unwrap();
    assert_eq!(tags.len(), 1);
    assert_eq!(tags[0].tag, "guppy");
}

#[test]
fn bare_array_of_strings_salvaged() {
    let tags = parse_scored_tags(r#"["angelfish", "freshwater"]"#, &TagOptions::default()).unwrap();
    assert_eq!(tags.len(), 2);
    // Unscored strings get the default confidence.
    assert!(tags.iter().all(|t| t.confidence > 0.0));
}

#[test]
fn text_tags_are_lowercased() {
    let tags = parse_text_tags(r#"["Betta", "FIN ROT"]"#, &TagOptions::default()).unwrap();
    assert_eq!(tags, vec!["betta", "fin rot"]);
}

#[test]
fn max_tags_truncates() {
    let options = TagOptions {
        max_tags: 2,
        ..Default::default()
    };
    let tags =
        parse_scored_tags(r#"["one", "two", "three", "four"]"#, &options).unwrap();
    assert_eq!(tags.len(), 2);
}

// A stub standing in for the live endpoint, showing the shape downstream
// workers program against.
struct CannedTagger {
    tags: Vec<ScoredTag>,
}

impl VisionTagger for CannedTagger {
    async fn tag_image(&self, _image_path: &Path, _options: &TagOptions) -> TagReport {
        TagReport::success(self.tags.clone(), "stub", 1)
    }
}

impl TextTagger for CannedTagger {
    async fn tag_text(&self, _title: &str, _content: &str, _options: &TagOptions) -> TagReport {
        TagReport::success(self.tags.clone(), "stub", 1)
    }
}

async fn tag_with<T: VisionTagger>(tagger: &T, path: &Path) -> TagReport {
    tagger.tag_image(path, &TagOptions::default()).await
}

#[tokio::test]
async fn generic_callers_accept_any_tagger() {
    let stub = CannedTagger {
        tags: vec![ScoredTag::new("shrimp", 0.9)],
    };
    let report = tag_with(&stub, Path::new("unused.jpg")).await;
    assert!(report.success);
    assert_eq!(report.tags[0].tag, "shrimp");

    // The live tagger satisfies the same bound.
    let live = LlmTagger::new(
        VisionConfig::with_model("llava")
            .endpoint("http://127.0.0.1:9")
            .protocol(Protocol::Ollama)
            .max_retries(1),
    );
    let report = tag_with(&live, Path::new("unused.jpg")).await;
    assert!(!report.success);
}

#[tokio::test]
async fn failed_report_carries_model_and_timing() {
    let tagger = LlmTagger::new(
        VisionConfig::with_model("llava")
            .endpoint("http://127.0.0.1:9")
            .max_retries(1),
    );
    let report = tagger
        .tag_image(Path::new("missing.jpg"), &TagOptions::default())
        .await;

    assert!(!report.success);
    assert!(report.tags.is_empty());
    assert_eq!(report.metadata.model, "llava");
    assert!(report.error.is_some());
}
