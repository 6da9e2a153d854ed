//! Integration tests over the unified provider surface: the factory,
//! the variant round-trip property, and the local upload/delete cycle.

use aqua_media::{
    from_config, CloudinaryConfig, DeleteOutcome, ImageVariants, LocalConfig, MediaConfig,
    MediaStorage, ShortPixelConfig,
};

#[test]
fn variant_original_round_trips_for_every_provider() {
    let remote_url = "https://res.cloudinary.com/demo/image/upload/v1/aqua-forum/u1/a.jpg";
    let local_url = "/uploads/u1/a.jpg";

    let providers = [
        from_config(MediaConfig::Local(LocalConfig::default())),
        from_config(MediaConfig::Cloudinary(CloudinaryConfig::new(
            "demo", "key", "secret",
        ))),
        from_config(MediaConfig::ShortPixel(ShortPixelConfig::new("key"))),
    ];

    for provider in &providers {
        // Remote URL: the original variant is always the input URL.
        assert_eq!(provider.image_variants(remote_url).original, remote_url);
        // Local URL: every variant equals the input URL.
        assert_eq!(
            provider.image_variants(local_url),
            ImageVariants::uniform(local_url),
            "provider {}",
            provider.provider_name()
        );
    }
}

#[tokio::test]
async fn local_upload_then_delete_cycle() {
    let dir = tempfile::tempdir().unwrap();
    let storage = from_config(MediaConfig::Local(LocalConfig {
        root: dir.path().to_path_buf(),
        base_url: "/uploads".to_string(),
    }));

    let result = storage.upload(b"img", "guppy.jpg", "u7").await.unwrap();
    assert!(!aqua_media::is_remote_url(&result.url));

    assert_eq!(
        storage.delete(&result.url).await.unwrap(),
        DeleteOutcome::Deleted
    );
    assert_eq!(
        storage.delete(&result.url).await.unwrap(),
        DeleteOutcome::NotFound
    );
}

#[tokio::test]
async fn shortpixel_delete_reports_unsupported() {
    let storage = from_config(MediaConfig::ShortPixel(ShortPixelConfig::new("key")));
    let outcome = storage
        .delete("https://cdn.shortpixel.ai/client/aqua/u1/a.jpg")
        .await
        .unwrap();
    assert_eq!(outcome, DeleteOutcome::Unsupported);
}
