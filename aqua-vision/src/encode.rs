//! Image loading and inline encoding for the vision request.
//!
//! The tagging endpoint wants inline base64, and a shared GPU endpoint
//! has no use for a 12 MP original, so images are downscaled to a
//! configured long side and re-encoded as JPEG before encoding.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, GenericImageView};
use std::io::Cursor;
use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    #[error("Failed to open image {0}: {1}")]
    Open(String, String),

    #[error("Failed to encode image as JPEG: {0}")]
    Jpeg(String),
}

/// Downscale so neither dimension exceeds `max_long_side`, preserving
/// aspect ratio. Images already within bounds pass through untouched.
pub fn downscale(img: DynamicImage, max_long_side: u32) -> DynamicImage {
    let (width, height) = img.dimensions();
    if width > max_long_side || height > max_long_side {
        img.resize(
            max_long_side,
            max_long_side,
            image::imageops::FilterType::Triangle,
        )
    } else {
        img
    }
}

/// Encode as JPEG at the given quality.
pub fn encode_jpeg(img: &DynamicImage, quality: u8) -> Result<Vec<u8>, EncodeError> {
    let mut buf = Cursor::new(Vec::new());
    let encoder = JpegEncoder::new_with_quality(&mut buf, quality);
    img.write_with_encoder(encoder)
        .map_err(|e| EncodeError::Jpeg(e.to_string()))?;
    Ok(buf.into_inner())
}

/// Load an image from disk, downscale and re-encode, and return the
/// base64 string along with the MIME type (always JPEG after re-encode).
pub fn read_image_base64(
    path: &Path,
    max_long_side: u32,
    jpeg_quality: u8,
) -> Result<(String, &'static str), EncodeError> {
    let img = image::open(path)
        .map_err(|e| EncodeError::Open(path.display().to_string(), e.to_string()))?;
    let img = downscale(img, max_long_side);
    let bytes = encode_jpeg(&img, jpeg_quality)?;
    Ok((BASE64.encode(bytes), "image/jpeg"))
}
