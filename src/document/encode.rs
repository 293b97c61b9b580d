//! Image encoding: rendered page or uploaded image → base64 inline attachment.
//!
//! Rendered pages are PNG-encoded; lossless compression keeps small print
//! crisp for the vision model. Uploaded PNG/JPEG files are forwarded as-is.

use crate::endpoint::InlineImage;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::DynamicImage;
use std::io::Cursor;
use tracing::debug;

/// Encode a rasterised page as a base64 PNG.
pub fn encode_page(img: &DynamicImage) -> Result<InlineImage, image::ImageError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;
    Ok(encode_bytes(&buf, "image/png"))
}

/// Wrap already-encoded image bytes.
pub fn encode_bytes(bytes: &[u8], mime_type: &str) -> InlineImage {
    let data = STANDARD.encode(bytes);
    debug!("Encoded {} → {} bytes base64", mime_type, data.len());
    InlineImage {
        mime_type: mime_type.to_string(),
        data,
    }
}
