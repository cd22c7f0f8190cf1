//! Image decoding into an RGBA8 pixel buffer.
//!
//! This is the first step of a request when the caller hands over raw
//! file bytes: bytes in, row-major `RgbaImage` out. Callers that already
//! hold a decoded buffer skip it.

use image::RgbaImage;

use crate::types::DigitizeError;

/// Decode raw image bytes into RGBA8.
///
/// Supports PNG, JPEG, BMP, and WebP (whatever the `image` crate was
/// built with).
///
/// # Errors
///
/// Returns [`DigitizeError::EmptyInput`] if `bytes` is empty.
/// Returns [`DigitizeError::ImageDecode`] if the image format is
/// unrecognized or the data is corrupt.
pub fn decode_rgba(bytes: &[u8]) -> Result<RgbaImage, DigitizeError> {
    if bytes.is_empty() {
        return Err(DigitizeError::EmptyInput);
    }

    let img = image::load_from_memory(bytes)?;
    Ok(img.to_rgba8())
}

/// Encode an RGBA image as PNG bytes. Test helper shared by the
/// module tests that need real file bytes.
#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub(crate) fn encode_png(img: &RgbaImage) -> Vec<u8> {
    let mut buf = Vec::new();
    let encoder = image::codecs::png::PngEncoder::new(&mut buf);
    image::ImageEncoder::write_image(
        encoder,
        img.as_raw(),
        img.width(),
        img.height(),
        image::ExtendedColorType::Rgba8,
    )
    .unwrap();
    buf
}
