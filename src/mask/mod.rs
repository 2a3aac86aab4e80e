pub mod draw;
pub mod engine;

use std::io::Cursor;

use image::{ImageFormat, RgbImage};

use crate::error::MaskError;

/// Per-call switches of [`engine::MaskingEngine::mask_image_data`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MaskOptions {
    /// Treat the whole image as a single candidate; no model inference.
    pub allow_full_mask: bool,
    /// Draw outlines of every rectangle instead of redacting.
    pub draw_diagnostics: bool,
}

/// Re-encoded image plus the number of areas that were masked.
///
/// `masked_areas == 0` means nothing was found; the bytes may still differ
/// from the input because of recompression.
#[derive(Debug, Clone)]
pub struct MaskingOutcome {
    pub data: Vec<u8>,
    pub format: ImageFormat,
    pub masked_areas: usize,
}

/// 拡張子またはMIMEタイプのヒントから画像形式を決める。
///
/// `"png"`, `".jpg"`, `"image/jpeg"` のいずれの形でも受け付ける。
pub fn format_from_hint(hint: &str) -> Option<ImageFormat> {
    let hint = hint.trim();
    if hint.contains('/') {
        return ImageFormat::from_mime_type(hint);
    }
    ImageFormat::from_extension(hint.trim_start_matches('.'))
}

/// 作業バッファを指定形式でエンコードする。
pub fn encode_image(
    image: &RgbImage,
    format: ImageFormat,
    jpeg_quality: u8,
) -> crate::error::Result<Vec<u8>> {
    let mut buf = Cursor::new(Vec::new());
    match format {
        ImageFormat::Jpeg => {
            let encoder =
                image::codecs::jpeg::JpegEncoder::new_with_quality(&mut buf, jpeg_quality);
            image.write_with_encoder(encoder)?;
        }
        other => {
            image.write_to(&mut buf, other).map_err(|e| {
                MaskError::encode(format!("cannot encode as {other:?}: {e}"))
            })?;
        }
    }
    Ok(buf.into_inner())
}
