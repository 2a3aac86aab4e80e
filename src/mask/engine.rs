// 画像単位: デコード → 候補領域提案 → 特徴検証 → 塗りつぶし/診断描画 → 再エンコード

use std::io::Cursor;
use std::path::Path;

use image::{GrayImage, ImageFormat, RgbImage};
use tracing::{debug, warn};

use super::draw::{
    AREA_OF_INTEREST_COLOR, DETECTED_FEATURE_COLOR, MASKABLE_AREA_COLOR, fill_areas,
    outline_areas,
};
use super::{MaskOptions, MaskingOutcome, encode_image, format_from_hint};
use crate::detect::Rect;
use crate::detect::proposer::RegionProposer;
use crate::detect::verifier::FeatureVerifier;
use crate::error::MaskError;

/// Default aspect ratio bounds for [`MaskingEngine::is_within_aspect_ratio`].
pub const DEFAULT_MIN_ASPECT: f64 = 0.5;
pub const DEFAULT_MAX_ASPECT: f64 = 2.0;

/// Default JPEG quality for re-encoding.
pub const DEFAULT_JPEG_QUALITY: u8 = 85;

/// The three rectangle sets produced for one image.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MaskedAreas {
    /// Unverified proposals.
    pub areas_of_interest: Vec<Rect>,
    /// Proposals confirmed by the verifier; these get redacted.
    pub maskable_areas: Vec<Rect>,
    /// Verifier matches translated to full-image coordinates (diagnostics only).
    pub detected_features: Vec<Rect>,
}

/// Decodes an image, finds maskable areas and redacts them.
pub struct MaskingEngine {
    proposer: RegionProposer,
    verifier: FeatureVerifier,
    min_aspect: f64,
    max_aspect: f64,
    jpeg_quality: u8,
}

impl MaskingEngine {
    pub fn new(proposer: RegionProposer, verifier: FeatureVerifier) -> Self {
        Self {
            proposer,
            verifier,
            min_aspect: DEFAULT_MIN_ASPECT,
            max_aspect: DEFAULT_MAX_ASPECT,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
        }
    }

    pub fn with_aspect_range(mut self, min_aspect: f64, max_aspect: f64) -> Self {
        self.min_aspect = min_aspect;
        self.max_aspect = max_aspect;
        self
    }

    pub fn with_jpeg_quality(mut self, quality: u8) -> Self {
        self.jpeg_quality = quality;
        self
    }

    /// ファイルを読み込み、拡張子を出力形式のヒントとしてマスクする。
    pub fn mask_file(
        &self,
        path: &Path,
        options: MaskOptions,
    ) -> crate::error::Result<MaskingOutcome> {
        let data = std::fs::read(path)?;
        let hint = path.extension().and_then(|e| e.to_str());
        self.mask_image_data(&data, hint, options)
    }

    /// 画像バイト列をマスクし、再エンコード済みバイト列とマスク数を返す。
    ///
    /// 出力形式は `extension_hint`（拡張子またはMIMEタイプ）、入力画像の形式、
    /// PNG の順に決まる。`options.draw_diagnostics` が true の場合は
    /// 塗りつぶしの代わりに枠線を描く（戻り値のマスク数は同じ意味を持つ）。
    pub fn mask_image_data(
        &self,
        data: &[u8],
        extension_hint: Option<&str>,
        options: MaskOptions,
    ) -> crate::error::Result<MaskingOutcome> {
        let (mut rgb, input_format) = decode_image(data)?;
        let gray = image::DynamicImage::ImageRgb8(rgb.clone()).to_luma8();

        let output_format = match extension_hint {
            Some(hint) => format_from_hint(hint).ok_or_else(|| {
                MaskError::encode(format!("unsupported output format hint '{hint}'"))
            })?,
            None => input_format.unwrap_or(ImageFormat::Png),
        };

        let areas = self.find_maskable_areas(&rgb, &gray, options.allow_full_mask)?;

        if options.draw_diagnostics {
            outline_areas(&mut rgb, &areas.areas_of_interest, AREA_OF_INTEREST_COLOR);
            outline_areas(&mut rgb, &areas.maskable_areas, MASKABLE_AREA_COLOR);
            outline_areas(&mut rgb, &areas.detected_features, DETECTED_FEATURE_COLOR);
        } else {
            fill_areas(&mut rgb, &areas.maskable_areas);
        }

        let data = encode_image(&rgb, output_format, self.jpeg_quality)?;
        debug!(
            proposals = areas.areas_of_interest.len(),
            masked = areas.maskable_areas.len(),
            format = ?output_format,
            "image masked"
        );

        Ok(MaskingOutcome {
            data,
            format: output_format,
            masked_areas: areas.maskable_areas.len(),
        })
    }

    /// 候補領域の提案と検証を行い、3種類の矩形集合を返す。
    pub fn find_maskable_areas(
        &self,
        rgb: &RgbImage,
        gray: &GrayImage,
        allow_full_mask: bool,
    ) -> crate::error::Result<MaskedAreas> {
        let areas_of_interest = self.proposer.propose(rgb, allow_full_mask)?;
        let (maskable_areas, detected_features) =
            self.detect_maskable_areas(gray, &areas_of_interest);

        Ok(MaskedAreas {
            areas_of_interest,
            maskable_areas,
            detected_features,
        })
    }

    /// Verify each area of interest and collect the confirmed ones.
    ///
    /// Returns `(maskable_areas, detected_features)`; features are translated
    /// into the coordinate space of `image`.
    pub fn detect_maskable_areas(
        &self,
        image: &GrayImage,
        areas_of_interest: &[Rect],
    ) -> (Vec<Rect>, Vec<Rect>) {
        let (width, height) = image.dimensions();
        let mut maskable = Vec::new();
        let mut features = Vec::new();

        for area in areas_of_interest {
            let (crop, clamped) = area.clamp_to(width, height);
            if clamped {
                warn!(area = ?area, clamped = ?crop, "area of interest exceeds image bounds");
            }
            if crop.is_empty() {
                continue;
            }

            let sub_image =
                image::imageops::crop_imm(image, crop.x, crop.y, crop.width, crop.height)
                    .to_image();
            let found = self.verifier.verify(&sub_image);
            if found.is_empty() {
                continue;
            }

            maskable.push(*area);
            for local in found {
                let (feature, clamped) = local.translate(&crop).clamp_to(width, height);
                if clamped {
                    warn!(feature = ?local, origin = ?crop, "detected feature exceeds image bounds");
                }
                if !feature.is_empty() {
                    features.push(feature);
                }
            }
        }

        (maskable, features)
    }

    /// Whether `rect` has a width/height ratio inside the configured range.
    ///
    /// Not consulted by the masking pipeline itself.
    pub fn is_within_aspect_ratio(&self, rect: &Rect) -> bool {
        if rect.height == 0 {
            return false;
        }
        let aspect = rect.width as f64 / rect.height as f64;
        (self.min_aspect..=self.max_aspect).contains(&aspect)
    }
}

/// バイト列をデコードし、RGB作業バッファと推定した入力形式を返す。
fn decode_image(data: &[u8]) -> crate::error::Result<(RgbImage, Option<ImageFormat>)> {
    let reader = image::ImageReader::new(Cursor::new(data))
        .with_guessed_format()
        .map_err(|e| MaskError::decode(e.to_string()))?;
    let format = reader.format();
    if format.is_none() {
        return Err(MaskError::decode("unrecognised image format"));
    }
    let decoded = reader
        .decode()
        .map_err(|e| MaskError::decode(e.to_string()))?;
    Ok((decoded.to_rgb8(), format))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::detect::{Detection, ObjectDetector, PatternDetector};

    struct NoObjects;

    impl ObjectDetector for NoObjects {
        fn detect(&self, _: &RgbImage, _: f32) -> crate::error::Result<Vec<Detection>> {
            Ok(Vec::new())
        }
    }

    /// 常に部分画像の左上に固定サイズの特徴を返す検出器
    struct Corner(u32);

    impl PatternDetector for Corner {
        fn name(&self) -> &str {
            "corner"
        }

        fn detect(&self, image: &GrayImage) -> Vec<Rect> {
            vec![Rect::new(0, 0, self.0.min(image.width()), self.0.min(image.height()))]
        }
    }

    fn engine(detectors: Vec<Arc<dyn PatternDetector>>) -> MaskingEngine {
        MaskingEngine::new(
            RegionProposer::new(Arc::new(NoObjects)),
            FeatureVerifier::new(detectors),
        )
    }

    #[test]
    fn test_aspect_ratio_bounds_inclusive() {
        let e = engine(Vec::new());
        assert!(e.is_within_aspect_ratio(&Rect::new(0, 0, 50, 100)));
        assert!(e.is_within_aspect_ratio(&Rect::new(0, 0, 200, 100)));
        assert!(e.is_within_aspect_ratio(&Rect::new(0, 0, 100, 100)));
        assert!(!e.is_within_aspect_ratio(&Rect::new(0, 0, 49, 100)));
        assert!(!e.is_within_aspect_ratio(&Rect::new(0, 0, 201, 100)));
        assert!(!e.is_within_aspect_ratio(&Rect::new(0, 0, 10, 0)));
    }

    #[test]
    fn test_aspect_ratio_custom_range() {
        let e = engine(Vec::new()).with_aspect_range(1.0, 1.0);
        assert!(e.is_within_aspect_ratio(&Rect::new(0, 0, 30, 30)));
        assert!(!e.is_within_aspect_ratio(&Rect::new(0, 0, 31, 30)));
    }

    #[test]
    fn test_features_are_translated_to_image_space() {
        let e = engine(vec![Arc::new(Corner(4))]);
        let gray = GrayImage::new(100, 100);
        let areas = [Rect::new(30, 40, 20, 20)];
        let (maskable, features) = e.detect_maskable_areas(&gray, &areas);
        assert_eq!(maskable, vec![Rect::new(30, 40, 20, 20)]);
        assert_eq!(features, vec![Rect::new(30, 40, 4, 4)]);
    }

    #[test]
    fn test_degenerate_area_yields_nothing() {
        let e = engine(vec![Arc::new(Corner(4))]);
        let gray = GrayImage::new(50, 50);
        let areas = [Rect::new(10, 10, 0, 20), Rect::new(60, 60, 10, 10)];
        let (maskable, features) = e.detect_maskable_areas(&gray, &areas);
        assert!(maskable.is_empty());
        assert!(features.is_empty());
    }

    #[test]
    fn test_partially_outside_area_is_clamped_for_verification() {
        let e = engine(vec![Arc::new(Corner(30))]);
        let gray = GrayImage::new(50, 50);
        let areas = [Rect::new(40, 40, 30, 30)];
        let (maskable, features) = e.detect_maskable_areas(&gray, &areas);
        // マスク領域は提案された矩形そのもの、特徴はクロップ範囲に収まる
        assert_eq!(maskable, vec![Rect::new(40, 40, 30, 30)]);
        assert_eq!(features, vec![Rect::new(40, 40, 10, 10)]);
        assert!(features.iter().all(|f| f.fits_within(50, 50)));
    }

    #[test]
    fn test_decode_failure_is_distinct() {
        let e = engine(Vec::new());
        let err = e
            .mask_image_data(b"definitely not an image", None, MaskOptions::default())
            .expect_err("garbage must not decode");
        assert!(matches!(err, MaskError::DecodeError(_)));
    }

    #[test]
    fn test_unknown_hint_is_rejected() {
        let e = engine(Vec::new());
        let img = RgbImage::new(4, 4);
        let png = encode_image(&img, ImageFormat::Png, 85).expect("encode");
        let err = e
            .mask_image_data(&png, Some("application/pdf"), MaskOptions::default())
            .expect_err("pdf is not an image format");
        assert!(matches!(err, MaskError::EncodeError(_)));
    }

    #[test]
    fn test_output_format_follows_input_without_hint() {
        let e = engine(Vec::new());
        let img = RgbImage::from_pixel(8, 8, image::Rgb([1, 2, 3]));
        let jpeg = encode_image(&img, ImageFormat::Jpeg, 85).expect("encode");
        let outcome = e
            .mask_image_data(&jpeg, None, MaskOptions::default())
            .expect("mask");
        assert_eq!(outcome.format, ImageFormat::Jpeg);
        assert_eq!(outcome.masked_areas, 0);
    }
}
