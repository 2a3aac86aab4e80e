// 単体画像のマスキング: 候補提案 → 特徴検証 → 塗りつぶし/診断描画
//
// Detectors are deterministic stand-ins so the pipeline can be checked
// without model files.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use image::{GrayImage, ImageFormat, Rgb, RgbImage};

use face_masking::detect::proposer::RegionProposer;
use face_masking::detect::verifier::FeatureVerifier;
use face_masking::mask::draw::{DETECTED_FEATURE_COLOR, MASKABLE_AREA_COLOR};
use face_masking::mask::encode_image;
use face_masking::{
    Detection, MaskError, MaskOptions, MaskingEngine, ObjectDetector, PatternDetector, Rect,
};

// ============================================================
// Stub detectors
// ============================================================

/// 固定の検出結果を返し、呼び出し回数を数える物体検出器
struct FixedProposals {
    boxes: Vec<[f32; 4]>,
    calls: AtomicUsize,
}

impl FixedProposals {
    fn new(boxes: Vec<[f32; 4]>) -> Arc<Self> {
        Arc::new(Self {
            boxes,
            calls: AtomicUsize::new(0),
        })
    }
}

impl ObjectDetector for FixedProposals {
    fn detect(&self, _: &RgbImage, threshold: f32) -> face_masking::Result<Vec<Detection>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .boxes
            .iter()
            .map(|bbox| Detection {
                score: 0.9,
                label: 1,
                bbox: *bbox,
            })
            .filter(|d| d.score > threshold)
            .collect())
    }
}

struct BrokenModel;

impl ObjectDetector for BrokenModel {
    fn detect(&self, _: &RgbImage, _: f32) -> face_masking::Result<Vec<Detection>> {
        Err(MaskError::detection("model session lost"))
    }
}

/// 暗いピクセル（輝度 < 100）の外接矩形を「顔」として返す検出器
struct DarkBlob;

impl PatternDetector for DarkBlob {
    fn name(&self) -> &str {
        "dark_blob"
    }

    fn detect(&self, image: &GrayImage) -> Vec<Rect> {
        let mut bounds: Option<(u32, u32, u32, u32)> = None;
        for (x, y, p) in image.enumerate_pixels() {
            if p.0[0] < 100 {
                bounds = Some(match bounds {
                    None => (x, y, x, y),
                    Some((x0, y0, x1, y1)) => (x0.min(x), y0.min(y), x1.max(x), y1.max(y)),
                });
            }
        }
        bounds
            .map(|(x0, y0, x1, y1)| vec![Rect::new(x0, y0, x1 - x0 + 1, y1 - y0 + 1)])
            .unwrap_or_default()
    }
}

const WHITE: Rgb<u8> = Rgb([255, 255, 255]);
const BLACK: Rgb<u8> = Rgb([0, 0, 0]);

/// 200x200の白画像に 40x40 の黒い正方形（顔の代わり）を (80, 60) に置く
fn portrait() -> RgbImage {
    let mut img = RgbImage::from_pixel(200, 200, WHITE);
    for y in 60..100 {
        for x in 80..120 {
            img.put_pixel(x, y, BLACK);
        }
    }
    img
}

fn engine_with(detector: Arc<dyn ObjectDetector>) -> MaskingEngine {
    MaskingEngine::new(
        RegionProposer::new(detector),
        FeatureVerifier::new(vec![Arc::new(DarkBlob) as Arc<dyn PatternDetector>]),
    )
}

fn png(img: &RgbImage) -> Vec<u8> {
    encode_image(img, ImageFormat::Png, 85).expect("encode PNG fixture")
}

fn decode(data: &[u8]) -> RgbImage {
    image::load_from_memory(data).expect("decode output").to_rgb8()
}

// ============================================================
// 1. Frontal face → masked
// ============================================================

#[test]
fn test_face_image_is_redacted() {
    let proposals = FixedProposals::new(vec![[70.0, 50.0, 130.0, 110.0]]);
    let engine = engine_with(proposals.clone());

    let outcome = engine
        .mask_image_data(&png(&portrait()), Some("png"), MaskOptions::default())
        .expect("mask");

    assert_eq!(outcome.masked_areas, 1);
    assert_eq!(outcome.format, ImageFormat::Png);
    assert_eq!(proposals.calls.load(Ordering::SeqCst), 1);

    let out = decode(&outcome.data);
    for (x, y, p) in out.enumerate_pixels() {
        let inside = (70..130).contains(&x) && (50..110).contains(&y);
        if inside {
            assert_eq!(*p, BLACK, "({x},{y}) should be redacted");
        } else {
            assert_eq!(*p, WHITE, "({x},{y}) should be untouched");
        }
    }
}

// ============================================================
// 2. Blank image → nothing masked
// ============================================================

#[test]
fn test_blank_image_has_zero_count() {
    let engine = engine_with(FixedProposals::new(Vec::new()));
    let blank = RgbImage::from_pixel(120, 80, WHITE);

    let outcome = engine
        .mask_image_data(&png(&blank), None, MaskOptions::default())
        .expect("mask");

    assert_eq!(outcome.masked_areas, 0);
    assert_eq!(decode(&outcome.data), blank);
}

#[test]
fn test_unconfirmed_proposal_is_not_masked() {
    // 候補はあるが暗い領域を含まない → 検証で落ちる
    let engine = engine_with(FixedProposals::new(vec![[0.0, 0.0, 40.0, 40.0]]));
    let outcome = engine
        .mask_image_data(&png(&portrait()), None, MaskOptions::default())
        .expect("mask");
    assert_eq!(outcome.masked_areas, 0);
    assert_eq!(decode(&outcome.data), portrait());
}

// ============================================================
// 3. allow_full_mask
// ============================================================

#[test]
fn test_full_mask_skips_inference_and_masks_whole_image() {
    let proposals = FixedProposals::new(vec![[70.0, 50.0, 130.0, 110.0]]);
    let engine = engine_with(proposals.clone());
    let options = MaskOptions {
        allow_full_mask: true,
        draw_diagnostics: false,
    };

    let outcome = engine
        .mask_image_data(&png(&portrait()), None, options)
        .expect("mask");

    assert_eq!(proposals.calls.load(Ordering::SeqCst), 0, "no inference expected");
    assert_eq!(outcome.masked_areas, 1);
    assert!(decode(&outcome.data).pixels().all(|p| *p == BLACK));
}

#[test]
fn test_full_mask_yields_single_full_area() {
    let engine = engine_with(Arc::new(BrokenModel));
    let img = portrait();
    let gray = image::DynamicImage::ImageRgb8(img.clone()).to_luma8();

    let areas = engine
        .find_maskable_areas(&img, &gray, true)
        .expect("full mode never consults the model");
    assert_eq!(areas.areas_of_interest, vec![Rect::full(200, 200)]);
    assert_eq!(areas.maskable_areas, vec![Rect::full(200, 200)]);
    assert_eq!(areas.detected_features, vec![Rect::new(80, 60, 40, 40)]);
}

// ============================================================
// 4. Invariants
// ============================================================

#[test]
fn test_maskable_areas_are_proposals_and_features_in_bounds() {
    let engine = engine_with(FixedProposals::new(vec![
        [70.0, 50.0, 130.0, 110.0],
        [0.0, 0.0, 40.0, 40.0],
        // はみ出す候補もクリップして検証される
        [150.0, 150.0, 260.0, 260.0],
        // 重なる候補は両方残る
        [75.0, 55.0, 125.0, 105.0],
    ]));
    let img = portrait();
    let gray = image::DynamicImage::ImageRgb8(img.clone()).to_luma8();

    let areas = engine.find_maskable_areas(&img, &gray, false).expect("areas");

    assert!(
        areas
            .maskable_areas
            .iter()
            .all(|m| areas.areas_of_interest.contains(m))
    );
    assert_eq!(areas.maskable_areas.len(), 2);
    assert!(areas.detected_features.iter().all(|f| f.fits_within(200, 200)));
    assert!(
        areas
            .detected_features
            .iter()
            .all(|f| *f == Rect::new(80, 60, 40, 40))
    );
}

#[test]
fn test_oversized_proposal_is_rejected() {
    // 幅が画像の70%を超える候補は除外される
    let engine = engine_with(FixedProposals::new(vec![[0.0, 50.0, 150.0, 110.0]]));
    let outcome = engine
        .mask_image_data(&png(&portrait()), None, MaskOptions::default())
        .expect("mask");
    assert_eq!(outcome.masked_areas, 0);
}

// ============================================================
// 5. Diagnostics
// ============================================================

#[test]
fn test_diagnostics_draw_outlines_without_redaction() {
    let engine = engine_with(FixedProposals::new(vec![[70.0, 50.0, 130.0, 110.0]]));
    let options = MaskOptions {
        allow_full_mask: false,
        draw_diagnostics: true,
    };

    let outcome = engine
        .mask_image_data(&png(&portrait()), Some(".png"), options)
        .expect("mask");
    assert_eq!(outcome.masked_areas, 1);

    let out = decode(&outcome.data);
    assert_eq!(*out.get_pixel(70, 50), MASKABLE_AREA_COLOR);
    assert_eq!(*out.get_pixel(80, 60), DETECTED_FEATURE_COLOR);
    // 枠の内側で顔以外の部分は塗られていない
    assert_eq!(*out.get_pixel(75, 55), WHITE);
    assert_eq!(*out.get_pixel(10, 10), WHITE);
}

// ============================================================
// 6. Errors and formats
// ============================================================

#[test]
fn test_detector_failure_propagates() {
    let engine = engine_with(Arc::new(BrokenModel));
    let err = engine
        .mask_image_data(&png(&portrait()), None, MaskOptions::default())
        .expect_err("model failure must not look like 'nothing found'");
    assert!(err.is_detection());
}

#[test]
fn test_decode_failure_is_distinct_from_zero() {
    let engine = engine_with(FixedProposals::new(Vec::new()));
    let err = engine
        .mask_image_data(&[0xFF, 0xD8, 0x00, 0x01], None, MaskOptions::default())
        .expect_err("truncated JPEG");
    assert!(matches!(err, MaskError::DecodeError(_)));
}

#[test]
fn test_hint_selects_output_format() {
    let engine = engine_with(FixedProposals::new(vec![[70.0, 50.0, 130.0, 110.0]]));
    let outcome = engine
        .mask_image_data(&png(&portrait()), Some("image/jpeg"), MaskOptions::default())
        .expect("mask");
    assert_eq!(outcome.format, ImageFormat::Jpeg);
    assert_eq!(&outcome.data[..2], &[0xFF, 0xD8]);

    // JPEGは非可逆なので中心付近がほぼ黒であることだけ確認する
    let out = decode(&outcome.data);
    let p = out.get_pixel(100, 80);
    assert!(p.0.iter().all(|c| *c < 16), "expected near black, got {:?}", p.0);
}

#[test]
fn test_mask_file_uses_extension() {
    let dir = tempfile::tempdir().expect("create temp dir");
    let path = dir.path().join("portrait.png");
    std::fs::write(&path, png(&portrait())).expect("write fixture");

    let engine = engine_with(FixedProposals::new(vec![[70.0, 50.0, 130.0, 110.0]]));
    let outcome = engine
        .mask_file(&path, MaskOptions::default())
        .expect("mask file");
    assert_eq!(outcome.format, ImageFormat::Png);
    assert_eq!(outcome.masked_areas, 1);
}
