// 候補領域提案: 物体検出モデルの出力 → 面積フィルタ済み矩形

use std::sync::Arc;

use image::RgbImage;
use tracing::{debug, warn};

use super::{Detection, ObjectDetector, Rect};

/// Default minimum confidence passed to the object detector.
pub const DEFAULT_THRESHOLD: f32 = 0.2;

/// Proposals wider or taller than this share of the image are dropped.
pub const DEFAULT_MAX_PROPOSAL_RATIO: f64 = 0.7;

/// Turns an [`ObjectDetector`] into a list of areas of interest.
pub struct RegionProposer {
    detector: Arc<dyn ObjectDetector>,
    threshold: f32,
    max_ratio: f64,
}

impl RegionProposer {
    pub fn new(detector: Arc<dyn ObjectDetector>) -> Self {
        Self {
            detector,
            threshold: DEFAULT_THRESHOLD,
            max_ratio: DEFAULT_MAX_PROPOSAL_RATIO,
        }
    }

    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn with_max_ratio(mut self, max_ratio: f64) -> Self {
        self.max_ratio = max_ratio;
        self
    }

    /// 画像から候補領域（area of interest）を求める。
    ///
    /// `allow_full_region` が true の場合はモデルを実行せず、画像全体を覆う
    /// 矩形を1つだけ返す。それ以外では検出器の結果を整数ピクセルに丸め、
    /// 画像の幅または高さの `max_ratio` を超える矩形を除外する。
    /// 重複する候補の統合（NMS等）は行わない。
    pub fn propose(
        &self,
        image: &RgbImage,
        allow_full_region: bool,
    ) -> crate::error::Result<Vec<Rect>> {
        let (width, height) = image.dimensions();

        if allow_full_region {
            return Ok(vec![Rect::full(width, height)]);
        }

        let detections = self.detector.detect(image, self.threshold)?;
        let total = detections.len();

        let rects: Vec<Rect> = detections
            .iter()
            .filter_map(rounded_box)
            // 比率判定はクリップ前の矩形で行う
            .filter(|b| {
                !self.is_overlapping_full_image(
                    (b[2] - b[0]) as f64,
                    (b[3] - b[1]) as f64,
                    width,
                    height,
                )
            })
            .map(|b| clamp_box(b, width, height))
            .collect();

        debug!(
            detections = total,
            proposals = rects.len(),
            "region proposals filtered"
        );
        Ok(rects)
    }

    /// 矩形の幅または高さが画像の `max_ratio` を超えているか（厳密な `>`）。
    pub fn is_overlapping_full_image(
        &self,
        box_width: f64,
        box_height: f64,
        width: u32,
        height: u32,
    ) -> bool {
        if width == 0 || height == 0 {
            return true;
        }
        box_width / width as f64 > self.max_ratio || box_height / height as f64 > self.max_ratio
    }
}

/// Round a detection box to whole pixels.
///
/// Boxes with inverted corners or non-finite coordinates are dropped.
fn rounded_box(detection: &Detection) -> Option<[f32; 4]> {
    let [x0, y0, x1, y1] = detection.bbox.map(|v| v.round());
    if !(x0.is_finite() && y0.is_finite() && x1.is_finite() && y1.is_finite()) {
        warn!(bbox = ?detection.bbox, "dropping non-finite detection box");
        return None;
    }
    if x1 < x0 || y1 < y0 {
        warn!(bbox = ?detection.bbox, "dropping inverted detection box");
        return None;
    }
    Some([x0, y0, x1, y1])
}

/// Clip a rounded box to the image.
fn clamp_box(bbox: [f32; 4], width: u32, height: u32) -> Rect {
    let [x0, y0, x1, y1] = bbox;
    let to_px = |v: f32, max: u32| v.clamp(0.0, max as f32) as u32;
    let left = to_px(x0, width);
    let top = to_px(y0, height);
    let right = to_px(x1, width);
    let bottom = to_px(y1, height);
    let rect = Rect::new(left, top, right - left, bottom - top);

    if x0 < 0.0 || y0 < 0.0 || x1 > width as f32 || y1 > height as f32 {
        warn!(bbox = ?bbox, clamped = ?rect, "detection box exceeded image bounds, clamped");
    }
    rect
}
