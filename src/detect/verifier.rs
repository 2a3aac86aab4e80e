use std::sync::Arc;

use image::GrayImage;
use tracing::debug;

use super::{PatternDetector, Rect};

/// Confirms areas of interest with an ordered list of pattern detectors.
///
/// The first detector that reports anything wins: its rectangles are returned
/// as-is and the remaining detectors are not run for that sub-image.
pub struct FeatureVerifier {
    detectors: Vec<Arc<dyn PatternDetector>>,
}

impl FeatureVerifier {
    pub fn new(detectors: Vec<Arc<dyn PatternDetector>>) -> Self {
        Self { detectors }
    }

    pub fn detector_names(&self) -> Vec<&str> {
        self.detectors.iter().map(|d| d.name()).collect()
    }

    /// 部分画像内の特徴矩形を返す（座標は部分画像ローカル）。
    pub fn verify(&self, sub_image: &GrayImage) -> Vec<Rect> {
        if sub_image.width() == 0 || sub_image.height() == 0 {
            return Vec::new();
        }

        for detector in &self.detectors {
            let found = detector.detect(sub_image);
            if !found.is_empty() {
                debug!(
                    detector = detector.name(),
                    matches = found.len(),
                    "feature confirmed"
                );
                return found;
            }
        }
        Vec::new()
    }
}
