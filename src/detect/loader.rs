// 検出器の読み込み: 設定からモデルを一度だけロードし、ジョブ間で共有する

use std::sync::Arc;

use image::RgbImage;
use tracing::{info, warn};

use super::proposer::RegionProposer;
use super::verifier::FeatureVerifier;
use super::{Detection, ObjectDetector, PatternDetector};
use crate::config::settings::{PatternDetectorSpec, PatternEngine, Settings};
use crate::error::MaskError;
use crate::mask::engine::MaskingEngine;

/// Stand-in used when no object detection model is configured.
///
/// Every call fails with a detection error, so images that need inference
/// are reported rather than silently passed through. Full-region mode never
/// reaches the detector and keeps working.
pub struct UnconfiguredDetector;

impl ObjectDetector for UnconfiguredDetector {
    fn detect(&self, _: &RgbImage, _: f32) -> crate::error::Result<Vec<Detection>> {
        Err(MaskError::detection("no detection model configured"))
    }
}

/// Loaded detection capabilities.
#[derive(Clone)]
pub struct DetectorStack {
    pub object_detector: Arc<dyn ObjectDetector>,
    pub pattern_detectors: Vec<Arc<dyn PatternDetector>>,
}

impl DetectorStack {
    /// 設定に従ってモデルを読み込む。
    pub fn load(settings: &Settings) -> crate::error::Result<Self> {
        let object_detector = load_object_detector(settings)?;
        let pattern_detectors = settings
            .pattern_detectors
            .iter()
            .map(load_pattern_detector)
            .collect::<crate::error::Result<Vec<_>>>()?;

        if pattern_detectors.is_empty() {
            warn!("no pattern detectors configured; nothing will be masked");
        }

        Ok(Self {
            object_detector,
            pattern_detectors,
        })
    }

    /// 設定値で調整済みの [`MaskingEngine`] を組み立てる。
    pub fn build_engine(&self, settings: &Settings) -> MaskingEngine {
        let proposer = RegionProposer::new(Arc::clone(&self.object_detector))
            .with_threshold(settings.detection_threshold)
            .with_max_ratio(settings.max_proposal_ratio);
        let verifier = FeatureVerifier::new(self.pattern_detectors.clone());

        MaskingEngine::new(proposer, verifier)
            .with_aspect_range(settings.min_aspect, settings.max_aspect)
            .with_jpeg_quality(settings.jpeg_quality)
    }
}

#[cfg(feature = "onnx")]
fn load_object_detector(settings: &Settings) -> crate::error::Result<Arc<dyn ObjectDetector>> {
    match &settings.detection_model {
        Some(path) => {
            let detector = super::onnx::OnnxObjectDetector::new(path, settings.model_input_size)?;
            info!(model = %path.display(), "object detection model loaded");
            Ok(Arc::new(detector))
        }
        None => {
            warn!("detection_model not set; only full-region masking is available");
            Ok(Arc::new(UnconfiguredDetector))
        }
    }
}

#[cfg(not(feature = "onnx"))]
fn load_object_detector(settings: &Settings) -> crate::error::Result<Arc<dyn ObjectDetector>> {
    if settings.detection_model.is_some() {
        return Err(MaskError::config(
            "detection_model is set but this build has no ONNX support",
        ));
    }
    warn!("detection_model not set; only full-region masking is available");
    Ok(Arc::new(UnconfiguredDetector))
}

fn load_pattern_detector(
    spec: &PatternDetectorSpec,
) -> crate::error::Result<Arc<dyn PatternDetector>> {
    match spec.engine {
        PatternEngine::Seetaface => load_seetaface(spec),
        PatternEngine::Cascade => load_cascade(spec),
    }
}

#[cfg(feature = "cascade")]
fn load_cascade(spec: &PatternDetectorSpec) -> crate::error::Result<Arc<dyn PatternDetector>> {
    let detector = super::cascade::CascadeDetector::from_file(&spec.name, &spec.model)?;
    info!(name = %spec.name, model = %spec.model.display(), "cascade detector loaded");
    Ok(Arc::new(detector))
}

#[cfg(not(feature = "cascade"))]
fn load_cascade(spec: &PatternDetectorSpec) -> crate::error::Result<Arc<dyn PatternDetector>> {
    Err(MaskError::config(format!(
        "pattern detector '{}' needs the cascade feature",
        spec.name
    )))
}

#[cfg(feature = "rustface")]
fn load_seetaface(spec: &PatternDetectorSpec) -> crate::error::Result<Arc<dyn PatternDetector>> {
    let detector = super::seeta::SeetaFaceDetector::from_file(&spec.name, &spec.model)?;
    info!(name = %spec.name, model = %spec.model.display(), "pattern detector loaded");
    Ok(Arc::new(detector))
}

#[cfg(not(feature = "rustface"))]
fn load_seetaface(spec: &PatternDetectorSpec) -> crate::error::Result<Arc<dyn PatternDetector>> {
    Err(MaskError::config(format!(
        "pattern detector '{}' needs the rustface feature",
        spec.name
    )))
}
