use std::path::Path;

use image::GrayImage;

use super::{PatternDetector, Rect};
use crate::error::MaskError;

/// Frontal face detector backed by the `rustface` crate (SeetaFace engine).
pub struct SeetaFaceDetector {
    name: String,
    model: rustface::Model,
    min_face_size: u32,
}

impl SeetaFaceDetector {
    /// Smallest face (in pixels) the engine searches for.
    pub const DEFAULT_MIN_FACE_SIZE: u32 = 20;

    /// SeetaFaceモデルファイルを読み込む。
    pub fn from_file(name: impl Into<String>, path: &Path) -> crate::error::Result<Self> {
        let file = std::fs::File::open(path).map_err(|e| {
            MaskError::config(format!("cannot open face model {}: {e}", path.display()))
        })?;
        let model = rustface::read_model(std::io::BufReader::new(file)).map_err(|e| {
            MaskError::config(format!("invalid face model {}: {e}", path.display()))
        })?;

        Ok(Self {
            name: name.into(),
            model,
            min_face_size: Self::DEFAULT_MIN_FACE_SIZE,
        })
    }
}

impl PatternDetector for SeetaFaceDetector {
    fn name(&self) -> &str {
        &self.name
    }

    fn detect(&self, image: &GrayImage) -> Vec<Rect> {
        let (width, height) = image.dimensions();
        // 最小顔サイズ未満の部分画像は探索しない
        if width < self.min_face_size || height < self.min_face_size {
            return Vec::new();
        }

        let mut detector = rustface::create_detector_with_model(self.model.clone());
        detector.set_min_face_size(self.min_face_size);
        detector.set_score_thresh(2.0);
        detector.set_pyramid_scale_factor(0.8);
        detector.set_slide_window_step(4, 4);

        let faces = detector.detect(&rustface::ImageData::new(image.as_raw(), width, height));

        faces
            .iter()
            .filter_map(|face| {
                let bbox = face.bbox();
                let x = bbox.x().max(0) as u32;
                let y = bbox.y().max(0) as u32;
                let (rect, _) = Rect::new(x, y, bbox.width(), bbox.height()).clamp_to(width, height);
                (!rect.is_empty()).then_some(rect)
            })
            .collect()
    }
}
