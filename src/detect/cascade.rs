// Haar/LBPカスケード分類器（OpenCV）による特徴検出

use std::path::Path;
use std::sync::Mutex;

use image::GrayImage;
use opencv::core::{CV_8UC1, Mat, Rect as CvRect, Scalar, Size, Vector};
use opencv::objdetect::CascadeClassifier;
use opencv::prelude::*;
use tracing::warn;

use super::{PatternDetector, Rect};
use crate::error::MaskError;

/// Pattern detector backed by an OpenCV cascade XML file
/// (ears, profile faces, eyes, upper bodies, ...).
pub struct CascadeDetector {
    name: String,
    // detect_multi_scale は &mut self を取る
    classifier: Mutex<CascadeClassifier>,
    scale_factor: f64,
    min_neighbors: i32,
}

impl CascadeDetector {
    pub const DEFAULT_SCALE_FACTOR: f64 = 1.1;
    pub const DEFAULT_MIN_NEIGHBORS: i32 = 3;

    /// カスケードXMLを読み込む。
    pub fn from_file(name: impl Into<String>, path: &Path) -> crate::error::Result<Self> {
        if !path.is_file() {
            return Err(MaskError::config(format!(
                "cascade file not found: {}",
                path.display()
            )));
        }
        let path_str = path.to_str().ok_or_else(|| {
            MaskError::config(format!("cascade path is not UTF-8: {}", path.display()))
        })?;

        let classifier = CascadeClassifier::new(path_str).map_err(|e| {
            MaskError::config(format!("cannot load cascade {}: {e}", path.display()))
        })?;
        if classifier.empty().unwrap_or(true) {
            return Err(MaskError::config(format!(
                "invalid cascade file: {}",
                path.display()
            )));
        }

        Ok(Self {
            name: name.into(),
            classifier: Mutex::new(classifier),
            scale_factor: Self::DEFAULT_SCALE_FACTOR,
            min_neighbors: Self::DEFAULT_MIN_NEIGHBORS,
        })
    }

    fn run(&self, image: &GrayImage) -> opencv::Result<Vec<Rect>> {
        let (width, height) = image.dimensions();

        let mut mat = Mat::new_rows_cols_with_default(
            height as i32,
            width as i32,
            CV_8UC1,
            Scalar::all(0.0),
        )?;
        for (x, y, pixel) in image.enumerate_pixels() {
            *mat.at_2d_mut::<u8>(y as i32, x as i32)? = pixel.0[0];
        }

        let mut objects = Vector::<CvRect>::new();
        let mut classifier = self.classifier.lock().map_err(|_| {
            opencv::Error::new(opencv::core::StsError, "cascade classifier lock poisoned")
        })?;
        classifier.detect_multi_scale(
            &mat,
            &mut objects,
            self.scale_factor,
            self.min_neighbors,
            0,
            Size::new(0, 0),
            Size::new(0, 0),
        )?;

        Ok(objects
            .iter()
            .filter_map(|r| {
                let (rect, _) = Rect::new(
                    r.x.max(0) as u32,
                    r.y.max(0) as u32,
                    r.width.max(0) as u32,
                    r.height.max(0) as u32,
                )
                .clamp_to(width, height);
                (!rect.is_empty()).then_some(rect)
            })
            .collect())
    }
}

impl PatternDetector for CascadeDetector {
    fn name(&self) -> &str {
        &self.name
    }

    fn detect(&self, image: &GrayImage) -> Vec<Rect> {
        match self.run(image) {
            Ok(rects) => rects,
            Err(e) => {
                warn!(detector = %self.name, error = %e, "cascade detection failed");
                Vec::new()
            }
        }
    }
}
