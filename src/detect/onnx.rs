// ONNX物体検出: YOLOS形式モデル (logits + pred_boxes) による候補領域検出

use std::path::Path;
use std::sync::Mutex;

use image::RgbImage;
use image::imageops::FilterType;
use ndarray::{Array4, ArrayView2, Axis, Ix3};
use ort::session::Session;
use ort::value::Tensor;
use tracing::debug;

use super::{Detection, ObjectDetector};
use crate::error::MaskError;

/// Upper bound for the longer image edge after resizing.
const MAX_LONGEST_EDGE: u32 = 1333;

/// ImageNet normalisation used by the YOLOS image processor.
const MEAN: [f32; 3] = [0.485, 0.456, 0.406];
const STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Object detector running a YOLOS-style ONNX export.
///
/// The model must produce `logits` (`[1, queries, classes + 1]`, the last
/// class being "no object") followed by `pred_boxes` (`[1, queries, 4]`,
/// normalised centre x, centre y, width, height).
pub struct OnnxObjectDetector {
    // ort の Session::run は &mut self を要求するため Mutex で包む
    session: Mutex<Session>,
    input_size: u32,
}

impl OnnxObjectDetector {
    /// ONNXモデルファイルから検出器を作成する。
    pub fn new(model_path: &Path, input_size: u32) -> crate::error::Result<Self> {
        let builder = Session::builder()
            .map_err(|e| MaskError::detection(format!("failed to create ONNX session: {e}")))?;
        let session = builder.commit_from_file(model_path).map_err(|e| {
            MaskError::detection(format!(
                "failed to load detection model {}: {e}",
                model_path.display()
            ))
        })?;

        Ok(Self {
            session: Mutex::new(session),
            input_size,
        })
    }
}

impl ObjectDetector for OnnxObjectDetector {
    fn detect(&self, image: &RgbImage, threshold: f32) -> crate::error::Result<Vec<Detection>> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Ok(Vec::new());
        }

        let input = preprocess(image, self.input_size);
        let input_tensor =
            Tensor::from_array(input).map_err(|e| MaskError::detection(e.to_string()))?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| MaskError::detection("detection session lock poisoned"))?;
        let outputs = session
            .run(ort::inputs![input_tensor])
            .map_err(|e| MaskError::detection(format!("detection inference failed: {e}")))?;

        let logits = outputs[0]
            .try_extract_array::<f32>()
            .map_err(|e| MaskError::detection(e.to_string()))?
            .into_dimensionality::<Ix3>()
            .map_err(|e| MaskError::detection(format!("unexpected logits shape: {e}")))?;
        let boxes = outputs[1]
            .try_extract_array::<f32>()
            .map_err(|e| MaskError::detection(e.to_string()))?
            .into_dimensionality::<Ix3>()
            .map_err(|e| MaskError::detection(format!("unexpected pred_boxes shape: {e}")))?;

        let detections = decode_predictions(
            logits.index_axis(Axis(0), 0),
            boxes.index_axis(Axis(0), 0),
            width,
            height,
            threshold,
        )?;
        debug!(count = detections.len(), "object detection finished");
        Ok(detections)
    }
}

/// 短辺を `shortest` に合わせ、長辺が上限を超える場合は短辺を縮める。
fn resize_dimensions(width: u32, height: u32, shortest: u32) -> (u32, u32) {
    let min_side = width.min(height) as f64;
    let max_side = width.max(height) as f64;
    let mut target = shortest as f64;
    if max_side / min_side * target > MAX_LONGEST_EDGE as f64 {
        target = (MAX_LONGEST_EDGE as f64 * min_side / max_side).round();
    }

    let long = (target * max_side / min_side) as u32;
    let short = target as u32;
    if width <= height {
        (short.max(1), long.max(1))
    } else {
        (long.max(1), short.max(1))
    }
}

/// RGB画像をNCHWの正規化済みテンソルに変換する。
fn preprocess(image: &RgbImage, input_size: u32) -> Array4<f32> {
    let (w, h) = resize_dimensions(image.width(), image.height(), input_size);
    let resized = image::imageops::resize(image, w, h, FilterType::Triangle);

    Array4::from_shape_fn((1, 3, h as usize, w as usize), |(_, c, y, x)| {
        let v = resized.get_pixel(x as u32, y as u32).0[c] as f32 / 255.0;
        (v - MEAN[c]) / STD[c]
    })
}

/// Convert one batch entry of model output into detections in pixel space.
///
/// Each query's logits are soft-maxed, the trailing "no object" class is
/// ignored and the best remaining class must score strictly above
/// `threshold`.
fn decode_predictions(
    logits: ArrayView2<f32>,
    boxes: ArrayView2<f32>,
    width: u32,
    height: u32,
    threshold: f32,
) -> crate::error::Result<Vec<Detection>> {
    if logits.nrows() != boxes.nrows() || boxes.ncols() != 4 || logits.ncols() < 2 {
        return Err(MaskError::detection(format!(
            "model output shape mismatch: logits {:?}, boxes {:?}",
            logits.shape(),
            boxes.shape()
        )));
    }

    let (w, h) = (width as f32, height as f32);
    let mut detections = Vec::new();

    for (row, bbox) in logits.outer_iter().zip(boxes.outer_iter()) {
        let max_logit = row.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        let exp: Vec<f32> = row.iter().map(|v| (v - max_logit).exp()).collect();
        let sum: f32 = exp.iter().sum();

        let classes = &exp[..exp.len() - 1];
        let Some((label, best)) = classes
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
        else {
            continue;
        };
        let score = best / sum;
        if score <= threshold {
            continue;
        }

        let (cx, cy, bw, bh) = (bbox[0], bbox[1], bbox[2], bbox[3]);
        detections.push(Detection {
            score,
            label,
            bbox: [
                (cx - bw / 2.0) * w,
                (cy - bh / 2.0) * h,
                (cx + bw / 2.0) * w,
                (cy + bh / 2.0) * h,
            ],
        });
    }

    Ok(detections)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_resize_shortest_edge() {
        assert_eq!(resize_dimensions(1000, 500, 512), (1024, 512));
        assert_eq!(resize_dimensions(500, 1000, 512), (512, 1024));
        assert_eq!(resize_dimensions(512, 512, 512), (512, 512));
    }

    #[test]
    fn test_resize_caps_longest_edge() {
        // 4:1 → 512 * 4 = 2048 > 1333, shortest becomes round(1333 / 4) = 333
        let (w, h) = resize_dimensions(4000, 1000, 512);
        assert_eq!(h, 333);
        assert!(w <= MAX_LONGEST_EDGE);
    }

    #[test]
    fn test_preprocess_shape_and_normalisation() {
        let img = RgbImage::from_pixel(8, 4, image::Rgb([255, 0, 128]));
        let tensor = preprocess(&img, 4);
        assert_eq!(tensor.shape(), &[1, 3, 4, 8]);
        let r = tensor[[0, 0, 0, 0]];
        let g = tensor[[0, 1, 2, 3]];
        assert!((r - (1.0 - MEAN[0]) / STD[0]).abs() < 0.02);
        assert!((g - (0.0 - MEAN[1]) / STD[1]).abs() < 0.02);
    }

    #[test]
    fn test_decode_keeps_confident_queries() {
        // クエリ0: クラス0が高スコア / クエリ1: "no object" が最大
        let logits = array![[5.0_f32, 0.0, 0.0], [0.0, 0.0, 6.0]];
        let boxes = array![[0.5_f32, 0.5, 0.2, 0.4], [0.1, 0.1, 0.1, 0.1]];
        let dets = decode_predictions(logits.view(), boxes.view(), 200, 100, 0.2).expect("decode");

        assert_eq!(dets.len(), 1);
        assert_eq!(dets[0].label, 0);
        assert!(dets[0].score > 0.9);
        let [x0, y0, x1, y1] = dets[0].bbox;
        assert!((x0 - 80.0).abs() < 1e-3);
        assert!((y0 - 30.0).abs() < 1e-3);
        assert!((x1 - 120.0).abs() < 1e-3);
        assert!((y1 - 70.0).abs() < 1e-3);
    }

    #[test]
    fn test_decode_threshold_is_strict() {
        // 2クラス + no-object が等確率 → 各 1/3
        let logits = array![[0.0_f32, 0.0, 0.0]];
        let boxes = array![[0.5_f32, 0.5, 0.1, 0.1]];
        let none = decode_predictions(logits.view(), boxes.view(), 10, 10, 0.5).expect("decode");
        assert!(none.is_empty());
        let some = decode_predictions(logits.view(), boxes.view(), 10, 10, 0.3).expect("decode");
        assert_eq!(some.len(), 1);
    }

    #[test]
    fn test_decode_rejects_shape_mismatch() {
        let logits = array![[0.0_f32, 1.0]];
        let boxes = array![[0.5_f32, 0.5, 0.1]];
        assert!(decode_predictions(logits.view(), boxes.view(), 10, 10, 0.2).is_err());
    }
}
