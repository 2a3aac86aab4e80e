// 検出層: 矩形型、外部検出器のトレイト、候補領域提案と特徴検証

#[cfg(feature = "cascade")]
pub mod cascade;
pub mod loader;
#[cfg(feature = "onnx")]
pub mod onnx;
pub mod proposer;
#[cfg(feature = "rustface")]
pub mod seeta;
pub mod verifier;

use image::{GrayImage, RgbImage};

/// Axis-aligned rectangle in pixel coordinates, origin top-left.
///
/// The same type carries areas of interest, maskable areas and detected
/// features; which role a value plays is decided by the collection holding it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// 画像全体を覆う矩形。
    pub fn full(width: u32, height: u32) -> Self {
        Self::new(0, 0, width, height)
    }

    /// Right edge (exclusive).
    pub fn right(&self) -> u32 {
        self.x.saturating_add(self.width)
    }

    /// Bottom edge (exclusive).
    pub fn bottom(&self) -> u32 {
        self.y.saturating_add(self.height)
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// `(w, h)` の画像内に収まっているか。
    pub fn fits_within(&self, width: u32, height: u32) -> bool {
        self.right() <= width && self.bottom() <= height
    }

    /// 画像範囲 `(width, height)` にクリップする。
    ///
    /// 戻り値の bool はクリップで矩形が変化したかどうか。
    pub fn clamp_to(&self, width: u32, height: u32) -> (Rect, bool) {
        let x = self.x.min(width);
        let y = self.y.min(height);
        let right = self.right().min(width);
        let bottom = self.bottom().min(height);
        let clamped = Rect::new(x, y, right - x, bottom - y);
        (clamped, clamped != *self)
    }

    /// Shift a rectangle local to `origin` into the coordinate space `origin` lives in.
    pub fn translate(&self, origin: &Rect) -> Rect {
        Rect::new(
            self.x.saturating_add(origin.x),
            self.y.saturating_add(origin.y),
            self.width,
            self.height,
        )
    }

    /// `other` が完全にこの矩形の内側にあるか。
    pub fn contains(&self, other: &Rect) -> bool {
        other.x >= self.x
            && other.y >= self.y
            && other.right() <= self.right()
            && other.bottom() <= self.bottom()
    }
}

/// One raw prediction of an [`ObjectDetector`].
///
/// Only the region proposer looks at these; they are dropped once filtered.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub score: f32,
    pub label: usize,
    /// `[x0, y0, x1, y1]` in the image's native pixel space.
    pub bbox: [f32; 4],
}

/// Coarse object-detection capability used to propose areas of interest.
///
/// Implementations are loaded once and shared read-only across calls.
pub trait ObjectDetector: Send + Sync {
    /// Detect objects scoring above `threshold`.
    fn detect(&self, image: &RgbImage, threshold: f32) -> crate::error::Result<Vec<Detection>>;
}

/// Specialised detector confirming a feature (face, ear, …) inside a sub-image.
pub trait PatternDetector: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Rectangles local to `image`.
    fn detect(&self, image: &GrayImage) -> Vec<Rect>;
}
