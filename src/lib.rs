pub mod config;
pub mod detect;
pub mod error;
pub mod mask;
pub mod pdf;
pub mod pipeline;

pub use detect::{Detection, ObjectDetector, PatternDetector, Rect};
pub use error::{MaskError, Result};
pub use mask::engine::MaskingEngine;
pub use mask::{MaskOptions, MaskingOutcome};
pub use pdf::masker::DocumentMasker;
