use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Engines that can back a configured pattern detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternEngine {
    /// SeetaFace frontal face model (`rustface`).
    Seetaface,
    /// OpenCV cascade classifier XML (`opencv`).
    Cascade,
}

/// One entry of the ordered `pattern_detectors` list.
///
/// List order is priority order: the first detector that finds anything in a
/// candidate region decides the outcome for that region.
#[derive(Debug, Clone, Deserialize)]
pub struct PatternDetectorSpec {
    pub name: String,
    pub engine: PatternEngine,
    pub model: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub detection_threshold: f32,
    pub max_proposal_ratio: f64,
    pub page_coverage_ratio: f64,
    pub min_aspect: f64,
    pub max_aspect: f64,
    pub jpeg_quality: u8,
    pub parallel_workers: usize,
    pub detection_model: Option<PathBuf>,
    pub model_input_size: u32,
    pub pattern_detectors: Vec<PatternDetectorSpec>,
    pub draw_diagnostics: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            detection_threshold: 0.2,
            max_proposal_ratio: 0.7,
            page_coverage_ratio: 0.8,
            min_aspect: 0.5,
            max_aspect: 2.0,
            jpeg_quality: 85,
            parallel_workers: 0,
            detection_model: None,
            model_input_size: 512,
            pattern_detectors: Vec::new(),
            draw_diagnostics: false,
        }
    }
}

impl Settings {
    pub fn from_yaml(yaml: &str) -> crate::error::Result<Self> {
        let settings: Settings = serde_yml::from_str(yaml).map_err(|e| {
            crate::error::MaskError::config(format!("Failed to parse settings YAML: {e}"))
        })?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn from_file(path: &Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut settings = Self::from_yaml(&content)?;

        // モデルパスは設定ファイルのディレクトリ基準で解決する
        if let Some(dir) = path.parent() {
            settings.resolve_model_paths(dir);
        }
        Ok(settings)
    }

    /// 相対モデルパスを `base_dir` 基準の絶対パスに置き換える。
    pub fn resolve_model_paths(&mut self, base_dir: &Path) {
        if let Some(model) = self.detection_model.as_mut()
            && model.is_relative()
        {
            *model = base_dir.join(&*model);
        }
        for spec in &mut self.pattern_detectors {
            if spec.model.is_relative() {
                spec.model = base_dir.join(&spec.model);
            }
        }
    }

    fn validate(&self) -> crate::error::Result<()> {
        let unit_ratio = |name: &str, value: f64| {
            if value > 0.0 && value <= 1.0 {
                Ok(())
            } else {
                Err(crate::error::MaskError::config(format!(
                    "{name} must be in (0, 1], got {value}"
                )))
            }
        };
        unit_ratio("max_proposal_ratio", self.max_proposal_ratio)?;
        unit_ratio("page_coverage_ratio", self.page_coverage_ratio)?;

        if !(0.0..=1.0).contains(&self.detection_threshold) {
            return Err(crate::error::MaskError::config(format!(
                "detection_threshold must be in [0, 1], got {}",
                self.detection_threshold
            )));
        }
        if !(1..=100).contains(&self.jpeg_quality) {
            return Err(crate::error::MaskError::config(format!(
                "jpeg_quality must be 1-100, got {}",
                self.jpeg_quality
            )));
        }
        if self.min_aspect <= 0.0 || self.min_aspect > self.max_aspect {
            return Err(crate::error::MaskError::config(format!(
                "invalid aspect range: min {} / max {}",
                self.min_aspect, self.max_aspect
            )));
        }
        if self.model_input_size == 0 {
            return Err(crate::error::MaskError::config(
                "model_input_size must be > 0",
            ));
        }
        Ok(())
    }
}
