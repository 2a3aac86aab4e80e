use std::path::Path;

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct JobFile {
    pub jobs: Vec<Job>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Job {
    pub input: String,
    pub output: String,
    pub draw_diagnostics: Option<bool>,
    /// 単体画像ジョブのみ有効。PDFでは画像ごとにページ占有率から決まる。
    pub allow_full_mask: Option<bool>,
    pub report: Option<String>,
}

/// 入力ファイルの種類。拡張子で判定する。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    Pdf,
    Image,
}

/// Image extensions accepted as standalone inputs (JPEG, PNG and GIF).
const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif"];

/// 画像拡張子として受け付けるかを判定する（大文字小文字は区別しない）。
pub fn is_supported_image_extension(ext: &str) -> bool {
    let ext = ext.trim_start_matches('.').to_ascii_lowercase();
    IMAGE_EXTENSIONS.contains(&ext.as_str())
}

impl Job {
    /// 入力パスの拡張子から処理対象の種類を決める。
    pub fn input_kind(&self) -> crate::error::Result<InputKind> {
        let ext = Path::new(&self.input)
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .ok_or_else(|| {
                crate::error::MaskError::config(format!(
                    "Input has no file extension: '{}'",
                    self.input
                ))
            })?;

        if ext == "pdf" {
            Ok(InputKind::Pdf)
        } else if is_supported_image_extension(&ext) {
            Ok(InputKind::Image)
        } else {
            Err(crate::error::MaskError::config(format!(
                "Unsupported input type '.{ext}' (expected pdf, jpg, jpeg, png or gif)"
            )))
        }
    }
}
