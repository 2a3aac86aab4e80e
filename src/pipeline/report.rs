// 実行レポート: 入出力のSHA-256とマスク結果をJSONで書き出す

use std::path::Path;

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::pdf::masker::DocumentReport;

/// バイト列のSHA-256を小文字16進文字列で返す。
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// One job's report as written to `report:`.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub input: String,
    pub output: String,
    pub input_sha256: String,
    pub output_sha256: String,
    pub draw_diagnostics: bool,
    #[serde(flatten)]
    pub details: ReportDetails,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReportDetails {
    Image {
        allow_full_mask: bool,
        masked_areas: usize,
    },
    Pdf {
        masked_images: usize,
        document: DocumentReport,
    },
}

impl RunReport {
    pub fn new(
        input: &Path,
        output: &Path,
        input_data: &[u8],
        output_data: &[u8],
        draw_diagnostics: bool,
        details: ReportDetails,
    ) -> Self {
        Self {
            input: input.display().to_string(),
            output: output.display().to_string(),
            input_sha256: sha256_hex(input_data),
            output_sha256: sha256_hex(output_data),
            draw_diagnostics,
            details,
        }
    }

    /// レポートを整形済みJSONとして書き出す。
    pub fn write_to(&self, path: &Path) -> crate::error::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).map_err(|e| {
            crate::error::MaskError::report(format!(
                "failed to write report {}: {e}",
                path.display()
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_known_value() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_image_report_json_shape() {
        let report = RunReport::new(
            Path::new("in.jpg"),
            Path::new("out.jpg"),
            b"in",
            b"out",
            false,
            ReportDetails::Image {
                allow_full_mask: false,
                masked_areas: 3,
            },
        );
        let json = serde_json::to_value(&report).expect("serialize");
        assert_eq!(json["kind"], "image");
        assert_eq!(json["masked_areas"], 3);
        assert_eq!(json["input_sha256"], sha256_hex(b"in"));
        assert_ne!(json["input_sha256"], json["output_sha256"]);
    }
}
