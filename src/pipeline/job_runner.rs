// ジョブ単位: 入力読込 -> 画像/PDFのマスキング -> 出力・レポート書出

use std::path::PathBuf;

use tracing::info;

use crate::config::job::InputKind;
use crate::mask::MaskOptions;
use crate::mask::engine::MaskingEngine;
use crate::pdf::masker::{DEFAULT_PAGE_COVERAGE_RATIO, DocumentMasker};
use crate::pipeline::report::{ReportDetails, RunReport};

/// Configuration for a single job.
#[derive(Debug, Clone)]
pub struct JobConfig {
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    pub kind: InputKind,
    pub draw_diagnostics: bool,
    /// Standalone images only.
    pub allow_full_mask: bool,
    pub report_path: Option<PathBuf>,
}

/// Shared, read-only state every job runs against.
pub struct JobContext {
    pub engine: MaskingEngine,
    pub page_coverage_ratio: f64,
}

impl JobContext {
    pub fn new(engine: MaskingEngine) -> Self {
        Self {
            engine,
            page_coverage_ratio: DEFAULT_PAGE_COVERAGE_RATIO,
        }
    }

    pub fn with_page_coverage_ratio(mut self, ratio: f64) -> Self {
        self.page_coverage_ratio = ratio;
        self
    }
}

/// Result of processing a single job.
#[derive(Debug, Clone)]
pub struct JobResult {
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    pub kind: InputKind,
    /// Masked areas for an image, replaced images for a PDF.
    pub masked: usize,
}

/// 1つのファイルを最初から最後まで処理する。
pub fn run_job(config: &JobConfig, ctx: &JobContext) -> crate::error::Result<JobResult> {
    let input = std::fs::read(&config.input_path)?;

    let (output, masked, details) = match config.kind {
        InputKind::Image => {
            let options = MaskOptions {
                allow_full_mask: config.allow_full_mask,
                draw_diagnostics: config.draw_diagnostics,
            };
            let hint = config.output_path.extension().and_then(|e| e.to_str());
            let outcome = ctx.engine.mask_image_data(&input, hint, options)?;
            let details = ReportDetails::Image {
                allow_full_mask: config.allow_full_mask,
                masked_areas: outcome.masked_areas,
            };
            (outcome.data, outcome.masked_areas, details)
        }
        InputKind::Pdf => {
            let masker = DocumentMasker::new(&ctx.engine)
                .with_coverage_ratio(ctx.page_coverage_ratio);
            let (data, report) =
                masker.mask_document_with_report(&input, config.draw_diagnostics)?;
            let masked = report.masked_images();
            let details = ReportDetails::Pdf {
                masked_images: masked,
                document: report,
            };
            (data, masked, details)
        }
    };

    if let Some(parent) = config.output_path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&config.output_path, &output)?;

    if let Some(report_path) = &config.report_path {
        RunReport::new(
            &config.input_path,
            &config.output_path,
            &input,
            &output,
            config.draw_diagnostics,
            details,
        )
        .write_to(report_path)?;
    }

    info!(
        input = %config.input_path.display(),
        output = %config.output_path.display(),
        masked,
        "job finished"
    );

    Ok(JobResult {
        input_path: config.input_path.clone(),
        output_path: config.output_path.clone(),
        kind: config.kind,
        masked,
    })
}
