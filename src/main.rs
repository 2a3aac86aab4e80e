use std::path::{Path, PathBuf};
use std::process::ExitCode;

use face_masking::config::job::JobFile;
use face_masking::config::merged::MergedConfig;
use face_masking::config::{self};
use face_masking::detect::loader::DetectorStack;
use face_masking::pipeline::job_runner::{JobConfig, JobContext};
use face_masking::pipeline::orchestrator::run_all_jobs;

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().skip(1).collect();

    if args.is_empty() || args.iter().any(|a| a == "--help" || a == "-h") {
        eprintln!("Usage: face_masking <jobs.yaml>...");
        eprintln!("  Redact faces in images and PDF files according to job specifications.");
        return if args.is_empty() {
            ExitCode::FAILURE
        } else {
            ExitCode::SUCCESS
        };
    }

    if args.iter().any(|a| a == "--version" || a == "-V") {
        eprintln!("face_masking {}", env!("CARGO_PKG_VERSION"));
        return ExitCode::SUCCESS;
    }

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let mut has_error = false;
    for job_file_arg in &args {
        if let Err(message) = run_job_file(Path::new(job_file_arg), &mut has_error) {
            eprintln!("ERROR: {message}");
            has_error = true;
        }
    }

    if has_error {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

/// 1つのジョブファイルを処理する。設定と検出器はファイルごとに一度だけ読み込む。
///
/// ジョブファイル自体を扱えない場合は Err、個々のジョブの失敗は `has_error` に反映する。
fn run_job_file(job_file_path: &Path, has_error: &mut bool) -> Result<(), String> {
    let display = job_file_path.display();

    let settings = config::load_settings_for_job(job_file_path)
        .map_err(|e| format!("Failed to load settings for {display}: {e}"))?;

    let yaml_content = std::fs::read_to_string(job_file_path)
        .map_err(|e| format!("Failed to read job file {display}: {e}"))?;
    let job_file: JobFile = serde_yml::from_str(&yaml_content)
        .map_err(|e| format!("Failed to parse job file {display}: {e}"))?;

    let job_dir = job_file_path
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .to_path_buf();

    let mut job_configs = Vec::with_capacity(job_file.jobs.len());
    for job in &job_file.jobs {
        let merged = MergedConfig::new(&settings, job).map_err(|e| e.to_string())?;
        job_configs.push(JobConfig {
            input_path: resolve_path(&job_dir, Path::new(&job.input)),
            output_path: resolve_path(&job_dir, Path::new(&job.output)),
            kind: merged.kind,
            draw_diagnostics: merged.draw_diagnostics,
            allow_full_mask: merged.allow_full_mask,
            report_path: merged.report.as_deref().map(|p| resolve_path(&job_dir, p)),
        });
    }

    let detectors = DetectorStack::load(&settings)
        .map_err(|e| format!("Failed to load detectors for {display}: {e}"))?;
    let ctx = JobContext::new(detectors.build_engine(&settings))
        .with_page_coverage_ratio(settings.page_coverage_ratio);

    let results = run_all_jobs(&job_configs, &ctx, settings.parallel_workers)
        .map_err(|e| e.to_string())?;

    for (config, result) in job_configs.iter().zip(&results) {
        match result {
            Ok(job_result) => {
                eprintln!(
                    "OK: {} -> {} ({} masked)",
                    job_result.input_path.display(),
                    job_result.output_path.display(),
                    job_result.masked
                );
            }
            Err(e) => {
                eprintln!(
                    "ERROR: {} -> {}: {e}",
                    config.input_path.display(),
                    config.output_path.display()
                );
                *has_error = true;
            }
        }
    }

    Ok(())
}

/// Resolve a potentially relative path against a base directory.
/// If the path is already absolute, return it as-is.
fn resolve_path(base_dir: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base_dir.join(path)
    }
}
