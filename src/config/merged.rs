use std::path::PathBuf;

use super::job::{InputKind, Job};
use super::settings::Settings;

#[derive(Debug, Clone)]
pub struct MergedConfig {
    pub kind: InputKind,
    pub draw_diagnostics: bool,
    pub allow_full_mask: bool,
    pub report: Option<PathBuf>,
}

impl MergedConfig {
    /// JobのOption値がSomeならJobの値を、NoneならSettingsの値を使用する。
    pub fn new(settings: &Settings, job: &Job) -> crate::error::Result<Self> {
        Ok(MergedConfig {
            kind: job.input_kind()?,
            draw_diagnostics: job.draw_diagnostics.unwrap_or(settings.draw_diagnostics),
            allow_full_mask: job.allow_full_mask.unwrap_or(false),
            report: job.report.as_ref().map(PathBuf::from),
        })
    }
}
