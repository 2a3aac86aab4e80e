// 設定の読み込み: ジョブファイルと同じディレクトリの settings.yaml / settings.yml

pub mod job;
pub mod merged;
pub mod settings;

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::MaskError;
use settings::Settings;

/// 探索する設定ファイル名。先に見つかったものを使う。
pub const SETTINGS_FILE_NAMES: [&str; 2] = ["settings.yaml", "settings.yml"];

/// ジョブファイルに対応する設定ファイルを探す。
pub fn find_settings_file(job_file_path: &Path) -> crate::error::Result<Option<PathBuf>> {
    let dir = job_file_path.parent().ok_or_else(|| {
        MaskError::config(format!(
            "cannot determine directory of job file {}",
            job_file_path.display()
        ))
    })?;
    Ok(SETTINGS_FILE_NAMES
        .iter()
        .map(|name| dir.join(name))
        .find(|path| path.is_file()))
}

/// ジョブファイル用の設定を読み込む。
///
/// 設定ファイルが無ければ既定値を返す。既定値ではモデルが設定されないため、
/// 使えるのは全面マスクだけになる。
pub fn load_settings_for_job(job_file_path: &Path) -> crate::error::Result<Settings> {
    match find_settings_file(job_file_path)? {
        Some(path) => {
            info!(settings = %path.display(), "loading settings");
            Settings::from_file(&path)
        }
        None => {
            debug!(jobs = %job_file_path.display(), "no settings file, using defaults");
            Ok(Settings::default())
        }
    }
}
