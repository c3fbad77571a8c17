//! 検証レポートの保存先決定と書き込み。

use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use thiserror::Error;
use tracing::info;

/// 判定できない場合の拡張子。
const FALLBACK_EXTENSION: &str = "bin";

#[derive(Error, Debug)]
pub enum OutputError {
    #[error("出力ディレクトリを作成できません: {path}: {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("レポートを書き込めません: {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// レポートの中身から拡張子を判定する。
pub fn detect_extension(payload: &[u8]) -> &'static str {
    infer::get(payload).map_or(FALLBACK_EXTENSION, |kind| kind.extension())
}

/// 保存先パスを決める。
///
/// 明示指定がなければ `<directory>/<署名ファイル名>-report-<yyyyMMddHHmmss>.<ext>` を返す。
pub fn report_path(
    explicit: Option<&Path>,
    directory: &Path,
    signature: &Path,
    payload: &[u8],
    now: NaiveDateTime,
) -> PathBuf {
    if let Some(path) = explicit {
        return path.to_path_buf();
    }

    let stem = signature
        .file_stem()
        .map_or_else(|| "signature".into(), |s| s.to_string_lossy());
    directory.join(format!(
        "{stem}-report-{}.{}",
        now.format("%Y%m%d%H%M%S"),
        detect_extension(payload)
    ))
}

/// レポートを書き込む。親ディレクトリがなければ作成する。
pub fn write_report(path: &Path, payload: &[u8]) -> Result<(), OutputError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|source| OutputError::CreateDirectory {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    std::fs::write(path, payload).map_err(|source| OutputError::Write {
        path: path.to_path_buf(),
        source,
    })?;

    info!(path = %path.display(), size = payload.len(), "検証レポートを保存しました");
    Ok(())
}
