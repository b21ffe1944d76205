//! Local last-resort copies of documents that could not be uploaded.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::info;

/// Returns `{dir}/{stem}-{YYYYmmddTHHMMSSZ}.xlsx` for the remote `path`.
pub fn backup_path(dir: &Path, remote_path: &str, now: DateTime<Utc>) -> PathBuf {
    let file = remote_path.rsplit('/').next().unwrap_or_default();
    let stem = match file.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => file,
    };
    let stem = if stem.is_empty() { "document" } else { stem };
    dir.join(format!("{}-{}.xlsx", stem, now.format("%Y%m%dT%H%M%SZ")))
}

/// Writes `bytes` to a new backup file and returns its path.
///
/// The file is written to a temporary sibling first and renamed, so a
/// backup that exists is always complete.
pub fn write_backup(
    dir: &Path,
    remote_path: &str,
    bytes: &[u8],
    now: DateTime<Utc>,
) -> io::Result<PathBuf> {
    fs::create_dir_all(dir)?;
    let path = backup_path(dir, remote_path, now);
    let temp_path = path.with_extension("xlsx.tmp");
    fs::write(&temp_path, bytes)?;
    fs::rename(&temp_path, &path)?;
    info!(path = %path.display(), len = bytes.len(), "wrote local backup");
    Ok(path)
}
