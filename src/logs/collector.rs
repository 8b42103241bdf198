use crate::error::{LogSinkError, Result};
use crate::logs::stream_cache::LOG_EXTENSION;
use std::path::{Path, PathBuf};

/// Directory names never descended into (archive metadata, not logs)
pub const SKIPPED_DIRS: &[&str] = &["__MACOSX"];

/// Recursively collect every `*.log` file under `dir`.
///
/// The order of the returned paths is unspecified. Any unreadable directory
/// on the way fails the whole walk.
pub async fn collect_log_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut pending = vec![dir.to_path_buf()];

    while let Some(current) = pending.pop() {
        let mut entries = tokio::fs::read_dir(&current)
            .await
            .map_err(|e| LogSinkError::DirectoryRead(format!("{}: {}", current.display(), e)))?;

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| LogSinkError::DirectoryRead(format!("{}: {}", current.display(), e)))?
        {
            let file_type = entry
                .file_type()
                .await
                .map_err(|e| LogSinkError::DirectoryRead(format!("{}: {}", current.display(), e)))?;
            let name = entry.file_name().to_string_lossy().into_owned();

            if file_type.is_dir() {
                if !SKIPPED_DIRS.contains(&name.as_str()) {
                    pending.push(entry.path());
                }
            } else if file_type.is_file() && name.ends_with(LOG_EXTENSION) {
                files.push(entry.path());
            }
        }
    }

    Ok(files)
}
