//! Directory listing helpers

use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Files directly inside `dir` whose name ends with `extension`, sorted
///
/// With no extension every file is listed. Subdirectories are skipped.
pub fn list_files(dir: impl AsRef<Path>, extension: Option<&str>) -> Result<Vec<PathBuf>> {
    let dir = dir.as_ref();
    if !dir.is_dir() {
        return Err(Error::NotADirectory(dir.to_path_buf()));
    }

    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let matches = extension.map_or(true, |ext| entry.file_name().to_string_lossy().ends_with(ext));
        if matches {
            files.push(entry.path());
        }
    }
    files.sort();
    Ok(files)
}
