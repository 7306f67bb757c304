//! Filesystem probe: existence checks and create-if-missing directories.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use tracing::debug;

/// Whether `path` exists and is not a directory.
pub fn file_exists(path: &Path) -> bool {
    fs::metadata(path).is_ok_and(|meta| !meta.is_dir())
}

/// Whether `path` names a file the current user can execute.
pub fn executable_exists(path: &Path) -> bool {
    which::which(path).is_ok()
}

/// Create `path` (and parents) unless it already exists.
///
/// Returns `true` when the directory was created by this call.
pub fn make_directory_if_not_exists(path: &Path) -> Result<bool> {
    if path.exists() {
        if !path.is_dir() {
            return Err(anyhow!("{} exists but is not a directory", path.display()));
        }
        return Ok(false);
    }
    fs::create_dir_all(path).with_context(|| format!("create directory {}", path.display()))?;
    debug!(path = %path.display(), "created directory");
    Ok(true)
}
