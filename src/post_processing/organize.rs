//! Organize stage - move files into per-uploader directories

use crate::error::{Error, PostProcessError, Result};
use crate::utils::{get_unique_path, sanitize_filename};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Directory name used when the uploader is unknown or sanitizes to nothing
const UNKNOWN_UPLOADER: &str = "Unknown";

/// Move `path` into `<root>/<uploader>/`
///
/// Returns the new path. When a different file already occupies the
/// destination it is replaced if `replace_existing`, otherwise the moved file
/// gets a ` (n)` suffix.
pub async fn organize_by_uploader(
    path: &Path,
    root: &Path,
    uploader: Option<&str>,
    replace_existing: bool,
) -> Result<PathBuf> {
    let dir_name = uploader
        .map(sanitize_filename)
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| UNKNOWN_UPLOADER.to_string());
    let dest_dir = root.join(dir_name);

    let file_name = path.file_name().ok_or_else(|| {
        Error::PostProcess(PostProcessError::MoveFailed {
            source_path: path.to_path_buf(),
            dest_path: dest_dir.clone(),
            reason: "source has no file name".to_string(),
        })
    })?;
    let mut dest = dest_dir.join(file_name);

    if dest == path {
        return Ok(dest);
    }

    tokio::fs::create_dir_all(&dest_dir).await.map_err(|e| {
        Error::PostProcess(PostProcessError::MoveFailed {
            source_path: path.to_path_buf(),
            dest_path: dest_dir.clone(),
            reason: format!("cannot create directory: {}", e),
        })
    })?;

    if !replace_existing {
        dest = get_unique_path(&dest)?;
    }

    move_file(path, &dest).await?;
    debug!(from = %path.display(), to = %dest.display(), "Organized file");
    Ok(dest)
}

/// Rename, falling back to copy and delete across filesystems
async fn move_file(source: &Path, dest: &Path) -> Result<()> {
    if tokio::fs::rename(source, dest).await.is_ok() {
        return Ok(());
    }

    tokio::fs::copy(source, dest).await.map_err(|e| {
        Error::PostProcess(PostProcessError::MoveFailed {
            source_path: source.to_path_buf(),
            dest_path: dest.to_path_buf(),
            reason: e.to_string(),
        })
    })?;
    tokio::fs::remove_file(source).await.map_err(|e| {
        Error::PostProcess(PostProcessError::MoveFailed {
            source_path: source.to_path_buf(),
            dest_path: dest.to_path_buf(),
            reason: format!("copied but could not remove source: {}", e),
        })
    })?;
    Ok(())
}
