//! Age-based cleanup of retrieved files

use crate::error::{Error, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::{debug, info, warn};

/// Files removed by [`remove_files_older_than`]
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    /// Paths that were deleted
    pub removed_files: Vec<PathBuf>,
    /// Combined size of the deleted files
    pub removed_bytes: u64,
}

/// Delete every regular file under `root` last modified more than `max_age` ago
///
/// Subdirectories are walked recursively and left in place. A missing root
/// yields an empty report. Files that cannot be inspected or deleted are
/// logged and skipped.
pub async fn remove_files_older_than(root: &Path, max_age: Duration) -> Result<CleanupReport> {
    if max_age.is_zero() {
        return Err(Error::Validation("max_age must be greater than zero".into()));
    }

    let mut report = CleanupReport::default();
    if tokio::fs::metadata(root).await.is_err() {
        debug!(?root, "cleanup root does not exist, nothing to remove");
        return Ok(report);
    }

    let cutoff = SystemTime::now()
        .checked_sub(max_age)
        .unwrap_or(SystemTime::UNIX_EPOCH);

    let mut expired = Vec::new();
    collect_expired(root, cutoff, &mut expired).await;

    for (file, size) in expired {
        match tokio::fs::remove_file(&file).await {
            Ok(()) => {
                debug!(?file, size, "deleted expired file");
                report.removed_bytes += size;
                report.removed_files.push(file);
            }
            Err(e) => warn!(?file, error = %e, "failed to delete expired file"),
        }
    }

    info!(
        ?root,
        removed = report.removed_files.len(),
        removed_bytes = report.removed_bytes,
        "age-based cleanup complete"
    );
    Ok(report)
}

/// Recursively collect files modified before `cutoff`, with their sizes
fn collect_expired<'a>(
    path: &'a Path,
    cutoff: SystemTime,
    expired: &'a mut Vec<(PathBuf, u64)>,
) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send + 'a>> {
    Box::pin(async move {
        let mut entries = match tokio::fs::read_dir(path).await {
            Ok(entries) => entries,
            Err(e) => {
                warn!(?path, error = %e, "failed to read directory during cleanup");
                return;
            }
        };

        while let Ok(Some(entry)) = entries.next_entry().await {
            let entry_path = entry.path();
            let file_type = match entry.file_type().await {
                Ok(ft) => ft,
                Err(_) => continue,
            };

            if file_type.is_dir() {
                collect_expired(&entry_path, cutoff, expired).await;
            } else if file_type.is_file() {
                let metadata = match entry.metadata().await {
                    Ok(m) => m,
                    Err(e) => {
                        warn!(path = ?entry_path, error = %e, "failed to stat file during cleanup");
                        continue;
                    }
                };
                if let Ok(modified) = metadata.modified()
                    && modified < cutoff
                {
                    expired.push((entry_path, metadata.len()));
                }
            }
        }
    })
}
