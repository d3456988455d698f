//! Queue document storage.
//!
//! The queue is stored as a pretty-printed JSON array of [`QueueEntry`]
//! records. Writes go to a sibling temp file that is renamed over the queue
//! file, so a crash mid-write leaves the previous document intact.

use crate::error::{Error, Result};
use crate::types::QueueEntry;
use std::path::{Path, PathBuf};

/// Load the queue document, treating a missing or blank file as empty
pub(crate) async fn load(path: &Path) -> Result<Vec<QueueEntry>> {
    let contents = match tokio::fs::read_to_string(path).await {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!(path = %path.display(), "No queue file, starting empty");
            return Ok(Vec::new());
        }
        Err(e) => return Err(Error::Io(e)),
    };

    if contents.trim().is_empty() {
        return Ok(Vec::new());
    }

    let entries: Vec<QueueEntry> = serde_json::from_str(&contents)?;
    Ok(entries)
}

/// Atomically replace the queue document with `entries`
pub(crate) async fn write(path: &Path, entries: &[QueueEntry]) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        tokio::fs::create_dir_all(parent).await?;
    }

    let json = serde_json::to_vec_pretty(entries)?;
    let temp = temp_path(path);

    tokio::fs::write(&temp, &json).await?;
    if let Err(e) = tokio::fs::rename(&temp, path).await {
        tracing::error!(
            path = %path.display(),
            error = %e,
            "Failed to replace queue file"
        );
        let _ = tokio::fs::remove_file(&temp).await;
        return Err(Error::Io(e));
    }
    Ok(())
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "queue.json".into());
    name.push(".tmp");
    path.with_file_name(name)
}
