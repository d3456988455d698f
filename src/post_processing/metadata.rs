//! Metadata stage - embed tags with ffmpeg

use crate::error::{Error, PostProcessError, Result};
use crate::fetch::ItemMetadata;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

/// Longest description written into the comment tag, in characters
pub const MAX_COMMENT_CHARS: usize = 500;

/// Embeds title, artist and comment tags by remuxing with ffmpeg
///
/// Streams are copied, not re-encoded. ffmpeg writes to a temp file next to
/// the original which then replaces it.
#[derive(Debug, Clone)]
pub struct MetadataEmbedder {
    binary_path: PathBuf,
}

impl MetadataEmbedder {
    /// Create an embedder with an explicit ffmpeg path
    pub fn new(binary_path: PathBuf) -> Self {
        Self { binary_path }
    }

    /// Attempt to find ffmpeg in PATH
    pub fn from_path() -> Option<Self> {
        which::which("ffmpeg").ok().map(Self::new)
    }

    /// Embed `meta` into the file at `path`
    pub async fn embed(&self, path: &Path, meta: &ItemMetadata) -> Result<()> {
        let temp = temp_path(path);
        let output = Command::new(&self.binary_path)
            .args(embed_args(path, &temp, meta))
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| Error::ExternalTool(format!("Failed to execute ffmpeg: {}", e)))?;

        if !output.status.success() {
            let _ = tokio::fs::remove_file(&temp).await;
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::PostProcess(PostProcessError::EmbedFailed {
                path: path.to_path_buf(),
                reason: format!(
                    "ffmpeg exited with {}: {}",
                    output.status,
                    stderr.lines().last().unwrap_or_default()
                ),
            }));
        }

        tokio::fs::rename(&temp, path).await.map_err(|e| {
            Error::PostProcess(PostProcessError::EmbedFailed {
                path: path.to_path_buf(),
                reason: format!("cannot replace original: {}", e),
            })
        })?;
        debug!(path = %path.display(), "Embedded metadata");
        Ok(())
    }
}

/// `<stem>.temp.<ext>` next to `path`, keeping the extension ffmpeg muxes by
fn temp_path(path: &Path) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match path.extension() {
        Some(ext) => format!("{}.temp.{}", stem, ext.to_string_lossy()),
        None => format!("{}.temp", stem),
    };
    path.with_file_name(name)
}

fn embed_args(input: &Path, output: &Path, meta: &ItemMetadata) -> Vec<std::ffi::OsString> {
    let comment: String = meta
        .description
        .as_deref()
        .unwrap_or_default()
        .chars()
        .take(MAX_COMMENT_CHARS)
        .collect();

    vec![
        "-hide_banner".into(),
        "-loglevel".into(),
        "error".into(),
        "-i".into(),
        input.into(),
        "-map".into(),
        "0".into(),
        "-metadata".into(),
        format!("title={}", meta.title).into(),
        "-metadata".into(),
        format!("artist={}", meta.uploader.as_deref().unwrap_or_default()).into(),
        "-metadata".into(),
        format!("comment={}", comment).into(),
        "-codec".into(),
        "copy".into(),
        "-y".into(),
        output.into(),
    ]
}
