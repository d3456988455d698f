//! Post-processing pipeline for retrieved files
//!
//! Runs after the output file is confirmed:
//! 1. Organize - move into `<download_dir>/<uploader>/`
//! 2. Metadata - embed title, artist and comment with ffmpeg
//!
//! Both stages are best effort. A failing stage is logged and the file is
//! left where the previous stage put it; the job still completes.
//!
//! [`remove_files_older_than`] is separate library maintenance and never runs
//! as part of a job.

use crate::config::Config;
use crate::error::Result;
use crate::fetch::ItemMetadata;
use crate::types::{JobId, OutputFormat};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

mod cleanup;
mod metadata;
mod organize;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

pub use cleanup::{CleanupReport, remove_files_older_than};
pub use metadata::{MAX_COMMENT_CHARS, MetadataEmbedder};
pub use organize::organize_by_uploader;

/// Post-processing pipeline executor
pub struct PostProcessor {
    /// Root the per-uploader directories are created in
    download_dir: PathBuf,
    /// Move files into per-uploader subdirectories
    auto_organize: bool,
    /// ffmpeg-based embedder, when ffmpeg is available and embedding is enabled
    embedder: Option<MetadataEmbedder>,
}

impl PostProcessor {
    /// Create a pipeline from configuration
    ///
    /// ffmpeg is taken from `tools.ffmpeg_path`, else searched in PATH when
    /// `tools.search_path` is set. Without it, embedding is skipped.
    pub fn new(config: &Config) -> Self {
        let embedder = if config.download.embed_metadata {
            let found = match &config.tools.ffmpeg_path {
                Some(path) => Some(MetadataEmbedder::new(path.clone())),
                None if config.tools.search_path => MetadataEmbedder::from_path(),
                None => None,
            };
            if found.is_none() {
                info!("ffmpeg not available, metadata embedding disabled");
            }
            found
        } else {
            None
        };

        Self {
            download_dir: config.download.download_dir.clone(),
            auto_organize: config.download.auto_organize,
            embedder,
        }
    }

    /// Pipeline with explicit settings
    pub fn with_settings(
        download_dir: PathBuf,
        auto_organize: bool,
        embedder: Option<MetadataEmbedder>,
    ) -> Self {
        Self {
            download_dir,
            auto_organize,
            embedder,
        }
    }

    /// Whether metadata embedding will be attempted
    pub fn can_embed(&self) -> bool {
        self.embedder.is_some()
    }

    /// Run all stages and return where the file ended up
    ///
    /// Never fails: stage errors are logged and skipped.
    pub async fn run(
        &self,
        job_id: JobId,
        path: &Path,
        meta: &ItemMetadata,
        format: OutputFormat,
        replace_existing: bool,
    ) -> PathBuf {
        let mut current = path.to_path_buf();

        if self.auto_organize {
            match self.organize(&current, meta, replace_existing).await {
                Ok(moved) => current = moved,
                Err(e) => warn!(
                    job_id = %job_id,
                    path = %current.display(),
                    error = %e,
                    "Organize stage failed, leaving file in place"
                ),
            }
        }

        if let Some(embedder) = &self.embedder {
            if format.supports_metadata_embedding() {
                if let Err(e) = embedder.embed(&current, meta).await {
                    warn!(
                        job_id = %job_id,
                        path = %current.display(),
                        error = %e,
                        "Metadata embedding failed"
                    );
                }
            } else {
                debug!(job_id = %job_id, ?format, "Format does not take embedded metadata");
            }
        }

        current
    }

    async fn organize(
        &self,
        path: &Path,
        meta: &ItemMetadata,
        replace_existing: bool,
    ) -> Result<PathBuf> {
        organize_by_uploader(
            path,
            &self.download_dir,
            meta.uploader.as_deref(),
            replace_existing,
        )
        .await
    }
}
