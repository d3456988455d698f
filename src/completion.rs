//! Output completion detection
//!
//! A fetch can report success before its output is visible under the name the
//! worker expects: merging and post-processing inside the fetcher write to
//! intermediate names such as `out.f137.mp4` and rename late, or not at all.
//! [`CompletionDetector::wait_for`] polls until the expected file exists with
//! a non-zero size, adopting a sibling `<stem>.<anything>` file by renaming
//! it when one shows up, and gives up after a fixed timeout.

use crate::config::CompletionConfig;
use crate::error::{JobError, Result};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::time::Instant;

/// Bounded poll/rename loop confirming an output file exists
#[derive(Clone, Debug)]
pub struct CompletionDetector {
    poll_interval: Duration,
    timeout: Duration,
    ignored_extensions: Vec<String>,
}

impl CompletionDetector {
    /// Detector with explicit timing and no ignored extensions
    pub fn new(poll_interval: Duration, timeout: Duration) -> Self {
        Self {
            poll_interval,
            timeout,
            ignored_extensions: Vec::new(),
        }
    }

    /// Detector built from configuration
    pub fn from_config(config: &CompletionConfig) -> Self {
        Self::new(config.poll_interval, config.timeout)
            .with_ignored_extensions(config.ignored_extensions.iter().cloned())
    }

    /// Never adopt files with these extensions (compared case-insensitively)
    pub fn with_ignored_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ignored_extensions = extensions
            .into_iter()
            .map(|e| e.into().trim_start_matches('.').to_ascii_lowercase())
            .collect();
        self
    }

    /// Configured timeout
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Wait until `expected` exists with a non-zero size
    ///
    /// Returns the confirmed path (always `expected`).
    ///
    /// # Errors
    ///
    /// [`JobError::OutputNotFound`] once the timeout elapses without the file
    /// materializing. A final check runs at the deadline.
    pub async fn wait_for(&self, expected: &Path) -> Result<PathBuf> {
        let started = Instant::now();
        let deadline = started + self.timeout;

        loop {
            if self.check_once(expected).await {
                tracing::debug!(
                    path = %expected.display(),
                    waited_ms = started.elapsed().as_millis() as u64,
                    "Output file confirmed"
                );
                return Ok(expected.to_path_buf());
            }

            let now = Instant::now();
            if now >= deadline {
                break;
            }
            let remaining = deadline - now;
            tokio::time::sleep(self.poll_interval.min(remaining)).await;
        }

        if self.check_once(expected).await {
            return Ok(expected.to_path_buf());
        }

        tracing::warn!(
            path = %expected.display(),
            timeout_ms = self.timeout.as_millis() as u64,
            "Output file did not appear"
        );
        Err(JobError::OutputNotFound {
            expected: expected.to_path_buf(),
            waited: started.elapsed(),
        }
        .into())
    }

    /// One detection pass: the expected file, else adopt the best sibling
    async fn check_once(&self, expected: &Path) -> bool {
        if non_empty_file(expected).await {
            return true;
        }

        let Some(candidate) = self.find_candidate(expected).await else {
            return false;
        };

        match tokio::fs::rename(&candidate, expected).await {
            Ok(()) => {
                tracing::info!(
                    from = %candidate.display(),
                    to = %expected.display(),
                    "Adopted output file under expected name"
                );
                non_empty_file(expected).await
            }
            Err(e) => {
                tracing::debug!(
                    from = %candidate.display(),
                    error = %e,
                    "Candidate not ready for rename, retrying"
                );
                false
            }
        }
    }

    /// Largest non-empty `<stem>.<anything>` sibling that is not a sidecar
    async fn find_candidate(&self, expected: &Path) -> Option<PathBuf> {
        let dir = match expected.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        let expected_name = expected.file_name()?.to_str()?;
        let prefix = format!("{}.", expected.file_stem()?.to_str()?);

        let mut reader = tokio::fs::read_dir(dir).await.ok()?;
        let mut best: Option<(u64, PathBuf)> = None;

        while let Ok(Some(entry)) = reader.next_entry().await {
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if name == expected_name || !name.starts_with(&prefix) || self.is_ignored(name) {
                continue;
            }
            let Ok(meta) = entry.metadata().await else {
                continue;
            };
            if !meta.is_file() || meta.len() == 0 {
                continue;
            }
            if best.as_ref().is_none_or(|(size, _)| meta.len() > *size) {
                best = Some((meta.len(), entry.path()));
            }
        }

        best.map(|(_, path)| path)
    }

    fn is_ignored(&self, name: &str) -> bool {
        Path::new(name)
            .extension()
            .and_then(OsStr::to_str)
            .map(|ext| {
                let ext = ext.to_ascii_lowercase();
                self.ignored_extensions.iter().any(|i| *i == ext)
            })
            .unwrap_or(false)
    }
}

impl Default for CompletionDetector {
    fn default() -> Self {
        Self::from_config(&CompletionConfig::default())
    }
}

async fn non_empty_file(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_file() && m.len() > 0)
        .unwrap_or(false)
}
