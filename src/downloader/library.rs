//! Library maintenance and discovery: age-based cleanup and search.

use crate::error::{Error, Result};
use crate::fetch::SearchHit;
use crate::post_processing::{CleanupReport, remove_files_older_than};
use std::time::Duration;

use super::MediaDownloader;

impl MediaDownloader {
    /// Delete files under the download directory last modified more than `max_age` ago
    ///
    /// History records of deleted files stay until the item is requested again,
    /// when the missing file is noticed and the record is dropped.
    pub async fn cleanup_old_files(&self, max_age: Duration) -> Result<CleanupReport> {
        remove_files_older_than(&self.config.download.download_dir, max_age).await
    }

    /// Search the source for `query`
    ///
    /// `max_results` defaults to, and is capped at, `download.max_search_results`.
    pub async fn search(&self, query: &str, max_results: Option<usize>) -> Result<Vec<SearchHit>> {
        let query = query.trim();
        if query.is_empty() {
            return Err(Error::Validation("search query must not be empty".into()));
        }

        let cap = self.config.download.max_search_results;
        let limit = max_results.unwrap_or(cap).clamp(1, cap.max(1));
        let hits = self.fetcher.search(query, limit).await?;

        tracing::debug!(query, limit, hits = hits.len(), "Search finished");
        Ok(hits)
    }
}
