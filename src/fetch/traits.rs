//! Traits and types for content retrieval

use crate::types::{JobSpec, OutputFormat, Quality};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

/// Metadata resolved for a single item before it is fetched
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ItemMetadata {
    /// Authoritative content identifier
    pub item_key: String,
    /// Item title
    pub title: String,
    /// Uploader or channel name
    pub uploader: Option<String>,
    /// Duration in seconds
    pub duration_secs: Option<f64>,
    /// Free-text description
    pub description: Option<String>,
    /// Size the source advertises for the selected format
    pub filesize_hint: Option<u64>,
    /// Canonical page URL
    pub webpage_url: Option<String>,
}

/// Everything a fetcher needs to retrieve one item
#[derive(Debug, Clone)]
pub struct FetchRequest {
    /// Source URL
    pub url: String,
    /// Output format
    pub format: OutputFormat,
    /// Quality tier
    pub quality: Quality,
    /// Output path without extension; the fetcher appends its own
    pub output_stem: PathBuf,
    /// Where the finished file is expected
    pub expected_path: PathBuf,
}

impl FetchRequest {
    /// Request for `spec` written to `expected_path`
    pub fn new(spec: &JobSpec, expected_path: PathBuf) -> Self {
        Self {
            url: spec.url.clone(),
            format: spec.format,
            quality: spec.quality.clone(),
            output_stem: expected_path.with_extension(""),
            expected_path,
        }
    }
}

/// One progress report from a running fetch
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FetchProgress {
    /// Bytes received so far
    pub downloaded_bytes: u64,
    /// Exact total, when known
    pub total_bytes: Option<u64>,
    /// Fetcher's estimate of the total
    pub total_bytes_estimate: Option<u64>,
    /// Transfer rate in bytes per second
    pub rate_bps: Option<f64>,
    /// Estimated seconds remaining
    pub eta_secs: Option<u64>,
}

/// Callback receiving progress reports; must not block
pub type ProgressSink = Arc<dyn Fn(FetchProgress) + Send + Sync>;

/// Outcome of a successful fetch
#[must_use]
#[derive(Debug, Clone, Default)]
pub struct FetchResult {
    /// Path the fetcher reports it wrote, if it knows
    pub final_path: Option<PathBuf>,
    /// Metadata observed during the fetch
    pub metadata: Option<ItemMetadata>,
}

/// An entry of a collection listing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionItem {
    /// Item URL
    pub url: String,
    /// Content identifier, when the listing provides one
    pub item_key: Option<String>,
    /// Item title
    pub title: Option<String>,
}

/// A collection (playlist, channel) expanded into its items
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CollectionListing {
    /// Collection title
    pub title: Option<String>,
    /// Items in collection order
    pub items: Vec<CollectionItem>,
}

/// One result of a text search
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    /// Item URL
    pub url: String,
    /// Content identifier
    pub item_key: Option<String>,
    /// Item title
    pub title: Option<String>,
    /// Uploader or channel name
    pub uploader: Option<String>,
    /// Duration in seconds
    pub duration_secs: Option<f64>,
    /// View count at search time
    pub view_count: Option<u64>,
}

/// Trait for content retrieval
///
/// Implementations resolve metadata, fetch an item to disk while reporting
/// progress, and expand collections into item URLs. A fetch may finish before
/// its output file is visible under the expected name; the worker confirms
/// the output separately.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Resolve metadata for the item a spec points at
    async fn fetch_metadata(&self, spec: &JobSpec) -> crate::Result<ItemMetadata>;

    /// Retrieve the item, reporting progress through `progress`
    async fn fetch(&self, request: &FetchRequest, progress: ProgressSink)
    -> crate::Result<FetchResult>;

    /// List at most `max_items` items of a collection
    async fn list_collection(&self, url: &str, max_items: usize)
    -> crate::Result<CollectionListing>;

    /// Search the source for `query`, returning at most `max_results` hits in rank order
    async fn search(&self, query: &str, max_results: usize) -> crate::Result<Vec<SearchHit>>;

    /// Human-readable name for logging
    fn name(&self) -> &'static str;
}
