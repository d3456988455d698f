//! Shared test helpers for creating MediaDownloader instances in tests.

use crate::config::Config;
use crate::downloader::MediaDownloader;
use crate::error::{Error, JobError, Result};
use crate::fetch::{
    CollectionItem, CollectionListing, FetchProgress, FetchRequest, FetchResult, Fetcher,
    ItemMetadata, ProgressSink, SearchHit,
};
use crate::history::{HistoryStore, MemoryHistory};
use crate::types::{EntryStatus, Event, JobId, JobSpec, TaskId};
use crate::utils::extract_item_key;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tempfile::{TempDir, tempdir};
use tokio::sync::broadcast;

/// How a scripted fetch writes its output
#[derive(Clone, Debug)]
pub(crate) enum OutputMode {
    /// Write the expected file before returning
    Expected,
    /// Write `<stem>.fxxx.<ext>` after a delay, never the expected name
    DelayedAlternate(Duration),
    /// Report success without writing anything
    Nothing,
}

/// Per-URL behavior of [`ScriptedFetcher`]
#[derive(Clone, Debug)]
pub(crate) struct Script {
    pub(crate) metadata: std::result::Result<ItemMetadata, String>,
    pub(crate) fetch_error: Option<String>,
    pub(crate) output: OutputMode,
    /// Sleep inside `fetch_metadata` before answering
    pub(crate) metadata_delay: Duration,
    /// Sleep inside `fetch` before writing anything
    pub(crate) fetch_delay: Duration,
    /// Byte counts reported through the progress sink, against `total`
    pub(crate) progress: Vec<u64>,
    pub(crate) total: Option<u64>,
}

impl Script {
    pub(crate) fn ok(item_key: &str, title: &str) -> Self {
        Self {
            metadata: Ok(ItemMetadata {
                item_key: item_key.to_string(),
                title: title.to_string(),
                uploader: Some("Test Channel".to_string()),
                duration_secs: Some(10.0),
                ..Default::default()
            }),
            fetch_error: None,
            output: OutputMode::Expected,
            metadata_delay: Duration::ZERO,
            fetch_delay: Duration::ZERO,
            progress: vec![250, 500, 1000],
            total: Some(1000),
        }
    }
}

/// Fetcher driven by per-URL scripts; records every call
#[derive(Default)]
pub(crate) struct ScriptedFetcher {
    scripts: Mutex<HashMap<String, Script>>,
    collections: Mutex<HashMap<String, CollectionListing>>,
    searches: Mutex<HashMap<String, Vec<SearchHit>>>,
    pub(crate) metadata_calls: Mutex<Vec<String>>,
    pub(crate) fetch_calls: Mutex<Vec<FetchRequest>>,
}

impl ScriptedFetcher {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn script(&self, url: &str, script: Script) {
        self.scripts.lock().insert(url.to_string(), script);
    }

    pub(crate) fn collection(&self, url: &str, listing: CollectionListing) {
        self.collections.lock().insert(url.to_string(), listing);
    }

    pub(crate) fn search_results(&self, query: &str, hits: Vec<SearchHit>) {
        self.searches.lock().insert(query.to_string(), hits);
    }

    pub(crate) fn fetch_count(&self) -> usize {
        self.fetch_calls.lock().len()
    }

    fn script_for(&self, url: &str) -> Script {
        self.scripts.lock().get(url).cloned().unwrap_or_else(|| {
            let key = extract_item_key(url).unwrap_or_else(|| "unknown".to_string());
            Script::ok(&key, &format!("Video {key}"))
        })
    }
}

#[async_trait]
impl Fetcher for ScriptedFetcher {
    async fn fetch_metadata(&self, spec: &JobSpec) -> Result<ItemMetadata> {
        self.metadata_calls.lock().push(spec.url.clone());
        let script = self.script_for(&spec.url);
        if !script.metadata_delay.is_zero() {
            tokio::time::sleep(script.metadata_delay).await;
        }
        script.metadata.map_err(Error::ExternalTool)
    }

    async fn fetch(&self, request: &FetchRequest, progress: ProgressSink) -> Result<FetchResult> {
        self.fetch_calls.lock().push(request.clone());
        let script = self.script_for(&request.url);

        if !script.fetch_delay.is_zero() {
            tokio::time::sleep(script.fetch_delay).await;
        }
        if let Some(error) = script.fetch_error {
            return Err(JobError::FetchFailed(error).into());
        }

        for downloaded in &script.progress {
            progress(FetchProgress {
                downloaded_bytes: *downloaded,
                total_bytes: script.total,
                ..Default::default()
            });
        }

        match script.output {
            OutputMode::Expected => {
                tokio::fs::write(&request.expected_path, b"fetched media").await?;
            }
            OutputMode::DelayedAlternate(delay) => {
                let alternate = request.output_stem.with_extension(format!(
                    "fxxx.{}",
                    request.format.extension()
                ));
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    tokio::fs::write(&alternate, b"merged media").await.unwrap();
                });
            }
            OutputMode::Nothing => {}
        }

        Ok(FetchResult::default())
    }

    async fn list_collection(&self, url: &str, max_items: usize) -> Result<CollectionListing> {
        let mut listing = self
            .collections
            .lock()
            .get(url)
            .cloned()
            .ok_or_else(|| Error::ExternalTool(format!("no collection at {url}")))?;
        listing.items.truncate(max_items);
        Ok(listing)
    }

    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchHit>> {
        let mut hits = self.searches.lock().get(query).cloned().unwrap_or_default();
        hits.truncate(max_results);
        Ok(hits)
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

/// Config rooted in `temp_dir` with fast timings and no external tools
pub(crate) fn test_config(temp_dir: &TempDir) -> Config {
    let mut config = Config::default();
    config.download.download_dir = temp_dir.path().join("downloads");
    config.download.auto_organize = false;
    config.download.embed_metadata = false;
    config.persistence.queue_path = temp_dir.path().join("queue.json");
    config.persistence.database_path = temp_dir.path().join("history.db");
    config.worker.poll_interval = Duration::from_millis(20);
    config.worker.shutdown_timeout = Duration::from_secs(2);
    config.completion.poll_interval = Duration::from_millis(20);
    config.completion.timeout = Duration::from_millis(300);
    config.tools.search_path = false;
    config
}

/// Helper to create a test MediaDownloader with a scripted fetcher and in-memory history.
/// Returns the downloader, its fetcher, its history and the tempdir (which must be kept alive).
pub(crate) async fn create_test_downloader() -> (
    MediaDownloader,
    Arc<ScriptedFetcher>,
    Arc<MemoryHistory>,
    TempDir,
) {
    let temp_dir = tempdir().unwrap();
    let config = test_config(&temp_dir);
    create_test_downloader_with(config, temp_dir).await
}

pub(crate) async fn create_test_downloader_with(
    config: Config,
    temp_dir: TempDir,
) -> (
    MediaDownloader,
    Arc<ScriptedFetcher>,
    Arc<MemoryHistory>,
    TempDir,
) {
    let fetcher = ScriptedFetcher::new();
    let history = Arc::new(MemoryHistory::new());
    let downloader = MediaDownloader::with_gateways(
        config,
        fetcher.clone() as Arc<dyn Fetcher>,
        history.clone() as Arc<dyn HistoryStore>,
    )
    .await
    .unwrap();
    (downloader, fetcher, history, temp_dir)
}

pub(crate) fn watch_url(key: &str) -> String {
    format!("https://www.youtube.com/watch?v={key}")
}

pub(crate) fn collection_listing(title: &str, keys: &[&str]) -> CollectionListing {
    CollectionListing {
        title: Some(title.to_string()),
        items: keys
            .iter()
            .map(|key| CollectionItem {
                url: watch_url(key),
                item_key: Some(key.to_string()),
                title: Some(format!("Video {key}")),
            })
            .collect(),
    }
}

/// Wait until the entry reaches a terminal status
pub(crate) async fn wait_for_terminal(downloader: &MediaDownloader, id: JobId) -> EntryStatus {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if let Some(entry) = downloader.entry(id).await
                && entry.status.is_terminal()
            {
                return entry.status;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("entry did not reach a terminal status")
}

/// Task id of the execution attempt for `id`, once it exists
pub(crate) async fn task_of(downloader: &MediaDownloader, id: JobId) -> TaskId {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if let Some(task_id) = downloader.entry(id).await.and_then(|e| e.task_id) {
                return task_id;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("entry was never claimed")
}

/// Drain every event currently buffered
pub(crate) fn drain(events: &mut broadcast::Receiver<Event>) -> Vec<Event> {
    let mut out = Vec::new();
    while let Ok(event) = events.try_recv() {
        out.push(event);
    }
    out
}
