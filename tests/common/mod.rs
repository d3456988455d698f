//! Common test utilities for media-dl integration tests

use async_trait::async_trait;
use media_dl::fetch::{
    CollectionItem, CollectionListing, FetchProgress, FetchRequest, FetchResult, ProgressSink,
    SearchHit,
};
use media_dl::utils::extract_item_key;
use media_dl::{
    Config, Database, EntryStatus, Error, Fetcher, ItemMetadata, JobId, JobSpec, MediaDownloader,
    Result,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tempfile::TempDir;

/// Fetcher that writes a small file for every request
///
/// Metadata comes from the URL's item key; collections are registered up front.
#[derive(Default)]
pub struct FakeFetcher {
    collections: parking_lot::Mutex<HashMap<String, Vec<String>>>,
    fetches: AtomicUsize,
}

#[allow(dead_code)]
impl FakeFetcher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add_collection(&self, url: &str, keys: &[&str]) {
        self.collections
            .lock()
            .insert(url.to_string(), keys.iter().map(|k| k.to_string()).collect());
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Fetcher for FakeFetcher {
    async fn fetch_metadata(&self, spec: &JobSpec) -> Result<ItemMetadata> {
        let item_key = extract_item_key(&spec.url)
            .ok_or_else(|| Error::ExternalTool(format!("unsupported url {}", spec.url)))?;
        Ok(ItemMetadata {
            title: format!("Clip {item_key}"),
            item_key,
            uploader: Some("Integration Channel".to_string()),
            duration_secs: Some(3.0),
            ..Default::default()
        })
    }

    async fn fetch(&self, request: &FetchRequest, progress: ProgressSink) -> Result<FetchResult> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        for downloaded in [128, 256, 512] {
            progress(FetchProgress {
                downloaded_bytes: downloaded,
                total_bytes: Some(512),
                ..Default::default()
            });
        }
        tokio::fs::write(&request.expected_path, vec![0u8; 512]).await?;
        Ok(FetchResult {
            final_path: Some(request.expected_path.clone()),
            metadata: None,
        })
    }

    async fn list_collection(&self, url: &str, max_items: usize) -> Result<CollectionListing> {
        let keys = self
            .collections
            .lock()
            .get(url)
            .cloned()
            .ok_or_else(|| Error::ExternalTool(format!("no collection at {url}")))?;
        Ok(CollectionListing {
            title: Some("Integration Playlist".to_string()),
            items: keys
                .into_iter()
                .take(max_items)
                .map(|key| CollectionItem {
                    url: watch_url(&key),
                    title: Some(format!("Clip {key}")),
                    item_key: Some(key),
                })
                .collect(),
        })
    }

    /// Hits are every registered collection item whose key contains `query`
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchHit>> {
        let collections = self.collections.lock();
        let mut keys: Vec<&String> = collections
            .values()
            .flatten()
            .filter(|key| key.contains(query))
            .collect();
        keys.sort();
        keys.dedup();
        Ok(keys
            .into_iter()
            .take(max_results)
            .map(|key| SearchHit {
                url: watch_url(key),
                item_key: Some(key.clone()),
                title: Some(format!("Clip {key}")),
                uploader: Some("Integration Channel".to_string()),
                duration_secs: Some(3.0),
                view_count: None,
            })
            .collect())
    }

    fn name(&self) -> &'static str {
        "fake"
    }
}

/// Config rooted in `dir` with short intervals
pub fn test_config(dir: &TempDir) -> Config {
    let mut config = Config::default();
    config.download.download_dir = dir.path().join("downloads");
    config.download.embed_metadata = false;
    config.persistence.queue_path = dir.path().join("queue.json");
    config.persistence.database_path = dir.path().join("history.db");
    config.scheduler.poll_interval = Duration::from_millis(50);
    config.worker.poll_interval = Duration::from_millis(20);
    config.worker.shutdown_timeout = Duration::from_secs(2);
    config.completion.poll_interval = Duration::from_millis(20);
    config.completion.timeout = Duration::from_millis(500);
    config.tools.search_path = false;
    config
}

/// Open a downloader backed by the SQLite history at `config.persistence.database_path`
pub async fn open_downloader(config: Config, fetcher: Arc<FakeFetcher>) -> MediaDownloader {
    let db = Database::new(&config.persistence.database_path)
        .await
        .expect("open history database");
    MediaDownloader::with_gateways(config, fetcher, Arc::new(db))
        .await
        .expect("create downloader")
}

pub fn watch_url(key: &str) -> String {
    format!("https://www.youtube.com/watch?v={key}")
}

/// Wait until the entry reaches a terminal status
pub async fn wait_for_terminal(downloader: &MediaDownloader, id: JobId) -> EntryStatus {
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            if let Some(entry) = downloader.entry(id).await
                && entry.status.is_terminal()
            {
                return entry.status;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("entry did not reach a terminal status")
}
