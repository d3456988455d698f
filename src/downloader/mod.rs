//! Core orchestration split into focused submodules.
//!
//! The `MediaDownloader` struct and its methods are organized by domain:
//! - [`queue`] - Enqueue, schedule and collection expansion
//! - [`control`] - Cancel, remove, reorder and status polling
//! - [`queue_processor`] - Claiming pending entries under the concurrency limit
//! - [`job_task`] - Per-entry state machine
//! - [`services`] - Background service starters
//! - [`lifecycle`] - Startup and shutdown coordination
//! - [`library`] - Age-based cleanup of the download directory and search

mod control;
mod job_task;
mod library;
mod lifecycle;
mod queue;
mod queue_processor;
mod services;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

pub use services::ServiceHandles;

use crate::completion::CompletionDetector;
use crate::config::Config;
use crate::db::Database;
use crate::error::{Error, Result};
use crate::fetch::{Fetcher, YtDlpFetcher};
use crate::history::HistoryStore;
use crate::post_processing::PostProcessor;
use crate::queue::Queue;
use crate::registry::JobRegistry;
use crate::types::{Event, JobId};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use tokio::sync::{Notify, Semaphore, broadcast};
use tokio_util::sync::CancellationToken;

/// Size of the event broadcast buffer
const EVENT_CHANNEL_CAPACITY: usize = 1000;

/// A job the worker is currently executing
pub(crate) struct ActiveJob {
    /// Cancelled to request the job stop before its fetch starts
    pub(crate) cancel_token: CancellationToken,
    /// Set once the job passed its last cancellation point
    pub(crate) fetch_started: bool,
}

/// Worker pool state
#[derive(Clone)]
pub(crate) struct WorkerState {
    /// Semaphore to limit concurrent jobs (respects max_concurrent_downloads)
    pub(crate) concurrent_limit: Arc<Semaphore>,
    /// Jobs currently executing, keyed by queue entry
    pub(crate) active_jobs: Arc<Mutex<HashMap<JobId, ActiveJob>>>,
    /// Woken when new work may be claimable
    pub(crate) wake: Arc<Notify>,
    /// Held from claim until the claimed job is in `active_jobs`
    pub(crate) claim_gate: Arc<tokio::sync::Mutex<()>>,
    /// Cancelled on shutdown; stops every background loop and is the parent of every job token
    pub(crate) shutdown: CancellationToken,
    /// Flag to indicate whether new entries are accepted (set to false during shutdown)
    pub(crate) accepting_new: Arc<AtomicBool>,
}

impl WorkerState {
    fn new(max_concurrent: usize) -> Self {
        Self {
            concurrent_limit: Arc::new(Semaphore::new(max_concurrent)),
            active_jobs: Arc::new(Mutex::new(HashMap::new())),
            wake: Arc::new(Notify::new()),
            claim_gate: Arc::new(tokio::sync::Mutex::new(())),
            shutdown: CancellationToken::new(),
            accepting_new: Arc::new(AtomicBool::new(true)),
        }
    }
}

/// Main orchestrator instance (cloneable - all fields are Arc-wrapped)
#[derive(Clone)]
pub struct MediaDownloader {
    /// Configuration (wrapped in Arc for sharing across tasks)
    pub(crate) config: Arc<Config>,
    /// Durable job queue
    pub(crate) queue: Arc<Queue>,
    /// Ephemeral per-task status
    pub(crate) registry: Arc<JobRegistry>,
    /// Completed-item history
    pub(crate) history: Arc<dyn HistoryStore>,
    /// Content retrieval backend
    pub(crate) fetcher: Arc<dyn Fetcher>,
    /// Post-processing pipeline executor
    pub(crate) post_processor: Arc<PostProcessor>,
    /// Confirms output files after a fetch
    pub(crate) detector: CompletionDetector,
    /// Event broadcast channel sender (multiple subscribers supported)
    pub(crate) event_tx: broadcast::Sender<Event>,
    /// Worker pool state
    pub(crate) worker: WorkerState,
}

impl MediaDownloader {
    /// Create a new MediaDownloader instance
    ///
    /// This initializes all core components:
    /// - Creates the download directory
    /// - Opens the queue document, re-queueing entries a previous run left processing
    /// - Opens/creates the SQLite history database and runs migrations
    /// - Locates yt-dlp (configured path, or PATH when `tools.search_path` is set)
    ///
    /// Background services are not started; call [`MediaDownloader::start`].
    pub async fn new(config: Config) -> Result<Self> {
        let fetcher: Arc<dyn Fetcher> = match &config.tools.ytdlp_path {
            Some(path) => Arc::new(YtDlpFetcher::new(path.clone())),
            None if config.tools.search_path => {
                Arc::new(YtDlpFetcher::from_path().ok_or_else(|| {
                    Error::ExternalTool("yt-dlp not found in PATH".to_string())
                })?)
            }
            None => {
                return Err(Error::Config {
                    message: "no yt-dlp path configured and PATH search is disabled"
                        .to_string(),
                    key: Some("tools.ytdlp_path".to_string()),
                });
            }
        };

        let db = Database::new(&config.persistence.database_path).await?;
        Self::with_gateways(config, fetcher, Arc::new(db)).await
    }

    /// Create an instance around explicit fetcher and history implementations
    pub async fn with_gateways(
        config: Config,
        fetcher: Arc<dyn Fetcher>,
        history: Arc<dyn HistoryStore>,
    ) -> Result<Self> {
        config.validate()?;

        tokio::fs::create_dir_all(&config.download.download_dir)
            .await
            .map_err(|e| {
                Error::Io(std::io::Error::new(
                    e.kind(),
                    format!(
                        "Failed to create download directory '{}': {}",
                        config.download.download_dir.display(),
                        e
                    ),
                ))
            })?;

        let queue = Queue::open(&config.persistence.queue_path).await?;
        let post_processor = PostProcessor::new(&config);
        let detector = CompletionDetector::from_config(&config.completion);
        let (event_tx, _rx) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let worker = WorkerState::new(config.download.max_concurrent_downloads);

        tracing::info!(
            fetcher = fetcher.name(),
            history = history.name(),
            max_concurrent = config.download.max_concurrent_downloads,
            embed_metadata = post_processor.can_embed(),
            "Media downloader initialized"
        );

        Ok(Self {
            config: Arc::new(config),
            queue: Arc::new(queue),
            registry: Arc::new(JobRegistry::new()),
            history,
            fetcher,
            post_processor: Arc::new(post_processor),
            detector,
            event_tx,
            worker,
        })
    }

    /// Subscribe to job events
    ///
    /// Multiple subscribers are supported. Each subscriber receives all events independently.
    /// Events are buffered, but if a subscriber falls behind by more than 1000 events,
    /// it will receive a `RecvError::Lagged` error.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use media_dl::{Config, MediaDownloader};
    ///
    /// #[tokio::main]
    /// async fn main() -> Result<(), Box<dyn std::error::Error>> {
    ///     let downloader = MediaDownloader::new(Config::default()).await?;
    ///
    ///     let mut events = downloader.subscribe();
    ///     tokio::spawn(async move {
    ///         while let Ok(event) = events.recv().await {
    ///             tracing::info!(?event, "job event");
    ///         }
    ///     });
    ///
    ///     Ok(())
    /// }
    /// ```
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Get the current configuration
    pub fn get_config(&self) -> Arc<Config> {
        Arc::clone(&self.config)
    }

    /// Direct access to the queue
    pub fn queue(&self) -> &Queue {
        &self.queue
    }

    /// Direct access to the status registry
    pub fn registry(&self) -> &JobRegistry {
        &self.registry
    }

    /// Emit an event to all subscribers
    ///
    /// If there are no active subscribers, the event is silently dropped.
    pub(crate) fn emit_event(&self, event: Event) {
        self.event_tx.send(event).ok();
    }
}
