//! # media-dl
//!
//! Job orchestration and queue engine for media retrieval applications.
//!
//! Callers enqueue URLs (optionally deferred to a start time, or expanded
//! from a playlist or channel), and a bounded worker pool runs each entry
//! through metadata resolution, history dedup, the fetch itself, output
//! confirmation and post-processing. The queue survives restarts; live
//! status is kept per execution attempt and swept after it finishes.
//!
//! ## Quick Start
//!
//! ```no_run
//! use media_dl::{Config, MediaDownloader, Priority};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let downloader = MediaDownloader::new(Config::default()).await?;
//!
//!     // Subscribe to events
//!     let mut events = downloader.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     let _services = downloader.start();
//!     let spec = downloader.job_spec("https://www.youtube.com/watch?v=dQw4w9WgXcQ");
//!     let outcome = downloader.enqueue(spec, Priority::Normal).await?;
//!     println!("queued {} at position {}", outcome.id, outcome.position);
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Output file confirmation
pub mod completion;
/// Configuration types
pub mod config;
/// SQLite-backed history store
pub mod db;
/// Core orchestrator (decomposed into focused submodules)
pub mod downloader;
/// Error types
pub mod error;
/// Content retrieval gateway
pub mod fetch;
/// Completed-item history
pub mod history;
/// Post-processing pipeline
pub mod post_processing;
/// Durable job queue
pub mod queue;
/// Ephemeral per-task status
pub mod registry;
/// Deferred entry promotion
pub mod scheduler;
/// Core types and events
pub mod types;
/// Utility functions
pub mod utils;

// Re-export commonly used types
pub use completion::CompletionDetector;
pub use config::Config;
pub use db::Database;
pub use downloader::{MediaDownloader, ServiceHandles};
pub use error::{
    DatabaseError, Error, JobError, PostProcessError, QueueError, RegistryError, Result,
};
pub use fetch::{Fetcher, ItemMetadata, YtDlpFetcher};
pub use history::{
    FormatStats, HistoryRecord, HistoryStats, HistoryStore, MemoryHistory, MonthlyStats,
    QualityStats, UploaderStats,
};
pub use queue::Queue;
pub use registry::JobRegistry;
pub use types::{
    ClearFilter, CollectionOutcome, EnqueueOutcome, EntryStatus, Event, JobId, JobSpec,
    JobStatus, OutputFormat, Phase, Priority, Quality, QueueEntry, QueueStats, TaskId,
};

/// Wait for a termination signal, then shut the downloader down gracefully.
///
/// After the signal, [`MediaDownloader::shutdown`] stops accepting entries,
/// stops the scheduler, queue processor and status sweeper, and cancels jobs
/// that have not started fetching; their entries return to pending and run
/// again after a restart. Jobs already fetching are given
/// `worker.shutdown_timeout` to finish before `Shutdown` is emitted.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// # Example
///
/// ```no_run
/// use media_dl::{MediaDownloader, Config, run_with_shutdown};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = Config::default();
///     let downloader = MediaDownloader::new(config).await?;
///     let _services = downloader.start();
///
///     // Blocks until SIGTERM/SIGINT, then drains the worker pool
///     run_with_shutdown(downloader).await?;
///
///     Ok(())
/// }
/// ```
pub async fn run_with_shutdown(downloader: MediaDownloader) -> Result<()> {
    shutdown_after(downloader, wait_for_signal()).await
}

async fn shutdown_after(
    downloader: MediaDownloader,
    signal: impl std::future::Future<Output = ()>,
) -> Result<()> {
    signal.await;
    downloader.shutdown().await
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Set up signal handlers - these may fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), _) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            if let Ok(mut sigint) = signal(SignalKind::interrupt()) {
                sigint.recv().await;
                tracing::info!("Received SIGINT signal (Ctrl+C)");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
        (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                sigterm.recv().await;
                tracing::info!("Received SIGTERM signal");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        }
    }
}
