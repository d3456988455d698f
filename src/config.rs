//! Configuration types for media-dl

use crate::error::{Error, Result};
use crate::types::{OutputFormat, Quality};
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};

/// Download behavior configuration (directories, concurrency, limits, post-processing)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DownloadConfig {
    /// Download directory (default: "./downloads")
    #[serde(default = "default_download_dir")]
    pub download_dir: PathBuf,

    /// Maximum jobs executing at once (default: 1)
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_downloads: usize,

    /// Refuse jobs whose estimated size exceeds this many bytes (default: 1000 MiB, None = no cap)
    #[serde(default = "default_max_file_size")]
    pub max_file_size_bytes: Option<u64>,

    /// Output file name pattern without extension (default: "{title}")
    ///
    /// Supports `{title}`, `{id}` and `{uploader}` placeholders. Ignored when the
    /// job spec carries a custom name.
    #[serde(default = "default_naming_pattern")]
    pub naming_pattern: String,

    /// Move finished files into per-uploader subdirectories (default: true)
    #[serde(default = "default_true")]
    pub auto_organize: bool,

    /// Embed title/artist/comment with ffmpeg when available (default: true)
    #[serde(default = "default_true")]
    pub embed_metadata: bool,

    /// Format used when a request does not specify one
    #[serde(default)]
    pub default_format: OutputFormat,

    /// Quality used when a request does not specify one
    #[serde(default)]
    pub default_quality: Quality,

    /// Upper bound on items taken from one collection (default: 50)
    #[serde(default = "default_max_collection_items")]
    pub max_collection_items: usize,

    /// Upper bound on hits returned by one search (default: 15)
    #[serde(default = "default_max_search_results")]
    pub max_search_results: usize,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            download_dir: default_download_dir(),
            max_concurrent_downloads: default_max_concurrent(),
            max_file_size_bytes: default_max_file_size(),
            naming_pattern: default_naming_pattern(),
            auto_organize: true,
            embed_metadata: true,
            default_format: OutputFormat::default(),
            default_quality: Quality::default(),
            max_collection_items: default_max_collection_items(),
            max_search_results: default_max_search_results(),
        }
    }
}

/// Data storage configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Queue document path (default: "./queue.json")
    #[serde(default = "default_queue_path")]
    pub queue_path: PathBuf,

    /// History database path (default: "./downloads.db")
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            queue_path: default_queue_path(),
            database_path: default_database_path(),
        }
    }
}

/// Deferred-job scheduler configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Interval between promotion passes (default: 60 seconds)
    #[serde(default = "default_scheduler_interval", with = "duration_serde")]
    pub poll_interval: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval: default_scheduler_interval(),
        }
    }
}

/// Queue processor configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// How long the idle queue processor waits before looking again (default: 500 ms)
    ///
    /// Enqueue and promotion wake the processor immediately; this only bounds
    /// the delay when a wake-up is missed.
    #[serde(default = "default_worker_interval", with = "duration_ms_serde")]
    pub poll_interval: Duration,

    /// How long shutdown waits for running jobs (default: 30 seconds)
    #[serde(default = "default_shutdown_timeout", with = "duration_serde")]
    pub shutdown_timeout: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval: default_worker_interval(),
            shutdown_timeout: default_shutdown_timeout(),
        }
    }
}

/// Output completion detection configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CompletionConfig {
    /// Delay between checks (default: 1000 ms)
    #[serde(default = "default_completion_interval", with = "duration_ms_serde")]
    pub poll_interval: Duration,

    /// Give up after this long (default: 30000 ms)
    #[serde(default = "default_completion_timeout", with = "duration_ms_serde")]
    pub timeout: Duration,

    /// Extensions never taken as the output (sidecars, fetcher bookkeeping)
    #[serde(default = "default_ignored_extensions")]
    pub ignored_extensions: Vec<String>,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            poll_interval: default_completion_interval(),
            timeout: default_completion_timeout(),
            ignored_extensions: default_ignored_extensions(),
        }
    }
}

/// Job status registry configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// How long terminal statuses stay pollable (default: 300 seconds)
    #[serde(default = "default_retention", with = "duration_serde")]
    pub retention: Duration,

    /// Interval between sweeps (default: 60 seconds)
    #[serde(default = "default_sweep_interval", with = "duration_serde")]
    pub sweep_interval: Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            retention: default_retention(),
            sweep_interval: default_sweep_interval(),
        }
    }
}

/// External tool paths (yt-dlp, ffmpeg)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Path to yt-dlp executable (auto-detected if None)
    #[serde(default)]
    pub ytdlp_path: Option<PathBuf>,

    /// Path to ffmpeg executable (auto-detected if None)
    #[serde(default)]
    pub ffmpeg_path: Option<PathBuf>,

    /// Whether to search PATH for external binaries if explicit paths not set (default: true)
    #[serde(default = "default_true")]
    pub search_path: bool,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            ytdlp_path: None,
            ffmpeg_path: None,
            search_path: true,
        }
    }
}

/// Main configuration for MediaDownloader
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Download behavior settings
    #[serde(default)]
    pub download: DownloadConfig,

    /// Queue and history storage
    #[serde(default)]
    pub persistence: PersistenceConfig,

    /// Deferred-job scheduler
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Queue processor
    #[serde(default)]
    pub worker: WorkerConfig,

    /// Output completion detection
    #[serde(default)]
    pub completion: CompletionConfig,

    /// Job status retention
    #[serde(default)]
    pub registry: RegistryConfig,

    /// External binaries
    #[serde(default)]
    pub tools: ToolsConfig,
}

impl Config {
    /// Download directory
    pub fn download_dir(&self) -> &PathBuf {
        &self.download.download_dir
    }

    /// Reject settings the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.download.max_concurrent_downloads == 0 {
            return Err(Error::Config {
                message: "max_concurrent_downloads must be at least 1".into(),
                key: Some("max_concurrent_downloads".into()),
            });
        }
        let intervals = [
            ("scheduler.poll_interval", self.scheduler.poll_interval),
            ("worker.poll_interval", self.worker.poll_interval),
            ("completion.poll_interval", self.completion.poll_interval),
            ("registry.sweep_interval", self.registry.sweep_interval),
        ];
        for (key, interval) in intervals {
            if interval.is_zero() {
                return Err(Error::Config {
                    message: format!("{key} must be greater than zero"),
                    key: Some(key.into()),
                });
            }
        }
        if self.download.naming_pattern.trim().is_empty() {
            return Err(Error::Config {
                message: "naming_pattern must not be empty".into(),
                key: Some("naming_pattern".into()),
            });
        }
        Ok(())
    }
}

fn default_download_dir() -> PathBuf {
    PathBuf::from("./downloads")
}

fn default_max_concurrent() -> usize {
    1
}

fn default_max_file_size() -> Option<u64> {
    Some(1000 * 1024 * 1024)
}

fn default_naming_pattern() -> String {
    "{title}".to_string()
}

fn default_max_collection_items() -> usize {
    50
}

fn default_max_search_results() -> usize {
    15
}

fn default_queue_path() -> PathBuf {
    PathBuf::from("./queue.json")
}

fn default_database_path() -> PathBuf {
    PathBuf::from("./downloads.db")
}

fn default_true() -> bool {
    true
}

fn default_scheduler_interval() -> Duration {
    Duration::from_secs(60)
}

fn default_worker_interval() -> Duration {
    Duration::from_millis(500)
}

fn default_shutdown_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_completion_interval() -> Duration {
    Duration::from_secs(1)
}

fn default_completion_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_ignored_extensions() -> Vec<String> {
    [
        "part", "ytdl", "json", "jpg", "jpeg", "png", "webp", "vtt", "srt", "temp",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_retention() -> Duration {
    Duration::from_secs(300)
}

fn default_sweep_interval() -> Duration {
    Duration::from_secs(60)
}

// Duration serialization helper
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

// Millisecond Duration serialization helper for short polling intervals
mod duration_ms_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
