//! Core types for media-dl

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use uuid::Uuid;

/// Unique identifier for a queue entry
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub Uuid);

impl JobId {
    /// Create a new random JobId
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for JobId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

/// Unique identifier for one execution attempt of a queue entry
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub Uuid);

impl TaskId {
    /// Create a new random TaskId
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TaskId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

/// Job priority
///
/// `High` entries are inserted at the front of the queue; `Normal` and `Low`
/// keep arrival order.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    /// Low priority
    Low,
    /// Normal priority
    #[default]
    Normal,
    /// High priority (front of queue)
    High,
}

/// Lifecycle status of a queue entry
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryStatus {
    /// Deferred until `scheduled_at`
    Scheduled,
    /// Waiting for a worker
    Pending,
    /// Claimed by a worker
    Processing,
    /// Finished successfully (or skipped as already retrieved)
    Completed,
    /// Finished with an error
    Failed,
}

impl EntryStatus {
    /// Whether the entry counts against the one-active-entry-per-key rule
    pub fn is_active(&self) -> bool {
        matches!(self, EntryStatus::Pending | EntryStatus::Processing)
    }

    /// Whether the entry has reached a final state
    pub fn is_terminal(&self) -> bool {
        matches!(self, EntryStatus::Completed | EntryStatus::Failed)
    }

    /// Whether `self -> next` is a legal transition
    ///
    /// `Processing -> Pending` only happens when an interrupted entry is
    /// recovered on reload or a job is stopped by shutdown before its fetch.
    /// `Scheduled/Pending -> Failed` is cancellation.
    pub fn can_transition_to(&self, next: EntryStatus) -> bool {
        use EntryStatus::*;
        matches!(
            (self, next),
            (Scheduled, Pending)
                | (Scheduled, Failed)
                | (Pending, Processing)
                | (Pending, Failed)
                | (Processing, Completed)
                | (Processing, Failed)
                | (Processing, Pending)
        )
    }
}

impl fmt::Display for EntryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EntryStatus::Scheduled => "scheduled",
            EntryStatus::Pending => "pending",
            EntryStatus::Processing => "processing",
            EntryStatus::Completed => "completed",
            EntryStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Output container / audio format
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// MP4 video (merged best video + best audio)
    #[default]
    Mp4,
    /// WebM video
    Webm,
    /// MP3 audio (extracted)
    Mp3,
    /// M4A audio (extracted)
    M4a,
}

impl OutputFormat {
    /// File extension of the final artifact
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Mp4 => "mp4",
            OutputFormat::Webm => "webm",
            OutputFormat::Mp3 => "mp3",
            OutputFormat::M4a => "m4a",
        }
    }

    /// Whether the format is audio-only
    pub fn is_audio(&self) -> bool {
        matches!(self, OutputFormat::Mp3 | OutputFormat::M4a)
    }

    /// Whether ffmpeg metadata embedding is applied to this format
    pub fn supports_metadata_embedding(&self) -> bool {
        matches!(self, OutputFormat::Mp4 | OutputFormat::Mp3)
    }
}

/// Requested quality tier
///
/// Serialized as its display string (`"720p"`, `"best"`, ...). Unrecognized
/// strings are kept verbatim and estimated with a fallback bitrate.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Quality {
    /// 144p
    P144,
    /// 240p
    P240,
    /// 360p
    P360,
    /// 480p
    P480,
    /// 720p
    P720,
    /// 1080p
    P1080,
    /// 1440p
    P1440,
    /// 2160p
    P2160,
    /// Best available (merged streams)
    #[default]
    Best,
    /// Highest available resolution
    Highest,
    /// Anything else
    Other(String),
}

/// Bitrate used for qualities without an entry in the table (Mbit/s)
const FALLBACK_MBPS: f64 = 2.0;

impl Quality {
    /// Nominal bitrate in Mbit/s used for size estimation
    pub fn nominal_mbps(&self) -> f64 {
        match self {
            Quality::P144 => 0.1,
            Quality::P240 => 0.2,
            Quality::P360 => 0.5,
            Quality::P480 => 1.0,
            Quality::P720 => 2.0,
            Quality::P1080 => 4.0,
            Quality::P1440 => 6.0,
            Quality::P2160 => 12.0,
            Quality::Best => 5.0,
            Quality::Highest => 8.0,
            Quality::Other(_) => FALLBACK_MBPS,
        }
    }

    /// Maximum video height for this tier (None = unrestricted)
    pub fn max_height(&self) -> Option<u32> {
        match self {
            Quality::P144 => Some(144),
            Quality::P240 => Some(240),
            Quality::P360 => Some(360),
            Quality::P480 => Some(480),
            Quality::P720 => Some(720),
            Quality::P1080 => Some(1080),
            Quality::P1440 => Some(1440),
            Quality::P2160 => Some(2160),
            Quality::Best | Quality::Highest | Quality::Other(_) => None,
        }
    }

    /// Estimate the output size in bytes for a given duration
    pub fn estimate_size_bytes(&self, duration_secs: f64) -> u64 {
        if !duration_secs.is_finite() || duration_secs <= 0.0 {
            return 0;
        }
        (duration_secs * self.nominal_mbps() * 1024.0 * 1024.0 / 8.0) as u64
    }
}

impl From<String> for Quality {
    fn from(s: String) -> Self {
        let normalized = s.trim().to_ascii_lowercase();
        let digits = normalized.strip_suffix('p').unwrap_or(&normalized);
        match digits {
            "144" => Quality::P144,
            "240" => Quality::P240,
            "360" => Quality::P360,
            "480" => Quality::P480,
            "720" => Quality::P720,
            "1080" => Quality::P1080,
            "1440" => Quality::P1440,
            "2160" => Quality::P2160,
            "best" => Quality::Best,
            "highest" | "max" => Quality::Highest,
            _ => Quality::Other(s),
        }
    }
}

impl From<Quality> for String {
    fn from(q: Quality) -> Self {
        q.to_string()
    }
}

impl FromStr for Quality {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Quality::from(s.to_string()))
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Quality::Best => f.write_str("best"),
            Quality::Highest => f.write_str("highest"),
            Quality::Other(s) => f.write_str(s),
            tier => match tier.max_height() {
                Some(h) => write!(f, "{h}p"),
                None => f.write_str("best"),
            },
        }
    }
}

/// What to retrieve and how
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct JobSpec {
    /// Source URL of the item
    pub url: String,

    /// Output format
    #[serde(default)]
    pub format: OutputFormat,

    /// Quality tier
    #[serde(default)]
    pub quality: Quality,

    /// File name (without extension) overriding the naming pattern
    #[serde(default)]
    pub custom_name: Option<String>,

    /// Free-form tags stored with the history record
    #[serde(default)]
    pub tags: Vec<String>,

    /// Re-fetch even if the item is already in history
    #[serde(default)]
    pub overwrite: bool,
}

impl JobSpec {
    /// Spec for a URL with default format and quality
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }
}

/// Durable record of a requested job
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QueueEntry {
    /// Stable unique key
    pub id: JobId,

    /// External content identifier (None until resolved)
    pub item_key: Option<String>,

    /// What to retrieve
    pub spec: JobSpec,

    /// Queue priority
    pub priority: Priority,

    /// Lifecycle status
    pub status: EntryStatus,

    /// When the entry was created
    pub created_at: DateTime<Utc>,

    /// When a deferred entry becomes due
    pub scheduled_at: Option<DateTime<Utc>>,

    /// When the entry reached a terminal status
    pub processed_at: Option<DateTime<Utc>>,

    /// Error text for failed entries
    pub error: Option<String>,

    /// Size estimated from duration and quality
    pub estimated_size_bytes: Option<u64>,

    /// Execution attempt spawned for this entry
    #[serde(default)]
    pub task_id: Option<TaskId>,

    /// Display title once metadata is resolved
    #[serde(default)]
    pub title: Option<String>,
}

impl QueueEntry {
    /// New entry ready for the worker
    pub fn pending(spec: JobSpec, item_key: Option<String>, priority: Priority) -> Self {
        Self {
            id: JobId::new(),
            item_key,
            spec,
            priority,
            status: EntryStatus::Pending,
            created_at: Utc::now(),
            scheduled_at: None,
            processed_at: None,
            error: None,
            estimated_size_bytes: None,
            task_id: None,
            title: None,
        }
    }

    /// New entry deferred until `at`
    pub fn scheduled(
        spec: JobSpec,
        item_key: Option<String>,
        priority: Priority,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            status: EntryStatus::Scheduled,
            scheduled_at: Some(at),
            ..Self::pending(spec, item_key, priority)
        }
    }
}

/// Execution phase of a task
///
/// Terminal phases carry their payload, so a failed task always has an error
/// string and only a completed task has a result summary.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum Phase {
    /// Task created
    Starting,
    /// Resolving metadata and checking history
    ExtractingInfo,
    /// Fetch in progress
    Downloading,
    /// Completion detection and post-processing
    Processing,
    /// Finished successfully
    Completed {
        /// Human-readable result
        summary: String,
    },
    /// Finished with an error
    Failed {
        /// Human-readable error
        error: String,
    },
    /// Sentinel returned for unknown or expired task ids
    NotFound,
}

impl Phase {
    /// Whether the phase is final
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Phase::Completed { .. } | Phase::Failed { .. } | Phase::NotFound
        )
    }

    /// Short name of the phase
    pub fn name(&self) -> &'static str {
        match self {
            Phase::Starting => "starting",
            Phase::ExtractingInfo => "extracting_info",
            Phase::Downloading => "downloading",
            Phase::Processing => "processing",
            Phase::Completed { .. } => "completed",
            Phase::Failed { .. } => "failed",
            Phase::NotFound => "not_found",
        }
    }
}

/// Ephemeral progress record of one execution attempt
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct JobStatus {
    /// Execution attempt id
    pub task_id: TaskId,

    /// Queue entry being executed (None for the not-found sentinel)
    pub job_id: Option<JobId>,

    /// Current phase
    #[serde(flatten)]
    pub phase: Phase,

    /// Overall progress (0.0 to 100.0)
    pub progress_percent: f32,

    /// Bytes fetched so far
    pub downloaded_bytes: u64,

    /// Total bytes, once the fetch reports it
    pub total_bytes: Option<u64>,

    /// Transfer rate in bytes per second
    pub rate_bps: Option<f64>,

    /// Estimated seconds remaining
    pub eta_secs: Option<u64>,

    /// Last mutation time
    pub updated_at: DateTime<Utc>,
}

impl JobStatus {
    /// Fresh status in phase `starting`
    pub fn starting(task_id: TaskId, job_id: JobId) -> Self {
        Self {
            task_id,
            job_id: Some(job_id),
            phase: Phase::Starting,
            progress_percent: 0.0,
            downloaded_bytes: 0,
            total_bytes: None,
            rate_bps: None,
            eta_secs: None,
            updated_at: Utc::now(),
        }
    }

    /// Sentinel for a task id the registry does not know
    pub fn not_found(task_id: TaskId) -> Self {
        Self {
            job_id: None,
            phase: Phase::NotFound,
            ..Self::starting(task_id, JobId(Uuid::nil()))
        }
    }

    /// Error text, if the task failed
    pub fn error(&self) -> Option<&str> {
        match &self.phase {
            Phase::Failed { error } => Some(error),
            Phase::NotFound => Some("Task not found"),
            _ => None,
        }
    }

    /// Result summary, if the task completed
    pub fn result_summary(&self) -> Option<&str> {
        match &self.phase {
            Phase::Completed { summary } => Some(summary),
            _ => None,
        }
    }
}

/// Result of a successful enqueue
#[derive(Clone, Debug, PartialEq)]
pub struct EnqueueOutcome {
    /// Id of the new entry
    pub id: JobId,

    /// Zero-based position in the queue
    pub position: usize,

    /// Where the item already lives, if history has it (the entry is still queued)
    pub already_retrieved: Option<PathBuf>,
}

/// Result of expanding a collection into queue entries
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CollectionOutcome {
    /// Collection title, if the fetcher reported one
    pub title: Option<String>,

    /// Entries that were queued
    pub queued: Vec<JobId>,

    /// Items skipped because history already has them
    pub skipped_existing: usize,

    /// Items skipped because an active entry already holds their key
    pub skipped_queued: usize,
}

/// Which entries to drop in a bulk clear
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClearFilter {
    /// Everything that is not processing
    All,
    /// Completed entries
    Completed,
    /// Failed entries
    Failed,
}

impl ClearFilter {
    /// Whether an entry with `status` is dropped by this filter
    pub fn matches(&self, status: EntryStatus) -> bool {
        match self {
            ClearFilter::All => status != EntryStatus::Processing,
            ClearFilter::Completed => status == EntryStatus::Completed,
            ClearFilter::Failed => status == EntryStatus::Failed,
        }
    }
}

/// Queue counts per status
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    /// All entries
    pub total: usize,
    /// Deferred entries
    pub scheduled: usize,
    /// Waiting entries
    pub pending: usize,
    /// Running entries
    pub processing: usize,
    /// Finished entries
    pub completed: usize,
    /// Failed entries
    pub failed: usize,
}

/// Event emitted during the job lifecycle
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Entry added to the queue
    Queued {
        /// Entry ID
        id: JobId,
        /// Item key, if known at enqueue time
        item_key: Option<String>,
    },

    /// Deferred entry added
    Scheduled {
        /// Entry ID
        id: JobId,
        /// When it becomes due
        at: DateTime<Utc>,
    },

    /// Deferred entry became pending
    Promoted {
        /// Entry ID
        id: JobId,
    },

    /// Worker started executing an entry
    Started {
        /// Entry ID
        id: JobId,
        /// Execution attempt ID
        task_id: TaskId,
    },

    /// Progress update
    Progress {
        /// Execution attempt ID
        task_id: TaskId,
        /// Overall progress (0.0 to 100.0)
        percent: f32,
    },

    /// Entry skipped because history already has the item
    Skipped {
        /// Entry ID
        id: JobId,
        /// Existing location
        location: PathBuf,
    },

    /// Entry finished successfully
    Completed {
        /// Entry ID
        id: JobId,
        /// Final path
        path: PathBuf,
    },

    /// Entry failed
    Failed {
        /// Entry ID
        id: JobId,
        /// Error message
        error: String,
    },

    /// Entry removed from the queue
    Removed {
        /// Entry ID
        id: JobId,
    },

    /// Graceful shutdown initiated
    Shutdown,
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quality_parses_with_and_without_suffix() {
        assert_eq!("720p".parse::<Quality>().unwrap(), Quality::P720);
        assert_eq!("1080".parse::<Quality>().unwrap(), Quality::P1080);
        assert_eq!("BEST".parse::<Quality>().unwrap(), Quality::Best);
        assert_eq!("max".parse::<Quality>().unwrap(), Quality::Highest);
        assert_eq!(
            "potato".parse::<Quality>().unwrap(),
            Quality::Other("potato".into())
        );
    }

    #[test]
    fn quality_serializes_as_display_string() {
        let json = serde_json::to_string(&Quality::P1440).unwrap();
        assert_eq!(json, "\"1440p\"");
        let back: Quality = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Quality::P1440);
    }

    #[test]
    fn size_estimate_uses_bitrate_table() {
        // 60s at 4 Mbit/s = 30 MiB
        assert_eq!(Quality::P1080.estimate_size_bytes(60.0), 30 * 1024 * 1024);
        // unknown tier uses the 2 Mbit/s fallback
        assert_eq!(
            Quality::Other("8k".into()).estimate_size_bytes(8.0),
            2 * 1024 * 1024
        );
        assert_eq!(Quality::Best.estimate_size_bytes(0.0), 0);
        assert_eq!(Quality::Best.estimate_size_bytes(f64::NAN), 0);
    }

    #[test]
    fn entry_status_transitions() {
        use EntryStatus::*;
        assert!(Scheduled.can_transition_to(Pending));
        assert!(Pending.can_transition_to(Processing));
        assert!(Processing.can_transition_to(Completed));
        assert!(Processing.can_transition_to(Failed));
        assert!(!Failed.can_transition_to(Pending), "no retry transition");
        assert!(!Completed.can_transition_to(Processing));
        assert!(!Scheduled.can_transition_to(Processing));
    }

    #[test]
    fn failed_phase_serializes_with_error_field() {
        let mut status = JobStatus::starting(TaskId::new(), JobId::new());
        status.phase = Phase::Failed {
            error: "fetch failed: 403".into(),
        };
        let value = serde_json::to_value(&status).unwrap();
        assert_eq!(value["phase"], "failed");
        assert_eq!(value["error"], "fetch failed: 403");
    }

    #[test]
    fn not_found_sentinel_has_error() {
        let status = JobStatus::not_found(TaskId::new());
        assert_eq!(status.phase, Phase::NotFound);
        assert!(status.job_id.is_none());
        assert_eq!(status.error(), Some("Task not found"));
    }

    #[test]
    fn queue_entry_round_trips_through_json() {
        let mut entry = QueueEntry::scheduled(
            JobSpec {
                url: "https://www.youtube.com/watch?v=dQw4w9WgXcQ".into(),
                format: OutputFormat::Mp3,
                quality: Quality::P480,
                custom_name: Some("song".into()),
                tags: vec!["music".into()],
                overwrite: true,
            },
            Some("dQw4w9WgXcQ".into()),
            Priority::High,
            Utc::now(),
        );
        entry.error = Some("boom".into());
        entry.estimated_size_bytes = Some(42);

        let json = serde_json::to_string(&entry).unwrap();
        let back: QueueEntry = serde_json::from_str(&json).unwrap();
        assert_eq!(back, entry);
    }

    #[test]
    fn clear_filter_never_matches_processing() {
        assert!(!ClearFilter::All.matches(EntryStatus::Processing));
        assert!(ClearFilter::All.matches(EntryStatus::Scheduled));
        assert!(ClearFilter::Completed.matches(EntryStatus::Completed));
        assert!(!ClearFilter::Failed.matches(EntryStatus::Completed));
    }
}
