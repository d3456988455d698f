//! Error types for media-dl
//!
//! This module provides the error taxonomy for the library:
//! - Queue errors (duplicate entries, unknown ids, illegal transitions)
//! - Job errors raised by the per-entry state machine
//! - Post-processing errors (non-fatal, logged by the worker)
//! - Registry errors for job status bookkeeping
//! - Infrastructure errors (database, I/O, serialization, external tools)

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::types::{EntryStatus, JobId, TaskId};

/// Result type alias for media-dl operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for media-dl
///
/// Each variant carries enough context to produce a human-readable message
/// for the job status shown to clients.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "download_dir")
        key: Option<String>,
    },

    /// The job spec was rejected before any job was created
    #[error("validation error: {0}")]
    Validation(String),

    /// Queue operation failed
    #[error("queue error: {0}")]
    Queue(#[from] QueueError),

    /// A step of the job state machine failed
    #[error("{0}")]
    Job(#[from] JobError),

    /// Post-processing error (organize, metadata embedding)
    #[error("post-processing error: {0}")]
    PostProcess(#[from] PostProcessError),

    /// Job status registry error
    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),

    /// Database operation failed
    #[error("database error: {0}")]
    Database(#[from] DatabaseError),

    /// SQLx database error
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// External tool execution failed (yt-dlp, ffmpeg)
    #[error("external tool error: {0}")]
    ExternalTool(String),

    /// Shutdown in progress - not accepting new jobs
    #[error("shutdown in progress: not accepting new jobs")]
    ShuttingDown,
}

/// Queue-related errors
#[derive(Debug, Error)]
pub enum QueueError {
    /// An entry for the same item is already pending or processing
    #[error("item {item_key} is already queued as {existing}")]
    AlreadyQueued {
        /// The item key shared by both entries
        item_key: String,
        /// The entry that already holds the key
        existing: JobId,
    },

    /// Queue entry not found
    #[error("queue entry {id} not found")]
    NotFound {
        /// The entry ID that was not found
        id: JobId,
    },

    /// Cannot perform operation in current state
    #[error("cannot {operation} entry {id} in state {current}")]
    InvalidState {
        /// The entry that is in an invalid state for the operation
        id: JobId,
        /// The operation that was attempted (e.g., "remove", "cancel")
        operation: String,
        /// The current status that prevents the operation
        current: EntryStatus,
    },
}

/// Failures of the per-entry state machine
///
/// Every variant except [`JobError::AlreadyExists`] turns the entry `failed`.
#[derive(Debug, Error)]
pub enum JobError {
    /// The item was already retrieved and overwrite was not requested
    #[error("already retrieved: {item_key} at {location}")]
    AlreadyExists {
        /// The item key found in history
        item_key: String,
        /// Where the item was stored
        location: PathBuf,
    },

    /// Metadata could not be resolved for the job spec
    #[error("metadata unavailable: {0}")]
    MetadataUnavailable(String),

    /// Estimated output size exceeds the configured cap
    #[error(
        "estimated size {estimated_bytes} bytes exceeds the limit of {limit_bytes} bytes"
    )]
    SizeLimitExceeded {
        /// Size estimated from duration and quality
        estimated_bytes: u64,
        /// Configured cap
        limit_bytes: u64,
    },

    /// The fetch operation reported failure
    #[error("fetch failed: {0}")]
    FetchFailed(String),

    /// The fetch reported success but no output file materialized in time
    #[error("output not found at {expected} after waiting {waited:?}")]
    OutputNotFound {
        /// The path the output was expected at
        expected: PathBuf,
        /// How long detection waited
        waited: Duration,
    },

    /// The job was cancelled before the fetch started
    #[error("cancelled before fetch started")]
    Cancelled,
}

/// Post-processing errors (never fatal to the job)
#[derive(Debug, Error)]
pub enum PostProcessError {
    /// File move/rename failed
    #[error("failed to move {source_path} to {dest_path}: {reason}")]
    MoveFailed {
        /// The source path of the file being moved
        source_path: PathBuf,
        /// The destination path where the file should be moved
        dest_path: PathBuf,
        /// The reason the move failed
        reason: String,
    },

    /// Metadata embedding failed
    #[error("metadata embedding failed for {path}: {reason}")]
    EmbedFailed {
        /// The file metadata was being written into
        path: PathBuf,
        /// The reason embedding failed
        reason: String,
    },
}

/// Job status registry errors
#[derive(Debug, Error)]
pub enum RegistryError {
    /// A status for this task already exists
    #[error("task {0} already exists")]
    DuplicateTask(TaskId),

    /// No status exists for this task
    #[error("task {0} not found")]
    UnknownTask(TaskId),
}

/// Database-related errors
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Failed to connect to database
    #[error("failed to connect to database: {0}")]
    ConnectionFailed(String),

    /// Failed to run migrations
    #[error("failed to run migrations: {0}")]
    MigrationFailed(String),

    /// Query failed
    #[error("query failed: {0}")]
    QueryFailed(String),
}

impl Error {
    /// Machine-readable error code
    ///
    /// Stable identifiers that an API layer can hand to clients for
    /// programmatic handling.
    pub fn code(&self) -> &'static str {
        match self {
            Error::Config { .. } => "config_error",
            Error::Validation(_) => "validation_error",
            Error::Queue(e) => match e {
                QueueError::AlreadyQueued { .. } => "already_queued",
                QueueError::NotFound { .. } => "not_found",
                QueueError::InvalidState { .. } => "invalid_state",
            },
            Error::Job(e) => match e {
                JobError::AlreadyExists { .. } => "already_exists",
                JobError::MetadataUnavailable(_) => "metadata_unavailable",
                JobError::SizeLimitExceeded { .. } => "size_limit_exceeded",
                JobError::FetchFailed(_) => "fetch_failed",
                JobError::OutputNotFound { .. } => "output_not_found",
                JobError::Cancelled => "cancelled",
            },
            Error::PostProcess(_) => "post_processing_failed",
            Error::Registry(e) => match e {
                RegistryError::DuplicateTask(_) => "duplicate_task",
                RegistryError::UnknownTask(_) => "unknown_task",
            },
            Error::Database(_) | Error::Sqlx(_) => "database_error",
            Error::Io(_) => "io_error",
            Error::Serialization(_) => "serialization_error",
            Error::ExternalTool(_) => "external_tool_error",
            Error::ShuttingDown => "shutting_down",
        }
    }

    /// Whether this error is informational rather than a failure
    ///
    /// `AlreadyQueued` and `AlreadyExists` are reported to the caller but do not
    /// indicate that anything went wrong.
    pub fn is_informational(&self) -> bool {
        matches!(
            self,
            Error::Queue(QueueError::AlreadyQueued { .. })
                | Error::Job(JobError::AlreadyExists { .. })
        )
    }
}
