//! Job finalization - write the outcome to the queue, the registry and subscribers.

use crate::error::{Error, JobError, Result};
use crate::queue::StatusExtra;
use crate::types::{EntryStatus, Event};
use std::path::PathBuf;
use std::time::Duration;

use super::context::JobTaskContext;

/// Registry error for jobs stopped by shutdown before their fetch
const INTERRUPTED_BY_SHUTDOWN: &str = "interrupted by shutdown";

pub(super) async fn finalize_job(ctx: &JobTaskContext, result: Result<PathBuf>, elapsed: Duration) {
    let id = ctx.id();
    let elapsed_ms = elapsed.as_millis() as u64;

    match result {
        Ok(path) => {
            tracing::info!(job_id = %id, path = %path.display(), elapsed_ms, "Job completed");
            complete(ctx, format!("Saved to {}", path.display())).await;
            ctx.downloader.emit_event(Event::Completed { id, path });
        }
        Err(Error::Job(JobError::AlreadyExists { item_key, location })) => {
            tracing::info!(
                job_id = %id,
                item_key = %item_key,
                location = %location.display(),
                "Item already retrieved, skipping"
            );
            complete(ctx, format!("already exists at {}", location.display())).await;
            ctx.downloader.emit_event(Event::Skipped { id, location });
        }
        Err(Error::Job(JobError::Cancelled)) if ctx.downloader.worker.shutdown.is_cancelled() => {
            tracing::info!(job_id = %id, "Job stopped by shutdown, returning it to pending");
            if let Err(e) = ctx.downloader.registry.fail(ctx.task_id, INTERRUPTED_BY_SHUTDOWN) {
                tracing::warn!(task_id = %ctx.task_id, error = %e, "Failed to record interruption");
            }
            if let Err(e) = ctx
                .downloader
                .queue
                .mark_status(id, EntryStatus::Pending, StatusExtra::default())
                .await
            {
                tracing::error!(job_id = %id, error = %e, "Failed to return entry to pending");
            }
        }
        Err(e) => {
            let message = e.to_string();
            tracing::warn!(
                job_id = %id,
                code = e.code(),
                error = %message,
                elapsed_ms,
                "Job failed"
            );
            if let Err(registry_err) = ctx.downloader.registry.fail(ctx.task_id, message.clone()) {
                tracing::warn!(task_id = %ctx.task_id, error = %registry_err, "Failed to record failure");
            }
            if let Err(persist_err) = ctx
                .downloader
                .queue
                .mark_status(id, EntryStatus::Failed, StatusExtra::error(message.clone()))
                .await
            {
                tracing::error!(job_id = %id, error = %persist_err, "Failed to mark entry failed");
            }
            ctx.downloader.emit_event(Event::Failed { id, error: message });
        }
    }
}

/// Registry first: a poller that sees the entry terminal also sees the status terminal
async fn complete(ctx: &JobTaskContext, summary: String) {
    let id = ctx.id();
    if let Err(e) = ctx.downloader.registry.complete(ctx.task_id, summary) {
        tracing::warn!(task_id = %ctx.task_id, error = %e, "Failed to record completion");
    }
    if let Err(e) = ctx
        .downloader
        .queue
        .mark_status(id, EntryStatus::Completed, StatusExtra::default())
        .await
    {
        tracing::error!(job_id = %id, error = %e, "Failed to mark entry completed");
    }
}
