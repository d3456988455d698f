//! Job task context - shared state for one execution attempt.

use crate::error::{JobError, Result};
use crate::types::{JobId, Phase, QueueEntry, TaskId};
use tokio_util::sync::CancellationToken;

use super::super::{ActiveJob, MediaDownloader};

/// Shared context for a single job task, reducing parameter passing between helpers.
pub(crate) struct JobTaskContext {
    /// The claimed entry as it was when claimed
    pub(crate) entry: QueueEntry,
    pub(crate) task_id: TaskId,
    pub(crate) cancel_token: CancellationToken,
    pub(crate) downloader: MediaDownloader,
}

impl JobTaskContext {
    pub(super) fn id(&self) -> JobId {
        self.entry.id
    }

    /// Last cancellation point before the fetch
    ///
    /// Checking the token and marking the fetch as started happen under the
    /// active-jobs lock, so a concurrent `cancel` either lands before this
    /// point and fails the job, or sees the fetch started and is refused.
    pub(super) fn begin_fetch(&self) -> Result<()> {
        let mut active = self.downloader.worker.active_jobs.lock();
        if self.cancel_token.is_cancelled() {
            return Err(JobError::Cancelled.into());
        }
        if let Some(job) = active.get_mut(&self.entry.id) {
            job.fetch_started = true;
        }
        Ok(())
    }

    /// Move the registry status to `phase`
    ///
    /// The registry only rejects unknown tasks, which would mean the status
    /// was swept mid-run; that is logged and otherwise ignored.
    pub(super) fn transition(&self, phase: Phase, percent: f32) {
        let name = phase.name();
        if let Err(e) = self
            .downloader
            .registry
            .transition(self.task_id, phase, percent)
        {
            tracing::warn!(task_id = %self.task_id, phase = name, error = %e, "Status transition lost");
        } else {
            tracing::debug!(job_id = %self.entry.id, task_id = %self.task_id, phase = name, "Phase changed");
        }
    }
}

/// Registers a job as active and unregisters it when dropped
///
/// Held by the spawned task, so the entry disappears from the active map
/// even if the task panics.
pub(crate) struct ActiveJobGuard {
    downloader: MediaDownloader,
    id: JobId,
}

impl ActiveJobGuard {
    pub(crate) fn register(
        downloader: &MediaDownloader,
        id: JobId,
        cancel_token: CancellationToken,
    ) -> Self {
        downloader.worker.active_jobs.lock().insert(
            id,
            ActiveJob {
                cancel_token,
                fetch_started: false,
            },
        );
        Self {
            downloader: downloader.clone(),
            id,
        }
    }
}

impl Drop for ActiveJobGuard {
    fn drop(&mut self) {
        self.downloader.worker.active_jobs.lock().remove(&self.id);
    }
}
