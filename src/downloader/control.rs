//! Queue maintenance and job control: cancel, remove, reorder, poll.

use crate::error::{QueueError, Result};
use crate::scheduler::promote_due_entries;
use crate::types::{ClearFilter, EntryStatus, Event, JobId, JobStatus, TaskId};

use super::MediaDownloader;

/// Error text recorded on cancelled entries
pub(crate) const CANCELLED_REASON: &str = "cancelled";

impl MediaDownloader {
    /// Cancel a job
    ///
    /// Scheduled and pending entries fail immediately with "cancelled". A
    /// processing entry is only cancellable until its fetch starts; after
    /// that this returns `InvalidState`.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// # use media_dl::*;
    /// # async fn example(downloader: MediaDownloader, id: JobId) -> Result<()> {
    /// match downloader.cancel(id).await {
    ///     Ok(()) => println!("cancelled"),
    ///     Err(e) if e.code() == "invalid_state" => println!("too late, already fetching"),
    ///     Err(e) => return Err(e),
    /// }
    /// # Ok(())
    /// # }
    /// ```
    pub async fn cancel(&self, id: JobId) -> Result<()> {
        // an entry being claimed is either still waiting or already active once this is held
        let _gate = self.worker.claim_gate.lock().await;

        if self
            .queue
            .cancel_waiting(id, CANCELLED_REASON)
            .await?
            .is_some()
        {
            tracing::info!(job_id = %id, "Cancelled waiting job");
            self.emit_event(Event::Failed {
                id,
                error: CANCELLED_REASON.to_string(),
            });
            return Ok(());
        }

        {
            let active = self.worker.active_jobs.lock();
            if let Some(job) = active.get(&id)
                && !job.fetch_started
            {
                job.cancel_token.cancel();
                tracing::info!(job_id = %id, "Cancellation requested for starting job");
                return Ok(());
            }
        }

        let current = self
            .queue
            .get(id)
            .await
            .map(|e| e.status)
            .ok_or(QueueError::NotFound { id })?;
        Err(QueueError::InvalidState {
            id,
            operation: "cancel".to_string(),
            current,
        }
        .into())
    }

    /// Remove an entry that is not processing
    ///
    /// Returns `NotFound` for unknown ids.
    pub async fn remove(&self, id: JobId) -> Result<()> {
        match self.queue.remove(id).await? {
            Some(entry) => {
                tracing::info!(job_id = %id, status = %entry.status, "Entry removed");
                self.emit_event(Event::Removed { id });
                Ok(())
            }
            None => Err(QueueError::NotFound { id }.into()),
        }
    }

    /// Drop every entry matching `filter`
    ///
    /// Processing entries are never dropped. Returns the removed ids.
    pub async fn clear(&self, filter: ClearFilter) -> Result<Vec<JobId>> {
        let removed = self.queue.clear(filter).await?;
        for id in &removed {
            self.emit_event(Event::Removed { id: *id });
        }
        tracing::info!(?filter, removed = removed.len(), "Queue cleared");
        Ok(removed)
    }

    /// Move an entry to `index` in the queue, returning where it landed
    pub async fn move_entry(&self, id: JobId, index: usize) -> Result<usize> {
        let position = self.queue.move_to(id, index).await?;
        if self
            .queue
            .get(id)
            .await
            .is_some_and(|e| e.status == EntryStatus::Pending)
        {
            self.worker.wake.notify_one();
        }
        Ok(position)
    }

    /// Promote every due scheduled entry now instead of waiting for the next tick
    pub async fn promote_due_now(&self) -> Result<Vec<JobId>> {
        promote_due_entries(&self.queue, &self.event_tx, &self.worker.wake).await
    }

    /// Current status of an execution attempt
    ///
    /// Unknown or already swept task ids yield a `not_found` sentinel rather
    /// than an error.
    pub fn job_status(&self, task_id: TaskId) -> JobStatus {
        self.registry
            .get(task_id)
            .unwrap_or_else(|| JobStatus::not_found(task_id))
    }
}
