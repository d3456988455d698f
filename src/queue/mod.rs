//! Durable job queue
//!
//! An ordered list of [`QueueEntry`] records persisted as a JSON document.
//! All mutations go through one async mutex that is held across the
//! write-through persist, so dedup-then-insert, claiming and promotion are
//! atomic with respect to each other. A mutation only becomes visible once
//! the new document is on disk.
//!
//! Ordering is insertion order, except that `High` priority entries go to the
//! front. The worker claims the first pending entry in list order.

mod persistence;


use crate::error::{QueueError, Result};
use crate::types::{
    ClearFilter, EntryStatus, JobId, Priority, QueueEntry, QueueStats, TaskId,
};
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

/// Optional fields recorded alongside a status change
#[derive(Clone, Debug, Default)]
pub struct StatusExtra {
    /// Error text (failed entries)
    pub error: Option<String>,
    /// Execution attempt id (entries moving to processing)
    pub task_id: Option<TaskId>,
}

impl StatusExtra {
    /// Extra carrying an error message
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            ..Default::default()
        }
    }
}

/// Details resolved while an entry executes
#[derive(Clone, Debug, Default)]
pub struct EntryDetails {
    /// Display title
    pub title: Option<String>,
    /// Estimated output size
    pub estimated_size_bytes: Option<u64>,
}

/// Persisted, ordered job queue
#[derive(Debug)]
pub struct Queue {
    path: PathBuf,
    entries: Mutex<Vec<QueueEntry>>,
}

impl Queue {
    /// Open the queue stored at `path`
    ///
    /// Entries left `processing` by an interrupted run are returned to
    /// `pending` so they execute again.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let queue = Self {
            entries: Mutex::new(persistence::load(&path).await?),
            path,
        };

        let recovered = queue.recover_interrupted().await?;
        let len = queue.len().await;
        tracing::info!(
            path = %queue.path.display(),
            entries = len,
            recovered,
            "Queue loaded"
        );
        Ok(queue)
    }

    /// Path of the queue document
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Add an entry, rejecting it if its key is already pending or processing
    ///
    /// `High` priority entries go to the front; others are appended. Returns
    /// the id and the zero-based position of the new entry.
    pub async fn enqueue(&self, entry: QueueEntry) -> Result<(JobId, usize)> {
        let at_front = entry.priority == Priority::High;
        self.insert(entry, at_front).await
    }

    /// Add an entry at the front of the queue regardless of its priority
    pub async fn insert_priority(&self, entry: QueueEntry) -> Result<(JobId, usize)> {
        self.insert(entry, true).await
    }

    async fn insert(&self, entry: QueueEntry, at_front: bool) -> Result<(JobId, usize)> {
        self.mutate(|entries| {
            if entry.status.is_active()
                && let Some(key) = entry.item_key.as_deref()
                && let Some(existing) = find_active(entries, key, None)
            {
                return Err(QueueError::AlreadyQueued {
                    item_key: key.to_string(),
                    existing,
                }
                .into());
            }

            let id = entry.id;
            let position = if at_front {
                entries.insert(0, entry);
                0
            } else {
                entries.push(entry);
                entries.len() - 1
            };
            Ok((id, position))
        })
        .await
    }

    /// Remove an entry that is not currently processing
    ///
    /// Returns `None` if no entry has this id.
    pub async fn remove(&self, id: JobId) -> Result<Option<QueueEntry>> {
        self.mutate(|entries| {
            let Some(index) = entries.iter().position(|e| e.id == id) else {
                return Ok(None);
            };
            let status = entries[index].status;
            if status == EntryStatus::Processing {
                return Err(QueueError::InvalidState {
                    id,
                    operation: "remove".into(),
                    current: status,
                }
                .into());
            }
            Ok(Some(entries.remove(index)))
        })
        .await
    }

    /// Snapshot of every entry in queue order
    pub async fn list(&self) -> Vec<QueueEntry> {
        self.entries.lock().await.clone()
    }

    /// Snapshot of pending entries in claim order
    pub async fn list_pending(&self) -> Vec<QueueEntry> {
        self.entries
            .lock()
            .await
            .iter()
            .filter(|e| e.status == EntryStatus::Pending)
            .cloned()
            .collect()
    }

    /// Copy of one entry
    pub async fn get(&self, id: JobId) -> Option<QueueEntry> {
        self.entries.lock().await.iter().find(|e| e.id == id).cloned()
    }

    /// Number of entries
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    /// Whether the queue has no entries
    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }

    /// Id of the pending or processing entry holding `item_key`
    pub async fn find_active(&self, item_key: &str) -> Option<JobId> {
        find_active(&self.entries.lock().await, item_key, None)
    }

    /// Move an entry to `status`, validating the transition
    ///
    /// Terminal statuses stamp `processed_at`.
    pub async fn mark_status(
        &self,
        id: JobId,
        status: EntryStatus,
        extra: StatusExtra,
    ) -> Result<QueueEntry> {
        self.mutate(|entries| {
            let entry = entry_mut(entries, id)?;
            if !entry.status.can_transition_to(status) {
                return Err(QueueError::InvalidState {
                    id,
                    operation: format!("mark {status}"),
                    current: entry.status,
                }
                .into());
            }

            entry.status = status;
            if let Some(error) = extra.error {
                entry.error = Some(error);
            }
            if let Some(task_id) = extra.task_id {
                entry.task_id = Some(task_id);
            }
            if status.is_terminal() {
                entry.processed_at = Some(Utc::now());
            }
            Ok(entry.clone())
        })
        .await
    }

    /// Record details resolved during execution
    pub async fn record_details(&self, id: JobId, details: EntryDetails) -> Result<()> {
        self.mutate(|entries| {
            let entry = entry_mut(entries, id)?;
            if details.title.is_some() {
                entry.title = details.title;
            }
            if details.estimated_size_bytes.is_some() {
                entry.estimated_size_bytes = details.estimated_size_bytes;
            }
            Ok(())
        })
        .await
    }

    /// Atomically move the first pending entry to processing
    ///
    /// The new task id is recorded on the entry before the claim is persisted.
    pub async fn claim_next(&self, task_id: TaskId) -> Result<Option<QueueEntry>> {
        self.mutate(|entries| {
            let Some(entry) = entries
                .iter_mut()
                .find(|e| e.status == EntryStatus::Pending)
            else {
                return Ok(None);
            };
            entry.status = EntryStatus::Processing;
            entry.task_id = Some(task_id);
            Ok(Some(entry.clone()))
        })
        .await
    }

    /// Promote scheduled entries due at or before `now` to pending
    ///
    /// An entry whose key is already held by an active entry stays scheduled
    /// until that entry finishes. Returns the promoted ids in queue order.
    pub async fn promote_due(&self, now: DateTime<Utc>) -> Result<Vec<JobId>> {
        self.mutate(|entries| {
            let mut promoted = Vec::new();
            for index in 0..entries.len() {
                let entry = &entries[index];
                if entry.status != EntryStatus::Scheduled {
                    continue;
                }
                let Some(at) = entry.scheduled_at else {
                    tracing::warn!(job_id = %entry.id, "Scheduled entry has no due time, skipping");
                    continue;
                };
                if at > now {
                    continue;
                }
                if let Some(key) = entry.item_key.as_deref()
                    && let Some(holder) = find_active(entries, key, None)
                {
                    tracing::debug!(
                        job_id = %entry.id,
                        holder = %holder,
                        item_key = key,
                        "Due entry collides with an active entry, keeping it scheduled"
                    );
                    continue;
                }

                let entry = &mut entries[index];
                entry.status = EntryStatus::Pending;
                promoted.push(entry.id);
            }
            Ok(promoted)
        })
        .await
    }

    /// Fail an entry that has not started yet
    ///
    /// Returns the failed entry, or `None` when the entry is no longer
    /// scheduled or pending. The check and the transition happen under one
    /// lock, so a claim can never slip in between.
    pub async fn cancel_waiting(
        &self,
        id: JobId,
        reason: &str,
    ) -> Result<Option<QueueEntry>> {
        self.mutate(|entries| {
            let entry = entry_mut(entries, id)?;
            if !matches!(entry.status, EntryStatus::Scheduled | EntryStatus::Pending) {
                return Ok(None);
            }
            entry.status = EntryStatus::Failed;
            entry.error = Some(reason.to_string());
            entry.processed_at = Some(Utc::now());
            Ok(Some(entry.clone()))
        })
        .await
    }

    /// Set the resolved item key of an entry
    ///
    /// Fails with `AlreadyQueued` when another active entry holds the key.
    pub async fn rekey(&self, id: JobId, item_key: &str) -> Result<()> {
        self.mutate(|entries| {
            if let Some(existing) = find_active(entries, item_key, Some(id)) {
                return Err(QueueError::AlreadyQueued {
                    item_key: item_key.to_string(),
                    existing,
                }
                .into());
            }
            let entry = entry_mut(entries, id)?;
            entry.item_key = Some(item_key.to_string());
            Ok(())
        })
        .await
    }

    /// Return entries interrupted mid-execution to pending
    pub async fn recover_interrupted(&self) -> Result<usize> {
        self.mutate(|entries| {
            let mut recovered = 0;
            for entry in entries
                .iter_mut()
                .filter(|e| e.status == EntryStatus::Processing)
            {
                tracing::info!(job_id = %entry.id, "Re-queueing interrupted entry");
                entry.status = EntryStatus::Pending;
                entry.task_id = None;
                recovered += 1;
            }
            Ok(recovered)
        })
        .await
    }

    /// Drop entries matching `filter`; processing entries are never dropped
    pub async fn clear(&self, filter: ClearFilter) -> Result<Vec<JobId>> {
        self.mutate(|entries| {
            let mut removed = Vec::new();
            entries.retain(|e| {
                if filter.matches(e.status) {
                    removed.push(e.id);
                    false
                } else {
                    true
                }
            });
            Ok(removed)
        })
        .await
    }

    /// Move an entry to `index` (clamped to the end of the queue)
    ///
    /// Returns the position the entry ended up at.
    pub async fn move_to(&self, id: JobId, index: usize) -> Result<usize> {
        self.mutate(|entries| {
            let from = entries
                .iter()
                .position(|e| e.id == id)
                .ok_or(QueueError::NotFound { id })?;
            let entry = entries.remove(from);
            let to = index.min(entries.len());
            entries.insert(to, entry);
            Ok(to)
        })
        .await
    }

    /// Counts per status
    pub async fn stats(&self) -> QueueStats {
        let entries = self.entries.lock().await;
        let mut stats = QueueStats {
            total: entries.len(),
            ..Default::default()
        };
        for entry in entries.iter() {
            match entry.status {
                EntryStatus::Scheduled => stats.scheduled += 1,
                EntryStatus::Pending => stats.pending += 1,
                EntryStatus::Processing => stats.processing += 1,
                EntryStatus::Completed => stats.completed += 1,
                EntryStatus::Failed => stats.failed += 1,
            }
        }
        stats
    }

    /// Write the current list to disk
    pub async fn persist(&self) -> Result<()> {
        let entries = self.entries.lock().await;
        persistence::write(&self.path, &entries).await
    }

    /// Replace the in-memory list with the document on disk
    pub async fn reload(&self) -> Result<()> {
        let loaded = persistence::load(&self.path).await?;
        *self.entries.lock().await = loaded;
        Ok(())
    }

    /// Apply `f` to a copy of the list and commit it once it is on disk
    ///
    /// Nothing is written when `f` leaves the list unchanged.
    async fn mutate<R, F>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&mut Vec<QueueEntry>) -> Result<R>,
    {
        let mut entries = self.entries.lock().await;
        let mut next = entries.clone();
        let out = f(&mut next)?;
        if next != *entries {
            persistence::write(&self.path, &next).await?;
            *entries = next;
        }
        Ok(out)
    }
}

fn find_active(entries: &[QueueEntry], item_key: &str, except: Option<JobId>) -> Option<JobId> {
    entries
        .iter()
        .find(|e| {
            e.status.is_active()
                && Some(e.id) != except
                && e.item_key.as_deref() == Some(item_key)
        })
        .map(|e| e.id)
}

fn entry_mut(entries: &mut [QueueEntry], id: JobId) -> Result<&mut QueueEntry> {
    entries
        .iter_mut()
        .find(|e| e.id == id)
        .ok_or_else(|| QueueError::NotFound { id }.into())
}
