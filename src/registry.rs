//! Job status registry
//!
//! Thread-safe map from [`TaskId`] to [`JobStatus`], the single source of truth
//! for progress polling. One coarse mutex guards the map; reads copy a single
//! status out. The lock is synchronous so the fetch progress callback can
//! update it without awaiting.
//!
//! After every mutation the registry normalizes the status:
//! - progress never decreases within one task
//! - progress stays below 100 until the task is completed
//! - a completed task reports exactly 100
//! - terminal phases are sticky; later updates are discarded

use crate::error::{RegistryError, Result};
use crate::types::{JobId, JobStatus, Phase, TaskId};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;

/// Highest progress a non-completed task may report
const MAX_UNFINISHED_PERCENT: f32 = 99.0;

/// Thread-safe store of job statuses keyed by task id
#[derive(Debug, Default)]
pub struct JobRegistry {
    statuses: Mutex<HashMap<TaskId, JobStatus>>,
}

impl JobRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new task in phase `starting`
    ///
    /// # Errors
    ///
    /// [`RegistryError::DuplicateTask`] if the task id is already registered.
    pub fn create(&self, task_id: TaskId, job_id: JobId) -> Result<JobStatus> {
        let mut statuses = self.statuses.lock();
        if statuses.contains_key(&task_id) {
            return Err(RegistryError::DuplicateTask(task_id).into());
        }
        let status = JobStatus::starting(task_id, job_id);
        statuses.insert(task_id, status.clone());
        Ok(status)
    }

    /// Apply `mutate` to a task's status and normalize the result
    ///
    /// Returns the status as stored after normalization. When the task is
    /// already terminal the mutation is discarded and the stored status is
    /// returned unchanged.
    ///
    /// # Errors
    ///
    /// [`RegistryError::UnknownTask`] if the task id is not registered.
    pub fn update<F>(&self, task_id: TaskId, mutate: F) -> Result<JobStatus>
    where
        F: FnOnce(&mut JobStatus),
    {
        let mut statuses = self.statuses.lock();
        let current = statuses
            .get_mut(&task_id)
            .ok_or(RegistryError::UnknownTask(task_id))?;

        if current.phase.is_terminal() {
            tracing::debug!(
                task_id = %task_id,
                phase = current.phase.name(),
                "Discarding update to terminal task"
            );
            return Ok(current.clone());
        }

        let previous_percent = current.progress_percent;
        let mut next = current.clone();
        mutate(&mut next);
        normalize(&mut next, previous_percent);
        *current = next;
        Ok(current.clone())
    }

    /// Set the phase and raise progress to at least `percent`
    pub fn transition(&self, task_id: TaskId, phase: Phase, percent: f32) -> Result<JobStatus> {
        self.update(task_id, |status| {
            status.phase = phase;
            status.progress_percent = percent;
        })
    }

    /// Mark the task completed with a result summary
    pub fn complete(&self, task_id: TaskId, summary: impl Into<String>) -> Result<JobStatus> {
        let summary = summary.into();
        self.update(task_id, |status| {
            status.phase = Phase::Completed { summary };
        })
    }

    /// Mark the task failed with an error message
    pub fn fail(&self, task_id: TaskId, error: impl Into<String>) -> Result<JobStatus> {
        let error = error.into();
        self.update(task_id, |status| {
            status.phase = Phase::Failed { error };
        })
    }

    /// Copy of a task's status
    pub fn get(&self, task_id: TaskId) -> Option<JobStatus> {
        self.statuses.lock().get(&task_id).cloned()
    }

    /// Number of registered tasks
    pub fn len(&self) -> usize {
        self.statuses.lock().len()
    }

    /// Whether the registry is empty
    pub fn is_empty(&self) -> bool {
        self.statuses.lock().is_empty()
    }

    /// Remove statuses last updated before `older_than`
    ///
    /// With `terminal_only`, running tasks are kept regardless of age.
    /// Returns the number of removed statuses.
    pub fn sweep(&self, older_than: DateTime<Utc>, terminal_only: bool) -> usize {
        let mut statuses = self.statuses.lock();
        let before = statuses.len();
        statuses.retain(|_, status| {
            let expired = status.updated_at < older_than;
            let eligible = !terminal_only || status.phase.is_terminal();
            !(expired && eligible)
        });
        let removed = before - statuses.len();
        if removed > 0 {
            tracing::debug!(removed, remaining = statuses.len(), "Swept job statuses");
        }
        removed
    }
}

fn normalize(status: &mut JobStatus, previous_percent: f32) {
    let mut percent = if status.progress_percent.is_finite() {
        status.progress_percent.max(previous_percent)
    } else {
        previous_percent
    };

    if matches!(status.phase, Phase::Completed { .. }) {
        percent = 100.0;
    } else {
        percent = percent.clamp(0.0, MAX_UNFINISHED_PERCENT);
    }

    status.progress_percent = percent;
    status.updated_at = Utc::now();
}
