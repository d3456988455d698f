//! Queue processor - claims pending entries and spawns job tasks.

use crate::types::{Event, QueueEntry, TaskId};
use std::sync::Arc;
use tokio::sync::OwnedSemaphorePermit;

use super::MediaDownloader;
use super::job_task::{ActiveJobGuard, JobTaskContext, run_job_task};

impl MediaDownloader {
    /// Start the queue processor task
    ///
    /// This method spawns a background task that continuously:
    /// 1. Acquires a permit from the concurrency limiter (respects max_concurrent_downloads)
    /// 2. Claims the first pending entry (pending -> processing, persisted)
    /// 3. Spawns a job task holding the permit
    /// 4. With nothing to claim, sleeps until woken or `worker.poll_interval` elapses
    ///
    /// The loop exits when the shutdown token is cancelled.
    pub fn start_queue_processor(&self) -> tokio::task::JoinHandle<()> {
        let downloader = self.clone();
        let concurrent_limit = Arc::clone(&self.worker.concurrent_limit);
        let wake = Arc::clone(&self.worker.wake);
        let claim_gate = Arc::clone(&self.worker.claim_gate);
        let shutdown = self.worker.shutdown.clone();
        let poll_interval = self.config.worker.poll_interval;

        tokio::spawn(async move {
            tracing::info!("Queue processor started");
            loop {
                let permit = tokio::select! {
                    _ = shutdown.cancelled() => break,
                    permit = Arc::clone(&concurrent_limit).acquire_owned() => match permit {
                        Ok(p) => p,
                        Err(_) => break,
                    },
                };

                // cancel and shutdown take the gate too, so they never see an
                // entry that is processing but not yet registered
                let claimed = {
                    let _gate = claim_gate.lock().await;
                    if shutdown.is_cancelled() {
                        break;
                    }
                    let task_id = TaskId::new();
                    match downloader.queue.claim_next(task_id).await {
                        Ok(Some(entry)) => {
                            downloader.spawn_job(entry, task_id, permit);
                            continue;
                        }
                        other => other,
                    }
                };

                drop(permit);
                match claimed {
                    Ok(_) => {
                        tokio::select! {
                            _ = shutdown.cancelled() => break,
                            _ = wake.notified() => {}
                            _ = tokio::time::sleep(poll_interval) => {}
                        }
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Failed to claim next entry");
                        tokio::select! {
                            _ = shutdown.cancelled() => break,
                            _ = tokio::time::sleep(poll_interval) => {}
                        }
                    }
                }
            }
            tracing::info!("Queue processor stopped");
        })
    }

    /// Register a claimed entry and run it on its own task
    ///
    /// Callers hold `claim_gate` so registration is visible before the gate opens.
    pub(super) fn spawn_job(&self, entry: QueueEntry, task_id: TaskId, permit: OwnedSemaphorePermit) {
        let id = entry.id;

        // A fresh TaskId cannot collide, so this only fails on a logic error
        if let Err(e) = self.registry.create(task_id, id) {
            tracing::error!(job_id = %id, task_id = %task_id, error = %e, "Failed to register task");
        }

        // a job claimed while shutdown is under way starts out cancelled
        let cancel_token = self.worker.shutdown.child_token();
        let guard = ActiveJobGuard::register(self, id, cancel_token.clone());
        self.emit_event(Event::Started { id, task_id });

        let ctx = JobTaskContext {
            entry,
            task_id,
            cancel_token,
            downloader: self.clone(),
        };

        tokio::spawn(async move {
            // declared after the permit so the job leaves the active map first
            let _permit = permit;
            let _guard = guard;
            run_job_task(ctx).await;
        });
    }
}
