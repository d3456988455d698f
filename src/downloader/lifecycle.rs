//! Shutdown coordination.

use crate::error::Result;
use crate::types::Event;
use std::sync::atomic::Ordering;
use std::time::Duration;

use super::MediaDownloader;

/// How often shutdown re-checks the active job map
const ACTIVE_JOB_POLL: Duration = Duration::from_millis(100);

impl MediaDownloader {
    /// Gracefully shut down the downloader
    ///
    /// This method performs a graceful shutdown sequence:
    /// 1. Stops accepting new entries
    /// 2. Stops the scheduler, queue processor and sweeper
    /// 3. Cancels active jobs that have not started fetching; they return to pending
    /// 4. Waits for running jobs with a timeout (`worker.shutdown_timeout`)
    /// 5. Emits `Shutdown`
    ///
    /// Jobs still running after the timeout keep their entry `processing`;
    /// the next [`crate::queue::Queue::open`] returns it to pending.
    pub async fn shutdown(&self) -> Result<()> {
        tracing::info!("Initiating graceful shutdown");

        self.worker.accepting_new.store(false, Ordering::SeqCst);
        self.worker.shutdown.cancel();
        tracing::info!("Stopped accepting new entries and background services");

        // let an in-flight claim finish registering its job; job tokens are
        // children of the shutdown token, so that job is already cancelled
        drop(self.worker.claim_gate.lock().await);
        tracing::debug!(
            active_count = self.active_job_count(),
            "Signalled cancellation to active jobs"
        );

        let shutdown_timeout = self.config.worker.shutdown_timeout;
        match tokio::time::timeout(shutdown_timeout, self.wait_for_active_jobs()).await {
            Ok(()) => tracing::info!("All active jobs finished"),
            Err(_) => tracing::warn!(
                timeout_secs = shutdown_timeout.as_secs(),
                remaining = self.active_job_count(),
                "Timeout waiting for active jobs, proceeding with shutdown"
            ),
        }

        self.emit_event(Event::Shutdown);
        tracing::info!("Graceful shutdown complete");
        Ok(())
    }

    /// Number of jobs currently executing
    pub fn active_job_count(&self) -> usize {
        self.worker.active_jobs.lock().len()
    }

    async fn wait_for_active_jobs(&self) {
        loop {
            let active_count = self.active_job_count();
            if active_count == 0 {
                return;
            }
            tracing::debug!(active_count, "Waiting for active jobs to complete");
            tokio::time::sleep(ACTIVE_JOB_POLL).await;
        }
    }
}
