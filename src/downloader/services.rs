//! Background service starters - scheduler, status sweeper, and everything at once.

use crate::scheduler::SchedulerTask;
use chrono::Utc;
use std::sync::Arc;
use tokio::time::MissedTickBehavior;

use super::MediaDownloader;

/// Handles of the background services started by [`MediaDownloader::start`]
pub struct ServiceHandles {
    /// Deferred entry promotion loop
    pub scheduler: tokio::task::JoinHandle<()>,
    /// Claims pending entries and spawns jobs
    pub queue_processor: tokio::task::JoinHandle<()>,
    /// Drops expired terminal statuses from the registry
    pub status_sweeper: tokio::task::JoinHandle<()>,
}

impl MediaDownloader {
    /// Start every background service
    pub fn start(&self) -> ServiceHandles {
        ServiceHandles {
            scheduler: self.start_scheduler(),
            queue_processor: self.start_queue_processor(),
            status_sweeper: self.start_status_sweeper(),
        }
    }

    /// Start the scheduler task promoting due scheduled entries
    pub fn start_scheduler(&self) -> tokio::task::JoinHandle<()> {
        let task = SchedulerTask::new(
            Arc::clone(&self.queue),
            Arc::clone(&self.worker.wake),
            self.event_tx.clone(),
            self.config.scheduler.poll_interval,
            self.worker.shutdown.clone(),
        );
        tokio::spawn(task.run())
    }

    /// Start the sweeper removing terminal statuses older than the retention window
    pub fn start_status_sweeper(&self) -> tokio::task::JoinHandle<()> {
        let registry = Arc::clone(&self.registry);
        let shutdown = self.worker.shutdown.clone();
        let retention = self.config.registry.retention;
        let sweep_interval = self.config.registry.sweep_interval;

        tokio::spawn(async move {
            let retention = match chrono::Duration::from_std(retention) {
                Ok(d) => d,
                Err(e) => {
                    tracing::error!(error = %e, "Status retention out of range, sweeper disabled");
                    return;
                }
            };

            let mut ticker = tokio::time::interval(sweep_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // the first tick completes immediately and there is nothing to sweep yet
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        let removed = registry.sweep(Utc::now() - retention, true);
                        if removed > 0 {
                            tracing::debug!(removed, "Status sweeper removed expired statuses");
                        }
                    }
                }
            }
            tracing::debug!("Status sweeper stopped");
        })
    }
}
