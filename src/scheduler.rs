//! Deferred entry promotion
//!
//! [`SchedulerTask`] is the background loop that moves scheduled queue entries
//! whose due time has passed to `pending` and wakes the queue processor. The
//! first tick fires immediately after start, then every `poll_interval`.
//!
//! # Example
//!
//! ```no_run
//! use media_dl::queue::Queue;
//! use media_dl::scheduler::SchedulerTask;
//! use std::sync::Arc;
//! use std::time::Duration;
//! use tokio::sync::{Notify, broadcast};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let queue = Arc::new(Queue::open("queue.json").await?);
//! let (event_tx, _rx) = broadcast::channel(16);
//! let shutdown = CancellationToken::new();
//!
//! let task = SchedulerTask::new(
//!     queue,
//!     Arc::new(Notify::new()),
//!     event_tx,
//!     Duration::from_secs(60),
//!     shutdown.clone(),
//! );
//! let handle = tokio::spawn(task.run());
//!
//! shutdown.cancel();
//! handle.await?;
//! # Ok(())
//! # }
//! ```

use crate::error::Result;
use crate::queue::Queue;
use crate::types::{Event, JobId};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Notify, broadcast};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Background loop promoting due scheduled entries
pub struct SchedulerTask {
    queue: Arc<Queue>,
    /// Woken whenever something was promoted
    worker_wake: Arc<Notify>,
    event_tx: broadcast::Sender<Event>,
    interval: Duration,
    shutdown: CancellationToken,
}

impl SchedulerTask {
    /// Creates a new scheduler task
    pub fn new(
        queue: Arc<Queue>,
        worker_wake: Arc<Notify>,
        event_tx: broadcast::Sender<Event>,
        interval: Duration,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            queue,
            worker_wake,
            event_tx,
            interval,
            shutdown,
        }
    }

    /// Run until the shutdown token is cancelled
    ///
    /// A failing tick is logged and the loop carries on with the next one.
    pub async fn run(self) {
        info!(interval_secs = self.interval.as_secs(), "Scheduler task started");

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.tick().await {
                        warn!(error = %e, "Scheduler tick failed");
                    }
                }
            }
        }

        info!("Scheduler task stopped");
    }

    /// Run one promotion pass now
    pub async fn tick(&self) -> Result<Vec<JobId>> {
        promote_due_entries(&self.queue, &self.event_tx, &self.worker_wake).await
    }
}

/// Promote every due entry, emit `Promoted` for each and wake the worker
pub(crate) async fn promote_due_entries(
    queue: &Queue,
    event_tx: &broadcast::Sender<Event>,
    worker_wake: &Notify,
) -> Result<Vec<JobId>> {
    let promoted = queue.promote_due(Utc::now()).await?;

    if promoted.is_empty() {
        debug!("No scheduled entries due");
        return Ok(promoted);
    }

    for id in &promoted {
        event_tx.send(Event::Promoted { id: *id }).ok();
    }
    info!(count = promoted.len(), "Promoted due scheduled entries");
    worker_wake.notify_one();

    Ok(promoted)
}
