//! Fetch progress mapping.
//!
//! Byte progress occupies the 10-90% band of overall progress; the phases
//! before and after the fetch own the rest.

use crate::fetch::{FetchProgress, ProgressSink};
use crate::registry::JobRegistry;
use crate::types::{Event, TaskId};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Progress reported once metadata resolution starts
pub(crate) const EXTRACTING_PERCENT: f32 = 5.0;
/// Progress at the start of the fetch
pub(crate) const DOWNLOAD_START_PERCENT: f32 = 10.0;
/// Progress at the end of the fetch
pub(crate) const DOWNLOAD_END_PERCENT: f32 = 90.0;
/// Progress while post-processing
pub(crate) const PROCESSING_PERCENT: f32 = 95.0;

/// Map fetched bytes onto the fetch band
pub(crate) fn map_progress(downloaded: u64, total: u64) -> f32 {
    if total == 0 {
        return DOWNLOAD_START_PERCENT;
    }
    let fraction = (downloaded as f64 / total as f64).clamp(0.0, 1.0);
    let band = (DOWNLOAD_END_PERCENT - DOWNLOAD_START_PERCENT) as f64;
    (DOWNLOAD_START_PERCENT as f64 + fraction * band) as f32
}

/// Build the callback handed to the fetcher
///
/// Totals fall back from the exact size to the fetcher's estimate, then to
/// `fallback_total` (metadata hint or bitrate estimate). A `Progress` event
/// is emitted whenever the whole-number percent increases.
pub(super) fn progress_sink(
    registry: Arc<JobRegistry>,
    event_tx: broadcast::Sender<Event>,
    task_id: TaskId,
    fallback_total: Option<u64>,
) -> ProgressSink {
    let last_emitted = Mutex::new(DOWNLOAD_START_PERCENT.floor());

    Arc::new(move |report: FetchProgress| {
        let total = report
            .total_bytes
            .or(report.total_bytes_estimate)
            .or(fallback_total)
            .filter(|t| *t > 0);
        let percent = total
            .map(|t| map_progress(report.downloaded_bytes, t))
            .unwrap_or(DOWNLOAD_START_PERCENT);

        let stored = registry.update(task_id, |status| {
            status.downloaded_bytes = report.downloaded_bytes;
            status.total_bytes = total;
            status.rate_bps = report.rate_bps;
            status.eta_secs = report.eta_secs;
            status.progress_percent = percent;
        });

        let Ok(status) = stored else {
            return;
        };
        let whole = status.progress_percent.floor();
        let mut last = last_emitted.lock();
        if whole > *last {
            *last = whole;
            event_tx
                .send(Event::Progress {
                    task_id,
                    percent: status.progress_percent,
                })
                .ok();
        }
    })
}
