//! Adding work to the queue: single items, deferred items and collections.

use crate::error::{Error, QueueError, Result};
use crate::types::{
    CollectionOutcome, EnqueueOutcome, Event, JobId, JobSpec, Priority, QueueEntry, QueueStats,
};
use crate::utils::{extract_item_key, sanitize_filename, validate_url};
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::sync::atomic::Ordering;

use super::MediaDownloader;

impl MediaDownloader {
    /// Job spec for `url` using the configured default format and quality
    pub fn job_spec(&self, url: impl Into<String>) -> JobSpec {
        JobSpec {
            format: self.config.download.default_format,
            quality: self.config.download.default_quality.clone(),
            ..JobSpec::new(url)
        }
    }

    /// Queue a job for immediate execution
    ///
    /// The entry is rejected with `AlreadyQueued` when the same item is
    /// already pending or processing. When history already holds the item
    /// the entry is still queued; the outcome carries the existing location
    /// and the worker will short-circuit unless `overwrite` is set.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// # use media_dl::*;
    /// # async fn example(downloader: MediaDownloader) -> Result<()> {
    /// let spec = downloader.job_spec("https://www.youtube.com/watch?v=dQw4w9WgXcQ");
    /// let outcome = downloader.enqueue(spec, Priority::High).await?;
    /// if let Some(location) = outcome.already_retrieved {
    ///     println!("already have it at {}", location.display());
    /// }
    /// # Ok(())
    /// # }
    /// ```
    pub async fn enqueue(&self, spec: JobSpec, priority: Priority) -> Result<EnqueueOutcome> {
        let item_key = self.admit(&spec)?;
        let already_retrieved = self.previously_retrieved(&spec, item_key.as_deref()).await?;

        let entry = QueueEntry::pending(spec, item_key.clone(), priority);
        let (id, position) = self.queue.enqueue(entry).await?;

        tracing::info!(
            job_id = %id,
            item_key = item_key.as_deref().unwrap_or("-"),
            ?priority,
            position,
            "Job queued"
        );
        self.emit_event(Event::Queued { id, item_key });
        self.worker.wake.notify_one();

        Ok(EnqueueOutcome {
            id,
            position,
            already_retrieved,
        })
    }

    /// Queue a job that becomes pending at `at`
    ///
    /// A due time in the past is accepted; the entry is promoted on the next
    /// scheduler tick. Duplicate keys are resolved at promotion time.
    pub async fn schedule(
        &self,
        spec: JobSpec,
        at: DateTime<Utc>,
        priority: Priority,
    ) -> Result<EnqueueOutcome> {
        let item_key = self.admit(&spec)?;
        let already_retrieved = self.previously_retrieved(&spec, item_key.as_deref()).await?;

        let entry = QueueEntry::scheduled(spec, item_key, priority, at);
        let (id, position) = self.queue.enqueue(entry).await?;

        tracing::info!(job_id = %id, scheduled_at = %at, "Job scheduled");
        self.emit_event(Event::Scheduled { id, at });

        Ok(EnqueueOutcome {
            id,
            position,
            already_retrieved,
        })
    }

    /// Expand a collection and queue its items
    ///
    /// Every item inherits `template` with its own URL. Items already in
    /// history (unless `template.overwrite`) or already queued are skipped and
    /// counted. At most `max_items` items are listed, capped by
    /// `download.max_collection_items`.
    pub async fn enqueue_collection(
        &self,
        url: &str,
        template: JobSpec,
        priority: Priority,
        max_items: Option<usize>,
    ) -> Result<CollectionOutcome> {
        self.ensure_accepting()?;
        validate_url(url)?;

        let limit = max_items
            .unwrap_or(self.config.download.max_collection_items)
            .min(self.config.download.max_collection_items);
        let listing = self.fetcher.list_collection(url, limit).await?;

        tracing::info!(
            url,
            title = listing.title.as_deref().unwrap_or("-"),
            items = listing.items.len(),
            "Expanding collection"
        );

        let mut outcome = CollectionOutcome {
            title: listing.title,
            ..Default::default()
        };

        for item in listing.items {
            let spec = JobSpec {
                url: item.url,
                ..template.clone()
            };
            let item_key = item
                .item_key
                .or_else(|| extract_item_key(&spec.url));

            if self
                .previously_retrieved(&spec, item_key.as_deref())
                .await?
                .is_some()
            {
                outcome.skipped_existing += 1;
                continue;
            }

            let entry = QueueEntry::pending(spec, item_key.clone(), priority);
            match self.queue.enqueue(entry).await {
                Ok((id, _)) => {
                    self.emit_event(Event::Queued { id, item_key });
                    outcome.queued.push(id);
                }
                Err(Error::Queue(QueueError::AlreadyQueued { .. })) => {
                    outcome.skipped_queued += 1;
                }
                Err(e) => return Err(e),
            }
        }

        if !outcome.queued.is_empty() {
            self.worker.wake.notify_one();
        }
        tracing::info!(
            queued = outcome.queued.len(),
            skipped_existing = outcome.skipped_existing,
            skipped_queued = outcome.skipped_queued,
            "Collection expanded"
        );
        Ok(outcome)
    }

    /// Copy of one queue entry
    pub async fn entry(&self, id: JobId) -> Option<QueueEntry> {
        self.queue.get(id).await
    }

    /// Every entry in queue order
    pub async fn list_queue(&self) -> Vec<QueueEntry> {
        self.queue.list().await
    }

    /// Pending entries in claim order
    pub async fn list_pending(&self) -> Vec<QueueEntry> {
        self.queue.list_pending().await
    }

    /// Counts per status
    pub async fn queue_stats(&self) -> QueueStats {
        self.queue.stats().await
    }

    /// Validate a spec and derive its enqueue-time item key
    fn admit(&self, spec: &JobSpec) -> Result<Option<String>> {
        self.ensure_accepting()?;
        validate_url(&spec.url)?;

        if let Some(name) = &spec.custom_name
            && sanitize_filename(name).trim().is_empty()
        {
            return Err(Error::Validation(format!(
                "custom name '{}' is empty after sanitization",
                name
            )));
        }

        Ok(extract_item_key(&spec.url))
    }

    fn ensure_accepting(&self) -> Result<()> {
        if self.worker.accepting_new.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(Error::ShuttingDown)
        }
    }

    /// Location of an earlier retrieval of the same item, for warning callers
    async fn previously_retrieved(
        &self,
        spec: &JobSpec,
        item_key: Option<&str>,
    ) -> Result<Option<PathBuf>> {
        match item_key {
            Some(key) if !spec.overwrite => self.retrieved_location(key).await,
            _ => Ok(None),
        }
    }

    /// Where history says `item_key` lives, if that file still exists
    ///
    /// A record whose file has disappeared is forgotten.
    pub(crate) async fn retrieved_location(&self, item_key: &str) -> Result<Option<PathBuf>> {
        let Some(record) = self.history.lookup(item_key).await? else {
            return Ok(None);
        };

        if tokio::fs::try_exists(&record.location).await.unwrap_or(false) {
            return Ok(Some(record.location));
        }

        tracing::info!(
            item_key,
            location = %record.location.display(),
            "History record points at a missing file, forgetting it"
        );
        self.history.forget(item_key).await?;
        Ok(None)
    }
}
