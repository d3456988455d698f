//! Job task orchestration - top-level lifecycle for a single queue entry.

use crate::error::{Error, JobError, Result};
use crate::fetch::{FetchRequest, ItemMetadata};
use crate::history::HistoryRecord;
use crate::queue::EntryDetails;
use crate::types::Phase;
use crate::utils::{expected_output_path, get_unique_path, render_name, sanitize_filename};
use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::context::JobTaskContext;
use super::finalization::finalize_job;
use super::progress::{
    DOWNLOAD_START_PERCENT, EXTRACTING_PERCENT, PROCESSING_PERCENT, progress_sink,
};

/// Core job task -- runs one claimed entry to a terminal state.
///
/// Phases:
/// 1. Dedup against history using the enqueue-time key
/// 2. Resolve metadata; re-key and dedup again if the key changed
/// 3. Size check, then the last cancellation point
/// 4. Fetch with progress
/// 5. Confirm the output file
/// 6. Post-process (never fatal)
/// 7. Record history
///
/// Nothing escapes this function: every outcome is written to the queue, the
/// registry and the event channel by [`finalize_job`].
pub(crate) async fn run_job_task(ctx: JobTaskContext) {
    let started = std::time::Instant::now();
    tracing::info!(
        job_id = %ctx.id(),
        task_id = %ctx.task_id,
        url = %ctx.entry.spec.url,
        "Job started"
    );

    let result = execute(&ctx).await;
    finalize_job(&ctx, result, started.elapsed()).await;
}

async fn execute(ctx: &JobTaskContext) -> Result<PathBuf> {
    let downloader = &ctx.downloader;
    let config = &downloader.config;
    let entry = &ctx.entry;
    let spec = &entry.spec;

    // Phase 1: enqueue-time dedup
    if let Some(key) = entry.item_key.as_deref() {
        check_history(ctx, key).await?;
    }

    // Phase 2: metadata, with the resolved key taking over
    ctx.transition(Phase::ExtractingInfo, EXTRACTING_PERCENT);
    let meta = downloader
        .fetcher
        .fetch_metadata(spec)
        .await
        .map_err(|e| as_job_error(e, JobError::MetadataUnavailable))?;

    if !meta.item_key.is_empty() && entry.item_key.as_deref() != Some(meta.item_key.as_str()) {
        tracing::debug!(
            job_id = %ctx.id(),
            enqueued_key = entry.item_key.as_deref().unwrap_or("-"),
            resolved_key = %meta.item_key,
            "Resolved item key differs, re-keying entry"
        );
        downloader.queue.rekey(ctx.id(), &meta.item_key).await?;
        check_history(ctx, &meta.item_key).await?;
    }

    // Phase 3: size check
    let estimate = spec
        .quality
        .estimate_size_bytes(meta.duration_secs.unwrap_or_default());
    let estimate = (estimate > 0).then_some(estimate);
    downloader
        .queue
        .record_details(
            ctx.id(),
            EntryDetails {
                title: Some(meta.title.clone()),
                estimated_size_bytes: estimate,
            },
        )
        .await?;

    if let (Some(estimated_bytes), Some(limit_bytes)) =
        (estimate, config.download.max_file_size_bytes)
        && estimated_bytes > limit_bytes
    {
        return Err(JobError::SizeLimitExceeded {
            estimated_bytes,
            limit_bytes,
        }
        .into());
    }

    ctx.begin_fetch()?;

    // Phase 4: fetch
    let expected = output_path(ctx, &meta).await?;
    ctx.transition(Phase::Downloading, DOWNLOAD_START_PERCENT);

    let sink = progress_sink(
        Arc::clone(&downloader.registry),
        downloader.event_tx.clone(),
        ctx.task_id,
        meta.filesize_hint.or(estimate),
    );
    let request = FetchRequest::new(spec, expected.clone());
    let fetched = downloader
        .fetcher
        .fetch(&request, sink)
        .await
        .map_err(|e| as_job_error(e, JobError::FetchFailed))?;

    // Phase 5: completion detection
    if let Some(reported) = fetched.final_path.as_deref()
        && reported != expected
    {
        adopt_reported_path(reported, &expected).await;
    }
    let confirmed = downloader.detector.wait_for(&expected).await?;

    // Phase 6: post-processing
    ctx.transition(Phase::Processing, PROCESSING_PERCENT);
    let mut meta = meta;
    if let Some(seen) = fetched.metadata {
        meta.uploader = meta.uploader.or(seen.uploader);
        meta.duration_secs = meta.duration_secs.or(seen.duration_secs);
    }
    let final_path = downloader
        .post_processor
        .run(ctx.id(), &confirmed, &meta, spec.format, spec.overwrite)
        .await;

    // Phase 7: history
    record_history(ctx, &meta, &final_path).await;

    Ok(final_path)
}

/// Short-circuit when history already has `item_key`
///
/// With `overwrite` the old record is forgotten instead.
async fn check_history(ctx: &JobTaskContext, item_key: &str) -> Result<()> {
    let downloader = &ctx.downloader;

    if ctx.entry.spec.overwrite {
        if downloader.history.forget(item_key).await? {
            tracing::info!(job_id = %ctx.id(), item_key, "Overwrite requested, forgot previous retrieval");
        }
        return Ok(());
    }

    match downloader.retrieved_location(item_key).await? {
        Some(location) => Err(JobError::AlreadyExists {
            item_key: item_key.to_string(),
            location,
        }
        .into()),
        None => Ok(()),
    }
}

/// Where the fetcher should write the item
///
/// An unrelated file already at that name is replaced with `overwrite`,
/// otherwise the output gets a unique name so the completion check cannot
/// mistake the old file for the new one.
async fn output_path(ctx: &JobTaskContext, meta: &ItemMetadata) -> Result<PathBuf> {
    let download = &ctx.downloader.config.download;
    let spec = &ctx.entry.spec;

    let stem = match &spec.custom_name {
        Some(name) => sanitize_filename(name),
        None => render_name(&download.naming_pattern, meta),
    };
    let expected = expected_output_path(&download.download_dir, &stem, spec.format.extension());

    if !tokio::fs::try_exists(&expected).await.unwrap_or(false) {
        return Ok(expected);
    }
    if spec.overwrite {
        tokio::fs::remove_file(&expected).await?;
        Ok(expected)
    } else {
        get_unique_path(&expected)
    }
}

/// Move a file the fetcher reports under a different name to `expected`
///
/// Failure is not an error here; completion detection decides.
async fn adopt_reported_path(reported: &Path, expected: &Path) {
    if !tokio::fs::try_exists(reported).await.unwrap_or(false) {
        return;
    }
    match tokio::fs::rename(reported, expected).await {
        Ok(()) => tracing::debug!(
            from = %reported.display(),
            to = %expected.display(),
            "Moved reported output to expected path"
        ),
        Err(e) => tracing::debug!(
            from = %reported.display(),
            error = %e,
            "Could not move reported output"
        ),
    }
}

async fn record_history(ctx: &JobTaskContext, meta: &ItemMetadata, location: &Path) {
    let spec = &ctx.entry.spec;
    let Some(item_key) = Some(meta.item_key.clone())
        .filter(|k| !k.is_empty())
        .or_else(|| ctx.entry.item_key.clone())
    else {
        tracing::warn!(job_id = %ctx.id(), "No item key resolved, not recording history");
        return;
    };

    let file_size_bytes = tokio::fs::metadata(location).await.ok().map(|m| m.len());
    let record = HistoryRecord {
        item_key,
        location: location.to_path_buf(),
        title: Some(meta.title.clone()),
        uploader: meta.uploader.clone(),
        url: meta.webpage_url.clone().unwrap_or_else(|| spec.url.clone()),
        format: spec.format.extension().to_string(),
        quality: spec.quality.to_string(),
        file_size_bytes,
        duration_secs: meta.duration_secs,
        tags: spec.tags.clone(),
        retrieved_at: Utc::now(),
    };

    match ctx.downloader.history.insert_if_absent(&record).await {
        Ok(true) => {}
        Ok(false) => tracing::debug!(
            job_id = %ctx.id(),
            item_key = %record.item_key,
            "History already had this item, insert ignored"
        ),
        Err(e) => tracing::error!(
            job_id = %ctx.id(),
            item_key = %record.item_key,
            error = %e,
            "Failed to record history"
        ),
    }
}

/// Keep job errors as they are, wrap anything else with `wrap`
fn as_job_error(e: Error, wrap: fn(String) -> JobError) -> Error {
    match e {
        Error::Job(_) => e,
        other => wrap(other.to_string()).into(),
    }
}
