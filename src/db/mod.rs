//! Database layer for media-dl
//!
//! SQLite persistence for the completed-item history.
//!
//! ## Submodules
//!
//! Methods on [`Database`] are organized by domain:
//! - [`migrations`] - Database lifecycle, schema migrations
//! - [`history`] - History records, queries and the [`HistoryStore`](crate::history::HistoryStore) implementation

use crate::history::HistoryRecord;
use sqlx::{FromRow, sqlite::SqlitePool};
use std::path::PathBuf;

mod history;
mod migrations;

/// History record from database
#[derive(Debug, Clone, FromRow)]
pub(crate) struct HistoryRow {
    pub item_key: String,
    pub location: String,
    pub title: Option<String>,
    pub uploader: Option<String>,
    pub url: String,
    pub format: String,
    pub quality: String,
    pub file_size_bytes: Option<i64>,
    pub duration_secs: Option<f64>,
    /// JSON array of tags
    pub tags: String,
    /// Unix timestamp
    pub retrieved_at: i64,
}

impl From<HistoryRow> for HistoryRecord {
    fn from(row: HistoryRow) -> Self {
        use chrono::{TimeZone, Utc};

        let tags = serde_json::from_str(&row.tags).unwrap_or_else(|e| {
            tracing::warn!(item_key = %row.item_key, error = %e, "Unreadable tags column");
            Vec::new()
        });

        HistoryRecord {
            item_key: row.item_key,
            location: PathBuf::from(row.location),
            title: row.title,
            uploader: row.uploader,
            url: row.url,
            format: row.format,
            quality: row.quality,
            file_size_bytes: row.file_size_bytes.map(|b| b.max(0) as u64),
            duration_secs: row.duration_secs,
            tags,
            retrieved_at: Utc
                .timestamp_opt(row.retrieved_at, 0)
                .single()
                .unwrap_or_else(Utc::now),
        }
    }
}

/// Database handle for media-dl
pub struct Database {
    pool: SqlitePool,
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
