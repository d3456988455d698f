//! Completed-item history
//!
//! The worker consults a [`HistoryStore`] before fetching and records every
//! successful retrieval in it. [`crate::db::Database`] is the durable
//! implementation; [`MemoryHistory`] keeps records in process memory.

use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// A retrieved item
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    /// External content identifier
    pub item_key: String,
    /// Where the file was stored
    pub location: PathBuf,
    /// Item title
    pub title: Option<String>,
    /// Uploader or channel name
    pub uploader: Option<String>,
    /// Source URL
    pub url: String,
    /// Output format extension
    pub format: String,
    /// Quality tier
    pub quality: String,
    /// Final file size
    pub file_size_bytes: Option<u64>,
    /// Item duration in seconds
    pub duration_secs: Option<f64>,
    /// Tags copied from the job spec
    pub tags: Vec<String>,
    /// When the retrieval finished
    pub retrieved_at: DateTime<Utc>,
}

/// Aggregate figures over the retrieval history
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct HistoryStats {
    /// Number of records
    pub total_count: u64,
    /// Sum of known file sizes
    pub total_size_bytes: u64,
    /// Records retrieved in the last seven days
    pub recent_count: u64,
    /// Per output format, most common first
    pub formats: Vec<FormatStats>,
    /// Per quality tier, most common first
    pub qualities: Vec<QualityStats>,
    /// Uploaders with the most records, at most ten
    pub top_uploaders: Vec<UploaderStats>,
    /// Per calendar month (`YYYY-MM`, UTC) over the last twelve months, newest first
    pub monthly: Vec<MonthlyStats>,
}

/// History figures for one output format
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FormatStats {
    /// Output format extension
    pub format: String,
    /// Number of records
    pub count: u64,
    /// Sum of known file sizes
    pub total_size_bytes: u64,
    /// Mean over records with a known, non-zero size
    pub average_size_bytes: Option<u64>,
}

/// History figures for one quality tier
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct QualityStats {
    /// Quality tier
    pub quality: String,
    /// Number of records
    pub count: u64,
}

/// History figures for one uploader
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct UploaderStats {
    /// Uploader or channel name
    pub uploader: String,
    /// Number of records
    pub count: u64,
    /// Sum of known file sizes
    pub total_size_bytes: u64,
}

/// History figures for one calendar month
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MonthlyStats {
    /// `YYYY-MM`
    pub month: String,
    /// Number of records
    pub count: u64,
    /// Sum of known file sizes
    pub total_size_bytes: u64,
}

/// Store of completed retrievals keyed by item key
///
/// Implementations must be safe to call from concurrent jobs.
/// `insert_if_absent` must be idempotent: inserting a key that already exists
/// leaves the stored record untouched and reports `false`.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Record for `item_key`, if one exists
    async fn lookup(&self, item_key: &str) -> Result<Option<HistoryRecord>>;

    /// Store `record` unless its key is already present
    ///
    /// Returns `true` if the record was inserted, `false` if it was ignored.
    async fn insert_if_absent(&self, record: &HistoryRecord) -> Result<bool>;

    /// Delete the record for `item_key`
    ///
    /// Returns `true` if a record was removed.
    async fn forget(&self, item_key: &str) -> Result<bool>;

    /// Human-readable name for logging
    fn name(&self) -> &'static str;
}

/// History store held in process memory
#[derive(Debug, Default)]
pub struct MemoryHistory {
    records: Mutex<HashMap<String, HistoryRecord>>,
}

impl MemoryHistory {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records
    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    /// Whether the store is empty
    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

#[async_trait]
impl HistoryStore for MemoryHistory {
    async fn lookup(&self, item_key: &str) -> Result<Option<HistoryRecord>> {
        Ok(self.records.lock().get(item_key).cloned())
    }

    async fn insert_if_absent(&self, record: &HistoryRecord) -> Result<bool> {
        let mut records = self.records.lock();
        if records.contains_key(&record.item_key) {
            return Ok(false);
        }
        records.insert(record.item_key.clone(), record.clone());
        Ok(true)
    }

    async fn forget(&self, item_key: &str) -> Result<bool> {
        Ok(self.records.lock().remove(item_key).is_some())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn record(item_key: &str, location: &str) -> HistoryRecord {
        HistoryRecord {
            item_key: item_key.to_string(),
            location: PathBuf::from(location),
            title: Some(format!("Title {item_key}")),
            uploader: Some("Uploader".into()),
            url: format!("https://www.youtube.com/watch?v={item_key}"),
            format: "mp4".into(),
            quality: "best".into(),
            file_size_bytes: Some(1024),
            duration_secs: Some(12.5),
            tags: vec!["tag".into()],
            retrieved_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn second_insert_is_ignored() {
        let history = MemoryHistory::new();
        assert!(history.insert_if_absent(&record("k", "/a.mp4")).await.unwrap());
        assert!(!history.insert_if_absent(&record("k", "/b.mp4")).await.unwrap());

        let stored = history.lookup("k").await.unwrap().unwrap();
        assert_eq!(stored.location, PathBuf::from("/a.mp4"));
        assert_eq!(history.len(), 1);
    }

    #[tokio::test]
    async fn forget_reports_whether_record_existed() {
        let history = MemoryHistory::new();
        history.insert_if_absent(&record("k", "/a.mp4")).await.unwrap();
        assert!(history.forget("k").await.unwrap());
        assert!(!history.forget("k").await.unwrap());
        assert!(history.lookup("k").await.unwrap().is_none());
    }
}
