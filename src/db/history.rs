//! History records and queries.

use crate::history::{
    FormatStats, HistoryRecord, HistoryStats, HistoryStore, MonthlyStats, QualityStats,
    UploaderStats,
};
use crate::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Months, Utc};

use super::{Database, HistoryRow};

/// Window counted as recent by [`Database::history_stats`]
const RECENT_WINDOW_DAYS: i64 = 7;

/// Months covered by the monthly breakdown
const MONTHLY_WINDOW_MONTHS: u32 = 12;

/// Uploaders listed in the stats
const TOP_UPLOADERS: i64 = 10;

const HISTORY_COLUMNS: &str = "item_key, location, title, uploader, url, format, quality, \
     file_size_bytes, duration_secs, tags, retrieved_at";

impl Database {
    /// Insert a history record unless its item key is already present
    ///
    /// Returns `true` if a row was written.
    pub async fn insert_history(&self, record: &HistoryRecord) -> Result<bool> {
        let tags = serde_json::to_string(&record.tags)?;
        let result = sqlx::query(
            r#"
            INSERT INTO history (
                item_key, location, title, uploader, url, format, quality,
                file_size_bytes, duration_secs, tags, retrieved_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(item_key) DO NOTHING
            "#,
        )
        .bind(&record.item_key)
        .bind(record.location.to_string_lossy().into_owned())
        .bind(&record.title)
        .bind(&record.uploader)
        .bind(&record.url)
        .bind(&record.format)
        .bind(&record.quality)
        .bind(record.file_size_bytes.map(|b| b as i64))
        .bind(record.duration_secs)
        .bind(tags)
        .bind(record.retrieved_at.timestamp())
        .execute(&self.pool)
        .await
        .map_err(Error::Sqlx)?;

        Ok(result.rows_affected() > 0)
    }

    /// Get the history record for an item key
    pub async fn get_history(&self, item_key: &str) -> Result<Option<HistoryRecord>> {
        let row = sqlx::query_as::<_, HistoryRow>(&format!(
            "SELECT {HISTORY_COLUMNS} FROM history WHERE item_key = ?"
        ))
        .bind(item_key)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Sqlx)?;

        Ok(row.map(HistoryRecord::from))
    }

    /// Delete the history record for an item key
    pub async fn delete_history(&self, item_key: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM history WHERE item_key = ?")
            .bind(item_key)
            .execute(&self.pool)
            .await
            .map_err(Error::Sqlx)?;

        Ok(result.rows_affected() > 0)
    }

    /// Query history with pagination
    ///
    /// Returns records ordered by retrieval time (most recent first).
    pub async fn query_history(&self, limit: usize, offset: usize) -> Result<Vec<HistoryRecord>> {
        let rows = sqlx::query_as::<_, HistoryRow>(&format!(
            "SELECT {HISTORY_COLUMNS} FROM history \
             ORDER BY retrieved_at DESC, id DESC LIMIT ? OFFSET ?"
        ))
        .bind(limit as i64)
        .bind(offset as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Sqlx)?;

        Ok(rows.into_iter().map(HistoryRecord::from).collect())
    }

    /// Search history by title, uploader or item key (case-insensitive substring)
    pub async fn search_history(&self, text: &str, limit: usize) -> Result<Vec<HistoryRecord>> {
        let pattern = format!("%{}%", escape_like(text));
        let rows = sqlx::query_as::<_, HistoryRow>(&format!(
            "SELECT {HISTORY_COLUMNS} FROM history \
             WHERE title LIKE ?1 ESCAPE '\\' \
                OR uploader LIKE ?1 ESCAPE '\\' \
                OR item_key LIKE ?1 ESCAPE '\\' \
             ORDER BY retrieved_at DESC, id DESC LIMIT ?2"
        ))
        .bind(pattern)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Sqlx)?;

        Ok(rows.into_iter().map(HistoryRecord::from).collect())
    }

    /// Count history records
    pub async fn count_history(&self) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM history")
            .fetch_one(&self.pool)
            .await
            .map_err(Error::Sqlx)?;

        Ok(count)
    }

    /// Aggregate figures over the whole history
    pub async fn history_stats(&self) -> Result<HistoryStats> {
        self.history_stats_at(Utc::now()).await
    }

    /// Aggregate figures with the recent and monthly windows ending at `now`
    pub async fn history_stats_at(&self, now: DateTime<Utc>) -> Result<HistoryStats> {
        let (total_count, total_size): (i64, i64) = sqlx::query_as(
            "SELECT COUNT(*), COALESCE(SUM(file_size_bytes), 0) FROM history",
        )
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Sqlx)?;

        let recent_since = (now - chrono::Duration::days(RECENT_WINDOW_DAYS)).timestamp();
        let recent_count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM history WHERE retrieved_at >= ?")
                .bind(recent_since)
                .fetch_one(&self.pool)
                .await
                .map_err(Error::Sqlx)?;

        let formats: Vec<(String, i64, i64, Option<f64>)> = sqlx::query_as(
            r#"
            SELECT format, COUNT(*), COALESCE(SUM(file_size_bytes), 0),
                   AVG(CASE WHEN file_size_bytes > 0 THEN file_size_bytes END)
            FROM history
            GROUP BY format
            ORDER BY COUNT(*) DESC, format
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Sqlx)?;

        let qualities: Vec<(String, i64)> = sqlx::query_as(
            "SELECT quality, COUNT(*) FROM history GROUP BY quality ORDER BY COUNT(*) DESC, quality",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Sqlx)?;

        let uploaders: Vec<(String, i64, i64)> = sqlx::query_as(
            r#"
            SELECT uploader, COUNT(*), COALESCE(SUM(file_size_bytes), 0)
            FROM history
            WHERE uploader IS NOT NULL
            GROUP BY uploader
            ORDER BY COUNT(*) DESC, uploader
            LIMIT ?
            "#,
        )
        .bind(TOP_UPLOADERS)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Sqlx)?;

        let monthly_since = now
            .checked_sub_months(Months::new(MONTHLY_WINDOW_MONTHS))
            .unwrap_or(now)
            .timestamp();
        let monthly: Vec<(String, i64, i64)> = sqlx::query_as(
            r#"
            SELECT strftime('%Y-%m', retrieved_at, 'unixepoch') AS month,
                   COUNT(*), COALESCE(SUM(file_size_bytes), 0)
            FROM history
            WHERE retrieved_at >= ?
            GROUP BY month
            ORDER BY month DESC
            "#,
        )
        .bind(monthly_since)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Sqlx)?;

        Ok(HistoryStats {
            total_count: non_negative(total_count),
            total_size_bytes: non_negative(total_size),
            recent_count: non_negative(recent_count),
            formats: formats
                .into_iter()
                .map(|(format, count, size, average)| FormatStats {
                    format,
                    count: non_negative(count),
                    total_size_bytes: non_negative(size),
                    average_size_bytes: average.map(|avg| avg.round() as u64),
                })
                .collect(),
            qualities: qualities
                .into_iter()
                .map(|(quality, count)| QualityStats {
                    quality,
                    count: non_negative(count),
                })
                .collect(),
            top_uploaders: uploaders
                .into_iter()
                .map(|(uploader, count, size)| UploaderStats {
                    uploader,
                    count: non_negative(count),
                    total_size_bytes: non_negative(size),
                })
                .collect(),
            monthly: monthly
                .into_iter()
                .map(|(month, count, size)| MonthlyStats {
                    month,
                    count: non_negative(count),
                    total_size_bytes: non_negative(size),
                })
                .collect(),
        })
    }

    /// Delete records whose files no longer exist on disk
    ///
    /// Returns the item keys that were removed.
    pub async fn prune_missing_history(&self) -> Result<Vec<String>> {
        let rows: Vec<(String, String)> =
            sqlx::query_as("SELECT item_key, location FROM history")
                .fetch_all(&self.pool)
                .await
                .map_err(Error::Sqlx)?;

        let mut pruned = Vec::new();
        for (item_key, location) in rows {
            if tokio::fs::try_exists(&location).await.unwrap_or(false) {
                continue;
            }
            if self.delete_history(&item_key).await? {
                tracing::debug!(item_key = %item_key, location = %location, "Pruned missing history record");
                pruned.push(item_key);
            }
        }

        if !pruned.is_empty() {
            tracing::info!(count = pruned.len(), "Pruned history records with missing files");
        }
        Ok(pruned)
    }
}

fn non_negative(value: i64) -> u64 {
    value.max(0) as u64
}

fn escape_like(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[async_trait]
impl HistoryStore for Database {
    async fn lookup(&self, item_key: &str) -> Result<Option<HistoryRecord>> {
        self.get_history(item_key).await
    }

    async fn insert_if_absent(&self, record: &HistoryRecord) -> Result<bool> {
        self.insert_history(record).await
    }

    async fn forget(&self, item_key: &str) -> Result<bool> {
        self.delete_history(item_key).await
    }

    fn name(&self) -> &'static str {
        "sqlite"
    }
}
