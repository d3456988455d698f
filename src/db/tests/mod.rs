use crate::db::*;
use crate::history::tests::record;
use crate::history::{HistoryRecord, HistoryStore};
use chrono::{TimeZone, Utc};
use tempfile::TempDir;

async fn open_db() -> (Database, TempDir) {
    let temp_dir = tempfile::tempdir().unwrap();
    let db = Database::new(&temp_dir.path().join("history.db"))
        .await
        .unwrap();
    (db, temp_dir)
}

fn record_at(item_key: &str, location: &str, secs: i64) -> HistoryRecord {
    HistoryRecord {
        retrieved_at: Utc.timestamp_opt(secs, 0).single().unwrap(),
        ..record(item_key, location)
    }
}

#[tokio::test]
async fn test_insert_and_lookup_history() {
    let (db, _dir) = open_db().await;
    let entry = record_at("dQw4w9WgXcQ", "/media/song.mp4", 1_700_000_000);

    assert!(db.insert_if_absent(&entry).await.unwrap());

    let stored = db.lookup("dQw4w9WgXcQ").await.unwrap().unwrap();
    assert_eq!(stored, entry);
}

#[tokio::test]
async fn test_second_insert_is_ignored() {
    let (db, _dir) = open_db().await;
    let first = record_at("k", "/media/first.mp4", 1_700_000_000);
    let second = record_at("k", "/media/second.mp4", 1_700_000_100);

    assert!(db.insert_if_absent(&first).await.unwrap());
    assert!(!db.insert_if_absent(&second).await.unwrap());

    let stored = db.lookup("k").await.unwrap().unwrap();
    assert_eq!(stored.location, std::path::PathBuf::from("/media/first.mp4"));
    assert_eq!(db.count_history().await.unwrap(), 1);
}

#[tokio::test]
async fn test_concurrent_inserts_store_one_row() {
    let (db, _dir) = open_db().await;
    let db = std::sync::Arc::new(db);

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let db = std::sync::Arc::clone(&db);
            tokio::spawn(async move {
                db.insert_if_absent(&record("race", &format!("/media/{i}.mp4")))
                    .await
                    .unwrap()
            })
        })
        .collect();

    let mut inserted = 0;
    for handle in handles {
        if handle.await.unwrap() {
            inserted += 1;
        }
    }
    assert_eq!(inserted, 1);
    assert_eq!(db.count_history().await.unwrap(), 1);
}

#[tokio::test]
async fn test_forget_history() {
    let (db, _dir) = open_db().await;
    db.insert_if_absent(&record("k", "/a.mp4")).await.unwrap();

    assert!(db.forget("k").await.unwrap());
    assert!(!db.forget("k").await.unwrap());
    assert!(db.lookup("k").await.unwrap().is_none());
}

#[tokio::test]
async fn test_query_history_pagination() {
    let (db, _dir) = open_db().await;
    for i in 0..5 {
        db.insert_history(&record_at(&format!("k{i}"), "/x.mp4", 1_700_000_000 + i))
            .await
            .unwrap();
    }

    let first_page = db.query_history(2, 0).await.unwrap();
    let keys: Vec<_> = first_page.iter().map(|r| r.item_key.as_str()).collect();
    assert_eq!(keys, vec!["k4", "k3"]);

    let last_page = db.query_history(2, 4).await.unwrap();
    assert_eq!(last_page.len(), 1);
    assert_eq!(last_page[0].item_key, "k0");
}

#[tokio::test]
async fn test_search_history_matches_title_and_uploader() {
    let (db, _dir) = open_db().await;
    let mut a = record("a", "/a.mp4");
    a.title = Some("Rust Conference Keynote".into());
    a.uploader = Some("Ferris".into());
    let mut b = record("b", "/b.mp4");
    b.title = Some("Cooking 101".into());
    b.uploader = Some("Chef".into());
    db.insert_history(&a).await.unwrap();
    db.insert_history(&b).await.unwrap();

    let by_title = db.search_history("keynote", 10).await.unwrap();
    assert_eq!(by_title.len(), 1);
    assert_eq!(by_title[0].item_key, "a");

    let by_uploader = db.search_history("chef", 10).await.unwrap();
    assert_eq!(by_uploader.len(), 1);
    assert_eq!(by_uploader[0].item_key, "b");
}

#[tokio::test]
async fn test_search_history_treats_wildcards_literally() {
    let (db, _dir) = open_db().await;
    db.insert_history(&record("plain", "/a.mp4")).await.unwrap();

    assert!(db.search_history("%", 10).await.unwrap().is_empty());
    assert!(db.search_history("_", 10).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_prune_missing_history() {
    let (db, dir) = open_db().await;
    let present = dir.path().join("present.mp4");
    tokio::fs::write(&present, b"data").await.unwrap();

    db.insert_history(&record("present", present.to_str().unwrap()))
        .await
        .unwrap();
    db.insert_history(&record("gone", dir.path().join("gone.mp4").to_str().unwrap()))
        .await
        .unwrap();

    let pruned = db.prune_missing_history().await.unwrap();
    assert_eq!(pruned, vec!["gone".to_string()]);
    assert!(db.lookup("present").await.unwrap().is_some());
    assert_eq!(db.count_history().await.unwrap(), 1);
}

#[tokio::test]
async fn test_reopen_keeps_records_and_schema() {
    let temp_dir = tempfile::tempdir().unwrap();
    let path = temp_dir.path().join("nested").join("history.db");

    let db = Database::new(&path).await.unwrap();
    db.insert_history(&record("k", "/a.mp4")).await.unwrap();
    db.close().await;

    let reopened = Database::new(&path).await.unwrap();
    assert!(reopened.lookup("k").await.unwrap().is_some());
    let version: i64 = sqlx::query_scalar("SELECT MAX(version) FROM schema_version")
        .fetch_one(reopened.pool())
        .await
        .unwrap();
    assert_eq!(version, 1);
}

fn stats_record(
    item_key: &str,
    format: &str,
    quality: &str,
    uploader: Option<&str>,
    size: Option<u64>,
    retrieved_at: chrono::DateTime<Utc>,
) -> HistoryRecord {
    HistoryRecord {
        format: format.into(),
        quality: quality.into(),
        uploader: uploader.map(String::from),
        file_size_bytes: size,
        retrieved_at,
        ..record(item_key, &format!("/media/{item_key}.{format}"))
    }
}

#[tokio::test]
async fn test_history_stats_aggregates() {
    use crate::history::{FormatStats, MonthlyStats, QualityStats, UploaderStats};

    let (db, _dir) = open_db().await;
    let now = Utc.with_ymd_and_hms(2026, 3, 15, 12, 0, 0).single().unwrap();
    let days = chrono::Duration::days;
    for entry in [
        stats_record("a", "mp4", "720p", Some("Alice"), Some(100), now - days(1)),
        stats_record("b", "mp4", "best", Some("Alice"), Some(300), now - days(3)),
        stats_record("c", "mp3", "best", Some("Bob"), Some(50), now - days(20)),
        stats_record("d", "mp3", "best", None, None, now - days(400)),
    ] {
        db.insert_history(&entry).await.unwrap();
    }

    let stats = db.history_stats_at(now).await.unwrap();

    assert_eq!(stats.total_count, 4);
    assert_eq!(stats.total_size_bytes, 450);
    assert_eq!(stats.recent_count, 2);
    assert_eq!(
        stats.formats,
        vec![
            FormatStats {
                format: "mp3".into(),
                count: 2,
                total_size_bytes: 50,
                average_size_bytes: Some(50),
            },
            FormatStats {
                format: "mp4".into(),
                count: 2,
                total_size_bytes: 400,
                average_size_bytes: Some(200),
            },
        ]
    );
    assert_eq!(
        stats.qualities,
        vec![
            QualityStats { quality: "best".into(), count: 3 },
            QualityStats { quality: "720p".into(), count: 1 },
        ]
    );
    assert_eq!(
        stats.top_uploaders,
        vec![
            UploaderStats { uploader: "Alice".into(), count: 2, total_size_bytes: 400 },
            UploaderStats { uploader: "Bob".into(), count: 1, total_size_bytes: 50 },
        ]
    );
    // the record from over a year ago falls outside the monthly window
    assert_eq!(
        stats.monthly,
        vec![
            MonthlyStats { month: "2026-03".into(), count: 2, total_size_bytes: 400 },
            MonthlyStats { month: "2026-02".into(), count: 1, total_size_bytes: 50 },
        ]
    );
}

#[tokio::test]
async fn test_history_stats_limits_uploaders_and_skips_unknown_sizes() {
    let (db, _dir) = open_db().await;
    let now = Utc::now();
    for i in 0..12 {
        let uploader = format!("Channel {i:02}");
        // channel 00 has the most records
        let copies = if i == 0 { 3 } else { 1 };
        for copy in 0..copies {
            db.insert_history(&stats_record(
                &format!("k{i}-{copy}"),
                "webm",
                "best",
                Some(&uploader),
                Some(0),
                now,
            ))
            .await
            .unwrap();
        }
    }

    let stats = db.history_stats().await.unwrap();
    assert_eq!(stats.total_count, 14);
    assert_eq!(stats.top_uploaders.len(), 10);
    assert_eq!(stats.top_uploaders[0].uploader, "Channel 00");
    assert_eq!(stats.top_uploaders[0].count, 3);
    assert_eq!(stats.formats.len(), 1);
    assert_eq!(stats.formats[0].average_size_bytes, None);
}

#[tokio::test]
async fn test_history_stats_of_empty_history() {
    let (db, _dir) = open_db().await;
    assert_eq!(
        db.history_stats().await.unwrap(),
        crate::history::HistoryStats::default()
    );
}
