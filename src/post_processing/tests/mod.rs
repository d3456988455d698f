use super::*;
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;

fn meta(uploader: Option<&str>) -> ItemMetadata {
    ItemMetadata {
        item_key: "dQw4w9WgXcQ".into(),
        title: "Never Gonna Give You Up".into(),
        uploader: uploader.map(String::from),
        description: Some("d".repeat(800)),
        ..Default::default()
    }
}

async fn downloaded_file(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    tokio::fs::write(&path, b"media bytes").await.unwrap();
    path
}

/// Write a fake ffmpeg that copies its input to its output and logs its args
#[cfg(unix)]
fn fake_ffmpeg(dir: &TempDir, exit_code: i32) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let script = dir.path().join("ffmpeg");
    let log = dir.path().join("ffmpeg-args.txt");
    let body = format!(
        "#!/bin/sh\nprintf '%s\\n' \"$@\" > '{}'\nfor a in \"$@\"; do out=\"$a\"; done\n\
         [ {code} -eq 0 ] && cp \"$5\" \"$out\"\nexit {code}\n",
        log.display(),
        code = exit_code
    );
    std::fs::write(&script, body).unwrap();
    std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
    script
}

#[tokio::test]
async fn test_organize_moves_into_uploader_directory() {
    let temp_dir = tempfile::tempdir().unwrap();
    let file = downloaded_file(temp_dir.path(), "song.mp4").await;

    let moved = organize_by_uploader(&file, temp_dir.path(), Some("Rick/Astley"), false)
        .await
        .unwrap();

    assert_eq!(moved, temp_dir.path().join("RickAstley").join("song.mp4"));
    assert!(moved.exists());
    assert!(!file.exists());
}

#[tokio::test]
async fn test_organize_unknown_uploader() {
    let temp_dir = tempfile::tempdir().unwrap();
    let file = downloaded_file(temp_dir.path(), "song.mp4").await;

    let moved = organize_by_uploader(&file, temp_dir.path(), None, false)
        .await
        .unwrap();
    assert_eq!(moved, temp_dir.path().join("Unknown").join("song.mp4"));
}

#[tokio::test]
async fn test_organize_keeps_existing_file_unless_replacing() {
    let temp_dir = tempfile::tempdir().unwrap();
    let dest_dir = temp_dir.path().join("Chan");
    tokio::fs::create_dir_all(&dest_dir).await.unwrap();
    tokio::fs::write(dest_dir.join("song.mp4"), b"older").await.unwrap();

    let file = downloaded_file(temp_dir.path(), "song.mp4").await;
    let moved = organize_by_uploader(&file, temp_dir.path(), Some("Chan"), false)
        .await
        .unwrap();
    assert_eq!(moved, dest_dir.join("song (1).mp4"));
    assert_eq!(tokio::fs::read(dest_dir.join("song.mp4")).await.unwrap(), b"older");

    let file = downloaded_file(temp_dir.path(), "song.mp4").await;
    let moved = organize_by_uploader(&file, temp_dir.path(), Some("Chan"), true)
        .await
        .unwrap();
    assert_eq!(moved, dest_dir.join("song.mp4"));
    assert_eq!(tokio::fs::read(&moved).await.unwrap(), b"media bytes");
}

#[tokio::test]
async fn test_organize_already_in_place_is_noop() {
    let temp_dir = tempfile::tempdir().unwrap();
    let dest_dir = temp_dir.path().join("Chan");
    tokio::fs::create_dir_all(&dest_dir).await.unwrap();
    let file = downloaded_file(&dest_dir, "song.mp4").await;

    let moved = organize_by_uploader(&file, temp_dir.path(), Some("Chan"), false)
        .await
        .unwrap();
    assert_eq!(moved, file);
    assert!(file.exists());
}

#[tokio::test]
async fn test_pipeline_without_stages_leaves_file() {
    let temp_dir = tempfile::tempdir().unwrap();
    let file = downloaded_file(temp_dir.path(), "clip.webm").await;
    let pipeline = PostProcessor::with_settings(temp_dir.path().to_path_buf(), false, None);

    let result = pipeline
        .run(JobId::new(), &file, &meta(Some("Chan")), OutputFormat::Webm, false)
        .await;
    assert_eq!(result, file);
    assert!(!pipeline.can_embed());
}

#[tokio::test]
async fn test_pipeline_organize_failure_is_not_fatal() {
    let temp_dir = tempfile::tempdir().unwrap();
    let missing = temp_dir.path().join("vanished.mp4");
    let pipeline = PostProcessor::with_settings(temp_dir.path().to_path_buf(), true, None);

    let result = pipeline
        .run(JobId::new(), &missing, &meta(Some("Chan")), OutputFormat::Mp4, false)
        .await;
    assert_eq!(result, missing);
}

#[test]
fn test_new_respects_embed_toggle() {
    let mut config = Config::default();
    config.download.embed_metadata = false;
    config.tools.ffmpeg_path = Some(PathBuf::from("/usr/bin/ffmpeg"));
    assert!(!PostProcessor::new(&config).can_embed());

    config.download.embed_metadata = true;
    assert!(PostProcessor::new(&config).can_embed());

    config.tools.ffmpeg_path = None;
    config.tools.search_path = false;
    assert!(!PostProcessor::new(&config).can_embed());
}

#[cfg(unix)]
#[tokio::test]
async fn test_embed_passes_tags_and_replaces_file() {
    let temp_dir = tempfile::tempdir().unwrap();
    let ffmpeg = fake_ffmpeg(&temp_dir, 0);
    let file = downloaded_file(temp_dir.path(), "song.mp4").await;

    MetadataEmbedder::new(ffmpeg)
        .embed(&file, &meta(Some("Rick Astley")))
        .await
        .unwrap();

    assert!(file.exists());
    assert!(!temp_dir.path().join("song.temp.mp4").exists());

    let args = tokio::fs::read_to_string(temp_dir.path().join("ffmpeg-args.txt"))
        .await
        .unwrap();
    let args: Vec<&str> = args.lines().collect();
    assert!(args.contains(&"title=Never Gonna Give You Up"));
    assert!(args.contains(&"artist=Rick Astley"));
    let comment = args.iter().find(|a| a.starts_with("comment=")).unwrap();
    assert_eq!(comment.len(), "comment=".len() + MAX_COMMENT_CHARS);
    assert!(args.contains(&"copy"));
}

#[cfg(unix)]
#[tokio::test]
async fn test_embed_failure_keeps_original() {
    let temp_dir = tempfile::tempdir().unwrap();
    let ffmpeg = fake_ffmpeg(&temp_dir, 1);
    let file = downloaded_file(temp_dir.path(), "song.mp3").await;

    let err = MetadataEmbedder::new(ffmpeg)
        .embed(&file, &meta(None))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "post_processing_failed");
    assert_eq!(tokio::fs::read(&file).await.unwrap(), b"media bytes");
}

#[cfg(unix)]
#[tokio::test]
async fn test_pipeline_organizes_then_embeds() {
    let temp_dir = tempfile::tempdir().unwrap();
    let tools = tempfile::tempdir().unwrap();
    let ffmpeg = fake_ffmpeg(&tools, 0);
    let file = downloaded_file(temp_dir.path(), "song.mp4").await;
    let pipeline = PostProcessor::with_settings(
        temp_dir.path().to_path_buf(),
        true,
        Some(MetadataEmbedder::new(ffmpeg)),
    );

    let result = pipeline
        .run(JobId::new(), &file, &meta(Some("Chan")), OutputFormat::Mp4, false)
        .await;

    let expected = temp_dir.path().join("Chan").join("song.mp4");
    assert_eq!(result, expected);
    let args = tokio::fs::read_to_string(tools.path().join("ffmpeg-args.txt"))
        .await
        .unwrap();
    assert!(args.contains(&expected.display().to_string()));
}

fn age_file(path: &Path, age: Duration) {
    let file = std::fs::File::options().write(true).open(path).unwrap();
    file.set_modified(std::time::SystemTime::now() - age).unwrap();
}

const DAY: Duration = Duration::from_secs(24 * 60 * 60);

#[tokio::test]
async fn test_cleanup_removes_only_expired_files_recursively() {
    let temp_dir = tempfile::tempdir().unwrap();
    let nested = temp_dir.path().join("Chan");
    tokio::fs::create_dir_all(&nested).await.unwrap();

    let old_top = downloaded_file(temp_dir.path(), "old.mp4").await;
    let old_nested = downloaded_file(&nested, "older.mp3").await;
    let fresh = downloaded_file(&nested, "fresh.mp4").await;
    age_file(&old_top, 31 * DAY);
    age_file(&old_nested, 40 * DAY);
    age_file(&fresh, 2 * DAY);

    let mut report = remove_files_older_than(temp_dir.path(), 30 * DAY)
        .await
        .unwrap();
    report.removed_files.sort();

    let mut expected = vec![old_top.clone(), old_nested.clone()];
    expected.sort();
    assert_eq!(report.removed_files, expected);
    assert_eq!(report.removed_bytes, 2 * b"media bytes".len() as u64);
    assert!(!old_top.exists());
    assert!(!old_nested.exists());
    assert!(fresh.exists());
    assert!(nested.is_dir());
}

#[tokio::test]
async fn test_cleanup_rejects_zero_age() {
    let temp_dir = tempfile::tempdir().unwrap();
    let file = downloaded_file(temp_dir.path(), "song.mp4").await;

    let err = remove_files_older_than(temp_dir.path(), Duration::ZERO)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "validation_error");
    assert!(file.exists());
}

#[tokio::test]
async fn test_cleanup_of_missing_root_is_empty() {
    let temp_dir = tempfile::tempdir().unwrap();
    let report = remove_files_older_than(&temp_dir.path().join("absent"), DAY)
        .await
        .unwrap();
    assert_eq!(report, CleanupReport::default());
}
