//! Utility functions for URLs, file names and path manipulation

use crate::error::{Error, PostProcessError, Result};
use crate::fetch::ItemMetadata;
use std::path::{Path, PathBuf};
use url::Url;

/// Longest file name stem produced by [`sanitize_filename`], in characters
pub const MAX_FILENAME_CHARS: usize = 150;

/// Maximum number of rename attempts when resolving file collisions
const MAX_RENAME_ATTEMPTS: u32 = 9999;

/// Characters that are invalid in file names on common filesystems
const INVALID_FILENAME_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Length of a YouTube video id
const VIDEO_ID_LEN: usize = 11;

/// Parse and validate a job URL
///
/// Only absolute `http` and `https` URLs with a host are accepted.
pub fn validate_url(raw: &str) -> Result<Url> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(Error::Validation("url must not be empty".into()));
    }
    let url = Url::parse(trimmed)
        .map_err(|e| Error::Validation(format!("invalid url '{}': {}", trimmed, e)))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(Error::Validation(format!(
            "unsupported url scheme '{}'",
            url.scheme()
        )));
    }
    if url.host_str().is_none_or(str::is_empty) {
        return Err(Error::Validation(format!("url '{}' has no host", trimmed)));
    }
    Ok(url)
}

/// Extract the content identifier from a URL, when it can be derived locally
///
/// Recognizes `watch?v=`, `youtu.be/`, `/embed/`, `/shorts/` and `/live/`
/// forms. Other URLs return `None`; their key is resolved from metadata when
/// the job runs.
///
/// # Examples
///
/// ```
/// use media_dl::utils::extract_item_key;
///
/// assert_eq!(
///     extract_item_key("https://www.youtube.com/watch?v=dQw4w9WgXcQ&t=42"),
///     Some("dQw4w9WgXcQ".to_string())
/// );
/// assert_eq!(
///     extract_item_key("https://youtu.be/dQw4w9WgXcQ"),
///     Some("dQw4w9WgXcQ".to_string())
/// );
/// assert_eq!(extract_item_key("https://example.com/video/1"), None);
/// ```
#[must_use]
pub fn extract_item_key(raw: &str) -> Option<String> {
    let url = Url::parse(raw.trim()).ok()?;
    let host = url.host_str()?.trim_start_matches("www.").trim_start_matches("m.");

    let candidate = match host {
        "youtu.be" => url.path_segments()?.next().map(str::to_string),
        "youtube.com" | "music.youtube.com" | "youtube-nocookie.com" => {
            let mut segments = url.path_segments()?;
            match segments.next() {
                Some("watch") => url
                    .query_pairs()
                    .find(|(k, _)| k == "v")
                    .map(|(_, v)| v.into_owned()),
                Some("embed" | "shorts" | "live" | "v") => segments.next().map(str::to_string),
                _ => None,
            }
        }
        _ => None,
    }?;

    is_video_id(&candidate).then_some(candidate)
}

fn is_video_id(s: &str) -> bool {
    s.len() == VIDEO_ID_LEN
        && s.chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Strip characters that are invalid in file names and cap the length
///
/// # Examples
///
/// ```
/// use media_dl::utils::sanitize_filename;
///
/// assert_eq!(sanitize_filename("What? A \"Title\": Part 1/2"), "What A Title Part 12");
/// ```
#[must_use]
pub fn sanitize_filename(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .filter(|c| !INVALID_FILENAME_CHARS.contains(c) && !c.is_control())
        .collect();
    let trimmed = cleaned.trim().trim_end_matches('.');
    trimmed
        .chars()
        .take(MAX_FILENAME_CHARS)
        .collect::<String>()
        .trim()
        .to_string()
}

/// Render a naming pattern against resolved metadata
///
/// `{title}`, `{id}` and `{uploader}` are substituted; the result is
/// sanitized. Falls back to the item key when the rendered name is empty.
#[must_use]
pub fn render_name(pattern: &str, meta: &ItemMetadata) -> String {
    let rendered = pattern
        .replace("{title}", &meta.title)
        .replace("{id}", &meta.item_key)
        .replace("{uploader}", meta.uploader.as_deref().unwrap_or("Unknown"));
    let name = sanitize_filename(&rendered);
    if name.is_empty() {
        sanitize_filename(&meta.item_key)
    } else {
        name
    }
}

/// Path the finished file is expected at
#[must_use]
pub fn expected_output_path(dir: &Path, stem: &str, extension: &str) -> PathBuf {
    dir.join(format!("{stem}.{extension}"))
}

/// Get a unique path for a file, adding ` (n)` before the extension on collision
pub fn get_unique_path(path: &Path) -> Result<PathBuf> {
    if !path.exists() {
        return Ok(path.to_path_buf());
    }

    let stem = path.file_stem().and_then(|s| s.to_str()).ok_or_else(|| {
        Error::PostProcess(PostProcessError::MoveFailed {
            source_path: path.to_path_buf(),
            dest_path: path.to_path_buf(),
            reason: "Cannot extract file stem".to_string(),
        })
    })?;
    let extension = path.extension().and_then(|e| e.to_str());
    let parent = path.parent().unwrap_or_else(|| Path::new(""));

    for i in 1..=MAX_RENAME_ATTEMPTS {
        let new_name = match extension {
            Some(ext) => format!("{} ({}).{}", stem, i, ext),
            None => format!("{} ({})", stem, i),
        };
        let new_path = parent.join(new_name);
        if !new_path.exists() {
            return Ok(new_path);
        }
    }

    Err(Error::PostProcess(PostProcessError::MoveFailed {
        source_path: path.to_path_buf(),
        dest_path: path.to_path_buf(),
        reason: "Could not find unique filename after 9999 attempts".to_string(),
    }))
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_item_key_variants() {
        let cases = [
            ("https://www.youtube.com/watch?v=dQw4w9WgXcQ", Some("dQw4w9WgXcQ")),
            ("https://youtube.com/watch?list=PL1&v=dQw4w9WgXcQ", Some("dQw4w9WgXcQ")),
            ("https://m.youtube.com/watch?v=dQw4w9WgXcQ", Some("dQw4w9WgXcQ")),
            ("https://youtu.be/dQw4w9WgXcQ?si=abc", Some("dQw4w9WgXcQ")),
            ("https://www.youtube.com/embed/dQw4w9WgXcQ", Some("dQw4w9WgXcQ")),
            ("https://www.youtube.com/shorts/dQw4w9WgXcQ", Some("dQw4w9WgXcQ")),
            ("https://www.youtube.com/watch?v=short", None),
            ("https://www.youtube.com/playlist?list=PL123", None),
            ("https://vimeo.com/123456", None),
            ("not a url", None),
        ];
        for (url, expected) in cases {
            assert_eq!(
                extract_item_key(url).as_deref(),
                expected,
                "wrong key for {url}"
            );
        }
    }

    #[test]
    fn test_validate_url() {
        assert!(validate_url("https://youtu.be/dQw4w9WgXcQ").is_ok());
        assert!(validate_url("  http://example.com/v  ").is_ok());

        for bad in ["", "   ", "ftp://example.com/file", "not a url", "file:///etc/passwd"] {
            let err = validate_url(bad).unwrap_err();
            assert_eq!(err.code(), "validation_error", "accepted {bad:?}");
        }
    }

    #[test]
    fn test_sanitize_filename_strips_invalid_chars() {
        assert_eq!(sanitize_filename("a<b>c:d\"e/f\\g|h?i*j"), "abcdefghij");
        assert_eq!(sanitize_filename("  padded name.  "), "padded name");
        assert_eq!(sanitize_filename("???"), "");
    }

    #[test]
    fn test_sanitize_filename_caps_length() {
        let long = "é".repeat(400);
        let name = sanitize_filename(&long);
        assert_eq!(name.chars().count(), MAX_FILENAME_CHARS);
    }

    #[test]
    fn test_render_name_substitutes_placeholders() {
        let meta = ItemMetadata {
            item_key: "abc123def45".into(),
            title: "My: Video?".into(),
            uploader: Some("Chan".into()),
            ..Default::default()
        };
        assert_eq!(render_name("{title}", &meta), "My Video");
        assert_eq!(render_name("{uploader} - {id}", &meta), "Chan - abc123def45");

        let untitled = ItemMetadata {
            item_key: "abc123def45".into(),
            title: "???".into(),
            ..Default::default()
        };
        assert_eq!(render_name("{title}", &untitled), "abc123def45");
    }

    #[test]
    fn test_get_unique_path_appends_counter() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("video.mp4");
        assert_eq!(get_unique_path(&path).unwrap(), path);

        std::fs::write(&path, b"x").unwrap();
        assert_eq!(
            get_unique_path(&path).unwrap(),
            temp_dir.path().join("video (1).mp4")
        );
    }
}
