//! CLI-based fetcher using an external yt-dlp binary

use super::parser::{
    PATH_PREFIX, PROGRESS_PREFIX, parse_collection_json, parse_metadata_json, parse_path_line,
    parse_progress_line, parse_search_json,
};
use super::traits::{
    CollectionListing, FetchRequest, FetchResult, Fetcher, ItemMetadata, ProgressSink, SearchHit,
};
use crate::error::Error;
use crate::types::{JobSpec, OutputFormat, Quality};
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;

/// Lines of stderr kept for error messages
const STDERR_TAIL_LINES: usize = 5;

/// Audio bitrate passed to the extractor for mp3/m4a output
const AUDIO_QUALITY_KBPS: &str = "192";

/// CLI-based fetcher using an external yt-dlp binary
///
/// Metadata and collection listings come from yt-dlp's JSON dump; fetches run
/// yt-dlp with a machine-readable progress template and stream its stdout
/// line by line into the progress sink.
///
/// # Examples
///
/// ```no_run
/// use media_dl::fetch::{Fetcher, YtDlpFetcher};
/// use media_dl::JobSpec;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let fetcher = YtDlpFetcher::from_path().expect("yt-dlp not found in PATH");
/// let meta = fetcher
///     .fetch_metadata(&JobSpec::new("https://www.youtube.com/watch?v=dQw4w9WgXcQ"))
///     .await?;
/// println!("{} ({:?}s)", meta.title, meta.duration_secs);
/// # Ok(())
/// # }
/// ```
pub struct YtDlpFetcher {
    binary_path: PathBuf,
}

impl YtDlpFetcher {
    /// Create a fetcher with an explicit binary path
    pub fn new(binary_path: PathBuf) -> Self {
        Self { binary_path }
    }

    /// Attempt to find yt-dlp in PATH
    pub fn from_path() -> Option<Self> {
        which::which("yt-dlp").ok().map(Self::new)
    }

    /// Path of the binary this fetcher runs
    pub fn binary_path(&self) -> &std::path::Path {
        &self.binary_path
    }

    async fn run_json(&self, args: &[&str]) -> crate::Result<Vec<u8>> {
        let output = Command::new(&self.binary_path)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| Error::ExternalTool(format!("Failed to execute yt-dlp: {}", e)))?;

        if !output.status.success() {
            return Err(Error::ExternalTool(format!(
                "yt-dlp exited with {}: {}",
                output.status,
                stderr_tail(&String::from_utf8_lossy(&output.stderr))
            )));
        }
        Ok(output.stdout)
    }
}

/// yt-dlp format selector and post-processing arguments for a request
pub(crate) fn format_args(format: OutputFormat, quality: &Quality) -> Vec<String> {
    if format.is_audio() {
        return vec![
            "-f".into(),
            "bestaudio/best".into(),
            "-x".into(),
            "--audio-format".into(),
            format.extension().into(),
            "--audio-quality".into(),
            format!("{AUDIO_QUALITY_KBPS}K"),
        ];
    }

    let selector = match quality {
        Quality::Other(raw) => {
            let h = raw.trim_end_matches('p');
            format!("best[height<={h}][ext=mp4]/best[height<={h}]/best[ext=mp4]/best")
        }
        tier => match tier.max_height() {
            Some(h) => format!("bv*[height<={h}]+ba/b[height<={h}]"),
            None => "bv*+ba/b".to_string(),
        },
    };

    vec![
        "-f".into(),
        selector,
        "--merge-output-format".into(),
        format.extension().into(),
    ]
}

/// Escape a literal path for use inside a yt-dlp output template
fn escape_template(path: &str) -> String {
    path.replace('%', "%%")
}

/// `ytsearchN:` pseudo-URL for a text query
fn search_target(query: &str, max_results: usize) -> String {
    format!("ytsearch{}:{}", max_results.max(1), query.trim())
}

fn stderr_tail(stderr: &str) -> String {
    let lines: Vec<&str> = stderr.lines().filter(|l| !l.trim().is_empty()).collect();
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    lines[start..].join("; ")
}

#[async_trait]
impl Fetcher for YtDlpFetcher {
    async fn fetch_metadata(&self, spec: &JobSpec) -> crate::Result<ItemMetadata> {
        let stdout = self
            .run_json(&[
                "--dump-single-json",
                "--no-playlist",
                "--no-warnings",
                "--skip-download",
                &spec.url,
            ])
            .await?;
        parse_metadata_json(&stdout)
    }

    async fn fetch(
        &self,
        request: &FetchRequest,
        progress: ProgressSink,
    ) -> crate::Result<FetchResult> {
        let template = format!(
            "{}.%(ext)s",
            escape_template(&request.output_stem.to_string_lossy())
        );
        let progress_template = format!(
            "download:{PROGRESS_PREFIX} %(progress.downloaded_bytes)s %(progress.total_bytes)s \
             %(progress.total_bytes_estimate)s %(progress.speed)s %(progress.eta)s"
        );
        let path_template = format!("after_move:{PATH_PREFIX} %(filepath)s");

        let mut child = Command::new(&self.binary_path)
            .args(["--no-playlist", "--newline", "--no-warnings", "--no-simulate", "--progress"])
            .args(["--progress-template", &progress_template])
            .args(["--print", &path_template])
            .args(format_args(request.format, &request.quality))
            .args(["-o", &template])
            .arg(&request.url)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::ExternalTool(format!("Failed to execute yt-dlp: {}", e)))?;

        let stderr_task = child.stderr.take().map(|mut stderr| {
            tokio::spawn(async move {
                let mut buf = String::new();
                if let Err(e) = stderr.read_to_string(&mut buf).await {
                    tracing::debug!(error = %e, "Failed to read yt-dlp stderr");
                }
                buf
            })
        });

        let mut final_path = None;
        if let Some(stdout) = child.stdout.take() {
            let mut lines = BufReader::new(stdout).lines();
            while let Some(line) = lines.next_line().await? {
                if let Some(report) = parse_progress_line(&line) {
                    progress(report);
                } else if let Some(path) = parse_path_line(&line) {
                    final_path = Some(PathBuf::from(path));
                } else {
                    tracing::trace!(line = %line, "yt-dlp output");
                }
            }
        }

        let status = child.wait().await?;
        let stderr = match stderr_task {
            Some(task) => task.await.unwrap_or_default(),
            None => String::new(),
        };

        if !status.success() {
            return Err(Error::ExternalTool(format!(
                "yt-dlp exited with {}: {}",
                status,
                stderr_tail(&stderr)
            )));
        }

        Ok(FetchResult {
            final_path,
            metadata: None,
        })
    }

    async fn list_collection(
        &self,
        url: &str,
        max_items: usize,
    ) -> crate::Result<CollectionListing> {
        let end = max_items.max(1).to_string();
        let stdout = self
            .run_json(&[
                "--flat-playlist",
                "--dump-single-json",
                "--no-warnings",
                "--playlist-end",
                &end,
                url,
            ])
            .await?;
        parse_collection_json(&stdout, max_items)
    }

    async fn search(&self, query: &str, max_results: usize) -> crate::Result<Vec<SearchHit>> {
        let target = search_target(query, max_results);
        let stdout = self
            .run_json(&["--flat-playlist", "--dump-single-json", "--no-warnings", &target])
            .await?;
        parse_search_json(&stdout, max_results)
    }

    fn name(&self) -> &'static str {
        "yt-dlp"
    }
}
