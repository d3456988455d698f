//! Parser for yt-dlp output

use super::traits::{CollectionItem, CollectionListing, FetchProgress, ItemMetadata, SearchHit};
use crate::error::Error;
use serde::Deserialize;

/// Prefix of the progress lines requested with `--progress-template`
pub(crate) const PROGRESS_PREFIX: &str = "[media-dl:progress]";

/// Prefix of the final-path line requested with `--print`
pub(crate) const PATH_PREFIX: &str = "[media-dl:path]";

#[derive(Deserialize)]
struct RawInfo {
    id: Option<String>,
    title: Option<String>,
    uploader: Option<String>,
    channel: Option<String>,
    duration: Option<f64>,
    description: Option<String>,
    filesize: Option<u64>,
    filesize_approx: Option<u64>,
    webpage_url: Option<String>,
    url: Option<String>,
    view_count: Option<u64>,
    #[serde(default)]
    entries: Vec<Option<RawInfo>>,
}

/// Parse the JSON document printed by `--dump-single-json` for one item
pub fn parse_metadata_json(stdout: &[u8]) -> crate::Result<ItemMetadata> {
    let info: RawInfo = serde_json::from_slice(stdout)?;
    let item_key = info
        .id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| Error::ExternalTool("yt-dlp metadata has no id".into()))?;

    Ok(ItemMetadata {
        title: info.title.unwrap_or_else(|| item_key.clone()),
        item_key,
        uploader: info.uploader.or(info.channel),
        duration_secs: info.duration,
        description: info.description,
        filesize_hint: info.filesize.or(info.filesize_approx),
        webpage_url: info.webpage_url,
    })
}

/// URL of a flat entry: its page URL, its URL, or a watch URL built from its id
fn entry_url(entry: &RawInfo) -> Option<String> {
    entry
        .webpage_url
        .clone()
        .or_else(|| entry.url.clone())
        .or_else(|| entry.id.as_ref().map(|id| format!("https://www.youtube.com/watch?v={id}")))
}

/// Parse the flat listing printed by `--flat-playlist --dump-single-json`
pub fn parse_collection_json(stdout: &[u8], max_items: usize) -> crate::Result<CollectionListing> {
    let info: RawInfo = serde_json::from_slice(stdout)?;
    let items = info
        .entries
        .into_iter()
        .flatten()
        .filter_map(|entry| {
            Some(CollectionItem {
                url: entry_url(&entry)?,
                item_key: entry.id,
                title: entry.title,
            })
        })
        .take(max_items)
        .collect();

    Ok(CollectionListing {
        title: info.title,
        items,
    })
}

/// Parse the flat `ytsearchN:` result printed by `--flat-playlist --dump-single-json`
pub fn parse_search_json(stdout: &[u8], max_results: usize) -> crate::Result<Vec<SearchHit>> {
    let info: RawInfo = serde_json::from_slice(stdout)?;
    Ok(info
        .entries
        .into_iter()
        .flatten()
        .filter_map(|entry| {
            Some(SearchHit {
                url: entry_url(&entry)?,
                item_key: entry.id,
                title: entry.title,
                uploader: entry.uploader.or(entry.channel),
                duration_secs: entry.duration,
                view_count: entry.view_count,
            })
        })
        .take(max_results)
        .collect())
}

/// Parse one progress line
///
/// Fields are whitespace separated in the order downloaded, total, estimate,
/// speed, eta; yt-dlp prints `NA` for unknown values.
pub fn parse_progress_line(line: &str) -> Option<FetchProgress> {
    let rest = line.trim().strip_prefix(PROGRESS_PREFIX)?;
    let mut fields = rest.split_whitespace();

    let downloaded_bytes = parse_number(fields.next()?)? as u64;
    let total_bytes = fields.next().and_then(parse_number).map(|n| n as u64);
    let total_bytes_estimate = fields.next().and_then(parse_number).map(|n| n as u64);
    let rate_bps = fields.next().and_then(parse_number);
    let eta_secs = fields.next().and_then(parse_number).map(|n| n as u64);

    Some(FetchProgress {
        downloaded_bytes,
        total_bytes,
        total_bytes_estimate,
        rate_bps,
        eta_secs,
    })
}

/// Parse the final-path line
pub fn parse_path_line(line: &str) -> Option<&str> {
    let path = line.trim().strip_prefix(PATH_PREFIX)?.trim();
    (!path.is_empty()).then_some(path)
}

fn parse_number(field: &str) -> Option<f64> {
    field
        .parse::<f64>()
        .ok()
        .filter(|n| n.is_finite() && *n >= 0.0)
}
