//! Content retrieval
//!
//! The [`Fetcher`] trait is the seam between the job engine and whatever
//! actually pulls media off the network. The engine never assumes a fetch
//! is instantaneous or that its output appears under the expected name.
//!
//! - [`YtDlpFetcher`]: drives an external `yt-dlp` binary

mod cli;
mod parser;
mod traits;

pub use cli::YtDlpFetcher;
pub use parser::{
    parse_collection_json, parse_metadata_json, parse_progress_line, parse_search_json,
};
pub use traits::{
    CollectionItem, CollectionListing, FetchProgress, FetchRequest, FetchResult, Fetcher,
    ItemMetadata, ProgressSink, SearchHit,
};
