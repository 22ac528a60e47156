//! Feed ingestion: source registry, HTTP fetching, parsing and scheduling.
//!
//! - [`source`] - Registry parsing and keyword-based source selection
//! - [`parser`] - Tolerant RSS 2.0 / RSS 1.0 / Atom parsing with `quick-xml`
//! - [`trending`] - GitHub trending page adapter (HTML, not a feed)
//! - [`fetcher`] - Per-source fetch with timeouts, retries and fallback endpoints
//! - [`scheduler`] - Bounded-concurrency batch runner with a wall-clock budget
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use dailyfeed::feed::{run_batch, FeedSource, FetchOptions, Fetcher};
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let fetcher = Fetcher::new(FetchOptions::default())?;
//! let sources = vec![FeedSource::new("Example", "https://example.com/feed.xml")];
//! let outcome = run_batch(&sources, Duration::from_secs(120), |src| {
//!     let fetcher = fetcher.clone();
//!     async move { fetcher.fetch_source(&src, 10, "2025-01-06").await }
//! })
//! .await;
//! println!("{} entries", outcome.entries.len());
//! # Ok(())
//! # }
//! ```

pub mod fetcher;
pub mod parser;
pub mod scheduler;
pub mod source;
pub mod trending;

pub use fetcher::{FetchError, FetchOptions, Fetcher, TimeoutPolicy, Timeouts, TRENDING_PLATFORM};
pub use parser::{parse_feed, ParseError, ParsedItem};
pub use scheduler::{run_batch, BatchOutcome, SourceError, SourceStatus};
pub use source::{
    choose_platform_key, load_keys, load_registry, parse_keys, parse_registry,
    select_by_keys, source_matches_key, FeedSource, KeySelection, TRENDING_URL_PREFIX,
};
pub use trending::{parse_trending, TrendingRepo};
