//! Utility functions for common operations.
//!
//! This module provides reusable utilities for:
//!
//! - **Dates**: tolerant parsing of feed timestamps and report dates
//! - **Text processing**: whitespace normalization, HTML stripping, language
//!   heuristics and keyword matching shared by the parser and the curators
//! - **URL handling**: tracking-parameter removal used as the dedup identity
//!
//! # Examples
//!
//! ```
//! use dailyfeed::util::{normalize_url, strip_html};
//!
//! assert_eq!(strip_html("<p>Hello <b>world</b></p>"), "Hello world");
//! assert_eq!(normalize_url("https://a.example/x?utm_medium=rss"), "https://a.example/x");
//! ```

mod date;
mod text;
mod url_normalize;

pub use self::date::{age_in_days, parse_iso_date, parse_timestamp, published_day};

pub use self::text::{
    clip, contains_any, contains_keyword, is_cjk, is_mostly_english, normalize_ws,
    split_sentences, strip_control_bytes, strip_html,
};
pub use self::url_normalize::{host_of, normalize_url};
