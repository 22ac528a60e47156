//! Persistent state shared across daily runs.
//!
//! A single JSON document holds short-lived dedup keys, permanent content
//! keys, the published history and per-source bookkeeping. See [`CacheStore`].

mod cache;

pub use cache::{
    CacheDocument, CacheError, CacheStore, ContentSeen, DateAdded, HistoryItem, LastRun,
    SourceHealth, SourceStats, TtlSection, DEFAULT_TTL_HOURS, MAX_RUN_ERRORS,
};
