//! Curation of fetched entries.
//!
//! - [`dedup`]: batch-local and cross-run duplicate suppression
//! - [`classify`]: category, carrier and baseline quality score
//! - [`summarize`]: optional model summaries with a heuristic fallback
//! - [`heat`]: per-platform heat used to order the digest
//! - [`picks`]: lead and top editorial picks

pub mod classify;
pub mod dedup;
pub mod heat;
pub mod picks;
pub mod summarize;

pub use classify::{classify, Classification, DEFAULT_MIN_SCORE};
pub use dedup::{content_keys, dedup_entries, title_fingerprint, DedupStats};
pub use heat::{compute_platform_heat, infer_platform_base_weight, platform_label};
pub use picks::{apply_pins, pick_score, select_picks, PickConfig, Picks};
pub use summarize::{enrich_all, OpenAiSummarizer, Summarizer, SummaryRequest};
