//! Daily feed digest: fetch many RSS/Atom sources under a time budget, drop
//! duplicates across runs, score and classify what is left, and pick the
//! entries worth leading with.

pub mod config;
pub mod curate;
pub mod feed;
pub mod pipeline;
pub mod storage;
pub mod types;
pub mod util;

pub use config::{Cli, ConfigError, Settings};
pub use pipeline::{Digest, Pipeline, RunStats};
