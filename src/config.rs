//! Configuration for a digest run.
//!
//! Three layers, highest priority first: command-line flags ([`Cli`]), the
//! optional TOML file ([`FileConfig`], `digest.toml` unless `--config` names
//! another), then built-in defaults. [`Settings::resolve`] folds them into one
//! concrete value before the pipeline starts, so nothing downstream deals with
//! unset or tri-state options.
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::NaiveDate;
use clap::{Parser, ValueEnum};
use secrecy::SecretString;
use serde::Deserialize;
use thiserror::Error;

use crate::curate::picks::{DEFAULT_LEAD_N, DEFAULT_MIN_TOP_TECH, DEFAULT_TOP_N};
use crate::curate::summarize::{DEFAULT_OPENAI_MODEL, OPENAI_API_KEY_ENV};
use crate::curate::DEFAULT_MIN_SCORE;
use crate::util::parse_iso_date;

pub const DEFAULT_CONFIG_PATH: &str = "digest.toml";
pub const DEFAULT_SOURCES_PATH: &str = "sources.md";
pub const DEFAULT_CACHE_PATH: &str = "cache.json";

const DEFAULT_PER_FEED_LIMIT: usize = 10;
const DEFAULT_TIME_BUDGET_SECS: u64 = 120;
const DEFAULT_HEAT_WINDOW_DAYS: i64 = 30;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// Config file exceeds maximum allowed size.
    #[error("Config file too large: {0}")]
    TooLarge(String),

    #[error("Input file not found: {}", .0.display())]
    MissingInput(PathBuf),

    #[error("Invalid date '{0}': expected YYYY-MM-DD")]
    InvalidDate(String),

    #[error("No feed sources found in the registry")]
    NoSources,

    #[error("No sources matched the selected keys: {0:?}")]
    NoSourcesMatched(Vec<String>),
}

// ============================================================================
// Option enums
// ============================================================================

/// How the published list is ordered and grouped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum GroupBy {
    #[default]
    Platform,
    Topic,
    None,
}

/// Which items survive a per-platform top-N cut.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum PlatformTopBy {
    #[default]
    Recent,
    Quality,
}

/// GitHub trending window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum TrendingSince {
    #[default]
    Daily,
    Weekly,
    Monthly,
}

impl TrendingSince {
    pub fn as_str(self) -> &'static str {
        match self {
            TrendingSince::Daily => "daily",
            TrendingSince::Weekly => "weekly",
            TrendingSince::Monthly => "monthly",
        }
    }
}

// ============================================================================
// Command line
// ============================================================================

#[derive(Parser, Debug, Default)]
#[command(
    name = "dailyfeed",
    about = "Merge RSS/Atom feeds into one deduplicated, scored and curated daily digest"
)]
pub struct Cli {
    /// Report date, YYYY-MM-DD (default: today)
    pub date: Option<String>,

    /// TOML config file (default: ./digest.toml if present)
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Source registry file; repeatable. Line list or Markdown table.
    #[arg(long = "sources", value_name = "FILE")]
    pub sources: Vec<PathBuf>,

    /// File of platform keys used to filter sources by name/url
    #[arg(long, value_name = "FILE")]
    pub select_keys_file: Option<PathBuf>,

    /// Platform key used to filter sources; repeatable
    #[arg(long = "select-key", value_name = "KEY")]
    pub select_keys: Vec<String>,

    /// Cache document path
    #[arg(long = "cache", value_name = "FILE")]
    pub cache_path: Option<PathBuf>,

    /// Max entries considered per feed
    #[arg(long)]
    pub per_feed_limit: Option<usize>,

    /// Minimum quality score to publish
    #[arg(long)]
    pub min_score: Option<f64>,

    /// Wall-clock budget for the fetch phase, in seconds
    #[arg(long = "time-budget", value_name = "SECS")]
    pub time_budget_secs: Option<u64>,

    /// Retries per endpoint for timeouts, connection errors and 5xx
    #[arg(long)]
    pub retries: Option<u32>,

    /// Sleep between retries, in milliseconds
    #[arg(long)]
    pub retry_sleep_ms: Option<u64>,

    /// Proxy URL applied to all requests
    #[arg(long)]
    pub proxy: Option<String>,

    /// Bind requests to IPv4
    #[arg(long, conflicts_with = "no_prefer_ipv4")]
    pub prefer_ipv4: bool,

    #[arg(long, hide = true)]
    pub no_prefer_ipv4: bool,

    /// Ordering mode of the published list
    #[arg(long, value_enum)]
    pub group_by: Option<GroupBy>,

    /// Look-back window for platform heat, in days
    #[arg(long)]
    pub platform_heat_window_days: Option<i64>,

    /// Keep the top N items per platform (platform grouping only; 0 = off)
    #[arg(long)]
    pub per_platform_limit: Option<usize>,

    /// Ranking used by --per-platform-limit
    #[arg(long, value_enum)]
    pub platform_top_by: Option<PlatformTopBy>,

    /// Max published items (0 = unlimited)
    #[arg(long, allow_negative_numbers = true)]
    pub max_items: Option<i64>,

    /// Include the GitHub trending top 10
    #[arg(long, conflicts_with = "no_github_trending")]
    pub github_trending: bool,

    #[arg(long, hide = true)]
    pub no_github_trending: bool,

    /// GitHub trending window
    #[arg(long, value_enum)]
    pub trending_since: Option<TrendingSince>,

    /// Disable model summaries even when OPENAI_API_KEY is set
    #[arg(long)]
    pub no_ai: bool,

    /// Chat model used for summaries
    #[arg(long)]
    pub openai_model: Option<String>,

    /// OpenAI-compatible API base URL
    #[arg(long)]
    pub openai_base_url: Option<String>,

    #[arg(long)]
    pub lead_n: Option<usize>,

    #[arg(long)]
    pub top_n: Option<usize>,

    #[arg(long)]
    pub min_top_tech: Option<usize>,

    /// Do not write the cache
    #[arg(long)]
    pub dry_run: bool,
}

fn tri_state(yes: bool, no: bool) -> Option<bool> {
    match (yes, no) {
        (true, _) => Some(true),
        (_, true) => Some(false),
        _ => None,
    }
}

// ============================================================================
// Config file
// ============================================================================

/// Contents of the TOML config file. Every key is optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub sources: Option<Vec<PathBuf>>,
    pub select_keys_file: Option<PathBuf>,
    pub select_keys: Option<Vec<String>>,
    pub cache_path: Option<PathBuf>,
    pub per_feed_limit: Option<usize>,
    pub min_score: Option<f64>,
    pub time_budget_secs: Option<u64>,
    pub retries: Option<u32>,
    pub retry_sleep_ms: Option<u64>,
    pub proxy: Option<String>,
    pub prefer_ipv4: Option<bool>,
    pub group_by: Option<GroupBy>,
    pub platform_heat_window_days: Option<i64>,
    pub per_platform_limit: Option<usize>,
    pub platform_top_by: Option<PlatformTopBy>,
    pub max_items: Option<i64>,
    pub github_trending: Option<bool>,
    pub trending_since: Option<TrendingSince>,
    pub ai: Option<bool>,
    pub openai_model: Option<String>,
    pub openai_base_url: Option<String>,
    pub lead_n: Option<usize>,
    pub top_n: Option<usize>,
    pub min_top_tech: Option<usize>,
}

const KNOWN_KEYS: &[&str] = &[
    "sources",
    "select_keys_file",
    "select_keys",
    "cache_path",
    "per_feed_limit",
    "min_score",
    "time_budget_secs",
    "retries",
    "retry_sleep_ms",
    "proxy",
    "prefer_ipv4",
    "group_by",
    "platform_heat_window_days",
    "per_platform_limit",
    "platform_top_by",
    "max_items",
    "github_trending",
    "trending_since",
    "ai",
    "openai_model",
    "openai_base_url",
    "lead_n",
    "top_n",
    "min_top_tech",
];

impl FileConfig {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(FileConfig::default())` when `required` is false,
    ///   `Err(ConfigError::MissingInput)` otherwise
    /// - Empty file → `Ok(FileConfig::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Unknown keys → accepted, logged as warning
    pub fn load(path: &Path, required: bool) -> Result<Self, ConfigError> {
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                if required {
                    return Err(ConfigError::MissingInput(path.to_path_buf()));
                }
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = std::fs::read_to_string(path)?;
        if content.trim().is_empty() {
            tracing::debug!(path = %path.display(), "Config file is empty, using defaults");
            return Ok(Self::default());
        }

        if let Ok(raw) = content.parse::<toml::Table>() {
            for key in raw.keys() {
                if !KNOWN_KEYS.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let config: FileConfig = toml::from_str(&content)?;
        tracing::info!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }
}

// ============================================================================
// Resolved settings
// ============================================================================

/// Fully resolved options for one run.
#[derive(Debug)]
pub struct Settings {
    pub date: NaiveDate,
    pub sources: Vec<PathBuf>,
    pub select_keys_file: Option<PathBuf>,
    pub select_keys: Vec<String>,
    pub cache_path: PathBuf,
    pub per_feed_limit: usize,
    pub min_score: f64,
    pub time_budget: Duration,
    pub retries: u32,
    pub retry_sleep: Duration,
    pub proxy: Option<String>,
    pub prefer_ipv4: bool,
    pub group_by: GroupBy,
    pub platform_heat_window_days: i64,
    pub per_platform_limit: usize,
    pub platform_top_by: PlatformTopBy,
    /// `None` picks the default once key selection is known.
    pub max_items: Option<i64>,
    pub github_trending: bool,
    pub trending_since: TrendingSince,
    pub ai: bool,
    pub openai_model: String,
    pub openai_base_url: Option<String>,
    pub openai_api_key: Option<SecretString>,
    pub lead_n: usize,
    pub top_n: usize,
    pub min_top_tech: usize,
    pub dry_run: bool,
}

impl Settings {
    /// Defaults for `date` with no file, flags or API key.
    pub fn for_date(date: NaiveDate) -> Self {
        Self {
            date,
            sources: vec![PathBuf::from(DEFAULT_SOURCES_PATH)],
            select_keys_file: None,
            select_keys: Vec::new(),
            cache_path: PathBuf::from(DEFAULT_CACHE_PATH),
            per_feed_limit: DEFAULT_PER_FEED_LIMIT,
            min_score: DEFAULT_MIN_SCORE,
            time_budget: Duration::from_secs(DEFAULT_TIME_BUDGET_SECS),
            retries: 0,
            retry_sleep: Duration::ZERO,
            proxy: None,
            prefer_ipv4: false,
            group_by: GroupBy::Platform,
            platform_heat_window_days: DEFAULT_HEAT_WINDOW_DAYS,
            per_platform_limit: 0,
            platform_top_by: PlatformTopBy::Recent,
            max_items: None,
            github_trending: false,
            trending_since: TrendingSince::Daily,
            ai: true,
            openai_model: DEFAULT_OPENAI_MODEL.to_string(),
            openai_base_url: None,
            openai_api_key: None,
            lead_n: DEFAULT_LEAD_N,
            top_n: DEFAULT_TOP_N,
            min_top_tech: DEFAULT_MIN_TOP_TECH,
            dry_run: false,
        }
    }

    /// Folds flags over the file over defaults.
    ///
    /// `today` is used when no date is given; `api_key` is the raw value of
    /// `OPENAI_API_KEY`, if any. GitHub trending defaults to on when a key
    /// selection is configured.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidDate`] for a malformed date argument.
    pub fn resolve(
        cli: &Cli,
        file: FileConfig,
        today: NaiveDate,
        api_key: Option<String>,
    ) -> Result<Self, ConfigError> {
        let date = match cli.date.as_deref() {
            Some(raw) => parse_iso_date(raw).ok_or_else(|| ConfigError::InvalidDate(raw.to_string()))?,
            None => today,
        };
        let d = Self::for_date(date);

        let sources = if !cli.sources.is_empty() {
            cli.sources.clone()
        } else {
            file.sources.filter(|s| !s.is_empty()).unwrap_or(d.sources)
        };
        let select_keys_file = cli.select_keys_file.clone().or(file.select_keys_file);
        let select_keys = if !cli.select_keys.is_empty() {
            cli.select_keys.clone()
        } else {
            file.select_keys.unwrap_or_default()
        };
        let keys_configured = select_keys_file.is_some() || !select_keys.is_empty();

        let proxy = cli
            .proxy
            .clone()
            .or(file.proxy)
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty());
        let ai = !cli.no_ai && file.ai.unwrap_or(d.ai);
        let api_key = api_key
            .filter(|k| !k.trim().is_empty())
            .map(SecretString::from);

        Ok(Self {
            date,
            sources,
            select_keys_file,
            select_keys,
            cache_path: cli.cache_path.clone().or(file.cache_path).unwrap_or(d.cache_path),
            per_feed_limit: cli
                .per_feed_limit
                .or(file.per_feed_limit)
                .unwrap_or(d.per_feed_limit)
                .max(1),
            min_score: cli.min_score.or(file.min_score).unwrap_or(d.min_score),
            time_budget: cli
                .time_budget_secs
                .or(file.time_budget_secs)
                .map(Duration::from_secs)
                .unwrap_or(d.time_budget),
            retries: cli.retries.or(file.retries).unwrap_or(d.retries),
            retry_sleep: cli
                .retry_sleep_ms
                .or(file.retry_sleep_ms)
                .map(Duration::from_millis)
                .unwrap_or(d.retry_sleep),
            proxy,
            prefer_ipv4: tri_state(cli.prefer_ipv4, cli.no_prefer_ipv4)
                .or(file.prefer_ipv4)
                .unwrap_or(d.prefer_ipv4),
            group_by: cli.group_by.or(file.group_by).unwrap_or(d.group_by),
            platform_heat_window_days: cli
                .platform_heat_window_days
                .or(file.platform_heat_window_days)
                .unwrap_or(d.platform_heat_window_days),
            per_platform_limit: cli
                .per_platform_limit
                .or(file.per_platform_limit)
                .unwrap_or(d.per_platform_limit),
            platform_top_by: cli
                .platform_top_by
                .or(file.platform_top_by)
                .unwrap_or(d.platform_top_by),
            max_items: cli.max_items.or(file.max_items),
            github_trending: tri_state(cli.github_trending, cli.no_github_trending)
                .or(file.github_trending)
                .unwrap_or(keys_configured),
            trending_since: cli
                .trending_since
                .or(file.trending_since)
                .unwrap_or(d.trending_since),
            ai,
            openai_model: cli
                .openai_model
                .clone()
                .or(file.openai_model)
                .unwrap_or(d.openai_model),
            openai_base_url: cli.openai_base_url.clone().or(file.openai_base_url),
            openai_api_key: api_key,
            lead_n: cli.lead_n.or(file.lead_n).unwrap_or(d.lead_n),
            top_n: cli.top_n.or(file.top_n).unwrap_or(d.top_n),
            min_top_tech: cli.min_top_tech.or(file.min_top_tech).unwrap_or(d.min_top_tech),
            dry_run: cli.dry_run,
        })
    }

    /// Loads the config file named by `cli` (or the default path) and resolves
    /// against the process environment.
    pub fn from_cli(cli: &Cli, today: NaiveDate) -> Result<Self, ConfigError> {
        let file = match &cli.config {
            Some(path) => FileConfig::load(path, true)?,
            None => FileConfig::load(Path::new(DEFAULT_CONFIG_PATH), false)?,
        };
        Self::resolve(cli, file, today, std::env::var(OPENAI_API_KEY_ENV).ok())
    }

    /// Per-platform cap and overall cap for the published list.
    ///
    /// An active key selection in platform mode implies 10 per platform. The
    /// overall cap defaults to unlimited when a per-platform cap applies and
    /// to 50 otherwise; a negative value also means 50. `0` is unlimited.
    pub fn publication_limits(&self, keys_selected: bool) -> (usize, usize) {
        let mut per_platform = self.per_platform_limit;
        if keys_selected && self.group_by == GroupBy::Platform && per_platform == 0 {
            per_platform = 10;
        }
        let max_items = match self.max_items {
            None if self.group_by == GroupBy::Platform && per_platform > 0 => 0,
            None => 50,
            Some(n) if n < 0 => 50,
            Some(n) => n as usize,
        };
        (per_platform, max_items)
    }

    pub fn trending_url(&self) -> String {
        format!("https://github.com/trending?since={}", self.trending_since.as_str())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, 10).unwrap()
    }

    fn write_config(name: &str, content: &str) -> (PathBuf, PathBuf) {
        let dir = std::env::temp_dir().join(format!("dailyfeed_config_test_{name}"));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("digest.toml");
        std::fs::write(&path, content).unwrap();
        (dir, path)
    }

    #[test]
    fn test_defaults() {
        let s = Settings::resolve(&Cli::default(), FileConfig::default(), today(), None).unwrap();
        assert_eq!(s.date, today());
        assert_eq!(s.sources, vec![PathBuf::from("sources.md")]);
        assert_eq!(s.per_feed_limit, 10);
        assert_eq!(s.min_score, 2.6);
        assert_eq!(s.time_budget, Duration::from_secs(120));
        assert_eq!(s.group_by, GroupBy::Platform);
        assert_eq!(s.platform_heat_window_days, 30);
        assert_eq!(s.openai_model, "gpt-4o-mini");
        assert_eq!((s.lead_n, s.top_n, s.min_top_tech), (1, 5, 2));
        assert!(!s.github_trending);
        assert!(s.ai && s.openai_api_key.is_none());
        assert_eq!(s.publication_limits(false), (0, 50));
    }

    #[test]
    fn test_missing_optional_file_returns_default() {
        let path = std::env::temp_dir().join("dailyfeed_nonexistent_config.toml");
        assert!(FileConfig::load(&path, false).is_ok());
        assert!(matches!(
            FileConfig::load(&path, true),
            Err(ConfigError::MissingInput(_))
        ));
    }

    #[test]
    fn test_cli_overrides_file() {
        let (dir, path) = write_config(
            "override",
            r#"
per_feed_limit = 25
group_by = "topic"
prefer_ipv4 = true
select_keys = ["知乎"]
unknown_thing = 1
"#,
        );
        let file = FileConfig::load(&path, true).unwrap();
        let cli = Cli {
            per_feed_limit: Some(5),
            no_prefer_ipv4: true,
            ..Cli::default()
        };
        let s = Settings::resolve(&cli, file, today(), None).unwrap();
        assert_eq!(s.per_feed_limit, 5);
        assert_eq!(s.group_by, GroupBy::Topic);
        assert!(!s.prefer_ipv4);
        assert_eq!(s.select_keys, vec!["知乎".to_string()]);
        // Key selection turns trending on unless told otherwise.
        assert!(s.github_trending);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_invalid_enum_value_is_parse_error() {
        let (dir, path) = write_config("bad_enum", "group_by = \"galaxy\"\n");
        assert!(matches!(
            FileConfig::load(&path, true),
            Err(ConfigError::Parse(_))
        ));
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_too_large_file_rejected() {
        let (dir, path) = write_config("too_large", &"a".repeat(1_048_577));
        let err = FileConfig::load(&path, true).unwrap_err();
        assert!(matches!(err, ConfigError::TooLarge(_)));
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_invalid_date() {
        let cli = Cli {
            date: Some("2025-13-40".into()),
            ..Cli::default()
        };
        assert!(matches!(
            Settings::resolve(&cli, FileConfig::default(), today(), None),
            Err(ConfigError::InvalidDate(_))
        ));
    }

    #[test]
    fn test_api_key_redacted_and_no_ai() {
        let s = Settings::resolve(
            &Cli::default(),
            FileConfig::default(),
            today(),
            Some("sk-secret-123".into()),
        )
        .unwrap();
        assert_eq!(
            s.openai_api_key.as_ref().map(|k| k.expose_secret().to_string()),
            Some("sk-secret-123".to_string())
        );
        assert!(!format!("{:?}", s).contains("sk-secret-123"));

        let cli = Cli {
            no_ai: true,
            ..Cli::default()
        };
        let s = Settings::resolve(&cli, FileConfig::default(), today(), None).unwrap();
        assert!(!s.ai);
    }

    #[test]
    fn test_publication_limits() {
        let mut s = Settings::for_date(today());
        assert_eq!(s.publication_limits(true), (10, 0));
        s.max_items = Some(-3);
        assert_eq!(s.publication_limits(true), (10, 50));
        s.max_items = Some(0);
        assert_eq!(s.publication_limits(false), (0, 0));
        s.group_by = GroupBy::Topic;
        s.max_items = None;
        assert_eq!(s.publication_limits(true), (0, 50));
    }
}
