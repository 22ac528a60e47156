use std::collections::{BTreeMap, HashSet};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

use crate::curate::dedup::{content_keys, title_fingerprint};
use crate::feed::{BatchOutcome, FeedSource, SourceStatus};
use crate::types::ScoredEntry;
use crate::util::parse_iso_date;

/// Default lifetime of short-lived dedup keys (7 days).
pub const DEFAULT_TTL_HOURS: u32 = 168;
/// Maximum error messages kept in the last-run summary.
pub const MAX_RUN_ERRORS: usize = 100;

const SCHEMA_VERSION: &str = "1.0";
const DESCRIPTION: &str = "daily feed digest cache";

/// Errors reading or writing the cache document.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The cache file exists but could not be read
    #[error("Failed to read cache file '{}': {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    /// The cache file is not a JSON object
    #[error("Cache file '{}' is not valid JSON: {source}", path.display())]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
    /// Writing the temporary file or renaming it into place failed
    #[error("Failed to write cache file '{}': {source}", path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    /// The in-memory document could not be serialized
    #[error("Failed to serialize cache: {0}")]
    Serialize(#[from] serde_json::Error),
}

// ============================================================================
// Document model
// ============================================================================

/// `{"date_added": "YYYY-MM-DD"}`
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DateAdded {
    pub date_added: String,
}

/// A short-lived key section with its own TTL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TtlSection {
    #[serde(rename = "_ttl_hours", default = "default_ttl_hours")]
    pub ttl_hours: u32,
    #[serde(default, deserialize_with = "lenient_map")]
    pub entries: BTreeMap<String, DateAdded>,
}

fn default_ttl_hours() -> u32 {
    DEFAULT_TTL_HOURS
}

impl Default for TtlSection {
    fn default() -> Self {
        Self {
            ttl_hours: DEFAULT_TTL_HOURS,
            entries: BTreeMap::new(),
        }
    }
}

impl TtlSection {
    pub fn insert(&mut self, key: &str, date: &str) {
        self.entries.insert(
            key.to_string(),
            DateAdded {
                date_added: date.to_string(),
            },
        );
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Keeps entries whose age in whole days is at most `max(1, ttl/24)`.
    /// Entries with unparseable dates are dropped.
    pub fn prune(&mut self, today: NaiveDate) -> usize {
        let ttl_days = i64::from((self.ttl_hours / 24).max(1));
        let before = self.entries.len();
        self.entries.retain(|_, v| {
            parse_iso_date(&v.date_added).is_some_and(|added| (today - added).num_days() <= ttl_days)
        });
        before - self.entries.len()
    }
}

/// First sighting of a permanent content key.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ContentSeen {
    pub date_added: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub source: String,
}

/// One published item as remembered in `article_history`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryItem {
    pub source: String,
    pub platform: String,
    pub title: String,
    pub title_hash: String,
    pub url: String,
    pub category: String,
    pub carrier: String,
    pub quality_score: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceStats {
    pub total_fetches: u64,
    pub success_count: u64,
    pub last_fetch: Option<String>,
    pub last_success: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceHealth {
    pub consecutive_failures: u32,
    pub last_status: Option<SourceStatus>,
    pub last_error: Option<String>,
}

/// Summary of the most recent run.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LastRun {
    pub date: String,
    pub duration_seconds: u64,
    pub items_collected: usize,
    pub items_published: usize,
    pub sources_used: Vec<String>,
    pub errors: Vec<String>,
}

/// The persisted cache document.
///
/// Every section has a default, so an empty or missing file loads as a fully
/// shaped document. Sections that fail to deserialize entry by entry keep
/// their valid entries and drop the rest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheDocument {
    #[serde(default = "default_schema_version")]
    pub schema_version: String,
    #[serde(default = "default_description")]
    pub description: String,
    #[serde(default, deserialize_with = "lenient_value")]
    pub last_run: LastRun,
    #[serde(default, deserialize_with = "lenient_map")]
    pub source_stats: BTreeMap<String, SourceStats>,
    #[serde(
        default,
        deserialize_with = "lenient_entries",
        serialize_with = "source_health_section"
    )]
    pub source_health: BTreeMap<String, SourceHealth>,
    #[serde(default, deserialize_with = "lenient_value")]
    pub url_cache: TtlSection,
    #[serde(default, deserialize_with = "lenient_value")]
    pub title_hashes: TtlSection,
    #[serde(
        default,
        deserialize_with = "lenient_entries",
        serialize_with = "content_seen_section"
    )]
    pub content_seen: BTreeMap<String, ContentSeen>,
    #[serde(default, deserialize_with = "lenient_map")]
    pub article_history: BTreeMap<String, Vec<HistoryItem>>,
}

fn default_schema_version() -> String {
    SCHEMA_VERSION.to_string()
}

fn default_description() -> String {
    DESCRIPTION.to_string()
}

impl Default for CacheDocument {
    fn default() -> Self {
        Self {
            schema_version: default_schema_version(),
            description: default_description(),
            last_run: LastRun::default(),
            source_stats: BTreeMap::new(),
            source_health: BTreeMap::new(),
            url_cache: TtlSection::default(),
            title_hashes: TtlSection::default(),
            content_seen: BTreeMap::new(),
            article_history: BTreeMap::new(),
        }
    }
}

/// Deserializes a JSON object, keeping only the entries that parse as `T`
/// (drops `_comment` markers and hand-edited junk). Non-objects become empty.
fn lenient_map<'de, D, T>(deserializer: D) -> Result<BTreeMap<String, T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    let serde_json::Value::Object(map) = value else {
        return Ok(BTreeMap::new());
    };
    Ok(keep_valid(map))
}

/// Like [`lenient_map`], but also reads the commented section shape
/// `{"_comment": ..., "entries": {...}}`.
fn lenient_entries<'de, D, T>(deserializer: D) -> Result<BTreeMap<String, T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    let serde_json::Value::Object(mut map) = value else {
        return Ok(BTreeMap::new());
    };
    match map.remove("entries") {
        Some(serde_json::Value::Object(entries)) => Ok(keep_valid(entries)),
        _ => Ok(keep_valid(map)),
    }
}

fn keep_valid<T: DeserializeOwned>(map: serde_json::Map<String, serde_json::Value>) -> BTreeMap<String, T> {
    map.into_iter()
        .filter_map(|(k, v)| serde_json::from_value(v).ok().map(|v| (k, v)))
        .collect()
}

/// On-disk shape of the keyed sections that carry a `_comment`.
#[derive(Serialize)]
struct CommentedSection<'a, T> {
    #[serde(rename = "_comment")]
    comment: &'static str,
    entries: &'a BTreeMap<String, T>,
}

fn source_health_section<S: Serializer>(
    entries: &BTreeMap<String, SourceHealth>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    CommentedSection {
        comment: "per-feed health state keyed by feed URL",
        entries,
    }
    .serialize(serializer)
}

fn content_seen_section<S: Serializer>(
    entries: &BTreeMap<String, ContentSeen>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    CommentedSection {
        comment: "permanent content keys (url/title+date) to prevent cross-day repeats",
        entries,
    }
    .serialize(serializer)
}

/// Deserializes `T`, falling back to its default on a shape mismatch.
fn lenient_value<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).unwrap_or_default())
}

// ============================================================================
// Store
// ============================================================================

/// In-memory cache state for one run.
///
/// Loaded once, pruned on load, mutated additively while the run records its
/// results, then written back atomically with [`CacheStore::persist`].
#[derive(Debug, Clone, Default)]
pub struct CacheStore {
    doc: CacheDocument,
}

impl CacheStore {
    /// Loads and prunes the cache at `path`. A missing or empty file yields a
    /// default document.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Read`] or [`CacheError::Json`] if the file exists
    /// but cannot be read or parsed.
    pub fn load(path: &Path, today: NaiveDate) -> Result<Self, CacheError> {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %path.display(), "No cache file yet, starting fresh");
                return Ok(Self::from_document(CacheDocument::default(), today));
            }
            Err(source) => {
                return Err(CacheError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        if content.trim().is_empty() {
            return Ok(Self::from_document(CacheDocument::default(), today));
        }
        let doc: CacheDocument =
            serde_json::from_str(&content).map_err(|source| CacheError::Json {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(Self::from_document(doc, today))
    }

    /// Wraps an existing document, pruning short-lived keys against `today`.
    pub fn from_document(doc: CacheDocument, today: NaiveDate) -> Self {
        let mut store = Self { doc };
        store.prune(today);
        store
    }

    pub fn document(&self) -> &CacheDocument {
        &self.doc
    }

    /// Drops expired short-lived keys. Permanent content keys are never pruned.
    pub fn prune(&mut self, today: NaiveDate) {
        let urls = self.doc.url_cache.prune(today);
        let titles = self.doc.title_hashes.prune(today);
        if urls + titles > 0 {
            tracing::debug!(urls = urls, titles = titles, "Pruned expired cache keys");
        }
    }

    pub fn has_recent_url(&self, url: &str) -> bool {
        self.doc.url_cache.contains(url)
    }

    pub fn has_recent_title(&self, title_hash: &str) -> bool {
        self.doc.title_hashes.contains(title_hash)
    }

    /// Date a permanent content key was first recorded.
    pub fn content_first_seen(&self, key: &str) -> Option<&str> {
        self.doc.content_seen.get(key).map(|c| c.date_added.as_str())
    }

    /// Items published on `date` by an earlier run.
    pub fn history(&self, date: &str) -> &[HistoryItem] {
        self.doc
            .article_history
            .get(date)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Records the published set for `date`.
    ///
    /// Adds short-lived URL and title keys, adds permanent content keys (an
    /// existing earlier date is kept), and replaces `article_history[date]`.
    pub fn record_published(&mut self, date: &str, published: &[ScoredEntry]) {
        for item in published {
            let entry = &item.entry;
            let title_hash = title_fingerprint(&entry.title);
            self.doc.url_cache.insert(&entry.url, date);
            self.doc.title_hashes.insert(&title_hash, date);

            for key in content_keys(entry) {
                let record = self.doc.content_seen.entry(key).or_insert_with(|| ContentSeen {
                    date_added: date.to_string(),
                    title: entry.title.clone(),
                    url: entry.url.clone(),
                    source: entry.source_name.clone(),
                });
                // Earliest date wins; a malformed stored date is replaced.
                let earlier = match (parse_iso_date(date), parse_iso_date(&record.date_added)) {
                    (Some(new), Some(old)) => new < old,
                    (Some(_), None) => true,
                    _ => false,
                };
                if earlier {
                    record.date_added = date.to_string();
                }
            }
        }

        let history = published
            .iter()
            .map(|item| HistoryItem {
                source: item.entry.source_name.clone(),
                platform: if item.entry.platform.is_empty() {
                    item.entry.source_name.clone()
                } else {
                    item.entry.platform.clone()
                },
                title: item.entry.title.clone(),
                title_hash: title_fingerprint(&item.entry.title),
                url: item.entry.url.clone(),
                category: item.category.as_str().to_string(),
                carrier: item.carrier.as_str().to_string(),
                quality_score: (item.quality_score * 100.0).round() / 100.0,
            })
            .collect();
        self.doc.article_history.insert(date.to_string(), history);
    }

    /// Updates per-source stats and health from a batch outcome.
    ///
    /// Every attempted source counts a fetch; only successful ones count a
    /// success. Skipped sources keep their failure streak and last error.
    pub fn record_source_outcomes(&mut self, date: &str, sources: &[FeedSource], outcome: &BatchOutcome) {
        for source in sources {
            let status = outcome.status_of(&source.url).unwrap_or(SourceStatus::Skipped);

            let stats = self.doc.source_stats.entry(source.url.clone()).or_default();
            stats.total_fetches += 1;
            stats.last_fetch = Some(date.to_string());
            if status == SourceStatus::Success {
                stats.success_count += 1;
                stats.last_success = Some(date.to_string());
            }

            let health = self.doc.source_health.entry(source.url.clone()).or_default();
            health.last_status = Some(status);
            match status {
                SourceStatus::Success => {
                    health.consecutive_failures = 0;
                    health.last_error = None;
                }
                SourceStatus::Failed => {
                    health.consecutive_failures = health.consecutive_failures.saturating_add(1);
                    health.last_error = outcome.error_for(&source.url).map(String::from);
                }
                SourceStatus::Skipped => {}
            }
        }
    }

    pub fn set_last_run(&mut self, mut run: LastRun) {
        run.errors.truncate(MAX_RUN_ERRORS);
        self.doc.last_run = run;
    }

    /// URLs whose failure streak reached `threshold`.
    pub fn unhealthy_sources(&self, threshold: u32) -> HashSet<&str> {
        self.doc
            .source_health
            .iter()
            .filter(|(_, h)| h.consecutive_failures >= threshold)
            .map(|(url, _)| url.as_str())
            .collect()
    }

    /// Writes the document to `path` atomically.
    ///
    /// The JSON is written to a uniquely named temporary file next to `path`,
    /// synced, then renamed over the destination, so readers never observe a
    /// partial document.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Write`] if any filesystem step fails; the
    /// temporary file is removed and the previous cache is left untouched.
    pub fn persist(&self, path: &Path) -> Result<(), CacheError> {
        let json = serde_json::to_vec_pretty(&self.doc)?;
        let write_err = |source| CacheError::Write {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(write_err)?;
        }

        // Unpredictable temp name; create_new refuses to follow a planted file.
        use std::time::{SystemTime, UNIX_EPOCH};
        let suffix = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        let temp_path = path.with_extension(format!("tmp.{:016x}", suffix));

        let result = (|| {
            let mut file = std::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&temp_path)?;
            file.write_all(&json)?;
            file.sync_all()?;
            std::fs::rename(&temp_path, path)
        })();

        if let Err(e) = result {
            let _ = std::fs::remove_file(&temp_path);
            return Err(write_err(e));
        }
        tracing::debug!(path = %path.display(), bytes = json.len(), "Cache persisted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn day(s: &str) -> NaiveDate {
        parse_iso_date(s).unwrap()
    }

    #[test]
    fn test_default_document_fully_shaped() {
        let json = serde_json::to_value(CacheDocument::default()).unwrap();
        for section in [
            "schema_version",
            "description",
            "last_run",
            "source_stats",
            "source_health",
            "url_cache",
            "title_hashes",
            "content_seen",
            "article_history",
        ] {
            assert!(json.get(section).is_some(), "missing section {section}");
        }
        assert_eq!(json["url_cache"]["_ttl_hours"], 168);
        assert!(json["content_seen"]["entries"].is_object());
        assert!(json["source_health"]["entries"].is_object());
    }

    #[test]
    fn test_load_commented_entries_sections() {
        let dir = std::env::temp_dir().join(format!("dailyfeed-cache-sections-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("cache.json");
        std::fs::write(
            &path,
            r#"{
                "content_seen": {
                    "_comment": "permanent content keys",
                    "entries": {
                        "url:https://a.example/old": {
                            "date_added": "2024-06-01",
                            "title": "Old story",
                            "url": "https://a.example/old",
                            "source": "A"
                        }
                    }
                },
                "source_health": {
                    "_comment": "per-feed health state keyed by feed URL",
                    "entries": {"https://a.example/feed": {"consecutive_failures": 4}}
                }
            }"#,
        )
        .unwrap();

        let store = CacheStore::load(&path, day("2025-01-10")).unwrap();
        assert_eq!(store.content_first_seen("url:https://a.example/old"), Some("2024-06-01"));
        assert_eq!(store.document().source_health["https://a.example/feed"].consecutive_failures, 4);
        assert!(store.unhealthy_sources(3).contains("https://a.example/feed"));

        // Written back in the same shape and read again unchanged.
        store.persist(&path).unwrap();
        let raw: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert!(raw["content_seen"]["entries"]["url:https://a.example/old"].is_object());
        let reloaded = CacheStore::load(&path, day("2025-01-10")).unwrap();
        assert_eq!(reloaded.document(), store.document());
    }

    #[test]
    fn test_load_flat_entries_sections() {
        let json = r#"{"content_seen": {"url:https://b.example/x": {"date_added": "2024-12-31"}}}"#;
        let doc: CacheDocument = serde_json::from_str(json).unwrap();
        assert_eq!(doc.content_seen["url:https://b.example/x"].date_added, "2024-12-31");
    }

    #[test]
    fn test_lenient_load_skips_junk() {
        let json = r#"{
            "source_stats": {"_comment": "per-feed stats keyed by feed URL",
                             "https://a/feed": {"total_fetches": 3, "success_count": 2}},
            "article_history": {"_comment": "daily published items"},
            "last_run": {},
            "url_cache": {"_ttl_hours": 48, "entries": {"u": {"date_added": "2025-01-09"}, "bad": 7}}
        }"#;
        let doc: CacheDocument = serde_json::from_str(json).unwrap();
        assert_eq!(doc.source_stats.len(), 1);
        assert_eq!(doc.source_stats["https://a/feed"].total_fetches, 3);
        assert!(doc.article_history.is_empty());
        assert_eq!(doc.url_cache.ttl_hours, 48);
        assert_eq!(doc.url_cache.entries.len(), 1);
        assert_eq!(doc.schema_version, "1.0");
    }

    #[test]
    fn test_prune_ttl() {
        let mut section = TtlSection::default();
        section.insert("fresh", "2025-01-09");
        section.insert("edge", "2025-01-03");
        section.insert("old", "2025-01-02");
        section.insert("broken", "not a date");
        section.prune(day("2025-01-10"));
        let keys: Vec<_> = section.entries.keys().cloned().collect();
        assert_eq!(keys, vec!["edge".to_string(), "fresh".to_string()]);
    }

    #[test]
    fn test_prune_minimum_one_day() {
        let mut section = TtlSection {
            ttl_hours: 5,
            entries: BTreeMap::new(),
        };
        section.insert("yesterday", "2025-01-09");
        section.insert("two_days", "2025-01-08");
        section.prune(day("2025-01-10"));
        assert!(section.contains("yesterday"));
        assert!(!section.contains("two_days"));
    }

    #[test]
    fn test_load_missing_and_empty_file() {
        let dir = std::env::temp_dir().join("dailyfeed_cache_test_missing");
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();

        let missing = CacheStore::load(&dir.join("nope.json"), day("2025-01-10")).unwrap();
        assert_eq!(missing.document(), &CacheDocument::default());

        let empty_path = dir.join("empty.json");
        std::fs::write(&empty_path, "   ").unwrap();
        let empty = CacheStore::load(&empty_path, day("2025-01-10")).unwrap();
        assert_eq!(empty.document(), &CacheDocument::default());

        let bad_path = dir.join("bad.json");
        std::fs::write(&bad_path, "{ not json").unwrap();
        assert!(matches!(
            CacheStore::load(&bad_path, day("2025-01-10")),
            Err(CacheError::Json { .. })
        ));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_persist_is_atomic_and_reloadable() {
        let dir = std::env::temp_dir().join("dailyfeed_cache_test_persist");
        let _ = std::fs::remove_dir_all(&dir);
        let path = dir.join("nested").join("cache.json");

        let mut store = CacheStore::default();
        store.doc.url_cache.insert("https://a/1", "2025-01-10");
        store.persist(&path).unwrap();

        let leftovers: Vec<_> = std::fs::read_dir(path.parent().unwrap())
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().contains("tmp"))
            .collect();
        assert!(leftovers.is_empty());

        let reloaded = CacheStore::load(&path, day("2025-01-10")).unwrap();
        assert!(reloaded.has_recent_url("https://a/1"));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_record_source_outcomes() {
        let sources = vec![
            FeedSource::new("ok", "https://ok/feed"),
            FeedSource::new("bad", "https://bad/feed"),
            FeedSource::new("slow", "https://slow/feed"),
        ];
        let mut outcome = BatchOutcome::default();
        outcome.success.insert("https://ok/feed".into());
        outcome.failed.insert("https://bad/feed".into());
        outcome.skipped.insert("https://slow/feed".into());
        outcome.errors.push(crate::feed::SourceError {
            source_name: "bad".into(),
            source_url: "https://bad/feed".into(),
            message: "HTTP error: status 500".into(),
        });

        let mut store = CacheStore::default();
        store.record_source_outcomes("2025-01-10", &sources, &outcome);
        store.record_source_outcomes("2025-01-11", &sources, &outcome);

        let doc = store.document();
        assert_eq!(doc.source_stats["https://ok/feed"].success_count, 2);
        assert_eq!(doc.source_stats["https://slow/feed"].total_fetches, 2);
        assert_eq!(doc.source_stats["https://slow/feed"].success_count, 0);
        assert_eq!(doc.source_health["https://bad/feed"].consecutive_failures, 2);
        assert_eq!(
            doc.source_health["https://bad/feed"].last_error.as_deref(),
            Some("HTTP error: status 500")
        );
        assert_eq!(
            doc.source_health["https://slow/feed"].last_status,
            Some(SourceStatus::Skipped)
        );
        assert!(store.unhealthy_sources(2).contains("https://bad/feed"));
    }

    #[test]
    fn test_last_run_errors_capped() {
        let mut store = CacheStore::default();
        store.set_last_run(LastRun {
            errors: (0..150).map(|i| format!("e{i}")).collect(),
            ..LastRun::default()
        });
        assert_eq!(store.document().last_run.errors.len(), MAX_RUN_ERRORS);
    }
}
