use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::config::ConfigError;
use crate::util::{host_of, normalize_ws};

/// URL prefix that routes a source to the trending-page adapter.
pub const TRENDING_URL_PREFIX: &str = "https://github.com/trending";

/// Hosts of "viewer" links that sometimes share a line with the real feed URL.
const VIEWER_HOSTS: &[&str] = &["webfollow.cc", "chromewebstore.google.com"];

static RE_URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"https?://[^\s\]\)|]+").unwrap());
static RE_TABLE_SEPARATOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\|\s*:?-{3,}").unwrap());
static RE_LIMIT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(?:limit|per_feed_limit)\s*=\s*([0-9]+)$").unwrap());
static RE_FALLBACK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(?:fallback|alt|mirror)\s*=\s*(https?://\S+)$").unwrap());
static RE_KEY_SEPARATORS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[，,、;；]+").unwrap());

/// A feed endpoint declared in a registry file.
///
/// Identity is the `url`; two sources with the same URL are the same source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedSource {
    pub name: String,
    pub url: String,
    /// Platform heat override; 0 means "infer from name/domain".
    pub weight: f64,
    /// Per-source item cap, overriding the global per-feed limit.
    pub fetch_cap: Option<usize>,
    /// Alternate endpoints tried in order when `url` fails.
    pub fallback_urls: Vec<String>,
}

impl FeedSource {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            weight: 0.0,
            fetch_cap: None,
            fallback_urls: Vec::new(),
        }
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight.max(0.0);
        self
    }

    pub fn with_fetch_cap(mut self, cap: usize) -> Self {
        self.fetch_cap = Some(cap.max(1));
        self
    }

    pub fn with_fallbacks<I, S>(mut self, urls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fallback_urls = urls.into_iter().map(Into::into).collect();
        self
    }

    /// Primary URL followed by fallbacks, without duplicates.
    pub fn endpoints(&self) -> Vec<&str> {
        let mut out: Vec<&str> = vec![self.url.as_str()];
        for u in &self.fallback_urls {
            if !u.is_empty() && !out.contains(&u.as_str()) {
                out.push(u);
            }
        }
        out
    }

    pub fn is_trending(&self) -> bool {
        self.url.starts_with(TRENDING_URL_PREFIX)
    }
}

/// Reads and merges registry files, dropping duplicate URLs (first wins).
///
/// # Errors
///
/// Returns [`ConfigError::MissingInput`] if a file does not exist and
/// [`ConfigError::Io`] if it cannot be read.
pub async fn load_registry(paths: &[PathBuf]) -> Result<Vec<FeedSource>, ConfigError> {
    let mut seen = HashSet::new();
    let mut sources = Vec::new();
    for path in paths {
        let content = read_input(path).await?;
        let parsed = parse_registry(&content);
        tracing::debug!(path = %path.display(), count = parsed.len(), "Parsed source registry");
        for source in parsed {
            if seen.insert(source.url.clone()) {
                sources.push(source);
            }
        }
    }
    Ok(sources)
}

async fn read_input(path: &Path) -> Result<String, ConfigError> {
    match tokio::fs::read_to_string(path).await {
        Ok(c) => Ok(c),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(ConfigError::MissingInput(path.to_path_buf()))
        }
        Err(e) => Err(ConfigError::Io(e)),
    }
}

/// Parses a registry document.
///
/// Two shapes are accepted:
///
/// - A Markdown table catalog whose header row contains `名称` and `RSS`.
///   Only rows of that table are read; column 1 is the name and column 2 holds
///   the feed URL.
/// - A plain list: one URL per line, optionally preceded by
///   `Name|meta|meta`. Meta segments are a bare number (weight), `limit=N`
///   (per-source cap) and `fallback=URL` (repeatable).
pub fn parse_registry(content: &str) -> Vec<FeedSource> {
    let is_table = content
        .lines()
        .any(|l| l.trim_start().starts_with('|') && l.contains("名称") && l.contains("RSS"));
    if is_table {
        parse_table(content)
    } else {
        parse_lines(content)
    }
}

fn extract_urls(text: &str) -> Vec<&str> {
    RE_URL.find_iter(text).map(|m| m.as_str()).collect()
}

fn parse_table(content: &str) -> Vec<FeedSource> {
    let mut sources = Vec::new();
    let mut seen = HashSet::new();
    let mut in_table = false;

    for raw in content.lines() {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }
        if !in_table {
            if line.starts_with('|') && line.contains("名称") && line.contains("RSS") {
                in_table = true;
            }
            continue;
        }
        if RE_TABLE_SEPARATOR.is_match(line) {
            continue;
        }
        if !line.starts_with('|') {
            break;
        }

        let cells: Vec<String> = line.trim_matches('|').split('|').map(normalize_ws).collect();
        if cells.len() < 2 {
            continue;
        }
        // Markdown links put the target last: [text](https://...)
        let Some(url) = extract_urls(&cells[1]).last().map(|u| u.to_string()) else {
            continue;
        };
        if !seen.insert(url.clone()) {
            continue;
        }
        let name = if cells[0].is_empty() {
            fallback_name(&url)
        } else {
            cells[0].clone()
        };
        sources.push(FeedSource::new(name, url));
    }
    sources
}

fn parse_lines(content: &str) -> Vec<FeedSource> {
    let mut sources = Vec::new();
    let mut seen = HashSet::new();

    for raw in content.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let urls: Vec<regex::Match<'_>> = RE_URL.find_iter(line).collect();
        let Some(&last) = urls.last() else {
            continue;
        };
        let token = if urls.len() > 1 {
            urls.iter()
                .rev()
                .find(|m| {
                    let host = host_of(m.as_str());
                    !host.is_empty() && !VIEWER_HOSTS.iter().any(|v| host.contains(v))
                })
                .copied()
                .unwrap_or(last)
        } else {
            last
        };
        let url = token.as_str();

        // Everything before the URL token is the name cell (metadata included).
        let name_cell = &line[..token.start()];
        let name_cell = name_cell
            .trim()
            .trim_start_matches(['-', '*', ' '])
            .trim_end_matches(['(', '[', ']', '<', ':', '：', ' ', '\t']);
        let mut source = parse_name_meta(name_cell, url);
        if source.name.is_empty() {
            source.name = fallback_name(url);
        }
        if seen.insert(source.url.clone()) {
            sources.push(source);
        }
    }
    sources
}

/// Parses `Name|80|limit=15|fallback=https://...` into a source for `url`.
fn parse_name_meta(cell: &str, url: &str) -> FeedSource {
    let mut parts = cell.split('|').map(normalize_ws).filter(|p| !p.is_empty());
    let name = parts.next().unwrap_or_default();
    let mut source = FeedSource::new(name, url);
    let mut fallbacks: Vec<String> = Vec::new();

    for seg in parts {
        if seg.chars().all(|c| c.is_ascii_digit() || c == '.') {
            if let Ok(w) = seg.parse::<f64>() {
                source.weight = w.max(0.0);
            }
            continue;
        }
        if let Some(caps) = RE_LIMIT.captures(&seg) {
            if let Ok(n) = caps[1].parse::<usize>() {
                source.fetch_cap = Some(n.max(1));
            }
            continue;
        }
        if let Some(caps) = RE_FALLBACK.captures(&seg) {
            let fb = caps[1].to_string();
            if !fallbacks.contains(&fb) {
                fallbacks.push(fb);
            }
        }
    }
    source.fallback_urls = fallbacks;
    source
}

fn fallback_name(url: &str) -> String {
    let host = host_of(url);
    if host.is_empty() {
        url.to_string()
    } else {
        host
    }
}

// ============================================================================
// Keyword selection
// ============================================================================

/// Reads a keyword file: one or more keys per line, `#` comments allowed.
pub async fn load_keys(path: &Path) -> Result<Vec<String>, ConfigError> {
    let content = read_input(path).await?;
    Ok(parse_keys(&content))
}

/// Splits keyword text on newlines and common ASCII/CJK list punctuation,
/// keeping the first occurrence of each key.
pub fn parse_keys(content: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut keys = Vec::new();
    for raw in content.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        for part in RE_KEY_SEPARATORS.split(line) {
            let key = normalize_ws(part);
            if !key.is_empty() && seen.insert(key.clone()) {
                keys.push(key);
            }
        }
    }
    keys
}

/// Does `key` select this source?
///
/// Keys containing ASCII letters match case-insensitively anywhere in
/// `name + url`; other keys (typically CJK) must occur verbatim in the name or
/// the URL.
pub fn source_matches_key(source: &FeedSource, key: &str) -> bool {
    if key.is_empty() {
        return false;
    }
    if key.chars().any(|c| c.is_ascii_alphabetic()) {
        let hay = format!("{} {}", source.name, source.url).to_lowercase();
        return hay.contains(&key.to_lowercase());
    }
    source.name.contains(key) || source.url.contains(key)
}

/// Picks the most specific matching key: longest first, then earliest.
pub fn choose_platform_key<'a>(source: &FeedSource, keys: &'a [String]) -> Option<&'a str> {
    keys.iter()
        .enumerate()
        .filter(|(_, k)| source_matches_key(source, k))
        .max_by(|(ia, a), (ib, b)| {
            a.chars()
                .count()
                .cmp(&b.chars().count())
                .then_with(|| ib.cmp(ia))
        })
        .map(|(_, k)| k.as_str())
}

/// Result of filtering sources through a keyword list.
#[derive(Debug, Clone, Default)]
pub struct KeySelection {
    pub sources: Vec<FeedSource>,
    /// Source URL → platform label (the matched key).
    pub platforms: HashMap<String, String>,
    /// Keys that matched no source.
    pub unmatched: Vec<String>,
}

/// Keeps only sources matching at least one key and assigns each its
/// platform label. An empty key list keeps everything.
///
/// # Errors
///
/// Returns [`ConfigError::NoSourcesMatched`] when keys were given but no
/// source matched any of them.
pub fn select_by_keys(
    sources: Vec<FeedSource>,
    keys: &[String],
) -> Result<KeySelection, ConfigError> {
    if keys.is_empty() {
        return Ok(KeySelection {
            sources,
            ..KeySelection::default()
        });
    }

    let mut selection = KeySelection::default();
    for source in sources {
        if let Some(key) = choose_platform_key(&source, keys) {
            selection
                .platforms
                .insert(source.url.clone(), key.to_string());
            selection.sources.push(source);
        }
    }
    if selection.sources.is_empty() {
        return Err(ConfigError::NoSourcesMatched(keys.to_vec()));
    }

    let matched: HashSet<&String> = selection.platforms.values().collect();
    selection.unmatched = keys.iter().filter(|k| !matched.contains(k)).cloned().collect();
    if !selection.unmatched.is_empty() {
        tracing::warn!(keys = ?selection.unmatched, "No sources matched some keys");
    }
    Ok(selection)
}
