use std::collections::HashSet;

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::storage::CacheStore;
use crate::types::RawEntry;
use crate::util::{is_cjk, normalize_url, normalize_ws, published_day};

const TITLE_KEY_CHARS: usize = 120;
const EXACT_TITLE_CHARS: usize = 200;

/// Loose title key: lowercase, only ASCII alphanumerics and CJK kept, first
/// 120 characters, SHA-256 hex.
///
/// Punctuation and spacing differences between mirrors of the same story
/// collapse to one key.
pub fn title_fingerprint(title: &str) -> String {
    let kept: String = title
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || is_cjk(*c))
        .take(TITLE_KEY_CHARS)
        .collect();
    sha256_hex(&kept)
}

/// Strict title key used in permanent content keys: whitespace-collapsed,
/// lowercased, first 200 characters, SHA-256 hex.
pub fn exact_title_fingerprint(title: &str) -> String {
    let norm: String = normalize_ws(title)
        .to_lowercase()
        .chars()
        .take(EXACT_TITLE_CHARS)
        .collect();
    sha256_hex(&norm)
}

fn sha256_hex(s: &str) -> String {
    format!("{:x}", Sha256::digest(s.as_bytes()))
}

/// Permanent content keys of an entry.
///
/// `url:<normalized url>` always (when the entry has a URL), plus
/// `title_date:<exact title fingerprint>|<YYYY-MM-DD>` when the published
/// timestamp parses.
pub fn content_keys(entry: &RawEntry) -> Vec<String> {
    let mut keys = Vec::with_capacity(2);
    let url = normalize_url(&entry.url);
    if !url.is_empty() {
        keys.push(format!("url:{url}"));
    }
    if let Some(day) = entry.published.as_deref().and_then(published_day) {
        keys.push(format!(
            "title_date:{}|{}",
            exact_title_fingerprint(&entry.title),
            day.format("%Y-%m-%d")
        ));
    }
    keys
}

/// Counters describing one dedup pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DedupStats {
    pub input: usize,
    /// Repeats within this batch.
    pub local: usize,
    /// Hits on short-lived cache keys.
    pub recent: usize,
    /// Hits on permanent content keys from earlier days.
    pub permanent: usize,
    pub kept: usize,
}

/// Drops entries already seen in this batch or in earlier runs.
///
/// An entry is dropped when its URL key or title key:
///
/// - already appeared earlier in `entries`
/// - is in the short-lived cache and not recorded in today's history
///
/// or when one of its [`content_keys`] was first seen on a day other than
/// `report_date` and its URL is not in today's history.
///
/// Today's history acts as an allow-list so that re-running the same report
/// date reproduces the same result. Input order is preserved and kept entries
/// carry the normalized URL.
pub fn dedup_entries(
    entries: Vec<RawEntry>,
    cache: &CacheStore,
    report_date: &str,
) -> (Vec<RawEntry>, DedupStats) {
    let mut stats = DedupStats {
        input: entries.len(),
        ..DedupStats::default()
    };

    let today = cache.history(report_date);
    let allow_url: HashSet<&str> = today.iter().map(|h| h.url.as_str()).collect();
    let allow_title: HashSet<&str> = today.iter().map(|h| h.title_hash.as_str()).collect();

    let mut local_urls: HashSet<String> = HashSet::new();
    let mut local_titles: HashSet<String> = HashSet::new();
    let mut out = Vec::with_capacity(entries.len());

    for mut entry in entries {
        let url = normalize_url(&entry.url);
        let title_key = title_fingerprint(&entry.title);

        if local_urls.contains(&url) || local_titles.contains(&title_key) {
            stats.local += 1;
            continue;
        }
        let url_allowed = allow_url.contains(url.as_str());
        if (cache.has_recent_url(&url) && !url_allowed)
            || (cache.has_recent_title(&title_key) && !allow_title.contains(title_key.as_str()))
        {
            stats.recent += 1;
            continue;
        }

        entry.url = url;
        if !url_allowed {
            let seen_before = content_keys(&entry).iter().any(|k| {
                cache
                    .content_first_seen(k)
                    .is_some_and(|first| first != report_date)
            });
            if seen_before {
                stats.permanent += 1;
                continue;
            }
        }

        local_urls.insert(entry.url.clone());
        local_titles.insert(title_key);
        out.push(entry);
    }

    stats.kept = out.len();
    tracing::debug!(
        input = stats.input,
        local = stats.local,
        recent = stats.recent,
        permanent = stats.permanent,
        kept = stats.kept,
        "Deduplicated entries"
    );
    (out, stats)
}
