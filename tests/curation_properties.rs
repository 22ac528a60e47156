//! Property tests over the curation stages, driven through the public API.

use std::collections::HashSet;

use chrono::NaiveDate;
use proptest::prelude::*;

use dailyfeed::curate::{classify, dedup_entries, select_picks, title_fingerprint, PickConfig};
use dailyfeed::storage::CacheStore;
use dailyfeed::types::{Pin, RawEntry, ScoredEntry};
use dailyfeed::util::normalize_url;

const TITLES: &[&str] = &[
    "Rust release notes",
    "rust release notes!",
    "New GPU benchmarks",
    "Markets rally on rate cut",
    "Open source database adds vector search",
];

const URLS: &[&str] = &[
    "https://a.example/1",
    "https://a.example/1?utm_source=rss",
    "https://a.example/2",
    "https://b.example/3",
    "https://c.example/4#comments",
];

fn raw(source: &str, title: &str, url: &str) -> RawEntry {
    RawEntry {
        source_name: source.to_string(),
        source_url: format!("https://{source}.example/feed"),
        platform: source.to_string(),
        title: title.to_string(),
        url: url.to_string(),
        description: String::new(),
        published: Some("2025-01-05T08:00:00Z".to_string()),
        enclosure_mime: None,
    }
}

fn scored(entry: RawEntry) -> ScoredEntry {
    let class = classify(&entry);
    ScoredEntry {
        entry,
        category: class.category,
        carrier: class.carrier,
        quality_score: class.quality_score,
        keywords: Vec::new(),
        summary: String::new(),
        key_points: Vec::new(),
        localized_title: None,
        pin: Pin::None,
    }
}

fn entries_strategy() -> impl Strategy<Value = Vec<RawEntry>> {
    prop::collection::vec((0..TITLES.len(), 0..URLS.len(), 0..3usize), 0..16).prop_map(|picks| {
        picks
            .into_iter()
            .map(|(t, u, s)| raw(["alpha", "beta", "gamma"][s], TITLES[t], URLS[u]))
            .collect()
    })
}

proptest! {
    #[test]
    fn dedup_never_keeps_two_of_the_same(entries in entries_strategy()) {
        let cache = CacheStore::default();
        let (kept, stats) = dedup_entries(entries.clone(), &cache, "2025-01-06");

        prop_assert_eq!(stats.input, entries.len());
        prop_assert_eq!(stats.kept + stats.local + stats.recent + stats.permanent, stats.input);

        for (i, a) in kept.iter().enumerate() {
            for b in &kept[i + 1..] {
                prop_assert_ne!(normalize_url(&a.url), normalize_url(&b.url));
                prop_assert_ne!(title_fingerprint(&a.title), title_fingerprint(&b.title));
            }
        }
    }

    #[test]
    fn published_entries_never_return_on_later_days(entries in entries_strategy()) {
        let mut cache = CacheStore::default();
        let (kept, _) = dedup_entries(entries.clone(), &cache, "2025-01-05");
        let published: Vec<ScoredEntry> = kept.into_iter().map(scored).collect();
        cache.record_published("2025-01-05", &published);

        let (again, _) = dedup_entries(entries, &cache, "2025-01-06");
        prop_assert!(again.is_empty());
    }

    #[test]
    fn picks_fill_both_lists_when_enough_entries(entries in entries_strategy()) {
        let cache = CacheStore::default();
        let (kept, _) = dedup_entries(entries, &cache, "2025-01-06");
        let published: Vec<ScoredEntry> = kept.into_iter().map(scored).collect();

        let config = PickConfig::default();
        let picks = select_picks(&published, &config, NaiveDate::from_ymd_opt(2025, 1, 6).unwrap());

        let n = published.len();
        prop_assert_eq!(picks.lead.len(), config.lead_n.min(n));
        prop_assert_eq!(picks.top.len(), config.top_n.min(n - picks.lead.len()));

        let mut seen = HashSet::new();
        for &i in picks.lead.iter().chain(picks.top.iter()) {
            prop_assert!(i < n);
            prop_assert!(seen.insert(i));
        }
    }
}
