use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDate;

use crate::feed::FeedSource;
use crate::storage::HistoryItem;
use crate::util::parse_iso_date;

/// Baseline weights for well-known platforms, matched against the lowercased
/// source name and URL. First match wins.
const PLATFORM_BASELINES: &[(&[&str], f64)] = &[
    (&["weibo", "微博"], 100.0),
    (&["zhihu", "知乎"], 90.0),
    (&["36kr", "36氪"], 80.0),
    (&["github"], 60.0),
    (&["sspai", "少数派"], 70.0),
    (&["xueqiu", "雪球"], 65.0),
    (&["ruanyifeng", "阮一峰"], 55.0),
    (&["v2ex"], 55.0),
    (&["zaobao", "早报"], 50.0),
    (&["telegram", "t.me/"], 35.0),
];

/// Inferred popularity baseline for a source, `0.0` when unknown.
pub fn infer_platform_base_weight(name: &str, url: &str) -> f64 {
    let haystack = format!("{} {}", name, url).to_lowercase();
    PLATFORM_BASELINES
        .iter()
        .find(|(patterns, _)| patterns.iter().any(|p| haystack.contains(p)))
        .map(|(_, weight)| *weight)
        .unwrap_or(0.0)
}

/// Grouping label of a source: its selected key, else its name.
pub fn platform_label<'a>(source: &'a FeedSource, platforms: &'a HashMap<String, String>) -> &'a str {
    platforms
        .get(&source.url)
        .map(String::as_str)
        .unwrap_or(source.name.as_str())
}

/// Heat score per platform label.
///
/// For each platform: the highest `max(weight, inferred baseline)` among its
/// sources, plus the number of history items recorded under that platform on
/// days `d` with `0 <= today - d < window_days`. Platforms that appear only in
/// history score their count alone.
pub fn compute_platform_heat(
    sources: &[FeedSource],
    platforms: &HashMap<String, String>,
    history: &BTreeMap<String, Vec<HistoryItem>>,
    today: NaiveDate,
    window_days: i64,
) -> HashMap<String, f64> {
    let window = window_days.max(1);
    let mut heat: HashMap<String, f64> = HashMap::new();

    for source in sources {
        let label = platform_label(source, platforms);
        let base = source
            .weight
            .max(infer_platform_base_weight(&source.name, &source.url));
        let slot = heat.entry(label.to_string()).or_insert(0.0);
        *slot = slot.max(base);
    }

    let mut counts: HashMap<&str, usize> = HashMap::new();
    for (date, items) in history {
        let Some(day) = parse_iso_date(date) else {
            continue;
        };
        let delta = (today - day).num_days();
        if !(0..window).contains(&delta) {
            continue;
        }
        for item in items {
            let key = if item.platform.is_empty() {
                item.source.as_str()
            } else {
                item.platform.as_str()
            };
            if !key.is_empty() {
                *counts.entry(key).or_insert(0) += 1;
            }
        }
    }
    for (platform, count) in counts {
        *heat.entry(platform.to_string()).or_insert(0.0) += count as f64;
    }

    tracing::debug!(platforms = heat.len(), window_days = window, "Computed platform heat");
    heat
}
