use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;

use crate::types::{Category, Pin, ScoredEntry};
use crate::util::{age_in_days, contains_any, is_mostly_english, normalize_ws};

pub const DEFAULT_LEAD_N: usize = 1;
pub const DEFAULT_TOP_N: usize = 5;
pub const DEFAULT_MIN_TOP_TECH: usize = 2;
pub const DEFAULT_MAX_PER_PLATFORM: usize = 3;
pub const DEFAULT_MAX_PER_SOURCE: usize = 1;

static RE_DIGIT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d").unwrap());

const SIGNAL_KEYWORDS: &[&str] = &[
    "开源", "漏洞", "安全", "发布", "财报", "利率", "通胀", "GPU", "LLM", "AI",
];
const EXPLAINER_KEYWORDS: &[&str] = &[
    "为什么", "如何", "指南", "复盘", "剖析", "how", "why", "guide",
];
const PROMO_KEYWORDS: &[&str] = &[
    "报名", "申领", "席位", "限量", "邀您", "峰会", "大会", "研讨会", "直播", "购票", "优惠",
    "领取", "登记", "赞助",
];
const ROUNDUP_TITLE_KEYWORDS: &[&str] = &[
    "热榜", "榜单", "Top", "top", "Trending", "trending", "周报", "日报", "月报", "盘点",
    "合集", "汇总", "快讯", "要闻", "简报", "今日", "本周", "本月",
];
const ROUNDUP_SOURCES: &[&str] = &["知乎热榜", "GitHub Trending"];

const FOCUS_TECH_KEYWORDS: &[&str] = &[
    "ai", "llm", "agent", "开源", "编程", "python", "rust", "go", "kubernetes", "数据库",
    "安全", "漏洞", "前端", "后端", "算法", "架构", "云", "docker", "git", "模型", "智能体",
];
const FOCUS_FINANCE_KEYWORDS: &[&str] = &[
    "股票", "基金", "美股", "a股", "港股", "投资", "经济", "利率", "通胀", "财报", "央行",
    "比特币", "黄金", "大宗",
];
const FOCUS_ENTERTAINMENT_KEYWORDS: &[&str] = &[
    "电影", "电视剧", "综艺", "里番", "蓝光", "烂片", "手游", "抽奖",
];

/// Editorial focus of an entry, coarser than its category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusTag {
    Tech,
    Finance,
    Entertainment,
    Other,
}

/// Limits for one pick selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PickConfig {
    pub lead_n: usize,
    pub top_n: usize,
    pub min_top_tech: usize,
    pub max_per_platform: usize,
    pub max_per_source: usize,
}

impl Default for PickConfig {
    fn default() -> Self {
        Self {
            lead_n: DEFAULT_LEAD_N,
            top_n: DEFAULT_TOP_N,
            min_top_tech: DEFAULT_MIN_TOP_TECH,
            max_per_platform: DEFAULT_MAX_PER_PLATFORM,
            max_per_source: DEFAULT_MAX_PER_SOURCE,
        }
    }
}

/// Indices into the scored entry list. `lead` and `top` never overlap.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Picks {
    pub lead: Vec<usize>,
    pub top: Vec<usize>,
}

pub fn focus_tag(entry: &ScoredEntry) -> FocusTag {
    match entry.category {
        Category::Technology => return FocusTag::Tech,
        Category::Finance => return FocusTag::Finance,
        _ => {}
    }
    let title = entry
        .localized_title
        .as_deref()
        .filter(|t| !t.trim().is_empty())
        .unwrap_or(&entry.entry.title);
    let text = normalize_ws(&format!("{} {}", title, entry.summary));
    let lower = text.to_lowercase();
    if lower.contains("product hunt") || lower.contains("producthunt") || lower.contains("ph今日热榜") {
        FocusTag::Tech
    } else if contains_any(&text, FOCUS_TECH_KEYWORDS) {
        FocusTag::Tech
    } else if contains_any(&text, FOCUS_FINANCE_KEYWORDS) {
        FocusTag::Finance
    } else if FOCUS_ENTERTAINMENT_KEYWORDS.iter().any(|k| text.contains(k)) {
        FocusTag::Entertainment
    } else {
        FocusTag::Other
    }
}

/// Trending lists, digests and other aggregate posts.
pub fn looks_like_roundup(entry: &ScoredEntry) -> bool {
    let title = &entry.entry.title;
    let source = &entry.entry.source_name;
    let platform = &entry.entry.platform;
    if ROUNDUP_TITLE_KEYWORDS.iter().any(|k| title.contains(k)) {
        return true;
    }
    if ROUNDUP_SOURCES.iter().any(|k| source.contains(k)) {
        return true;
    }
    ["知乎", "GitHub"].iter().any(|k| platform.contains(k))
        && ["热榜", "Trending", "trending"].iter().any(|k| title.contains(k))
}

fn is_promotional(entry: &ScoredEntry) -> bool {
    let text = format!("{} {}", entry.entry.title, entry.summary);
    PROMO_KEYWORDS.iter().any(|k| text.contains(k))
}

fn category_bonus(category: Category) -> f64 {
    match category {
        Category::Technology => 1.1,
        Category::Finance => 0.6,
        Category::Business => 0.3,
        Category::CurrentAffairs => 0.1,
        _ => 0.0,
    }
}

fn density_bonus(title: &str, summary: &str) -> f64 {
    let summary = normalize_ws(summary);
    let len = summary.chars().count();
    let mut score = if len < 40 {
        -0.4
    } else if (80..=220).contains(&len) {
        0.4
    } else if len > 360 {
        -0.2
    } else {
        0.0
    };
    let text = format!("{} {}", title, summary);
    if RE_DIGIT.is_match(&text) {
        score += 0.15;
    }
    // Case-sensitive substrings: "AI" and "GPU" count only as written.
    if SIGNAL_KEYWORDS.iter().any(|k| text.contains(k)) {
        score += 0.15;
    }
    if contains_any(title, EXPLAINER_KEYWORDS) {
        score += 0.1;
    }
    score
}

fn recency_bonus(published: Option<&str>, report_date: NaiveDate) -> f64 {
    match published.and_then(|p| age_in_days(p, report_date)) {
        None => 0.0,
        Some(d) if d < 0 => -0.2,
        Some(d) if d <= 2 => 0.45,
        Some(d) if d <= 7 => 0.15,
        Some(d) if d <= 14 => -0.75,
        Some(d) if d <= 30 => -1.0,
        Some(_) => -1.6,
    }
}

/// Editorial ranking score of one entry on `report_date`.
pub fn pick_score(entry: &ScoredEntry, report_date: NaiveDate) -> f64 {
    let title = &entry.entry.title;
    let mut score = entry.quality_score
        + category_bonus(entry.category)
        + density_bonus(title, &entry.summary)
        + recency_bonus(entry.entry.published.as_deref(), report_date);
    if is_promotional(entry) {
        score -= 1.1;
    }
    if looks_like_roundup(entry) {
        score -= 0.35;
    }
    if focus_tag(entry) == FocusTag::Entertainment {
        score -= 0.6;
    }
    let localized = entry
        .localized_title
        .as_deref()
        .is_some_and(|t| !t.trim().is_empty());
    if is_mostly_english(title) && !localized {
        score -= 0.15;
    }
    score
}

/// Running selection state shared by the lead and top passes.
struct Selector<'a> {
    entries: &'a [ScoredEntry],
    ranked: Vec<usize>,
    taken: HashSet<usize>,
    per_platform: HashMap<&'a str, usize>,
    per_source: HashMap<&'a str, usize>,
    max_per_platform: usize,
    max_per_source: usize,
}

impl<'a> Selector<'a> {
    fn new(entries: &'a [ScoredEntry], config: &PickConfig, report_date: NaiveDate) -> Self {
        let mut scored: Vec<(usize, f64)> = entries
            .iter()
            .enumerate()
            .filter(|(_, e)| !e.entry.url.is_empty())
            .map(|(i, e)| (i, pick_score(e, report_date)))
            .collect();
        scored.sort_by(|a, b| {
            b.1.total_cmp(&a.1)
                .then_with(|| entries[a.0].entry.url.cmp(&entries[b.0].entry.url))
        });
        Self {
            entries,
            ranked: scored.into_iter().map(|(i, _)| i).collect(),
            taken: HashSet::new(),
            per_platform: HashMap::new(),
            per_source: HashMap::new(),
            max_per_platform: config.max_per_platform,
            max_per_source: config.max_per_source,
        }
    }

    fn reset(&mut self) {
        self.taken.clear();
        self.per_platform.clear();
        self.per_source.clear();
    }

    fn within_caps(&self, entry: &ScoredEntry) -> bool {
        let platform = entry.entry.platform.trim();
        let source = entry.entry.source_name.trim();
        let platform_full = !platform.is_empty()
            && self.per_platform.get(platform).copied().unwrap_or(0) >= self.max_per_platform;
        let source_full = !source.is_empty()
            && self.per_source.get(source).copied().unwrap_or(0) >= self.max_per_source;
        !platform_full && !source_full
    }

    /// Takes up to `n` ranked entries accepted by `only`: first within the
    /// platform and source caps, then ignoring them.
    fn take(&mut self, n: usize, only: impl Fn(&ScoredEntry) -> bool) -> Vec<usize> {
        let mut out = Vec::new();
        if n == 0 {
            return out;
        }
        let entries = self.entries;
        for relaxed in [false, true] {
            for pos in 0..self.ranked.len() {
                let idx = self.ranked[pos];
                if self.taken.contains(&idx) {
                    continue;
                }
                let entry = &entries[idx];
                if !only(entry) || (!relaxed && !self.within_caps(entry)) {
                    continue;
                }
                out.push(idx);
                self.taken.insert(idx);
                let platform = entry.entry.platform.trim();
                if !platform.is_empty() {
                    *self.per_platform.entry(platform).or_insert(0) += 1;
                }
                let source = entry.entry.source_name.trim();
                if !source.is_empty() {
                    *self.per_source.entry(source).or_insert(0) += 1;
                }
                if out.len() >= n {
                    return out;
                }
            }
        }
        out
    }
}

fn lead_candidate(entry: &ScoredEntry) -> bool {
    matches!(focus_tag(entry), FocusTag::Tech | FocusTag::Finance)
        && !looks_like_roundup(entry)
        && !is_promotional(entry)
}

/// Chooses the lead and top picks.
///
/// Entries are ranked by descending [`pick_score`], ties broken by URL;
/// entries without a URL are never picked. Each list is filled in two passes,
/// first honoring `max_per_platform` and `max_per_source`, then without them.
///
/// Leads come from non-roundup, non-promotional tech or finance entries; if
/// there are not enough, the counters reset and leads are chosen from
/// everything. The top list takes up to `min_top_tech` tech entries, then
/// tech or finance entries, then anything left.
pub fn select_picks(entries: &[ScoredEntry], config: &PickConfig, report_date: NaiveDate) -> Picks {
    let mut selector = Selector::new(entries, config, report_date);

    let mut lead = selector.take(config.lead_n, lead_candidate);
    if lead.len() < config.lead_n {
        selector.reset();
        lead = selector.take(config.lead_n, |_| true);
    }

    let want_tech = config.min_top_tech.min(config.top_n);
    let mut top = selector.take(want_tech, |e| focus_tag(e) == FocusTag::Tech);
    if top.len() < config.top_n {
        let more = selector.take(config.top_n - top.len(), |e| {
            matches!(focus_tag(e), FocusTag::Tech | FocusTag::Finance)
        });
        top.extend(more);
    }
    if top.len() < config.top_n {
        let more = selector.take(config.top_n - top.len(), |_| true);
        top.extend(more);
    }

    tracing::debug!(lead = lead.len(), top = top.len(), candidates = selector.ranked.len(), "Selected picks");
    Picks { lead, top }
}

/// Writes picks back as pins; every other entry is unpinned.
pub fn apply_pins(entries: &mut [ScoredEntry], picks: &Picks) {
    for entry in entries.iter_mut() {
        entry.pin = Pin::None;
    }
    for &i in &picks.top {
        if let Some(e) = entries.get_mut(i) {
            e.pin = Pin::Top;
        }
    }
    for &i in &picks.lead {
        if let Some(e) = entries.get_mut(i) {
            e.pin = Pin::Lead;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Carrier, RawEntry};
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn entry(source: &str, title: &str, url: &str, category: Category) -> ScoredEntry {
        ScoredEntry {
            entry: RawEntry {
                source_name: source.into(),
                source_url: format!("https://{source}.example/feed"),
                platform: source.into(),
                title: title.into(),
                url: url.into(),
                description: String::new(),
                published: None,
                enclosure_mime: None,
            },
            category,
            carrier: Carrier::Article,
            quality_score: 3.0,
            keywords: Vec::new(),
            summary: String::new(),
            key_points: Vec::new(),
            localized_title: None,
            pin: Pin::None,
        }
    }

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, 10).unwrap()
    }

    #[test]
    fn test_localized_english_title_scores_higher() {
        let plain = entry(
            "S",
            "OpenAI announces new GPU security update",
            "https://s.example/1",
            Category::Technology,
        );
        let mut localized = plain.clone();
        localized.localized_title = Some("OpenAI 发布新的 GPU 安全更新".into());
        let diff = pick_score(&localized, day()) - pick_score(&plain, day());
        assert!((diff - 0.15).abs() < 1e-9);
    }

    #[test]
    fn test_signal_keywords_are_case_sensitive_substrings() {
        let filler = "x".repeat(100);
        let base = density_bonus("plain", &filler);
        assert_eq!(density_bonus("OpenAI ships", &filler), base + 0.15);
        assert_eq!(density_bonus("新品发布会", &filler), base + 0.15);
        assert_eq!(density_bonus("ai ships", &filler), base);
    }

    #[test]
    fn test_recency_bands() {
        let cases = [
            ("2025-01-11", -0.2),
            ("2025-01-09", 0.45),
            ("2025-01-04", 0.15),
            ("2024-12-28", -0.75),
            ("2024-12-15", -1.0),
            ("2024-06-01", -1.6),
        ];
        let base = pick_score(&entry("S", "x", "https://s/1", Category::Other), day());
        for (published, expected) in cases {
            let mut e = entry("S", "x", "https://s/1", Category::Other);
            e.entry.published = Some(published.into());
            let got = pick_score(&e, day()) - base;
            assert!((got - expected).abs() < 1e-9, "{published}: {got}");
        }
    }

    #[test]
    fn test_promo_and_roundup_penalties() {
        let base = pick_score(&entry("S", "普通文章", "https://s/1", Category::Other), day());
        let promo = pick_score(&entry("S", "开发者大会报名开启", "https://s/2", Category::Other), day());
        let roundup = pick_score(&entry("S", "本周热榜", "https://s/3", Category::Other), day());
        assert!((base - promo - 1.1).abs() < 1e-9);
        assert!((base - roundup - 0.35).abs() < 1e-9);
    }

    #[test]
    fn test_lead_prefers_tech_and_skips_roundups() {
        let mut roundup = entry("GitHub Trending", "GitHub Trending today", "https://a/1", Category::Technology);
        roundup.quality_score = 5.0;
        let mut other = entry("Life", "睡眠小技巧", "https://b/1", Category::Lifestyle);
        other.quality_score = 5.0;
        let tech = entry("Dev", "Rust 发布新版本", "https://c/1", Category::Technology);
        let entries = vec![roundup, other, tech];

        let picks = select_picks(&entries, &PickConfig::default(), day());
        assert_eq!(picks.lead, vec![2]);
        assert!(!picks.top.contains(&2));
    }

    #[test]
    fn test_lead_falls_back_when_no_candidates() {
        let entries = vec![
            entry("A", "睡眠小技巧", "https://a/1", Category::Lifestyle),
            entry("B", "旅行随笔", "https://b/1", Category::Lifestyle),
        ];
        let picks = select_picks(&entries, &PickConfig::default(), day());
        assert_eq!(picks.lead.len(), 1);
        assert_eq!(picks.top.len(), 1);
    }

    #[test]
    fn test_min_top_tech_guarantee() {
        let mut entries = Vec::new();
        for i in 0..6 {
            let mut e = entry(&format!("biz{i}"), "融资消息", &format!("https://biz{i}/1"), Category::Business);
            e.quality_score = 5.0;
            entries.push(e);
        }
        entries.push(entry("dev1", "编程笔记", "https://dev1/1", Category::Technology));
        entries.push(entry("dev2", "数据库调优", "https://dev2/1", Category::Technology));
        entries.push(entry("dev3", "前端小记", "https://dev3/1", Category::Technology));

        let config = PickConfig {
            lead_n: 0,
            ..PickConfig::default()
        };
        let picks = select_picks(&entries, &config, day());
        let tech = picks
            .top
            .iter()
            .filter(|&&i| entries[i].category == Category::Technology)
            .count();
        assert!(tech >= 2);
        assert_eq!(picks.top.len(), 5);
    }

    #[test]
    fn test_entries_without_url_never_picked() {
        let entries = vec![entry("A", "Rust 编程", "", Category::Technology)];
        let picks = select_picks(&entries, &PickConfig::default(), day());
        assert!(picks.lead.is_empty() && picks.top.is_empty());
    }

    #[test]
    fn test_apply_pins() {
        let mut entries = vec![
            entry("A", "a", "https://a/1", Category::Other),
            entry("B", "b", "https://b/1", Category::Other),
            entry("C", "c", "https://c/1", Category::Other),
        ];
        entries[2].pin = Pin::Top;
        apply_pins(&mut entries, &Picks { lead: vec![1], top: vec![0] });
        let pins: Vec<_> = entries.iter().map(|e| e.pin).collect();
        assert_eq!(pins, vec![Pin::Top, Pin::Lead, Pin::None]);
    }

    proptest! {
        #[test]
        fn prop_lead_and_top_disjoint(
            specs in proptest::collection::vec((0usize..4, 0usize..4, 1.0f64..5.0), 0..30),
            lead_n in 0usize..3,
            top_n in 0usize..8,
        ) {
            let entries: Vec<_> = specs
                .iter()
                .enumerate()
                .map(|(i, (src, cat, q))| {
                    let category = [Category::Technology, Category::Finance, Category::Business, Category::Other][*cat];
                    let mut e = entry(&format!("s{src}"), "x", &format!("https://x/{i}"), category);
                    e.quality_score = *q;
                    e
                })
                .collect();
            let config = PickConfig { lead_n, top_n, ..PickConfig::default() };
            let picks = select_picks(&entries, &config, day());
            let lead: HashSet<_> = picks.lead.iter().collect();
            prop_assert!(picks.top.iter().all(|i| !lead.contains(i)));
            prop_assert!(picks.lead.len() <= lead_n && picks.top.len() <= top_n);
            let expected_total = (lead_n + top_n).min(entries.len());
            prop_assert_eq!(picks.lead.len() + picks.top.len(), expected_total);
        }

        #[test]
        fn prop_platform_cap_respected_when_enough_diversity(
            platforms in proptest::collection::vec(0usize..8, 12..40),
        ) {
            // Every entry has its own source, so only the platform cap binds.
            let entries: Vec<_> = platforms
                .iter()
                .enumerate()
                .map(|(i, p)| {
                    let mut e = entry(&format!("src{i}"), "zzz", &format!("https://x/{i}"), Category::Other);
                    e.entry.platform = format!("p{p}");
                    e
                })
                .collect();
            let mut per_platform: HashMap<usize, usize> = HashMap::new();
            for p in &platforms {
                *per_platform.entry(*p).or_insert(0) += 1;
            }
            let capacity: usize = per_platform
                .values()
                .map(|&n| n.min(DEFAULT_MAX_PER_PLATFORM))
                .sum();
            let config = PickConfig { lead_n: 0, top_n: 5, ..PickConfig::default() };
            let picks = select_picks(&entries, &config, day());

            let mut counts: HashMap<&str, usize> = HashMap::new();
            for &i in &picks.top {
                *counts.entry(entries[i].entry.platform.as_str()).or_insert(0) += 1;
            }
            if capacity >= 5 {
                prop_assert!(counts.values().all(|&c| c <= DEFAULT_MAX_PER_PLATFORM));
            }
        }
    }
}
