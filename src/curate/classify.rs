use crate::types::{Carrier, Category, RawEntry};
use crate::util::{contains_any, host_of};

/// Entries scoring below this are dropped before enrichment.
pub const DEFAULT_MIN_SCORE: f64 = 2.6;

pub const MIN_QUALITY: f64 = 1.0;
pub const MAX_QUALITY: f64 = 5.0;

const BASE_SCORE: f64 = 3.0;
const SHORT_TEXT_CHARS: usize = 30;

// ============================================================================
// Keyword sets
// ============================================================================

const FINANCE_KEYWORDS: &[&str] = &[
    "股票", "基金", "美股", "a股", "港股", "投资", "经济", "利率", "通胀", "财报", "央行",
    "比特币", "黄金", "stock market", "stocks", "inflation", "interest rate", "earnings",
    "central bank", "bitcoin", "nasdaq",
];

const BUSINESS_KEYWORDS: &[&str] = &[
    "融资", "ipo", "估值", "收购", "并购", "市场", "商业", "产品", "运营", "用户", "增长",
    "创业", "电商", "funding", "valuation", "acquisition", "acquires", "merger", "startup",
    "e-commerce",
];

const CURRENT_AFFAIRS_KEYWORDS: &[&str] = &[
    "国际", "外交", "政府", "法院", "选举", "总统", "部长", "警方", "通报", "突发", "战争",
    "冲突", "election", "president", "minister", "government", "court", "police", "war",
];

const ENTERTAINMENT_KEYWORDS: &[&str] = &[
    "电影", "电视剧", "综艺", "游戏", "音乐", "动画", "4k", "蓝光", "movie", "film", "anime",
    "music",
];

const LIFESTYLE_KEYWORDS: &[&str] = &[
    "健康", "运动", "睡眠", "习惯", "心理", "育儿", "饮食", "旅行", "自驾", "租车", "穿衣",
    "穿搭", "指南", "复盘", "避坑", "health", "fitness", "sleep", "parenting", "travel", "diet",
];

const TECH_KEYWORDS: &[&str] = &[
    "ai", "llm", "agent", "开源", "编程", "python", "rust", "go", "kubernetes", "数据库",
    "安全", "漏洞", "前端", "后端", "算法", "架构", "云", "macos", "windows", "docker", "git",
    "open source", "programming", "database", "security", "vulnerability", "frontend",
    "backend", "algorithm", "linux", "gpu", "compiler",
];

/// Keyword cascade in priority order; first match wins.
const CATEGORY_RULES: &[(Category, &[&str])] = &[
    (Category::Finance, FINANCE_KEYWORDS),
    (Category::Business, BUSINESS_KEYWORDS),
    (Category::CurrentAffairs, CURRENT_AFFAIRS_KEYWORDS),
    (Category::Entertainment, ENTERTAINMENT_KEYWORDS),
    (Category::Lifestyle, LIFESTYLE_KEYWORDS),
    (Category::Technology, TECH_KEYWORDS),
];

/// Result of classifying one entry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Classification {
    pub category: Category,
    pub carrier: Carrier,
    pub quality_score: f64,
}

/// Classifies and scores an entry.
pub fn classify(entry: &RawEntry) -> Classification {
    let category = category_of(entry);
    let carrier = carrier_of(entry);
    Classification {
        category,
        carrier,
        quality_score: quality_score(entry, category, carrier),
    }
}

/// Delivery medium: enclosure MIME type first, then the link's domain.
pub fn carrier_of(entry: &RawEntry) -> Carrier {
    if let Some(mime) = entry.enclosure_mime.as_deref() {
        let mime = mime.to_ascii_lowercase();
        if mime.starts_with("audio/") {
            return Carrier::Podcast;
        }
        if mime.starts_with("video/") {
            return Carrier::Video;
        }
    }

    let url = entry.url.to_lowercase();
    let host = host_of(&entry.url);
    if host.contains("github.com") {
        Carrier::Project
    } else if host.contains("youtube.com") || host.contains("bilibili.com") {
        Carrier::Video
    } else if url.contains("news.ycombinator.com/item") || url.contains("v2ex.com/t") {
        Carrier::Post
    } else {
        Carrier::Article
    }
}

/// Topic category.
///
/// Near-single-topic sources force their category; otherwise keyword sets
/// are tried in a fixed priority order over the source name, title and
/// description.
pub fn category_of(entry: &RawEntry) -> Category {
    if let Some(forced) = source_category(entry) {
        return forced;
    }
    let text = format!("{} {} {}", entry.source_name, entry.title, entry.description);
    CATEGORY_RULES
        .iter()
        .find(|(_, keywords)| contains_any(&text, keywords))
        .map(|(category, _)| *category)
        .unwrap_or(Category::Other)
}

fn source_category(entry: &RawEntry) -> Option<Category> {
    let source = entry.source_name.as_str();
    let host = host_of(&entry.url);
    if source.contains("阮一峰") || host.ends_with("ruanyifeng.com") {
        return Some(Category::Technology);
    }
    if source.contains("V2EX") || host == "v2ex.com" || host == "www.v2ex.com" {
        return Some(Category::Technology);
    }
    if ["36氪", "36kr", "Product"].iter().any(|k| source.contains(k)) || host.ends_with("36kr.com") {
        return Some(Category::Business);
    }
    None
}

/// Baseline quality score, clamped to `[1.0, 5.0]`.
pub fn quality_score(entry: &RawEntry, category: Category, carrier: Carrier) -> f64 {
    let mut score = BASE_SCORE;
    let text = format!("{} {}", entry.title, entry.description);
    if text.trim().chars().count() < SHORT_TEXT_CHARS {
        score -= 0.6;
    }
    if matches!(category, Category::Technology | Category::Finance) {
        score += 0.3;
    }
    if carrier == Carrier::Project {
        score += 0.4;
    }
    clamp_quality(score)
}

pub fn clamp_quality(score: f64) -> f64 {
    if score.is_nan() {
        return BASE_SCORE;
    }
    score.clamp(MIN_QUALITY, MAX_QUALITY)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn raw(source: &str, title: &str, url: &str, description: &str) -> RawEntry {
        RawEntry {
            source_name: source.into(),
            source_url: "https://feed.example/rss".into(),
            platform: source.into(),
            title: title.into(),
            url: url.into(),
            description: description.into(),
            published: None,
            enclosure_mime: None,
        }
    }

    #[test]
    fn test_carrier_rules() {
        let mut e = raw("S", "t", "https://a.example/ep1", "");
        e.enclosure_mime = Some("audio/mpeg".into());
        assert_eq!(carrier_of(&e), Carrier::Podcast);
        e.enclosure_mime = Some("VIDEO/mp4".into());
        assert_eq!(carrier_of(&e), Carrier::Video);

        assert_eq!(carrier_of(&raw("S", "t", "https://github.com/o/r", "")), Carrier::Project);
        assert_eq!(carrier_of(&raw("S", "t", "https://www.bilibili.com/video/1", "")), Carrier::Video);
        assert_eq!(
            carrier_of(&raw("S", "t", "https://news.ycombinator.com/item?id=1", "")),
            Carrier::Post
        );
        assert_eq!(carrier_of(&raw("S", "t", "https://www.v2ex.com/t/123", "")), Carrier::Post);
        assert_eq!(carrier_of(&raw("S", "t", "https://blog.example/p", "")), Carrier::Article);
    }

    #[test]
    fn test_source_hint_overrides_keywords() {
        let e = raw("V2EX 技术", "股票软件推荐", "https://www.v2ex.com/t/1", "");
        assert_eq!(category_of(&e), Category::Technology);
        let e = raw("36氪", "新游戏发布", "https://36kr.com/p/1", "");
        assert_eq!(category_of(&e), Category::Business);
    }

    #[test]
    fn test_keyword_priority_order() {
        // Finance beats technology even when both match.
        let e = raw("Blog", "AI 公司财报超预期", "https://a.example/1", "");
        assert_eq!(category_of(&e), Category::Finance);
        let e = raw("Blog", "Rust 编程技巧", "https://a.example/2", "");
        assert_eq!(category_of(&e), Category::Technology);
        let e = raw("Blog", "Nothing to see", "https://a.example/3", "");
        assert_eq!(category_of(&e), Category::Other);
    }

    #[test]
    fn test_ascii_keywords_need_word_boundaries() {
        // "go" inside "google" and "ai" inside "said" must not fire.
        let e = raw("Blog", "google said hello", "https://a.example/1", "");
        assert_eq!(category_of(&e), Category::Other);
    }

    #[test]
    fn test_quality_score_components() {
        let short = raw("S", "Short", "https://a.example/1", "");
        assert!((quality_score(&short, Category::Other, Carrier::Article) - 2.4).abs() < 1e-9);

        let long = raw("S", "A reasonably long title for scoring", "https://a.example/2", "");
        assert!((quality_score(&long, Category::Technology, Carrier::Project) - 3.7).abs() < 1e-9);
    }

    proptest! {
        #[test]
        fn prop_quality_always_in_bounds(
            title in ".{0,80}",
            description in ".{0,300}",
            url in "https?://[a-z]{1,12}\\.(com|org|io)/[a-z0-9/]{0,20}",
            mime in proptest::option::of("(audio|video|text)/[a-z]{2,6}"),
        ) {
            let mut e = raw("Source", &title, &url, &description);
            e.enclosure_mime = mime;
            let c = classify(&e);
            prop_assert!(c.quality_score >= MIN_QUALITY && c.quality_score <= MAX_QUALITY);
        }
    }
}
