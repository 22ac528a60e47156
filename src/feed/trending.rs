//! GitHub trending page adapter.
//!
//! The trending page is HTML, not a feed. Each repository is rendered as an
//! `<article class="Box-row">`; this module extracts the first ten into
//! [`TrendingRepo`] records that the fetcher turns into regular entries.

use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};

use crate::util::{normalize_ws, strip_html};

/// Maximum repositories taken from one trending page.
pub const MAX_TRENDING_REPOS: usize = 10;

static ROW: LazyLock<Selector> = LazyLock::new(|| Selector::parse("article.Box-row").unwrap());
static LINK: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a[href]").unwrap());
static HEADING_LINK: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("h2 a[href], h1 a[href]").unwrap());
static PARAGRAPH: LazyLock<Selector> = LazyLock::new(|| Selector::parse("p").unwrap());
static LANGUAGE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"[itemprop="programmingLanguage"]"#).unwrap());
static STARGAZERS: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"a[href$="/stargazers"]"#).unwrap());

static RE_SLUG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*/([A-Za-z0-9_.-]+/[A-Za-z0-9_.-]+)\s*$").unwrap());
static RE_STARS_TODAY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)([0-9,]+)\s+stars\s+today").unwrap());
static RE_COUNT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[0-9][0-9,]*").unwrap());

/// One repository from the trending page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrendingRepo {
    /// `owner/repo`
    pub slug: String,
    pub url: String,
    /// Stars, stars today, language and the repo blurb joined by " • ".
    pub description: String,
}

/// Extracts at most [`MAX_TRENDING_REPOS`] repositories from trending HTML.
///
/// Rows without a recognizable `owner/repo` link are skipped. Missing
/// metadata is left out of the description; a row with no metadata at all
/// uses the slug as its description.
pub fn parse_trending(html: &str) -> Vec<TrendingRepo> {
    if html.trim().is_empty() {
        return Vec::new();
    }
    let document = Html::parse_document(html);

    document
        .select(&ROW)
        .filter_map(parse_row)
        .take(MAX_TRENDING_REPOS)
        .collect()
}

fn text_of(el: ElementRef<'_>) -> String {
    normalize_ws(&el.text().collect::<Vec<_>>().join(" "))
}

fn slug_from_href(href: &str) -> Option<String> {
    RE_SLUG.captures(href).map(|c| c[1].to_string())
}

fn parse_row(row: ElementRef<'_>) -> Option<TrendingRepo> {
    let slug = row
        .select(&HEADING_LINK)
        .chain(row.select(&LINK))
        .filter_map(|a| a.value().attr("href"))
        .find_map(slug_from_href)?;

    let blurb = row
        .select(&PARAGRAPH)
        .next()
        .map(|p| strip_html(&p.inner_html()))
        .unwrap_or_default();
    let language = row.select(&LANGUAGE).next().map(text_of).unwrap_or_default();
    let stars = row
        .select(&STARGAZERS)
        .next()
        .map(text_of)
        .and_then(|t| RE_COUNT.find(&t).map(|m| m.as_str().to_string()))
        .unwrap_or_default();
    let row_text = text_of(row);
    let stars_today = RE_STARS_TODAY
        .captures(&row_text)
        .map(|c| c[1].to_string())
        .unwrap_or_default();

    let mut parts: Vec<String> = Vec::new();
    if !stars.is_empty() {
        parts.push(format!("⭐ {stars}"));
    }
    if !stars_today.is_empty() {
        parts.push(format!("今日 +{stars_today}"));
    }
    if !language.is_empty() {
        parts.push(language);
    }
    if !blurb.is_empty() {
        parts.push(blurb);
    }
    let description = if parts.is_empty() {
        slug.clone()
    } else {
        parts.join(" • ")
    };

    Some(TrendingRepo {
        url: format!("https://github.com/{slug}"),
        slug,
        description,
    })
}
