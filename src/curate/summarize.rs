use std::collections::HashMap;
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use regex::Regex;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;

use crate::curate::classify::{clamp_quality, Classification};
use crate::types::{RawEntry, ScoredEntry};
use crate::util::{clip, is_mostly_english, normalize_ws, split_sentences};

pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
/// Environment variable holding the API key.
pub const OPENAI_API_KEY_ENV: &str = "OPENAI_API_KEY";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(35);
/// Concurrent summarization calls during enrichment.
pub const ENRICH_CONCURRENCY: usize = 4;

const MAX_KEY_POINTS: usize = 3;
const MAX_KEYWORDS: usize = 6;
const SUMMARY_CHARS: usize = 260;
const KEY_POINT_CHARS: usize = 80;
const MIN_KEY_POINT_CHARS: usize = 12;

static RE_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[A-Za-z][A-Za-z0-9+_.\-]{1,24}").unwrap());
static RE_TICKER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\$[^$]{1,40}\$").unwrap());
static RE_LEADING_LABEL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(首发|作者|来源)\s*[:：]\s*").unwrap());
static RE_LEADING_SIGNATURE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^，,]{1,18}[，,]\s*").unwrap());
static RE_CJK_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\u{4e00}-\u{9fff}]+").unwrap());

const KEYWORD_STOP_WORDS: &[&str] = &[
    "the", "and", "for", "with", "from", "this", "that", "your", "now", "how", "what", "into",
    "are",
];
const BIGRAM_STOP_WORDS: &[&str] = &[
    "什么", "为什么", "怎么", "如何", "是否", "可以", "有的", "一个", "哪些", "不会", "会不",
    "到底", "真的", "我们", "你们", "他们", "这个", "那个", "中国",
];
const BOILERPLATE: &[&str] = &[
    "查看知乎原文", "查看原文", "查看全文", "阅读原文", "阅读全文", "点击查看", "点击阅读",
];

/// Summarization failures. Never surfaced past [`enrich_all`].
#[derive(Debug, Error)]
pub enum SummarizeError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    #[error("Request timed out")]
    Timeout,
    #[error("Malformed model response: {0}")]
    MalformedResponse(String),
    #[error("Model returned an empty summary")]
    EmptySummary,
    #[error("Insecure base URL: HTTPS required (except localhost for testing)")]
    InsecureBaseUrl,
}

/// What the summarizer sees of an entry.
#[derive(Debug, Clone, Serialize)]
pub struct SummaryRequest {
    pub source: String,
    pub title: String,
    pub description: String,
    pub url: String,
    pub category_hint: String,
    pub carrier_hint: String,
    pub published: Option<String>,
}

impl SummaryRequest {
    pub fn new(entry: &RawEntry, class: &Classification) -> Self {
        Self {
            source: entry.source_name.clone(),
            title: entry.title.clone(),
            description: entry.description.clone(),
            url: entry.url.clone(),
            category_hint: class.category.as_str().to_string(),
            carrier_hint: class.carrier.as_str().to_string(),
            published: entry.published.clone(),
        }
    }
}

/// Enrichment attached to a scored entry.
#[derive(Debug, Clone, PartialEq)]
pub struct Enrichment {
    pub summary: String,
    /// At most three.
    pub key_points: Vec<String>,
    /// At most six.
    pub keywords: Vec<String>,
    /// Within `[1.0, 5.0]`.
    pub quality_score: f64,
    pub localized_title: Option<String>,
}

/// Produces a summary, key points, keywords and a quality opinion.
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, request: &SummaryRequest) -> Result<Enrichment, SummarizeError>;
}

// ============================================================================
// OpenAI-compatible chat completions
// ============================================================================

/// Summarizer backed by an OpenAI-compatible `/chat/completions` endpoint.
#[derive(Debug)]
pub struct OpenAiSummarizer {
    client: reqwest::Client,
    api_key: SecretString,
    model: String,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SummaryPayload {
    summary: String,
    key_points: Vec<serde_json::Value>,
    keywords: Vec<serde_json::Value>,
    quality_score: Option<serde_json::Value>,
    title_zh: Option<String>,
}

impl OpenAiSummarizer {
    /// # Errors
    ///
    /// Returns [`SummarizeError::InsecureBaseUrl`] for a plain-HTTP base URL
    /// other than localhost, since the API key would travel in the clear.
    pub fn new(
        api_key: SecretString,
        model: impl Into<String>,
        base_url: Option<&str>,
    ) -> Result<Self, SummarizeError> {
        let base = base_url.unwrap_or(DEFAULT_OPENAI_BASE_URL).trim_end_matches('/');
        if !base.starts_with("https://") {
            let is_localhost =
                base.starts_with("http://127.0.0.1") || base.starts_with("http://localhost");
            if !is_localhost {
                tracing::error!(base_url = %base, "Rejecting non-HTTPS summarizer base URL");
                return Err(SummarizeError::InsecureBaseUrl);
            }
        }
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            api_key,
            model: model.into(),
            base_url: base.to_string(),
        })
    }

    fn messages(request: &SummaryRequest, want_title: bool) -> serde_json::Value {
        let mut system = String::from(
            "你是一个日报编辑。根据输入信息输出严格 JSON（不要 Markdown，不要多余字段）。\
             要求：摘要 2-4 句中文；要点最多 3 条；关键词 3-6 个；质量评分 1-5（可小数）。\
             要点必须是对内容的具体提炼（包含具体名词/事实/结论），不要输出模板化建议。",
        );
        let mut shape = String::from(
            r#"{"summary":"...","key_points":["..."],"keywords":["..."],"quality_score":4.2"#,
        );
        if want_title {
            system.push_str("原标题主要为英文时，额外输出 title_zh（中文标题翻译，尽量简洁）。");
            shape.push_str(r#","title_zh":"...""#);
        }
        shape.push('}');
        let user = serde_json::to_string(request).unwrap_or_default();
        json!([
            {"role": "system", "content": system},
            {"role": "user", "content": user},
            {"role": "user", "content": shape},
        ])
    }
}

#[async_trait]
impl Summarizer for OpenAiSummarizer {
    async fn summarize(&self, request: &SummaryRequest) -> Result<Enrichment, SummarizeError> {
        let want_title = is_mostly_english(&request.title);
        let body = json!({
            "model": self.model,
            "messages": Self::messages(request, want_title),
            "temperature": 0.2,
        });

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header(
                "Authorization",
                format!("Bearer {}", self.api_key.expose_secret()),
            )
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    SummarizeError::Timeout
                } else {
                    SummarizeError::Network(e)
                }
            })?;
        if !response.status().is_success() {
            return Err(SummarizeError::HttpStatus(response.status().as_u16()));
        }
        let chat: ChatResponse = response.json().await?;
        let content = chat
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| SummarizeError::MalformedResponse("no choices".into()))?;

        parse_payload(&content, &request.title, want_title)
    }
}

/// Validates and clamps a model reply.
fn parse_payload(
    content: &str,
    title: &str,
    want_title: bool,
) -> Result<Enrichment, SummarizeError> {
    let trimmed = content
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();
    let payload: SummaryPayload = serde_json::from_str(trimmed)
        .map_err(|e| SummarizeError::MalformedResponse(e.to_string()))?;

    let summary = normalize_ws(&payload.summary);
    if summary.is_empty() {
        return Err(SummarizeError::EmptySummary);
    }
    let strings = |values: Vec<serde_json::Value>, max: usize| -> Vec<String> {
        values
            .into_iter()
            .take(max)
            .map(|v| match v {
                serde_json::Value::String(s) => normalize_ws(&s),
                other => normalize_ws(&other.to_string()),
            })
            .filter(|s| !s.is_empty())
            .collect()
    };
    let quality = payload
        .quality_score
        .and_then(|v| match v {
            serde_json::Value::Number(n) => n.as_f64(),
            serde_json::Value::String(s) => s.trim().parse().ok(),
            _ => None,
        })
        .unwrap_or(3.0);
    let localized_title = payload
        .title_zh
        .filter(|_| want_title)
        .map(|t| normalize_ws(&t))
        .filter(|t| !t.is_empty() && !t.eq_ignore_ascii_case(title.trim()));

    Ok(Enrichment {
        summary,
        key_points: strings(payload.key_points, MAX_KEY_POINTS),
        keywords: strings(payload.keywords, MAX_KEYWORDS),
        quality_score: clamp_quality(quality),
        localized_title,
    })
}

// ============================================================================
// Heuristic fallback
// ============================================================================

/// Deterministic enrichment used when no summarizer is configured or it fails.
pub fn heuristic_enrichment(entry: &RawEntry, quality_score: f64) -> Enrichment {
    let (summary, key_points) = fallback_summary(entry);
    Enrichment {
        summary,
        key_points,
        keywords: derive_keywords(&format!("{} {}", entry.title, entry.description)),
        quality_score: clamp_quality(quality_score),
        localized_title: None,
    }
}

/// Most frequent ASCII tokens (stop words removed), ties broken
/// case-insensitively, at most six.
pub fn derive_keywords(text: &str) -> Vec<String> {
    let mut freq: HashMap<&str, usize> = HashMap::new();
    for m in RE_TOKEN.find_iter(text) {
        let word = m.as_str();
        if KEYWORD_STOP_WORDS.contains(&word.to_lowercase().as_str()) {
            continue;
        }
        *freq.entry(word).or_insert(0) += 1;
    }
    let mut ranked: Vec<(&str, usize)> = freq.into_iter().collect();
    ranked.sort_by(|a, b| {
        b.1.cmp(&a.1)
            .then_with(|| a.0.to_lowercase().cmp(&b.0.to_lowercase()))
            .then_with(|| a.0.cmp(b.0))
    });
    ranked
        .into_iter()
        .take(MAX_KEYWORDS)
        .map(|(w, _)| w.to_string())
        .collect()
}

/// Removes read-more links, ticker wrappers and leading bylines.
fn clean_point(text: &str) -> String {
    let mut t = normalize_ws(text);
    for frag in BOILERPLATE {
        t = t.replace(frag, " ");
    }
    let t = normalize_ws(&RE_TICKER.replace_all(&t, " "));
    let t = normalize_ws(&RE_LEADING_LABEL.replace(&t, ""));
    normalize_ws(&RE_LEADING_SIGNATURE.replace(&t, ""))
}

/// CJK bigrams of the title, skipping filler words, first 20.
fn title_bigrams(title: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for run in RE_CJK_RUN.find_iter(title) {
        let chars: Vec<char> = run.as_str().chars().collect();
        for pair in chars.windows(2) {
            let bigram: String = pair.iter().collect();
            if BIGRAM_STOP_WORDS.contains(&bigram.as_str()) || out.contains(&bigram) {
                continue;
            }
            out.push(bigram);
        }
    }
    out.truncate(20);
    out
}

/// Summary and up to three key points without a model.
///
/// Sentences that share title bigrams rank first, then longer ones. Once a
/// relevant point is found, unrelated sentences are not used as filler.
pub fn fallback_summary(entry: &RawEntry) -> (String, Vec<String>) {
    let base = if entry.description.trim().is_empty() {
        &entry.title
    } else {
        &entry.description
    };
    let summary = clip(base, SUMMARY_CHARS);

    let bigrams = title_bigrams(&entry.title);
    let mut scored: Vec<(usize, usize, String)> = split_sentences(&entry.description)
        .iter()
        .map(|raw| {
            clean_point(raw)
                .trim_matches(|c: char| "。！？.!?".contains(c) || c.is_whitespace())
                .to_string()
        })
        .filter(|s| s.chars().count() >= MIN_KEY_POINT_CHARS)
        .map(|s| {
            let overlap = bigrams.iter().filter(|bg| s.contains(bg.as_str())).count();
            (overlap, s.chars().count(), s)
        })
        .collect();
    scored.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| b.1.cmp(&a.1)));

    let mut points: Vec<String> = Vec::new();
    for (overlap, _, sentence) in scored {
        if overlap == 0 && !points.is_empty() {
            continue;
        }
        let point = clip(&sentence, KEY_POINT_CHARS);
        if !points.contains(&point) {
            points.push(point);
        }
        if points.len() >= MAX_KEY_POINTS {
            break;
        }
    }

    if points.is_empty() {
        let cleaned = clean_point(&entry.title);
        let source = if cleaned.is_empty() { &entry.title } else { &cleaned };
        let point = clip(source, KEY_POINT_CHARS);
        if !point.is_empty() {
            points.push(point);
        }
    }
    (summary, points)
}

// ============================================================================
// Enrichment driver
// ============================================================================

/// Attaches summaries to classified entries, preserving input order.
///
/// With a summarizer, up to [`ENRICH_CONCURRENCY`] requests run at once and
/// its quality opinion replaces the rule-based score. Any summarizer error
/// falls back to [`heuristic_enrichment`] for that entry.
pub async fn enrich_all(
    entries: Vec<(RawEntry, Classification)>,
    summarizer: Option<Arc<dyn Summarizer>>,
) -> Vec<ScoredEntry> {
    stream::iter(entries)
        .map(|(entry, class)| {
            let summarizer = summarizer.clone();
            async move {
                let enrichment = match summarizer {
                    Some(s) => match s.summarize(&SummaryRequest::new(&entry, &class)).await {
                        Ok(e) => e,
                        Err(e) => {
                            tracing::debug!(url = %entry.url, error = %e, "Summarizer failed, using heuristic");
                            heuristic_enrichment(&entry, class.quality_score)
                        }
                    },
                    None => heuristic_enrichment(&entry, class.quality_score),
                };
                ScoredEntry {
                    category: class.category,
                    carrier: class.carrier,
                    quality_score: enrichment.quality_score,
                    keywords: enrichment.keywords,
                    summary: enrichment.summary,
                    key_points: enrichment.key_points,
                    localized_title: enrichment.localized_title,
                    pin: Default::default(),
                    entry,
                }
            }
        })
        .buffered(ENRICH_CONCURRENCY)
        .collect()
        .await
}
