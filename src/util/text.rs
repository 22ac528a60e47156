use std::borrow::Cow;
use std::sync::LazyLock;

use regex::Regex;

static RE_WS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());
static RE_SCRIPT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<script[^>]*>.*?</script>").unwrap());
static RE_STYLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<style[^>]*>.*?</style>").unwrap());
static RE_TAGS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<[^>]+>").unwrap());
static RE_SENTENCE_END: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[。！？.!?]\s+").unwrap());

/// Collapses every whitespace run to a single space and trims both ends.
pub fn normalize_ws(s: &str) -> String {
    RE_WS.replace_all(s, " ").trim().to_string()
}

/// Removes markup from a feed description.
///
/// Script and style blocks are dropped with their content, remaining tags are
/// replaced by a space, HTML entities are decoded and whitespace is collapsed.
/// Non-breaking spaces count as whitespace.
pub fn strip_html(html: &str) -> String {
    if !html.contains('<') && !html.contains('&') {
        return normalize_ws(html);
    }
    let text = RE_SCRIPT.replace_all(html, " ");
    let text = RE_STYLE.replace_all(&text, " ");
    let text = RE_TAGS.replace_all(&text, " ");
    let decoded = html_escape::decode_html_entities(&text);
    normalize_ws(&decoded.replace('\u{a0}', " "))
}

/// Removes bytes that are illegal in XML 1.0 documents.
///
/// Strips 0x00-0x1F except tab (0x09), newline (0x0A) and carriage return
/// (0x0D). Returns `Cow::Borrowed` when nothing needs stripping.
pub fn strip_control_bytes(bytes: &[u8]) -> Cow<'_, [u8]> {
    let is_bad = |b: u8| b < 0x20 && b != 0x09 && b != 0x0a && b != 0x0d;
    if !bytes.iter().any(|&b| is_bad(b)) {
        return Cow::Borrowed(bytes);
    }
    Cow::Owned(bytes.iter().copied().filter(|&b| !is_bad(b)).collect())
}

/// Returns true for characters in the CJK Unified Ideographs block.
pub fn is_cjk(c: char) -> bool {
    ('\u{4e00}'..='\u{9fff}').contains(&c)
}

/// Heuristic: does this text read as English rather than Chinese?
///
/// Any CJK character disqualifies the text. Otherwise it needs at least eight
/// ASCII letters (so short acronyms like "AI" or "GPU" are ignored) and letters
/// must make up at least 45% of the non-space characters.
pub fn is_mostly_english(text: &str) -> bool {
    let t = text.trim();
    if t.is_empty() || t.chars().any(is_cjk) {
        return false;
    }
    let letters = t.chars().filter(|c| c.is_ascii_alphabetic()).count();
    if letters < 8 {
        return false;
    }
    let non_space = t.chars().filter(|c| !c.is_whitespace()).count().max(1);
    letters as f64 / non_space as f64 >= 0.45
}

/// Splits Chinese or English prose into sentences on terminal punctuation
/// followed by whitespace.
pub fn split_sentences(text: &str) -> Vec<String> {
    let t = normalize_ws(text);
    if t.is_empty() {
        return Vec::new();
    }
    let mut out = Vec::new();
    let mut start = 0;
    for m in RE_SENTENCE_END.find_iter(&t) {
        // Keep the punctuation with its sentence, drop the trailing space.
        let punct_len = m
            .as_str()
            .chars()
            .next()
            .map(char::len_utf8)
            .unwrap_or(0);
        let piece = t[start..m.start() + punct_len].trim();
        if !piece.is_empty() {
            out.push(piece.to_string());
        }
        start = m.end();
    }
    let tail = t[start..].trim();
    if !tail.is_empty() {
        out.push(tail.to_string());
    }
    out
}

/// Truncates to `max_chars` characters, appending "…" when text was cut.
pub fn clip(text: &str, max_chars: usize) -> String {
    let t = normalize_ws(text);
    if t.chars().count() <= max_chars {
        return t;
    }
    let kept: String = t.chars().take(max_chars.saturating_sub(1)).collect();
    format!("{}…", kept.trim_end())
}

/// Keyword match used by the classifier and the pick selector.
///
/// Keywords made only of ASCII word characters must match on word boundaries
/// in the lowercased text, so "go" does not fire on "google". Anything else
/// (CJK, phrases with spaces) is a plain substring match on the lowercased text.
pub fn contains_keyword(text_lower: &str, keyword: &str) -> bool {
    let kw = keyword.to_lowercase();
    if kw.is_empty() {
        return false;
    }
    let is_word = kw
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '_' | '.' | '-'));
    if !is_word {
        return text_lower.contains(&kw);
    }
    let bytes = text_lower.as_bytes();
    let mut from = 0;
    while let Some(pos) = text_lower[from..].find(&kw) {
        let start = from + pos;
        let end = start + kw.len();
        let before_ok = start == 0 || !bytes[start - 1].is_ascii_alphanumeric();
        let after_ok = end == bytes.len() || !bytes[end].is_ascii_alphanumeric();
        if before_ok && after_ok {
            return true;
        }
        from = start + 1;
        while !text_lower.is_char_boundary(from) {
            from += 1;
        }
    }
    false
}

/// True if any keyword matches according to [`contains_keyword`].
pub fn contains_any(text: &str, keywords: &[&str]) -> bool {
    let lower = text.to_lowercase();
    keywords.iter().any(|k| contains_keyword(&lower, k))
}
