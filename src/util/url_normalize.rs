use url::Url;

/// Query parameters that only carry campaign/click tracking.
const TRACKING_PARAMS: &[&str] = &["fbclid", "gclid", "mc_cid", "mc_eid"];

fn is_tracking_param(key: &str) -> bool {
    let key = key.to_ascii_lowercase();
    key.starts_with("utm_") || TRACKING_PARAMS.contains(&key.as_str())
}

/// Normalizes an entry URL for use as a dedup identity.
///
/// Strips `utm_*` and other click-tracking query parameters and trims
/// surrounding whitespace. URLs without a query, or that do not parse, are
/// returned trimmed but otherwise untouched.
///
/// # Examples
///
/// ```
/// use dailyfeed::util::normalize_url;
///
/// assert_eq!(
///     normalize_url("https://example.com/a?utm_source=rss&id=7"),
///     "https://example.com/a?id=7"
/// );
/// ```
pub fn normalize_url(raw: &str) -> String {
    let raw = raw.trim();
    if raw.is_empty() || !raw.contains('?') {
        return raw.to_string();
    }
    let Ok(mut url) = Url::parse(raw) else {
        return raw.to_string();
    };
    if !url.query_pairs().any(|(k, _)| is_tracking_param(&k)) {
        return raw.to_string();
    }

    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| !is_tracking_param(k))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    if kept.is_empty() {
        url.set_query(None);
    } else {
        url.query_pairs_mut().clear().extend_pairs(kept);
    }
    url.to_string()
}

/// Lowercased host of a URL, or an empty string when it has none.
pub fn host_of(raw: &str) -> String {
    Url::parse(raw.trim())
        .ok()
        .and_then(|u| u.host_str().map(str::to_ascii_lowercase))
        .unwrap_or_default()
}
