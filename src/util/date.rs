use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, TimeZone, Utc};

const NAIVE_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S",
];
const NAIVE_DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d"];

/// Parses the timestamp formats seen in feeds.
///
/// Accepts RFC 2822 (RSS `pubDate`), RFC 3339 (Atom, `dc:date`) and a few
/// zone-less forms, which are read as UTC. Returns `None` for anything else.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<FixedOffset>> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(s) {
        return Some(dt);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt);
    }
    let utc = FixedOffset::east_opt(0)?;
    for fmt in NAIVE_DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return utc.from_local_datetime(&naive).single();
        }
    }
    for fmt in NAIVE_DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(s, fmt) {
            return utc.from_local_datetime(&date.and_hms_opt(0, 0, 0)?).single();
        }
    }
    None
}

/// Calendar date of a feed timestamp in the feed's own offset.
pub fn published_day(raw: &str) -> Option<NaiveDate> {
    parse_timestamp(raw).map(|dt| dt.date_naive())
}

/// Parses a `YYYY-MM-DD` report or cache date.
pub fn parse_iso_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").ok()
}

/// Whole days from `published` to `today`, using the UTC calendar date of the
/// timestamp. Negative for timestamps in the future.
pub fn age_in_days(raw: &str, today: NaiveDate) -> Option<i64> {
    let dt = parse_timestamp(raw)?;
    Some((today - dt.with_timezone(&Utc).date_naive()).num_days())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_common_formats() {
        assert!(parse_timestamp("Mon, 06 Jan 2025 08:00:00 +0800").is_some());
        assert!(parse_timestamp("2025-01-06T08:00:00Z").is_some());
        assert!(parse_timestamp("2025-01-06 08:00:00").is_some());
        assert!(parse_timestamp("2025-01-06").is_some());
        assert!(parse_timestamp("yesterday").is_none());
        assert!(parse_timestamp("").is_none());
    }

    #[test]
    fn test_published_day_keeps_feed_offset() {
        let day = published_day("Mon, 06 Jan 2025 01:00:00 +0800").unwrap();
        assert_eq!(day, NaiveDate::from_ymd_opt(2025, 1, 6).unwrap());
    }

    #[test]
    fn test_age_in_days() {
        let today = NaiveDate::from_ymd_opt(2025, 1, 10).unwrap();
        assert_eq!(age_in_days("2025-01-08T12:00:00Z", today), Some(2));
        assert_eq!(age_in_days("2025-01-12", today), Some(-2));
        assert_eq!(age_in_days("garbage", today), None);
    }
}
