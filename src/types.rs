//! Entry types that flow through the digest pipeline.
//!
//! A [`RawEntry`] is produced by parsing one feed document. After
//! classification, scoring and enrichment it becomes a [`ScoredEntry`], which
//! stays immutable apart from the editorial [`Pin`].

use serde::{Deserialize, Serialize};

/// One item as parsed from a feed, before any curation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawEntry {
    pub source_name: String,
    pub source_url: String,
    /// Grouping label; the source name unless a keyword filter assigned one.
    pub platform: String,
    pub title: String,
    /// Always normalized (tracking parameters stripped).
    pub url: String,
    pub description: String,
    /// Raw timestamp string as it appeared in the feed.
    pub published: Option<String>,
    pub enclosure_mime: Option<String>,
}

/// Topic category. Declaration order is the fixed display/tie-break order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Technology,
    Business,
    Lifestyle,
    CurrentAffairs,
    Finance,
    Entertainment,
    Other,
}

impl Category {
    pub fn as_str(self) -> &'static str {
        match self {
            Category::Technology => "technology",
            Category::Business => "business",
            Category::Lifestyle => "lifestyle",
            Category::CurrentAffairs => "current_affairs",
            Category::Finance => "finance",
            Category::Entertainment => "entertainment",
            Category::Other => "other",
        }
    }
}

/// The medium an entry is delivered in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Carrier {
    Article,
    Video,
    Podcast,
    Project,
    Post,
    Other,
}

impl Carrier {
    pub fn as_str(self) -> &'static str {
        match self {
            Carrier::Article => "article",
            Carrier::Video => "video",
            Carrier::Podcast => "podcast",
            Carrier::Project => "project",
            Carrier::Post => "post",
            Carrier::Other => "other",
        }
    }
}

/// Editorial annotation set by the pick selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Pin {
    #[default]
    None,
    Lead,
    Top,
}

/// A classified, scored and summarized entry ready for publication.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredEntry {
    #[serde(flatten)]
    pub entry: RawEntry,
    pub category: Category,
    pub carrier: Carrier,
    /// Always within `[1.0, 5.0]`.
    pub quality_score: f64,
    pub keywords: Vec<String>,
    pub summary: String,
    /// At most three points.
    pub key_points: Vec<String>,
    pub localized_title: Option<String>,
    #[serde(default)]
    pub pin: Pin,
}
