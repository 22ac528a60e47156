//! One daily digest run, end to end.
//!
//! Phases run strictly in order: load sources and cache, compute platform
//! heat, fetch under the time budget, dedup, classify and gate, enrich, order
//! and limit, pick, then record into the cache and persist it once.
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Serialize;
use tokio::time::Instant;

use crate::config::{ConfigError, GroupBy, PlatformTopBy, Settings};
use crate::curate::summarize::{OpenAiSummarizer, Summarizer};
use crate::curate::{
    apply_pins, classify, compute_platform_heat, dedup_entries, enrich_all, select_picks,
    DedupStats, PickConfig,
};
use crate::feed::{
    load_keys, load_registry, run_batch, select_by_keys, FeedSource, FetchOptions, Fetcher,
    TimeoutPolicy, TRENDING_PLATFORM,
};
use crate::storage::{CacheStore, LastRun};
use crate::types::ScoredEntry;
use crate::util::parse_timestamp;

/// Failure streak at which a source is reported as unhealthy before fetching.
const UNHEALTHY_STREAK: u32 = 3;
const TRENDING_SOURCE_NAME: &str = "GitHub Trending";
const TRENDING_WEIGHT: f64 = 60.0;
const UNKNOWN_PLATFORM: &str = "unknown";

/// Counters for one run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunStats {
    pub sources_total: usize,
    pub sources_success: usize,
    pub sources_failed: usize,
    pub sources_skipped: usize,
    pub fetched: usize,
    pub dedup: DedupStats,
    pub below_min_score: usize,
    pub published: usize,
    pub duration_seconds: u64,
}

/// The published result handed to the renderer.
#[derive(Debug, Clone, Serialize)]
pub struct Digest {
    pub date: String,
    /// Published entries in display order, pins applied.
    pub items: Vec<ScoredEntry>,
    /// Indices into `items`.
    pub lead: Vec<usize>,
    pub top: Vec<usize>,
    pub platform_heat: BTreeMap<String, f64>,
    pub sources_used: Vec<String>,
    pub errors: Vec<String>,
    pub stats: RunStats,
}

/// A configured run.
pub struct Pipeline {
    settings: Settings,
    fetcher: Fetcher,
    summarizer: Option<Arc<dyn Summarizer>>,
}

impl Pipeline {
    /// Builds the HTTP client and, when enabled and keyed, the summarizer.
    pub fn new(mut settings: Settings) -> Result<Self> {
        let fetcher = Fetcher::new(FetchOptions {
            retries: settings.retries,
            retry_sleep: settings.retry_sleep,
            proxy: settings.proxy.clone(),
            prefer_ipv4: settings.prefer_ipv4,
            timeouts: TimeoutPolicy::default(),
        })
        .context("Failed to build HTTP client")?;

        let api_key = settings.openai_api_key.take();
        let summarizer: Option<Arc<dyn Summarizer>> = match (api_key, settings.ai) {
            (Some(key), true) => {
                match OpenAiSummarizer::new(
                    key,
                    settings.openai_model.clone(),
                    settings.openai_base_url.as_deref(),
                ) {
                    Ok(s) => Some(Arc::new(s)),
                    Err(e) => {
                        tracing::warn!(error = %e, "Model summaries disabled");
                        None
                    }
                }
            }
            _ => None,
        };

        Ok(Self {
            settings,
            fetcher,
            summarizer,
        })
    }

    pub fn with_fetcher(mut self, fetcher: Fetcher) -> Self {
        self.fetcher = fetcher;
        self
    }

    pub fn with_summarizer(mut self, summarizer: Option<Arc<dyn Summarizer>>) -> Self {
        self.summarizer = summarizer;
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Runs every phase and persists the cache unless this is a dry run.
    ///
    /// # Errors
    ///
    /// Configuration problems ([`ConfigError`]) and cache I/O failures abort
    /// the run before anything is written. Source failures do not.
    pub async fn run(&self) -> Result<Digest> {
        let started = Instant::now();
        let settings = &self.settings;
        let date = settings.date.format("%Y-%m-%d").to_string();

        // Sources and key selection.
        let registry = load_registry(&settings.sources)
            .await
            .context("Failed to load source registry")?;
        if registry.is_empty() {
            return Err(ConfigError::NoSources.into());
        }
        let keys = self.selected_keys().await?;
        let selection = select_by_keys(registry, &keys)?;
        let mut sources = selection.sources;
        let mut platforms = selection.platforms;

        if settings.github_trending {
            let url = settings.trending_url();
            if !sources.iter().any(|s| s.url == url) {
                sources.push(FeedSource::new(TRENDING_SOURCE_NAME, url.clone()).with_weight(TRENDING_WEIGHT));
            }
            platforms.entry(url).or_insert_with(|| TRENDING_PLATFORM.to_string());
        }
        tracing::info!(sources = sources.len(), keys = keys.len(), date = %date, "Starting digest run");

        // Cache and heat.
        let mut cache = CacheStore::load(&settings.cache_path, settings.date)
            .with_context(|| format!("Failed to load cache '{}'", settings.cache_path.display()))?;
        for url in cache.unhealthy_sources(UNHEALTHY_STREAK) {
            if sources.iter().any(|s| s.url == url) {
                tracing::warn!(source = %url, "Source has failed repeatedly on earlier runs");
            }
        }
        let heat = compute_platform_heat(
            &sources,
            &platforms,
            &cache.document().article_history,
            settings.date,
            settings.platform_heat_window_days,
        );

        // Fetch.
        let mut outcome = {
            let fetcher = self.fetcher.clone();
            let platforms = Arc::new(platforms.clone());
            let default_cap = settings.per_feed_limit;
            let report_date = date.clone();
            run_batch(&sources, settings.time_budget, move |source| {
                let fetcher = fetcher.clone();
                let platforms = Arc::clone(&platforms);
                let report_date = report_date.clone();
                async move {
                    let cap = source.fetch_cap.unwrap_or(default_cap);
                    let mut entries = fetcher.fetch_source(&source, cap, &report_date).await?;
                    if let Some(platform) = platforms.get(&source.url) {
                        for entry in &mut entries {
                            entry.platform = platform.clone();
                        }
                    }
                    Ok::<_, crate::feed::FetchError>(entries)
                }
            })
            .await
        };
        let fetched = outcome.entries.len();

        // Dedup, classify, gate.
        let (unique, dedup_stats) = dedup_entries(std::mem::take(&mut outcome.entries), &cache, &date);
        let mut below_min_score = 0;
        let gated: Vec<_> = unique
            .into_iter()
            .filter_map(|entry| {
                let class = classify(&entry);
                if class.quality_score < settings.min_score {
                    below_min_score += 1;
                    None
                } else {
                    Some((entry, class))
                }
            })
            .collect();
        tracing::info!(kept = gated.len(), below_min_score, "Classified entries");

        // Enrich, order, limit.
        let mut enriched = enrich_all(gated, self.summarizer.clone()).await;
        order_entries(&mut enriched, settings.group_by, &heat);
        let (per_platform, max_items) = settings.publication_limits(!keys.is_empty());
        let mut published = limit_entries(
            enriched,
            settings.group_by,
            per_platform,
            settings.platform_top_by,
            max_items,
            &heat,
        );

        // Picks.
        let pick_config = PickConfig {
            lead_n: settings.lead_n,
            top_n: settings.top_n,
            min_top_tech: settings.min_top_tech,
            ..PickConfig::default()
        };
        let picks = select_picks(&published, &pick_config, settings.date);
        apply_pins(&mut published, &picks);

        // Record and persist.
        let errors: Vec<String> = outcome.errors.iter().map(ToString::to_string).collect();
        let sources_used: Vec<String> = sources
            .iter()
            .filter(|s| outcome.success.contains(&s.url))
            .map(|s| s.name.clone())
            .collect();
        let duration_seconds = started.elapsed().as_secs();

        cache.record_published(&date, &published);
        cache.record_source_outcomes(&date, &sources, &outcome);
        cache.set_last_run(LastRun {
            date: date.clone(),
            duration_seconds,
            items_collected: fetched,
            items_published: published.len(),
            sources_used: sources_used.clone(),
            errors: errors.clone(),
        });
        if settings.dry_run {
            tracing::info!("Dry run, cache not written");
        } else {
            cache
                .persist(&settings.cache_path)
                .with_context(|| format!("Failed to write cache '{}'", settings.cache_path.display()))?;
        }

        let stats = RunStats {
            sources_total: sources.len(),
            sources_success: outcome.success.len(),
            sources_failed: outcome.failed.len(),
            sources_skipped: outcome.skipped.len(),
            fetched,
            dedup: dedup_stats,
            below_min_score,
            published: published.len(),
            duration_seconds,
        };
        tracing::info!(
            published = stats.published,
            failed = stats.sources_failed,
            skipped = stats.sources_skipped,
            "Digest run finished"
        );

        Ok(Digest {
            date,
            items: published,
            lead: picks.lead,
            top: picks.top,
            platform_heat: heat.into_iter().collect(),
            sources_used,
            errors,
            stats,
        })
    }

    /// Keys from the keys file followed by explicit keys, de-duplicated.
    async fn selected_keys(&self) -> Result<Vec<String>, ConfigError> {
        let mut keys = match &self.settings.select_keys_file {
            Some(path) => load_keys(path).await?,
            None => Vec::new(),
        };
        keys.extend(
            self.settings
                .select_keys
                .iter()
                .map(|k| k.trim().to_string())
                .filter(|k| !k.is_empty()),
        );
        let mut seen = HashSet::new();
        keys.retain(|k| seen.insert(k.clone()));
        Ok(keys)
    }
}

fn platform_of(entry: &ScoredEntry) -> &str {
    if !entry.entry.platform.is_empty() {
        &entry.entry.platform
    } else if !entry.entry.source_name.is_empty() {
        &entry.entry.source_name
    } else {
        UNKNOWN_PLATFORM
    }
}

fn heat_of(heat: &HashMap<String, f64>, platform: &str) -> f64 {
    heat.get(platform).copied().unwrap_or(0.0)
}

/// Sorts the enriched list for display.
///
/// Platform and flat modes: hotter platforms first, then higher quality, then
/// title. Topic mode: higher quality, then category order, then title.
pub fn order_entries(entries: &mut [ScoredEntry], group_by: GroupBy, heat: &HashMap<String, f64>) {
    let title_cmp = |a: &ScoredEntry, b: &ScoredEntry| {
        a.entry.title.to_lowercase().cmp(&b.entry.title.to_lowercase())
    };
    match group_by {
        GroupBy::Platform | GroupBy::None => entries.sort_by(|a, b| {
            heat_of(heat, platform_of(b))
                .total_cmp(&heat_of(heat, platform_of(a)))
                .then_with(|| b.quality_score.total_cmp(&a.quality_score))
                .then_with(|| title_cmp(a, b))
        }),
        GroupBy::Topic => entries.sort_by(|a, b| {
            b.quality_score
                .total_cmp(&a.quality_score)
                .then_with(|| a.category.cmp(&b.category))
                .then_with(|| title_cmp(a, b))
        }),
    }
}

fn published_ts(entry: &ScoredEntry) -> Option<i64> {
    entry
        .entry
        .published
        .as_deref()
        .and_then(parse_timestamp)
        .map(|dt| dt.timestamp())
}

fn within_platform_cmp(a: &ScoredEntry, b: &ScoredEntry, top_by: PlatformTopBy) -> Ordering {
    // Undated entries sort after dated ones.
    let recent = published_ts(b).cmp(&published_ts(a));
    let quality = b.quality_score.total_cmp(&a.quality_score);
    let title = a.entry.title.to_lowercase().cmp(&b.entry.title.to_lowercase());
    match top_by {
        PlatformTopBy::Recent => recent.then(quality).then(title),
        PlatformTopBy::Quality => quality.then(recent).then(title),
    }
}

/// Applies the per-platform top-N (platform mode only) and the overall cap.
///
/// With a per-platform cap, platforms are emitted hottest first (ties by
/// name), each holding its best `per_platform` entries. `max_items == 0`
/// means unlimited; any other cap keeps at least one entry.
pub fn limit_entries(
    entries: Vec<ScoredEntry>,
    group_by: GroupBy,
    per_platform: usize,
    top_by: PlatformTopBy,
    max_items: usize,
    heat: &HashMap<String, f64>,
) -> Vec<ScoredEntry> {
    let mut out = if group_by == GroupBy::Platform && per_platform > 0 {
        let mut by_platform: BTreeMap<String, Vec<ScoredEntry>> = BTreeMap::new();
        for entry in entries {
            by_platform
                .entry(platform_of(&entry).to_string())
                .or_default()
                .push(entry);
        }
        let mut groups: Vec<(String, Vec<ScoredEntry>)> = by_platform.into_iter().collect();
        groups.sort_by(|(a, _), (b, _)| {
            heat_of(heat, b).total_cmp(&heat_of(heat, a)).then_with(|| a.cmp(b))
        });
        groups
            .into_iter()
            .flat_map(|(_, mut group)| {
                group.sort_by(|a, b| within_platform_cmp(a, b, top_by));
                group.truncate(per_platform);
                group
            })
            .collect()
    } else {
        entries
    };
    if max_items > 0 {
        out.truncate(max_items);
    }
    out
}
