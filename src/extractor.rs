//! Extraction orchestrator.
//!
//! For every new article the orchestrator walks the provider order and, inside
//! each provider, that provider's credentials in rotation order. The first
//! call that yields a valid [`ArticleExtraction`] is persisted, the URL is
//! marked seen, and the article is done. A provider whose credentials all fail
//! is marked exhausted in the [`RunTally`] and is not tried again for the rest
//! of the run.
//!
//! Articles are processed strictly one at a time. The only throttling is the
//! fixed retry delay between attempts and the optional delay between items.

use crate::api::AskModel;
use crate::cache::SeenCache;
use crate::error::ExtractorError;
use crate::models::{ExtractedArticle, RawArticle, RunTally, ScrapeResult};
use crate::prompt::build_prompt;
use crate::provider::{ModelRequest, Provider, ProviderRegistry};
use crate::schema::{ArticleExtraction, output_schema};
use crate::store::ArticleStore;
use chrono::{DateTime, Utc};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, error, info, instrument, warn};

pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(1500);
pub const DEFAULT_COLLECTION: &str = "articles";

/// Where "already extracted" is looked up.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum DedupMode {
    /// Local URL cache only.
    #[default]
    Cache,
    /// Store query for documents extracted within the retention window.
    Store,
    /// Either source; store-only hits are copied into the cache.
    Both,
}

impl FromStr for DedupMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "cache" => Ok(DedupMode::Cache),
            "store" => Ok(DedupMode::Store),
            "both" => Ok(DedupMode::Both),
            other => Err(format!("unknown dedup mode: {other}")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExtractorOptions {
    pub collection: String,
    pub retry_delay: Duration,
    pub item_delay: Duration,
    pub dedup: DedupMode,
}

impl Default for ExtractorOptions {
    fn default() -> Self {
        Self {
            collection: DEFAULT_COLLECTION.to_string(),
            retry_delay: DEFAULT_RETRY_DELAY,
            item_delay: Duration::ZERO,
            dedup: DedupMode::Cache,
        }
    }
}

/// An article queued for extraction plus when its scrape ran.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub article: RawArticle,
    pub scraped_at: DateTime<Utc>,
}

/// Terminal state of one article.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemOutcome {
    Saved,
    Failed,
}

/// What one model attempt produced, short of success.
enum AttemptFailure {
    Error(String),
    NoOutput,
    Invalid(String),
}

pub struct Extractor<A> {
    registry: ProviderRegistry,
    asker: A,
    store: Arc<dyn ArticleStore>,
    cache: SeenCache,
    options: ExtractorOptions,
    schema: Value,
}

impl<A: AskModel> Extractor<A> {
    pub fn new(
        registry: ProviderRegistry,
        asker: A,
        store: Arc<dyn ArticleStore>,
        cache: SeenCache,
        options: ExtractorOptions,
    ) -> Self {
        Self {
            registry,
            asker,
            store,
            cache,
            options,
            schema: output_schema(),
        }
    }

    #[cfg(test)]
    pub fn cache_mut(&mut self) -> &mut SeenCache {
        &mut self.cache
    }

    /// Flatten scrape results into candidates that still need extraction.
    ///
    /// Articles without content and repeated URLs (first occurrence wins) are
    /// dropped. The rest are checked against the configured dedup source.
    /// Returns the candidates plus the tally with `total` and `skipped` filled in.
    #[instrument(level = "info", skip_all, fields(dedup = ?self.options.dedup))]
    pub async fn filter_new_articles(
        &mut self,
        results: &[ScrapeResult],
    ) -> Result<(Vec<Candidate>, RunTally), ExtractorError> {
        let scraped: usize = results.iter().map(|r| r.articles.len()).sum();
        let candidates: Vec<Candidate> = results
            .iter()
            .flat_map(|r| {
                r.articles.iter().map(move |a| Candidate {
                    article: a.clone(),
                    scraped_at: r.scraped_at,
                })
            })
            .filter(|c| c.article.body().is_some())
            .unique_by(|c| c.article.url.clone())
            .collect();

        let mut tally = RunTally {
            total: candidates.len(),
            ..RunTally::default()
        };
        if candidates.is_empty() {
            info!(scraped, "No articles with content");
            return Ok((candidates, tally));
        }

        let in_store = match self.options.dedup {
            DedupMode::Cache => HashSet::new(),
            DedupMode::Store | DedupMode::Both => {
                let hours = retention_hours(self.cache.retention());
                self.store.recently_extracted(&self.options.collection, hours).await?
            }
        };

        let mut fresh = Vec::with_capacity(candidates.len());
        let mut backfill = Vec::new();
        for candidate in candidates {
            let url = candidate.article.url.as_str();
            let seen = match self.options.dedup {
                DedupMode::Cache => self.cache.is_seen(url).await,
                DedupMode::Store => in_store.contains(url),
                DedupMode::Both => {
                    let cached = self.cache.is_seen(url).await;
                    if !cached && in_store.contains(url) {
                        backfill.push(url.to_string());
                    }
                    cached || in_store.contains(url)
                }
            };
            if seen {
                tally.skipped += 1;
            } else {
                fresh.push(candidate);
            }
        }

        if !backfill.is_empty() {
            match self.cache.mark_seen_batch(&backfill).await {
                Ok(()) => debug!(count = backfill.len(), "Back-filled URL cache from store"),
                Err(e) => warn!(error = %e, "Could not back-fill URL cache"),
            }
        }

        info!(
            scraped,
            total = tally.total,
            skipped = tally.skipped,
            new = fresh.len(),
            "Filtered articles"
        );
        Ok((fresh, tally))
    }

    /// Run one extraction pass over `results`.
    ///
    /// Fails only on configuration problems (no providers) or when the dedup
    /// store cannot be queried. Per-item failures are counted in the tally.
    #[instrument(level = "info", skip_all)]
    pub async fn extract(&mut self, results: &[ScrapeResult]) -> Result<RunTally, ExtractorError> {
        let t0 = Instant::now();
        let order = self.registry.provider_order();
        info!(provider_order = ?order, "Starting extraction");

        let (candidates, mut tally) = self.filter_new_articles(results).await?;
        if candidates.is_empty() {
            info!("No new articles to extract");
            return Ok(tally);
        }
        if order.is_empty() {
            return Err(ExtractorError::NoProviderAvailable);
        }

        let count = candidates.len();
        for (index, candidate) in candidates.iter().enumerate() {
            match self.process_item(candidate, &order, &mut tally).await {
                ItemOutcome::Saved => tally.extracted += 1,
                ItemOutcome::Failed => tally.failed += 1,
            }
            if index + 1 < count && !self.options.item_delay.is_zero() {
                debug!(delay_ms = self.options.item_delay.as_millis(), "Pacing before next article");
                sleep(self.options.item_delay).await;
            }
        }

        info!(
            extracted = tally.extracted,
            failed = tally.failed,
            skipped = tally.skipped,
            exhausted_providers = ?tally.exhausted_providers,
            elapsed_ms = t0.elapsed().as_millis(),
            "Extraction done"
        );
        Ok(tally)
    }

    /// Drive one article to Saved or Failed. Providers exhausted here are
    /// recorded in `tally` and skipped for every later article.
    #[instrument(level = "info", skip_all, fields(url = %candidate.article.url))]
    pub async fn process_item(
        &mut self,
        candidate: &Candidate,
        order: &[Provider],
        tally: &mut RunTally,
    ) -> ItemOutcome {
        let article = &candidate.article;
        info!(title = %article.title, "Extracting");
        let prompt = build_prompt(article);

        for (position, &provider) in order.iter().enumerate() {
            if tally.is_exhausted(provider) {
                continue;
            }
            let attempts = self.registry.credential_count(provider).max(1);

            for attempt in 1..=attempts {
                let created = match self.registry.create_model(Some(ModelRequest::for_provider(provider))) {
                    Ok(created) => created,
                    Err(e) => {
                        warn!(%provider, error = %e, "Provider unusable; skipping for this run");
                        tally.mark_exhausted(provider);
                        break;
                    }
                };
                info!(
                    %provider,
                    model = %created.handle.model_id,
                    attempt,
                    of = attempts,
                    credential = %created.credential,
                    "Trying provider"
                );

                let failure = match self.asker.ask(&created.handle, &prompt, &self.schema).await {
                    Ok(Some(value)) => match ArticleExtraction::from_value(value) {
                        Ok(extraction) => return self.persist(candidate, extraction, provider).await,
                        Err(reason) => AttemptFailure::Invalid(reason),
                    },
                    Ok(None) => AttemptFailure::NoOutput,
                    Err(e) => AttemptFailure::Error(e.to_string()),
                };
                match &failure {
                    AttemptFailure::Error(e) => {
                        warn!(%provider, attempt, credential = %created.credential, error = %e, "Attempt failed")
                    }
                    AttemptFailure::Invalid(reason) => {
                        warn!(%provider, attempt, credential = %created.credential, %reason, "Model output rejected")
                    }
                    AttemptFailure::NoOutput => {
                        info!(%provider, attempt, credential = %created.credential, "Model returned no output")
                    }
                }

                if attempt < attempts {
                    self.pause("next credential").await;
                    continue;
                }

                tally.mark_exhausted(provider);
                warn!(%provider, attempts, "All credentials failed; skipping provider for remaining articles");
                let more = order[position + 1..].iter().any(|p| !tally.is_exhausted(*p));
                if more {
                    self.pause("next provider").await;
                }
            }
        }

        error!(title = %article.title, "All providers failed");
        ItemOutcome::Failed
    }

    /// Store the document, then mark the URL seen. Either failing fails the item.
    async fn persist(&mut self, candidate: &Candidate, extraction: ArticleExtraction, provider: Provider) -> ItemOutcome {
        let article = &candidate.article;
        let title = extraction.title_english.clone();
        let document = ExtractedArticle {
            extraction,
            url: article.url.clone(),
            source: article.source,
            scraped_at: candidate.scraped_at,
            extracted_at: Utc::now(),
        };
        let value = match serde_json::to_value(&document) {
            Ok(value) => value,
            Err(e) => {
                error!(error = %e, "Could not serialize extracted article");
                return ItemOutcome::Failed;
            }
        };

        let id = match self.store.insert(&self.options.collection, value).await {
            Ok(id) => id,
            Err(e) => {
                error!(error = %e, collection = %self.options.collection, "Store write failed; article not marked seen");
                return ItemOutcome::Failed;
            }
        };
        if let Err(e) = self.cache.mark_seen(&article.url).await {
            error!(%id, error = %e, "Saved article but could not mark URL seen");
            return ItemOutcome::Failed;
        }

        info!(%id, %provider, %title, "Saved");
        ItemOutcome::Saved
    }

    async fn pause(&self, before: &str) {
        let delay = self.options.retry_delay;
        if delay.is_zero() {
            return;
        }
        debug!(delay_ms = delay.as_millis(), before, "Waiting");
        sleep(delay).await;
    }
}

fn retention_hours(retention: Duration) -> i64 {
    i64::try_from(retention.as_secs().div_ceil(3600)).unwrap_or(i64::MAX)
}
