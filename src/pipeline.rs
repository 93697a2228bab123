//! One scrape + extract pass.
//!
//! Scrapers run concurrently; a failing scraper is logged and left out. The
//! raw results are snapshotted to the data dir, then handed to the
//! [`Extractor`], which processes articles one at a time.

use crate::api::AskModel;
use crate::extractor::Extractor;
use crate::models::{ScrapeReport, ScrapeResult, format_duration};
use crate::outputs::json::write_snapshot;
use crate::scrapers::Scraper;
use chrono::Utc;
use futures::future::join_all;
use std::error::Error;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{error, info, instrument, warn};

pub struct Pipeline<A> {
    scrapers: Vec<Box<dyn Scraper>>,
    extractor: Extractor<A>,
    data_dir: PathBuf,
}

impl<A: AskModel> Pipeline<A> {
    pub fn new(scrapers: Vec<Box<dyn Scraper>>, extractor: Extractor<A>, data_dir: impl Into<PathBuf>) -> Self {
        Self {
            scrapers,
            extractor,
            data_dir: data_dir.into(),
        }
    }

    /// Run every scraper concurrently and keep the ones that succeeded.
    #[instrument(level = "info", skip_all, fields(scrapers = self.scrapers.len()))]
    pub async fn scrape_all(&self) -> Vec<ScrapeResult> {
        let runs = self.scrapers.iter().map(|scraper| async move {
            let source = scraper.source();
            info!(source = %source.name, url = %source.base_url, "Scraping");
            let outcome = scraper.scrape().await;
            (source.name, outcome)
        });

        let mut results = Vec::new();
        for (source, outcome) in join_all(runs).await {
            match outcome {
                Ok(articles) => {
                    info!(%source, count = articles.len(), "Scraper finished");
                    results.push(ScrapeResult {
                        source,
                        articles,
                        scraped_at: Utc::now(),
                    });
                }
                Err(e) => error!(%source, error = %e, "Scraper failed"),
            }
        }

        let total: usize = results.iter().map(|r| r.articles.len()).sum();
        info!(
            succeeded = results.len(),
            of = self.scrapers.len(),
            total_articles = total,
            "Scrape complete"
        );
        results
    }

    /// Scrape, snapshot, extract.
    ///
    /// A failing scraper or snapshot write is logged and the pass goes on.
    ///
    /// # Returns
    ///
    /// A [`ScrapeReport`] with per-source results and the extraction tally.
    ///
    /// # Errors
    ///
    /// Only extraction-level problems: no provider is configured while there
    /// are articles to process, or the dedup store cannot be queried.
    #[instrument(level = "info", skip_all)]
    pub async fn run(&mut self) -> Result<ScrapeReport, Box<dyn Error + Send + Sync>> {
        let t0 = Instant::now();
        let results = self.scrape_all().await;
        let total_articles = results.iter().map(|r| r.articles.len()).sum();

        let snapshot = if results.is_empty() {
            None
        } else {
            match write_snapshot(&results, &self.data_dir).await {
                Ok(path) => Some(path.display().to_string()),
                Err(e) => {
                    warn!(error = %e, "Could not write scrape snapshot");
                    None
                }
            }
        };

        let extraction = self.extractor.extract(&results).await?;

        let elapsed = t0.elapsed();
        info!(
            elapsed_ms = elapsed.as_millis(),
            sources = results.len(),
            total_articles,
            extracted = extraction.extracted,
            failed = extraction.failed,
            "Pass complete"
        );
        Ok(ScrapeReport {
            success: true,
            duration: format_duration(elapsed),
            sources: results.len(),
            total_articles,
            extraction,
            snapshot,
            results,
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::cache::{DEFAULT_RETENTION, SeenCache};
    use crate::error::ProviderError;
    use crate::extractor::ExtractorOptions;
    use crate::keys::{CredentialEntry, KeyPool};
    use crate::models::{NewsSource, RawArticle, SourceName};
    use crate::provider::{ModelHandle, Provider, ProviderRegistry};
    use crate::schema::sample_extraction;
    use crate::scrapers::ScrapeError;
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use serde_json::Value;
    use std::sync::Arc;
    use std::time::Duration;

    pub(crate) struct FixedScraper {
        source: NewsSource,
        urls: Vec<&'static str>,
        fail: bool,
    }

    impl FixedScraper {
        pub(crate) fn ok(name: SourceName, urls: Vec<&'static str>) -> Self {
            Self {
                source: NewsSource {
                    name,
                    base_url: "https://example.test".into(),
                },
                urls,
                fail: false,
            }
        }

        pub(crate) fn failing(name: SourceName) -> Self {
            Self {
                fail: true,
                ..Self::ok(name, vec![])
            }
        }
    }

    #[async_trait]
    impl Scraper for FixedScraper {
        fn source(&self) -> &NewsSource {
            &self.source
        }

        async fn scrape(&self) -> Result<Vec<RawArticle>, ScrapeError> {
            if self.fail {
                return Err("browser crashed".into());
            }
            Ok(self
                .urls
                .iter()
                .map(|u| RawArticle {
                    title: format!("title {u}"),
                    url: u.to_string(),
                    source: self.source.name,
                    published_at: None,
                    content: Some("বিস্তারিত".into()),
                    image_url: None,
                })
                .collect())
        }
    }

    pub(crate) struct AlwaysValid;

    impl AskModel for AlwaysValid {
        async fn ask(&self, _: &ModelHandle, _: &str, _: &Value) -> Result<Option<Value>, ProviderError> {
            Ok(Some(serde_json::to_value(sample_extraction()).unwrap()))
        }
    }

    pub(crate) fn pipeline(
        scrapers: Vec<Box<dyn Scraper>>,
        with_keys: bool,
        data_dir: &std::path::Path,
    ) -> (Pipeline<AlwaysValid>, Arc<MemoryStore>) {
        let mut pool = KeyPool::new();
        if with_keys {
            pool.add_credentials(Provider::Groq, [CredentialEntry::new("g1")]);
        }
        let store = Arc::new(MemoryStore::default());
        let extractor = Extractor::new(
            ProviderRegistry::new(pool, None),
            AlwaysValid,
            store.clone(),
            SeenCache::in_dir(data_dir, DEFAULT_RETENTION),
            ExtractorOptions {
                retry_delay: Duration::ZERO,
                ..ExtractorOptions::default()
            },
        );
        (Pipeline::new(scrapers, extractor, data_dir), store)
    }

    #[tokio::test]
    async fn run_keeps_successful_sources_and_extracts() {
        let dir = tempfile::tempdir().unwrap();
        let (mut pipeline, store) = pipeline(
            vec![
                Box::new(FixedScraper::ok(SourceName::ProthomAlo, vec!["u1", "u2"])),
                Box::new(FixedScraper::failing(SourceName::SomoyNews)),
            ],
            true,
            dir.path(),
        );

        let report = pipeline.run().await.unwrap();

        assert!(report.success);
        assert_eq!(report.sources, 1);
        assert_eq!(report.total_articles, 2);
        assert_eq!(report.extraction.extracted, 2);
        assert!(report.duration.ends_with('s'));
        assert_eq!(store.documents().len(), 2);
        let snapshot = report.snapshot.expect("snapshot written");
        assert!(std::path::Path::new(&snapshot).exists());
    }

    #[tokio::test]
    async fn no_results_means_no_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let (mut pipeline, _) = pipeline(vec![Box::new(FixedScraper::failing(SourceName::ProthomAlo))], true, dir.path());

        let report = pipeline.run().await.unwrap();
        assert_eq!(report.sources, 0);
        assert!(report.snapshot.is_none());
        assert_eq!(report.extraction.total, 0);
    }

    #[tokio::test]
    async fn missing_providers_fail_the_run() {
        let dir = tempfile::tempdir().unwrap();
        let (mut pipeline, _) = pipeline(
            vec![Box::new(FixedScraper::ok(SourceName::ProthomAlo, vec!["u1"]))],
            false,
            dir.path(),
        );
        let err = pipeline.run().await.unwrap_err();
        assert!(err.to_string().contains("no providers available"));
    }
}
