//! Data models shared by the scrapers, the extraction orchestrator and the
//! HTTP front door.
//!
//! - [`RawArticle`] / [`ScrapeResult`]: what scrapers produce
//! - [`ExtractedArticle`]: the document persisted for one article
//! - [`RunTally`] / [`ScrapeReport`]: per-run summaries
//!
//! Wire names are camelCase so snapshots and reports keep the same shape as
//! the stored documents.

use crate::provider::Provider;
use crate::schema::ArticleExtraction;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// News outlets known to the scrapers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SourceName {
    #[serde(rename = "Prothom Alo")]
    ProthomAlo,
    #[serde(rename = "Somoy News")]
    SomoyNews,
}

impl SourceName {
    pub fn as_str(self) -> &'static str {
        match self {
            SourceName::ProthomAlo => "Prothom Alo",
            SourceName::SomoyNews => "Somoy News",
        }
    }
}

impl fmt::Display for SourceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A news outlet and the root URL its scraper starts from.
#[derive(Debug, Clone)]
pub struct NewsSource {
    pub name: SourceName,
    pub base_url: String,
}

/// A raw news article as scraped from a source.
///
/// `url` is the stable key used for duplicate detection. Articles with no
/// `content` are never sent to a model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawArticle {
    pub title: String,
    pub url: String,
    pub source: SourceName,
    /// Publication timestamp exactly as the page presents it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

impl RawArticle {
    /// Content if present and not blank.
    pub fn body(&self) -> Option<&str> {
        self.content.as_deref().filter(|c| !c.trim().is_empty())
    }
}

/// Everything one scraper returned for one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrapeResult {
    pub source: SourceName,
    pub articles: Vec<RawArticle>,
    pub scraped_at: DateTime<Utc>,
}

/// The document written to the article store.
///
/// Extraction fields are flattened to the top level and enriched with where
/// the article came from and when it was scraped and extracted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedArticle {
    #[serde(flatten)]
    pub extraction: ArticleExtraction,
    pub url: String,
    pub source: SourceName,
    pub scraped_at: DateTime<Utc>,
    pub extracted_at: DateTime<Utc>,
}

/// Counters for one orchestration pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunTally {
    /// Distinct articles with content, before duplicate filtering.
    pub total: usize,
    /// Dropped because they were already extracted within the retention window.
    pub skipped: usize,
    pub extracted: usize,
    pub failed: usize,
    /// Providers given up on during this run, in the order they were exhausted.
    pub exhausted_providers: Vec<Provider>,
}

impl RunTally {
    pub fn is_exhausted(&self, provider: Provider) -> bool {
        self.exhausted_providers.contains(&provider)
    }

    pub fn mark_exhausted(&mut self, provider: Provider) {
        if !self.is_exhausted(provider) {
            self.exhausted_providers.push(provider);
        }
    }
}

/// Response of one scrape + extract pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrapeReport {
    pub success: bool,
    /// Wall time formatted as seconds with one decimal, e.g. `"12.3s"`.
    pub duration: String,
    /// Number of sources whose scraper succeeded.
    pub sources: usize,
    pub total_articles: usize,
    pub extraction: RunTally,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<String>,
    pub results: Vec<ScrapeResult>,
}

pub fn format_duration(elapsed: std::time::Duration) -> String {
    format!("{:.1}s", elapsed.as_secs_f64())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::sample_extraction;

    fn article(content: Option<&str>) -> RawArticle {
        RawArticle {
            title: "শিরোনাম".into(),
            url: "https://www.prothomalo.com/bangladesh/abc123defg".into(),
            source: SourceName::ProthomAlo,
            published_at: None,
            content: content.map(str::to_string),
            image_url: None,
        }
    }

    #[test]
    fn raw_article_uses_camel_case_and_skips_missing_fields() {
        let mut a = article(Some("body"));
        a.published_at = Some("2026-02-25T10:00:00+06:00".into());
        let json = serde_json::to_value(&a).unwrap();
        assert_eq!(json["source"], "Prothom Alo");
        assert_eq!(json["publishedAt"], "2026-02-25T10:00:00+06:00");
        assert!(json.get("imageUrl").is_none());
    }

    #[test]
    fn blank_content_is_no_body() {
        assert_eq!(article(Some("text")).body(), Some("text"));
        assert_eq!(article(Some("  \n")).body(), None);
        assert_eq!(article(None).body(), None);
    }

    #[test]
    fn extracted_article_flattens_extraction_fields() {
        let now = Utc::now();
        let doc = ExtractedArticle {
            extraction: sample_extraction(),
            url: "u1".into(),
            source: SourceName::ProthomAlo,
            scraped_at: now,
            extracted_at: now,
        };
        let json = serde_json::to_value(&doc).unwrap();
        assert_eq!(json["title_english"], "Test: Dhaka Sees Heavy Rainfall");
        assert_eq!(json["url"], "u1");
        assert!(json["scrapedAt"].is_string());
        assert!(json["extractedAt"].is_string());
        assert!(json.get("extraction").is_none());
    }

    #[test]
    fn tally_records_each_exhausted_provider_once() {
        let mut tally = RunTally::default();
        tally.mark_exhausted(Provider::Groq);
        tally.mark_exhausted(Provider::Google);
        tally.mark_exhausted(Provider::Groq);
        assert_eq!(tally.exhausted_providers, vec![Provider::Groq, Provider::Google]);
        let json = serde_json::to_value(&tally).unwrap();
        assert_eq!(json["exhaustedProviders"], serde_json::json!(["groq", "google"]));
    }

    #[test]
    fn durations_have_one_decimal() {
        assert_eq!(format_duration(std::time::Duration::from_millis(12_345)), "12.3s");
    }
}
