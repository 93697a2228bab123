//! Prothom Alo scraper.
//!
//! Section pages under `https://www.prothomalo.com/{topic}` link to articles
//! whose last path segment is a 10-character lowercase id containing at least
//! one digit, e.g. `/bangladesh/district/k2l8m9n0pq`. Anything else on the page
//! (tag pages, author pages, other sections) is ignored.

use super::{ScrapeError, Scraper};
use crate::models::{NewsSource, RawArticle, SourceName};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use scraper::{Html, Selector};
use std::collections::HashSet;
use tracing::{debug, error, info, instrument, warn};
use url::Url;

pub const BASE_URL: &str = "https://www.prothomalo.com";
pub const SUB_TOPICS: [&str; 3] = ["bangladesh", "politics", "business"];

static ARTICLE_ID: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-z0-9]{10}$").expect("valid regex"));
static ANCHOR: Lazy<Selector> = Lazy::new(|| Selector::parse("a[href]").expect("valid selector"));
static TITLE: Lazy<Selector> = Lazy::new(|| Selector::parse("h1[data-title-0]").expect("valid selector"));
static TIME: Lazy<Selector> = Lazy::new(|| Selector::parse("time[datetime]").expect("valid selector"));
static PARAGRAPHS: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(".story-element-text:not(.story-element-text-also-read) p").expect("valid selector")
});

#[derive(Debug)]
pub struct ProthomAloScraper {
    source: NewsSource,
    client: Client,
}

impl ProthomAloScraper {
    pub fn new(client: Client) -> Self {
        Self::with_base_url(client, BASE_URL)
    }

    pub fn with_base_url(client: Client, base_url: &str) -> Self {
        Self {
            source: NewsSource {
                name: SourceName::ProthomAlo,
                base_url: base_url.trim_end_matches('/').to_string(),
            },
            client,
        }
    }

    async fn get_text(&self, url: &str) -> Result<String, ScrapeError> {
        let response = self.client.get(url).send().await?.error_for_status()?;
        Ok(response.text().await?)
    }

    /// Collect valid article links from every section page, in first-seen order.
    #[instrument(level = "info", skip_all)]
    pub async fn index_articles(&self) -> Result<Vec<String>, ScrapeError> {
        let base = Url::parse(&self.source.base_url)?;
        let mut seen = HashSet::new();
        let mut links = Vec::new();

        for topic in SUB_TOPICS {
            let target = format!("{}/{topic}", self.source.base_url);
            info!(source = %self.source.name, url = %target, "Loading section");
            let html = match self.get_text(&target).await {
                Ok(html) => html,
                Err(e) => {
                    error!(source = %self.source.name, %topic, error = %e, "Failed to collect links");
                    continue;
                }
            };
            let raw = collect_links(&html, &base, &SUB_TOPICS);
            let before = links.len();
            for link in raw.iter().filter(|l| is_valid_article_link(l)) {
                if seen.insert(link.clone()) {
                    links.push(link.clone());
                }
            }
            info!(
                %topic,
                raw = raw.len(),
                added = links.len() - before,
                total = links.len(),
                "Indexed section"
            );
        }
        debug!(urls = ?links, "Prothom Alo URLs");
        Ok(links)
    }

    /// Fetch articles one after another; failures and empty bodies are skipped.
    #[instrument(level = "info", skip_all, fields(count = urls.len()))]
    pub async fn fetch_articles(&self, urls: Vec<String>) -> Vec<RawArticle> {
        let total = urls.len();
        let mut articles = Vec::with_capacity(total);
        for url in urls {
            match self.fetch_article(&url).await {
                Ok(article) if article.body().is_some() => articles.push(article),
                Ok(_) => warn!(%url, "Article has no body text"),
                Err(e) => error!(%url, error = %e, "Article fetch failed"),
            }
        }

        info!(collected = articles.len(), links = total, "Fetched Prothom Alo articles");
        articles
    }

    #[instrument(level = "debug", skip(self))]
    async fn fetch_article(&self, url: &str) -> Result<RawArticle, ScrapeError> {
        let html = self.get_text(url).await?;
        let parsed = parse_article(&html);
        debug!(bytes = parsed.content.len(), "Parsed article");
        Ok(RawArticle {
            title: parsed.title,
            url: url.to_string(),
            source: self.source.name,
            published_at: parsed.published_at,
            content: Some(parsed.content).filter(|c| !c.is_empty()),
            image_url: None,
        })
    }
}

#[async_trait]
impl Scraper for ProthomAloScraper {
    fn source(&self) -> &NewsSource {
        &self.source
    }

    async fn scrape(&self) -> Result<Vec<RawArticle>, ScrapeError> {
        let links = self.index_articles().await?;
        Ok(self.fetch_articles(links).await)
    }
}

/// Absolute hrefs on the page whose path contains `/{topic}/` for any topic.
pub fn collect_links(html: &str, base: &Url, topics: &[&str]) -> Vec<String> {
    let document = Html::parse_document(html);
    let mut links: Vec<String> = Vec::new();
    for href in document.select(&ANCHOR).filter_map(|a| a.value().attr("href")) {
        let Ok(resolved) = base.join(href) else {
            continue;
        };
        let resolved = resolved.to_string();
        let on_topic = topics.iter().any(|t| resolved.contains(&format!("/{t}/")));
        if on_topic && !links.contains(&resolved) {
            links.push(resolved);
        }
    }
    links
}

/// At least two path segments, the last being a 10-char lowercase id with a digit.
pub fn is_valid_article_link(href: &str) -> bool {
    let Ok(url) = Url::parse(href) else {
        return false;
    };
    let segments: Vec<&str> = url.path().split('/').filter(|s| !s.is_empty()).collect();
    if segments.len() < 2 {
        return false;
    }
    let last = segments[segments.len() - 1];
    ARTICLE_ID.is_match(last) && last.chars().any(|c| c.is_ascii_digit())
}

#[derive(Debug, Default, PartialEq)]
pub struct ParsedArticle {
    pub title: String,
    pub published_at: Option<String>,
    pub content: String,
}

pub fn parse_article(html: &str) -> ParsedArticle {
    let document = Html::parse_document(html);
    let title = document
        .select(&TITLE)
        .next()
        .map(|h| h.text().collect::<String>().trim().to_string())
        .unwrap_or_default();
    let published_at = document
        .select(&TIME)
        .next()
        .and_then(|t| t.value().attr("datetime"))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string);
    let content = document
        .select(&PARAGRAPHS)
        .map(|p| p.text().collect::<String>().trim().to_string())
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n");
    ParsedArticle {
        title,
        published_at,
        content,
    }
}
