//! News source scrapers.
//!
//! Each scraper follows the same two-phase pattern:
//!
//! 1. **Indexing**: collect article URLs from the outlet's section pages
//! 2. **Fetching**: download each article and parse title, date and body
//!
//! Failed fetches are logged and skipped; articles without body text are
//! dropped before they leave the scraper.
//!
//! | Source | Module | Sections |
//! |--------|--------|----------|
//! | Prothom Alo | [`prothom_alo`] | bangladesh, politics, business |

use crate::models::{NewsSource, RawArticle};
use async_trait::async_trait;
use std::error::Error;

pub mod prothom_alo;

pub type ScrapeError = Box<dyn Error + Send + Sync>;

#[async_trait]
pub trait Scraper: Send + Sync {
    fn source(&self) -> &NewsSource;

    async fn scrape(&self) -> Result<Vec<RawArticle>, ScrapeError>;
}

/// Every scraper this binary knows about.
pub fn all(client: reqwest::Client) -> Vec<Box<dyn Scraper>> {
    vec![Box::new(prothom_alo::ProthomAloScraper::new(client))]
}
