//! # khoborer_khoj
//!
//! Scrapes Bangladeshi news sites and turns each new article into a
//! structured record with an LLM, falling back across providers and API keys
//! when one is rate limited or failing.
//!
//! ## Usage
//!
//! ```sh
//! GROQ_API_KEY_1=... CEREBRAS_API_KEY=... khoborer_khoj run
//! khoborer_khoj serve --port 3000
//! khoborer_khoj prune
//! ```
//!
//! ## Architecture
//!
//! 1. **Scraping**: every source is scraped concurrently
//! 2. **Snapshot**: raw results go to `{data_dir}/scrape-{timestamp}.json`
//! 3. **Dedup**: URLs extracted within the retention window are skipped
//! 4. **Extraction**: one article at a time, provider by provider, key by key
//! 5. **Store**: validated records are appended to `{data_dir}/{collection}/{day}.jsonl`

use clap::Parser;
use std::error::Error;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, instrument};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod api;
mod cache;
mod cli;
mod config;
mod error;
mod extractor;
mod keys;
mod models;
mod outputs;
mod pipeline;
mod prompt;
mod provider;
mod schema;
mod scrapers;
mod server;
mod store;
mod utils;

use api::HttpAsk;
use cache::SeenCache;
use cli::{Cli, Command};
use config::Config;
use extractor::Extractor;
use pipeline::Pipeline;
use provider::ProviderRegistry;
use store::JsonStore;
use utils::ensure_writable_dir;

const USER_AGENT: &str = concat!("khoborer_khoj/", env!("CARGO_PKG_VERSION"));
const SCRAPE_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    if let Ok(path) = dotenvy::dotenv() {
        debug!(path = %path.display(), "Loaded .env");
    }

    let args = Cli::parse();
    debug!(command = ?args.command, "Parsed CLI arguments");

    let config = Config::load(&args.global).await?;
    info!(
        data_dir = %config.data_dir.display(),
        collection = %config.collection,
        dedup = ?config.dedup,
        "khoborer_khoj starting up"
    );

    if let Err(e) = ensure_writable_dir(&config.data_dir).await {
        error!(
            path = %config.data_dir.display(),
            error = %e,
            "Data directory is not writable (fix perms or choose a different path)"
        );
        return Err(e);
    }

    match args.command {
        Command::Prune => {
            let mut cache = SeenCache::in_dir(&config.data_dir, config.retention);
            let removed = cache.prune_expired().await?;
            info!(removed, remaining = cache.len().await, "Pruned seen-URL cache");
            println!("{removed}");
        }
        Command::Run => {
            let mut pipeline = build_pipeline(&config)?;
            let report = pipeline.run().await.map_err(|e| e as Box<dyn Error>)?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Serve { port } => {
            let pipeline = build_pipeline(&config)?;
            server::serve(pipeline, port).await?;
        }
    }

    Ok(())
}

fn build_pipeline(config: &Config) -> Result<Pipeline<HttpAsk>, Box<dyn Error>> {
    let mut registry = ProviderRegistry::from_env(config.provider_order.clone());
    config.apply_overrides(&mut registry);
    for provider in registry.provider_order() {
        info!(
            %provider,
            model = %registry.model_id(provider),
            keys = registry.credential_count(provider),
            "Provider configured"
        );
    }

    let extractor = Extractor::new(
        registry,
        HttpAsk::default(),
        Arc::new(JsonStore::new(&config.data_dir)),
        SeenCache::in_dir(&config.data_dir, config.retention),
        config.extractor_options(),
    );

    let client = reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(SCRAPE_TIMEOUT)
        .build()?;

    Ok(Pipeline::new(scrapers::all(client), extractor, &config.data_dir))
}
