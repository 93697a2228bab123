//! Command-line interface definitions for khoborer_khoj.
//!
//! Every global option can also come from an environment variable, and most
//! from the YAML settings file (see [`crate::config`]).

use crate::extractor::DedupMode;
use crate::provider::Provider;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Scrape Bangladeshi news sites and extract structured article data with LLMs.
///
/// ```sh
/// # one pass, report printed as JSON
/// khoborer_khoj run
///
/// # HTTP server with GET /scrape and GET /health
/// khoborer_khoj --provider-order groq,cerebras serve --port 3000
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Args, Debug, Clone, Default)]
pub struct GlobalArgs {
    /// Optional path to a YAML settings file
    #[arg(short, long, global = true, env = "EXTRACTOR_CONFIG")]
    pub config: Option<PathBuf>,

    /// Directory for snapshots, the seen-URL cache and stored documents
    #[arg(short, long, global = true, env = "DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Collection that extracted documents are written to
    #[arg(long, global = true, env = "COLLECTION_NAME")]
    pub collection: Option<String>,

    /// Providers to try, in order (comma separated)
    #[arg(long, global = true, env = "PROVIDER_ORDER", value_enum, value_delimiter = ',')]
    pub provider_order: Vec<Provider>,

    /// Where already-extracted URLs are looked up
    #[arg(long, global = true, value_enum)]
    pub dedup: Option<DedupMode>,

    /// Pause between failed attempts, in milliseconds
    #[arg(long, global = true)]
    pub retry_delay_ms: Option<u64>,

    /// Pause between articles, in milliseconds
    #[arg(long, global = true)]
    pub item_delay_ms: Option<u64>,

    /// How long an extracted URL is skipped, in hours
    #[arg(long, global = true)]
    pub retention_hours: Option<u64>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Run one scrape + extract pass and print the report
    Run,

    /// Serve the HTTP API
    Serve {
        #[arg(short, long, env = "PORT", default_value_t = 3000)]
        port: u16,
    },

    /// Drop expired entries from the seen-URL cache
    Prune,
}
