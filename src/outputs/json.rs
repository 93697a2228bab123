//! JSON snapshot of raw scrape results.
//!
//! Every pass writes what the scrapers returned, before extraction, to
//! `{data_dir}/scrape-{timestamp}.json`. The timestamp is RFC 3339 UTC with
//! `:` and `.` replaced by `-` so the name is valid on every filesystem.

use crate::models::ScrapeResult;
use crate::utils::file_timestamp;
use chrono::{DateTime, Utc};
use std::error::Error;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{error, info, instrument};

pub fn snapshot_path(data_dir: &Path, now: DateTime<Utc>) -> PathBuf {
    data_dir.join(format!("scrape-{}.json", file_timestamp(now)))
}

/// Write a scrape snapshot as pretty JSON.
///
/// Creates `data_dir` if needed and writes every [`ScrapeResult`] of the pass,
/// including sources that returned no articles.
///
/// # Arguments
///
/// * `results` - Raw results of the scrape phase
/// * `data_dir` - Directory the snapshot is written to
///
/// # Returns
///
/// The path of the written file, or an error if serialization, directory
/// creation or the write fails.
///
/// # Output Path
///
/// The file is written to: `{data_dir}/scrape-{timestamp}.json`
#[instrument(level = "info", skip_all, fields(data_dir = %data_dir.display()))]
pub async fn write_snapshot(results: &[ScrapeResult], data_dir: &Path) -> Result<PathBuf, Box<dyn Error + Send + Sync>> {
    let json = serde_json::to_string_pretty(results)?;

    if let Err(e) = fs::create_dir_all(data_dir).await {
        error!(error = %e, "Failed to create data dir");
        return Err(e.into());
    }

    let path = snapshot_path(data_dir, Utc::now());
    fs::write(&path, json).await?;
    info!(path = %path.display(), sources = results.len(), "Wrote scrape snapshot");
    Ok(path)
}
