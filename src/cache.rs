//! Seen-URL cache with a retention window.
//!
//! Records map an article URL to the millisecond timestamp it was extracted.
//! State lives in memory, is loaded lazily from a single JSON file on first
//! use, and every mutation rewrites the whole file (`tmp` then rename).
//! A missing or corrupt file is treated as an empty cache.

use crate::error::CacheError;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::fs;
use tracing::{debug, info, instrument, warn};

pub const CACHE_FILE_NAME: &str = "extracted-urls.json";
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(30 * 60 * 60);

/// Milliseconds since the Unix epoch.
pub type Clock = Arc<dyn Fn() -> i64 + Send + Sync>;

pub fn system_clock() -> Clock {
    Arc::new(|| chrono::Utc::now().timestamp_millis())
}

pub struct SeenCache {
    path: PathBuf,
    retention_ms: i64,
    clock: Clock,
    entries: Option<HashMap<String, i64>>,
}

impl fmt::Debug for SeenCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SeenCache")
            .field("path", &self.path)
            .field("retention_ms", &self.retention_ms)
            .field("loaded", &self.entries.as_ref().map(HashMap::len))
            .finish()
    }
}

impl SeenCache {
    /// Cache stored as `extracted-urls.json` inside `data_dir`.
    pub fn in_dir(data_dir: impl AsRef<Path>, retention: Duration) -> Self {
        Self::new(data_dir.as_ref().join(CACHE_FILE_NAME), retention)
    }

    pub fn new(path: impl Into<PathBuf>, retention: Duration) -> Self {
        Self {
            path: path.into(),
            retention_ms: i64::try_from(retention.as_millis()).unwrap_or(i64::MAX),
            clock: system_clock(),
            entries: None,
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn retention(&self) -> Duration {
        Duration::from_millis(self.retention_ms.max(0) as u64)
    }

    /// Drop in-memory state; the next access reloads from disk.
    pub fn reset(&mut self) {
        self.entries = None;
    }

    fn is_fresh(&self, ts: i64, now: i64) -> bool {
        now.saturating_sub(ts) < self.retention_ms
    }

    async fn load(&mut self) -> &mut HashMap<String, i64> {
        if self.entries.is_none() {
            let now = (self.clock)();
            let loaded = read_entries(&self.path).await;
            let total = loaded.len();
            let fresh: HashMap<String, i64> = loaded
                .into_iter()
                .filter(|(_, ts)| self.is_fresh(*ts, now))
                .collect();
            debug!(path = %self.path.display(), total, fresh = fresh.len(), "Loaded URL cache");
            self.entries = Some(fresh);
        }
        self.entries.get_or_insert_with(HashMap::new)
    }

    /// `true` iff `url` was marked within the retention window.
    /// An expired record found here is evicted from memory.
    pub async fn is_seen(&mut self, url: &str) -> bool {
        let now = (self.clock)();
        let retention_ms = self.retention_ms;
        let entries = self.load().await;
        match entries.get(url).copied() {
            None => false,
            Some(ts) if now.saturating_sub(ts) < retention_ms => true,
            Some(_) => {
                entries.remove(url);
                false
            }
        }
    }

    pub async fn mark_seen(&mut self, url: &str) -> Result<(), CacheError> {
        self.mark_seen_batch(std::iter::once(url)).await
    }

    /// Record all `urls` with the same timestamp and persist once.
    ///
    /// If the write fails, the in-memory records are rolled back so memory
    /// never claims a URL the file does not have.
    pub async fn mark_seen_batch<I, S>(&mut self, urls: I) -> Result<(), CacheError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let now = (self.clock)();
        let entries = self.load().await;
        let previous: Vec<(String, Option<i64>)> = urls
            .into_iter()
            .map(|url| {
                let url = url.as_ref().to_string();
                let prev = entries.insert(url.clone(), now);
                (url, prev)
            })
            .collect();

        if let Err(e) = self.persist().await {
            if let Some(entries) = self.entries.as_mut() {
                for (url, prev) in previous.into_iter().rev() {
                    match prev {
                        Some(ts) => entries.insert(url, ts),
                        None => entries.remove(&url),
                    };
                }
            }
            return Err(e);
        }
        Ok(())
    }

    /// Evict every expired record; persists only if something was removed.
    #[instrument(level = "info", skip_all, fields(path = %self.path.display()))]
    pub async fn prune_expired(&mut self) -> Result<usize, CacheError> {
        let now = (self.clock)();
        let retention_ms = self.retention_ms;
        let entries = self.load().await;
        let before = entries.len();
        entries.retain(|_, ts| now.saturating_sub(*ts) < retention_ms);
        let pruned = before - entries.len();
        if pruned > 0 {
            self.persist().await?;
            info!(pruned, "Pruned expired URL cache entries");
        }
        Ok(pruned)
    }

    /// Number of records currently held in memory (loads if needed).
    pub async fn len(&mut self) -> usize {
        self.load().await.len()
    }

    async fn persist(&self) -> Result<(), CacheError> {
        let Some(entries) = &self.entries else {
            return Ok(());
        };
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }
        // stable key order keeps diffs of the file readable
        let sorted: std::collections::BTreeMap<&String, &i64> = entries.iter().collect();
        let json = serde_json::to_string_pretty(&sorted)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json).await?;
        fs::rename(&tmp, &self.path).await?;
        debug!(path = %self.path.display(), count = entries.len(), "Persisted URL cache");
        Ok(())
    }
}

async fn read_entries(path: &Path) -> HashMap<String, i64> {
    let raw = match fs::read_to_string(path).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return HashMap::new(),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Could not read URL cache; starting empty");
            return HashMap::new();
        }
    };
    match serde_json::from_str::<HashMap<String, serde_json::Value>>(&raw) {
        Ok(map) => map
            .into_iter()
            .filter_map(|(url, ts)| ts.as_f64().map(|ts| (url, ts as i64)))
            .collect(),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Corrupt URL cache; starting empty");
            HashMap::new()
        }
    }
}
