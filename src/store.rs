//! Persistent document store for extracted articles.
//!
//! [`JsonStore`] keeps one directory per collection under the data
//! directory and one JSON-lines file per UTC day inside it:
//!
//! ```text
//! data_dir/articles/2026-02-24.jsonl
//! data_dir/articles/2026-02-25.jsonl
//! ```
//!
//! A document lands in the file for the day of its `extractedAt`, so a
//! "recently extracted" lookup only opens the files inside the window and
//! streams them line by line. Each inserted document gets a UUID `_id`.

use crate::error::StoreError;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, TimeDelta, Utc};
use serde_json::Value;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tokio::fs::{self, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

#[async_trait]
pub trait ArticleStore: Send + Sync {
    /// Insert one document and return its id.
    async fn insert(&self, collection: &str, document: Value) -> Result<String, StoreError>;

    /// URLs of documents whose `extractedAt` falls within the last `hours`.
    async fn recently_extracted(&self, collection: &str, hours: i64) -> Result<HashSet<String>, StoreError>;
}

#[derive(Debug)]
pub struct JsonStore {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn collection_dir(&self, collection: &str) -> PathBuf {
        let safe: String = collection
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.dir.join(safe)
    }

    pub fn day_path(&self, collection: &str, day: NaiveDate) -> PathBuf {
        self.collection_dir(collection).join(format!("{}.jsonl", day.format("%Y-%m-%d")))
    }

    /// Day files of `collection` dated on or after `since`.
    async fn day_files_since(&self, collection: &str, since: NaiveDate) -> Result<Vec<PathBuf>, StoreError> {
        let dir = self.collection_dir(collection);
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("jsonl") {
                continue;
            }
            let day = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok());
            if day.is_some_and(|day| day >= since) {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }
}

#[async_trait]
impl ArticleStore for JsonStore {
    #[instrument(level = "debug", skip(self, document))]
    async fn insert(&self, collection: &str, mut document: Value) -> Result<String, StoreError> {
        let day = extracted_at(&document).unwrap_or_else(Utc::now).date_naive();
        let Value::Object(map) = &mut document else {
            return Err(StoreError::NotAnObject);
        };
        let id = Uuid::new_v4().to_string();
        map.insert("_id".into(), Value::String(id.clone()));

        let mut line = serde_json::to_string(&document)?;
        line.push('\n');

        let _guard = self.write_lock.lock().await;
        fs::create_dir_all(self.collection_dir(collection)).await?;
        let path = self.day_path(collection, day);
        let mut file = OpenOptions::new().create(true).append(true).open(&path).await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        debug!(%id, path = %path.display(), "Inserted document");
        Ok(id)
    }

    #[instrument(level = "debug", skip(self))]
    async fn recently_extracted(&self, collection: &str, hours: i64) -> Result<HashSet<String>, StoreError> {
        let cutoff = cutoff(hours)?;
        let mut urls = HashSet::new();
        for path in self.day_files_since(collection, cutoff.date_naive()).await? {
            collect_recent(&path, cutoff, &mut urls).await?;
        }
        debug!(count = urls.len(), "Loaded recently extracted URLs");
        Ok(urls)
    }
}

/// Stream one day file, adding URLs extracted at or after `cutoff`.
async fn collect_recent(path: &Path, cutoff: DateTime<Utc>, urls: &mut HashSet<String>) -> Result<(), StoreError> {
    let file = fs::File::open(path).await?;
    let mut lines = BufReader::new(file).lines();
    let mut lineno = 0usize;
    while let Some(line) = lines.next_line().await? {
        lineno += 1;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<Value>(&line) {
            Ok(doc) => {
                if let Some(url) = recent_url(&doc, cutoff) {
                    urls.insert(url);
                }
            }
            Err(e) => warn!(path = %path.display(), line = lineno, error = %e, "Skipping unreadable document"),
        }
    }
    Ok(())
}

fn cutoff(hours: i64) -> Result<DateTime<Utc>, StoreError> {
    TimeDelta::try_hours(hours)
        .and_then(|window| Utc::now().checked_sub_signed(window))
        .ok_or(StoreError::Window { hours })
}

fn extracted_at(doc: &Value) -> Option<DateTime<Utc>> {
    let raw = doc.get("extractedAt")?.as_str()?;
    DateTime::parse_from_rfc3339(raw).ok().map(|t| t.with_timezone(&Utc))
}

fn recent_url(doc: &Value, cutoff: DateTime<Utc>) -> Option<String> {
    if extracted_at(doc)? < cutoff {
        return None;
    }
    doc.get("url")?.as_str().map(str::to_string)
}

/// In-memory store used by orchestrator tests.
#[cfg(test)]
#[derive(Debug, Default)]
pub(crate) struct MemoryStore {
    pub docs: std::sync::Mutex<Vec<(String, Value)>>,
    pub fail_inserts: std::sync::atomic::AtomicBool,
}

#[cfg(test)]
impl MemoryStore {
    pub fn documents(&self) -> Vec<Value> {
        self.docs.lock().unwrap().iter().map(|(_, d)| d.clone()).collect()
    }
}

#[cfg(test)]
#[async_trait]
impl ArticleStore for MemoryStore {
    async fn insert(&self, collection: &str, document: Value) -> Result<String, StoreError> {
        if self.fail_inserts.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(StoreError::Io(std::io::Error::other("store offline")));
        }
        let id = Uuid::new_v4().to_string();
        self.docs.lock().unwrap().push((collection.to_string(), document));
        Ok(id)
    }

    async fn recently_extracted(&self, collection: &str, hours: i64) -> Result<HashSet<String>, StoreError> {
        let cutoff = cutoff(hours)?;
        Ok(self
            .docs
            .lock()
            .unwrap()
            .iter()
            .filter(|(c, _)| c == collection)
            .filter_map(|(_, doc)| recent_url(doc, cutoff))
            .collect())
    }
}
