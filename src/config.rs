//! Runtime configuration.
//!
//! Values come from three layers, highest first: command-line flags (or their
//! environment variables), an optional YAML settings file, then built-in
//! defaults. API keys are not part of this file; they are read from the
//! environment by [`crate::keys::KeyPool::load_from_env`].
//!
//! ```yaml
//! provider_order: [groq, cerebras, google]
//! models:
//!   groq: llama-3.3-70b-versatile
//! base_urls:
//!   cerebras: http://localhost:8080/v1
//! retry_delay_ms: 1500
//! item_delay_ms: 2000
//! retention_hours: 30
//! collection: articles
//! data_dir: ./data
//! dedup: cache
//! ```

use crate::cli::GlobalArgs;
use crate::extractor::{DEFAULT_COLLECTION, DEFAULT_RETRY_DELAY, DedupMode, ExtractorOptions};
use crate::provider::{Provider, ProviderRegistry};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

pub const DEFAULT_DATA_DIR: &str = "./data";
pub const DEFAULT_RETENTION_HOURS: u64 = 30;
/// Largest retention whose millisecond value still fits an `i64` timestamp.
pub const MAX_RETENTION_HOURS: u64 = i64::MAX as u64 / 3_600_000;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read settings file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid settings file {path}: {source}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("{key} = {value} is out of range (max {max})")]
    OutOfRange { key: &'static str, value: u64, max: u64 },
}

/// Contents of the optional YAML settings file. Every key is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub provider_order: Option<Vec<Provider>>,
    pub models: HashMap<Provider, String>,
    pub base_urls: HashMap<Provider, String>,
    pub retry_delay_ms: Option<u64>,
    pub item_delay_ms: Option<u64>,
    pub retention_hours: Option<u64>,
    pub collection: Option<String>,
    pub data_dir: Option<PathBuf>,
    pub dedup: Option<DedupMode>,
}

impl Settings {
    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = tokio::fs::read_to_string(path).await.map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let settings = Self::from_yaml(&raw).map_err(|source| ConfigError::Yaml {
            path: path.to_path_buf(),
            source,
        })?;
        info!(path = %path.display(), "Loaded settings file");
        Ok(settings)
    }

    pub fn from_yaml(raw: &str) -> Result<Self, serde_yaml::Error> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(raw)
    }
}

/// Fully resolved configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub data_dir: PathBuf,
    pub provider_order: Option<Vec<Provider>>,
    pub models: HashMap<Provider, String>,
    pub base_urls: HashMap<Provider, String>,
    pub retry_delay: Duration,
    pub item_delay: Duration,
    pub retention: Duration,
    pub collection: String,
    pub dedup: DedupMode,
}

impl Config {
    /// Merge CLI flags over file settings over defaults.
    pub fn resolve(args: &GlobalArgs, settings: Settings) -> Result<Self, ConfigError> {
        let provider_order = if args.provider_order.is_empty() {
            settings.provider_order
        } else {
            Some(args.provider_order.clone())
        };
        let retention_hours = args
            .retention_hours
            .or(settings.retention_hours)
            .unwrap_or(DEFAULT_RETENTION_HOURS);
        if retention_hours > MAX_RETENTION_HOURS {
            return Err(ConfigError::OutOfRange {
                key: "retention_hours",
                value: retention_hours,
                max: MAX_RETENTION_HOURS,
            });
        }
        let config = Self {
            data_dir: args
                .data_dir
                .clone()
                .or(settings.data_dir)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR)),
            provider_order,
            models: settings.models,
            base_urls: settings.base_urls,
            retry_delay: args
                .retry_delay_ms
                .or(settings.retry_delay_ms)
                .map(Duration::from_millis)
                .unwrap_or(DEFAULT_RETRY_DELAY),
            item_delay: Duration::from_millis(args.item_delay_ms.or(settings.item_delay_ms).unwrap_or(0)),
            retention: Duration::from_secs(retention_hours * 60 * 60),
            collection: args
                .collection
                .clone()
                .or(settings.collection)
                .unwrap_or_else(|| DEFAULT_COLLECTION.to_string()),
            dedup: args.dedup.or(settings.dedup).unwrap_or_default(),
        };
        debug!(?config, "Resolved configuration");
        Ok(config)
    }

    /// Load the settings file named by `args` (if any) and resolve.
    pub async fn load(args: &GlobalArgs) -> Result<Self, ConfigError> {
        let settings = match &args.config {
            Some(path) => Settings::load(path).await?,
            None => Settings::default(),
        };
        Self::resolve(args, settings)
    }

    pub fn extractor_options(&self) -> ExtractorOptions {
        ExtractorOptions {
            collection: self.collection.clone(),
            retry_delay: self.retry_delay,
            item_delay: self.item_delay,
            dedup: self.dedup,
        }
    }

    /// Apply model and base URL overrides to a registry.
    pub fn apply_overrides(&self, registry: &mut ProviderRegistry) {
        for (provider, model) in &self.models {
            registry.set_model(*provider, model.clone());
        }
        for (provider, url) in &self.base_urls {
            registry.set_base_url(*provider, url.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_without_flags_or_file() {
        let config = Config::resolve(&GlobalArgs::default(), Settings::default()).unwrap();
        assert_eq!(config.data_dir, PathBuf::from("./data"));
        assert_eq!(config.retry_delay, Duration::from_millis(1500));
        assert_eq!(config.item_delay, Duration::ZERO);
        assert_eq!(config.retention, Duration::from_secs(30 * 3600));
        assert_eq!(config.collection, "articles");
        assert_eq!(config.dedup, DedupMode::Cache);
        assert_eq!(config.provider_order, None);
    }

    #[test]
    fn yaml_settings_parse() {
        let settings = Settings::from_yaml(
            "provider_order: [cerebras, groq]\nmodels:\n  groq: llama-3.3-70b-versatile\nitem_delay_ms: 250\ndedup: both\n",
        )
        .unwrap();
        assert_eq!(settings.provider_order, Some(vec![Provider::Cerebras, Provider::Groq]));
        assert_eq!(settings.models[&Provider::Groq], "llama-3.3-70b-versatile");
        assert_eq!(settings.dedup, Some(DedupMode::Both));
        assert_eq!(Settings::from_yaml("").unwrap(), Settings::default());
        assert!(Settings::from_yaml("retry_delay: 5").is_err());
    }

    #[test]
    fn flags_win_over_file() {
        let settings = Settings {
            provider_order: Some(vec![Provider::Google]),
            collection: Some("from_file".into()),
            item_delay_ms: Some(100),
            ..Settings::default()
        };
        let args = GlobalArgs {
            provider_order: vec![Provider::Groq, Provider::Cerebras],
            collection: Some("from_flag".into()),
            ..GlobalArgs::default()
        };
        let config = Config::resolve(&args, settings).unwrap();
        assert_eq!(config.provider_order, Some(vec![Provider::Groq, Provider::Cerebras]));
        assert_eq!(config.collection, "from_flag");
        assert_eq!(config.item_delay, Duration::from_millis(100));
    }

    #[test]
    fn oversized_retention_is_rejected() {
        let settings = Settings {
            retention_hours: Some(u64::MAX / 60),
            ..Settings::default()
        };
        let err = Config::resolve(&GlobalArgs::default(), settings).unwrap_err();
        assert!(matches!(err, ConfigError::OutOfRange { key: "retention_hours", .. }));

        let args = GlobalArgs {
            retention_hours: Some(MAX_RETENTION_HOURS),
            ..GlobalArgs::default()
        };
        let config = Config::resolve(&args, Settings::default()).unwrap();
        assert_eq!(config.retention.as_secs(), MAX_RETENTION_HOURS * 3600);
    }

    #[tokio::test]
    async fn missing_settings_file_is_an_error() {
        let err = Settings::load(Path::new("/nonexistent/settings.yaml")).await.unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn overrides_reach_the_registry() {
        let settings = Settings::from_yaml("models:\n  google: gemini-2.5-flash\n").unwrap();
        let config = Config::resolve(&GlobalArgs::default(), settings).unwrap();
        let mut registry = ProviderRegistry::new(crate::keys::KeyPool::new(), None);
        config.apply_overrides(&mut registry);
        assert_eq!(registry.model_id(Provider::Google), "gemini-2.5-flash");
        assert_eq!(registry.model_id(Provider::Groq), "openai/gpt-oss-120b");
    }
}
