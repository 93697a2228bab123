//! Error types for the extraction core.
//!
//! Configuration problems (no credentials, no providers) surface immediately to
//! the caller that needed them. Provider errors are recovered inside the
//! orchestrator by moving to the next credential or provider. Store and cache
//! errors end the current item.

use crate::provider::Provider;
use thiserror::Error;

/// Errors raised by the credential pool, provider directory and orchestrator.
#[derive(Debug, Error)]
pub enum ExtractorError {
    /// The provider has no registered credentials.
    #[error("no API keys registered for provider \"{provider}\"; set {env} or {env}_1..{env}_20")]
    NoCredentials { provider: Provider, env: &'static str },

    /// The provider order is empty.
    #[error("no providers available; register API keys first")]
    NoProviderAvailable,

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Cache(#[from] CacheError),
}

impl ExtractorError {
    pub fn no_credentials(provider: Provider) -> Self {
        Self::NoCredentials {
            provider,
            env: provider.env_prefix(),
        }
    }
}

/// A single model invocation failed. All variants are treated alike by the
/// orchestrator: try the next credential, then the next provider.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("{provider} rate limited: {message}")]
    RateLimited { provider: Provider, message: String },

    #[error("{provider} rejected credentials ({status}): {message}")]
    Unauthorized {
        provider: Provider,
        status: u16,
        message: String,
    },

    #[error("{provider} returned HTTP {status}: {message}")]
    Status {
        provider: Provider,
        status: u16,
        message: String,
    },

    #[error("transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("malformed model response: {0}")]
    Parse(String),

    #[error("model output violates the extraction schema: {0}")]
    Schema(String),
}

/// Document store failures.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("document is not a JSON object")]
    NotAnObject,

    #[error("lookback window of {hours} hours is out of range")]
    Window { hours: i64 },
}

/// Seen-item cache persistence failures. Loading never produces one of these.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("cache serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_credentials_names_the_env_prefix() {
        let err = ExtractorError::no_credentials(Provider::Groq);
        let msg = err.to_string();
        assert!(msg.contains("\"groq\""));
        assert!(msg.contains("GROQ_API_KEY_1"));
    }

    #[test]
    fn provider_errors_convert_into_extractor_errors() {
        let err: ExtractorError = ProviderError::Parse("eof".into()).into();
        assert!(matches!(err, ExtractorError::Provider(ProviderError::Parse(_))));
    }
}
