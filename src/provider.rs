//! Provider directory: the closed set of model backends, their defaults, and
//! the registry that turns a provider choice into a callable model handle.

use crate::error::ExtractorError;
use crate::keys::KeyPool;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use tracing::debug;

/// A model-serving backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Google,
    Groq,
    Cerebras,
}

impl Provider {
    pub const ALL: [Provider; 3] = [Provider::Google, Provider::Groq, Provider::Cerebras];

    pub fn as_str(self) -> &'static str {
        match self {
            Provider::Google => "google",
            Provider::Groq => "groq",
            Provider::Cerebras => "cerebras",
        }
    }

    /// Environment variable prefix for this provider's keys.
    pub fn env_prefix(self) -> &'static str {
        match self {
            Provider::Google => "GOOGLE_GENERATIVE_AI_API_KEY",
            Provider::Groq => "GROQ_API_KEY",
            Provider::Cerebras => "CEREBRAS_API_KEY",
        }
    }

    pub fn default_model(self) -> &'static str {
        match self {
            Provider::Google => "gemini-2.0-flash",
            Provider::Groq => "openai/gpt-oss-120b",
            Provider::Cerebras => "gpt-oss-120b",
        }
    }

    pub fn default_base_url(self) -> &'static str {
        match self {
            Provider::Google => "https://generativelanguage.googleapis.com/v1beta",
            Provider::Groq => "https://api.groq.com/openai/v1",
            Provider::Cerebras => "https://api.cerebras.ai/v1",
        }
    }

    /// Build a model handle for this provider. This is the per-provider factory.
    pub fn build_model(self, model_id: String, api_key: String, base_url: Option<String>) -> ModelHandle {
        let base_url = base_url
            .unwrap_or_else(|| self.default_base_url().to_string())
            .trim_end_matches('/')
            .to_string();
        let api = match self {
            Provider::Google => Api::GenerateContent { base_url },
            Provider::Groq | Provider::Cerebras => Api::ChatCompletions { base_url },
        };
        ModelHandle {
            provider: self,
            model_id,
            api_key,
            api,
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "google" | "gemini" => Ok(Provider::Google),
            "groq" => Ok(Provider::Groq),
            "cerebras" => Ok(Provider::Cerebras),
            other => Err(format!("unknown provider: {other}")),
        }
    }
}

/// Wire protocol spoken by a model handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Api {
    /// Google Generative Language `models/{id}:generateContent`.
    GenerateContent { base_url: String },
    /// OpenAI-compatible `/chat/completions` with `json_schema` response format.
    ChatCompletions { base_url: String },
}

/// Everything needed to call one model with one credential.
#[derive(Clone)]
pub struct ModelHandle {
    pub provider: Provider,
    pub model_id: String,
    pub api_key: String,
    pub api: Api,
}

impl fmt::Debug for ModelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelHandle")
            .field("provider", &self.provider)
            .field("model_id", &self.model_id)
            .field("api_key", &"<redacted>")
            .field("api", &self.api)
            .finish()
    }
}

/// Optional overrides for [`ProviderRegistry::create_model`].
#[derive(Debug, Clone, Default)]
pub struct ModelRequest {
    pub provider: Option<Provider>,
    pub model: Option<String>,
    pub base_url: Option<String>,
}

impl ModelRequest {
    pub fn for_provider(provider: Provider) -> Self {
        Self {
            provider: Some(provider),
            ..Self::default()
        }
    }
}

/// A freshly built handle plus the credential label used, for logging.
#[derive(Debug, Clone)]
pub struct CreatedModel {
    pub handle: ModelHandle,
    pub credential: String,
}

/// Maps providers to models and owns the credential pool and attempt order.
#[derive(Debug)]
pub struct ProviderRegistry {
    keys: KeyPool,
    order: Vec<Provider>,
    model_overrides: HashMap<Provider, String>,
    base_urls: HashMap<Provider, String>,
}

impl ProviderRegistry {
    /// Without an explicit order, providers that have credentials are tried in discovery order.
    pub fn new(keys: KeyPool, order: Option<Vec<Provider>>) -> Self {
        let order = order.unwrap_or_else(|| keys.available_providers());
        Self {
            keys,
            order,
            model_overrides: HashMap::new(),
            base_urls: HashMap::new(),
        }
    }

    /// Registry backed by keys found in the process environment.
    pub fn from_env(order: Option<Vec<Provider>>) -> Self {
        let mut keys = KeyPool::new();
        keys.load_from_env();
        Self::new(keys, order)
    }

    pub fn provider_order(&self) -> Vec<Provider> {
        self.order.clone()
    }

    pub fn set_provider_order(&mut self, order: Vec<Provider>) {
        self.order = order;
    }

    pub fn set_model(&mut self, provider: Provider, model: impl Into<String>) {
        self.model_overrides.insert(provider, model.into());
    }

    pub fn set_base_url(&mut self, provider: Provider, base_url: impl Into<String>) {
        self.base_urls.insert(provider, base_url.into());
    }

    pub fn model_id(&self, provider: Provider) -> String {
        self.model_overrides
            .get(&provider)
            .cloned()
            .unwrap_or_else(|| provider.default_model().to_string())
    }

    pub fn credential_count(&self, provider: Provider) -> usize {
        self.keys.credential_count(provider)
    }

    /// Resolve provider, model and credential, then build a model handle.
    /// Each call consumes one credential from the provider's rotation.
    pub fn create_model(&mut self, request: Option<ModelRequest>) -> Result<CreatedModel, ExtractorError> {
        let request = request.unwrap_or_default();
        let provider = match request.provider.or_else(|| self.order.first().copied()) {
            Some(p) => p,
            None => return Err(ExtractorError::NoProviderAvailable),
        };

        let model_id = request.model.unwrap_or_else(|| self.model_id(provider));
        let base_url = request.base_url.or_else(|| self.base_urls.get(&provider).cloned());
        let entry = self.keys.next_credential(provider)?;
        let credential = entry.display_name();
        let handle = provider.build_model(model_id, entry.key.clone(), base_url);

        debug!(%provider, model = %handle.model_id, %credential, "Created model handle");
        Ok(CreatedModel { handle, credential })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::CredentialEntry;

    fn registry(order: Option<Vec<Provider>>) -> ProviderRegistry {
        let mut keys = KeyPool::new();
        keys.add_credentials(Provider::Groq, [CredentialEntry::new("g1"), CredentialEntry::new("g2")]);
        keys.add_credentials(Provider::Cerebras, [CredentialEntry::new("c1")]);
        ProviderRegistry::new(keys, order)
    }

    #[test]
    fn default_order_is_providers_with_keys() {
        let reg = registry(None);
        assert_eq!(reg.provider_order(), vec![Provider::Groq, Provider::Cerebras]);
    }

    #[test]
    fn provider_order_is_returned_as_a_copy() {
        let mut reg = registry(None);
        let mut copy = reg.provider_order();
        copy.clear();
        assert_eq!(reg.provider_order().len(), 2);

        reg.set_provider_order(vec![Provider::Cerebras]);
        assert_eq!(reg.provider_order(), vec![Provider::Cerebras]);
    }

    #[test]
    fn create_model_uses_first_provider_and_rotates_keys() {
        let mut reg = registry(None);
        let first = reg.create_model(None).unwrap();
        let second = reg.create_model(None).unwrap();
        assert_eq!(first.handle.provider, Provider::Groq);
        assert_eq!(first.handle.model_id, "openai/gpt-oss-120b");
        assert_eq!(first.handle.api_key, "g1");
        assert_eq!(second.handle.api_key, "g2");
        assert_eq!(
            first.handle.api,
            Api::ChatCompletions {
                base_url: "https://api.groq.com/openai/v1".into()
            }
        );
    }

    #[test]
    fn explicit_request_overrides_model_and_base_url() {
        let mut reg = registry(None);
        let created = reg
            .create_model(Some(ModelRequest {
                provider: Some(Provider::Cerebras),
                model: Some("llama-3.3-70b".into()),
                base_url: Some("http://localhost:9000/v1/".into()),
            }))
            .unwrap();
        assert_eq!(created.handle.model_id, "llama-3.3-70b");
        assert_eq!(
            created.handle.api,
            Api::ChatCompletions {
                base_url: "http://localhost:9000/v1".into()
            }
        );
    }

    #[test]
    fn model_override_applies_to_provider() {
        let mut reg = registry(None);
        reg.set_model(Provider::Groq, "llama-3.1-8b-instant");
        let created = reg.create_model(Some(ModelRequest::for_provider(Provider::Groq))).unwrap();
        assert_eq!(created.handle.model_id, "llama-3.1-8b-instant");
    }

    #[test]
    fn empty_order_fails_with_no_provider_available() {
        let mut reg = ProviderRegistry::new(KeyPool::new(), None);
        assert!(matches!(reg.create_model(None), Err(ExtractorError::NoProviderAvailable)));
    }

    #[test]
    fn provider_without_keys_fails_with_no_credentials() {
        let mut reg = registry(None);
        let err = reg.create_model(Some(ModelRequest::for_provider(Provider::Google))).unwrap_err();
        assert!(matches!(err, ExtractorError::NoCredentials { provider: Provider::Google, .. }));
    }

    #[test]
    fn google_builds_a_generate_content_handle() {
        let handle = Provider::Google.build_model("gemini-2.0-flash".into(), "k".into(), None);
        assert_eq!(
            handle.api,
            Api::GenerateContent {
                base_url: "https://generativelanguage.googleapis.com/v1beta".into()
            }
        );
        assert!(!format!("{handle:?}").contains("\"k\""));
    }

    #[test]
    fn provider_parses_from_str() {
        assert_eq!("Groq".parse::<Provider>().unwrap(), Provider::Groq);
        assert_eq!(" gemini ".parse::<Provider>().unwrap(), Provider::Google);
        assert!("openai".parse::<Provider>().is_err());
    }
}
