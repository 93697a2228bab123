//! Credential pool with per-provider round-robin rotation.
//!
//! Every provider owns an ordered list of API keys. Each draw returns the next
//! key in registration order and wraps around, so consecutive calls spread load
//! across keys that are rate limited independently.

use crate::error::ExtractorError;
use crate::provider::Provider;
use std::collections::HashMap;
use std::fmt;
use tracing::{debug, info};

/// Highest numbered variant scanned by [`KeyPool::load_from`] (`PREFIX_1` … `PREFIX_20`).
pub const MAX_NUMBERED_KEYS: usize = 20;

/// A single API key plus an optional label such as the env var it came from.
#[derive(Clone, PartialEq, Eq)]
pub struct CredentialEntry {
    pub key: String,
    pub label: Option<String>,
}

impl CredentialEntry {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            label: None,
        }
    }

    pub fn labeled(key: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            label: Some(label.into()),
        }
    }

    /// Label if present, otherwise a redacted hint of the key.
    pub fn display_name(&self) -> String {
        match &self.label {
            Some(label) => label.clone(),
            None => format!("key…{}", key_suffix(&self.key)),
        }
    }
}

impl fmt::Debug for CredentialEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialEntry")
            .field("key", &"<redacted>")
            .field("label", &self.label)
            .finish()
    }
}

fn key_suffix(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    let start = chars.len().saturating_sub(4);
    chars[start..].iter().collect()
}

/// Owns every registered credential and the rotation index of each provider.
#[derive(Debug, Default)]
pub struct KeyPool {
    keys: HashMap<Provider, Vec<CredentialEntry>>,
    indices: HashMap<Provider, usize>,
    discovered: Vec<Provider>,
}

impl KeyPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append credentials to a provider. Never resets the rotation index.
    pub fn add_credentials(&mut self, provider: Provider, entries: impl IntoIterator<Item = CredentialEntry>) {
        let list = self.keys.entry(provider).or_default();
        let before = list.len();
        list.extend(entries);
        if list.is_empty() {
            return;
        }
        self.indices.entry(provider).or_insert(0);
        if !self.discovered.contains(&provider) {
            self.discovered.push(provider);
        }
        debug!(%provider, added = list.len() - before, total = list.len(), "Registered credentials");
    }

    /// Next credential in round-robin order; advances the rotation index.
    pub fn next_credential(&mut self, provider: Provider) -> Result<&CredentialEntry, ExtractorError> {
        let entries = match self.keys.get(&provider) {
            Some(entries) if !entries.is_empty() => entries,
            _ => return Err(ExtractorError::no_credentials(provider)),
        };
        let index = self.indices.entry(provider).or_insert(0);
        let current = *index % entries.len();
        *index = (current + 1) % entries.len();
        Ok(&entries[current])
    }

    pub fn credential_count(&self, provider: Provider) -> usize {
        self.keys.get(&provider).map_or(0, Vec::len)
    }

    pub fn has_credentials(&self, provider: Provider) -> bool {
        self.credential_count(provider) > 0
    }

    /// Providers with at least one credential, in the order they were first registered.
    pub fn available_providers(&self) -> Vec<Provider> {
        self.discovered
            .iter()
            .copied()
            .filter(|p| self.has_credentials(*p))
            .collect()
    }

    /// Load `PREFIX` and `PREFIX_1..PREFIX_20` for every provider through `lookup`.
    /// Empty values are ignored.
    pub fn load_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        for provider in Provider::ALL {
            let prefix = provider.env_prefix();
            let names = std::iter::once(prefix.to_string())
                .chain((1..=MAX_NUMBERED_KEYS).map(|i| format!("{prefix}_{i}")));

            let entries: Vec<CredentialEntry> = names
                .filter_map(|name| {
                    lookup(&name)
                        .filter(|v| !v.trim().is_empty())
                        .map(|v| CredentialEntry::labeled(v.trim(), name))
                })
                .collect();

            if !entries.is_empty() {
                info!(%provider, count = entries.len(), "Loaded API keys");
                self.add_credentials(provider, entries);
            }
        }
    }

    pub fn load_from_env(&mut self) {
        self.load_from(|name| std::env::var(name).ok());
    }
}
