//! Provider Registry — configured backends and their runtime mutation
//!
//! Pure state container: identity, priority, enabled flag, credential, and
//! endpoint for each configured backend. Dispatch reads the registry
//! concurrently with potential configuration changes from a UI thread, so
//! every read returns a cloned snapshot behind an `RwLock` rather than a
//! live view that could observe a half-applied mutation.

use serde::{Deserialize, Serialize};
use std::sync::RwLock;
use tracing::debug;

/// Error type for registry mutations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("provider not found: {0}")]
    NotFound(String),
}

/// Result type for registry operations
pub type RegistryResult<T> = Result<T, RegistryError>;

/// A configured AI backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Unique name identifying the provider within the registry.
    pub name: String,
    /// Backend-specific model identifier.
    pub model: String,
    /// Dispatch priority, 1 = highest. Ties are allowed; ordering among
    /// tied providers follows insertion order.
    pub priority: u8,
    /// Disabled providers are skipped by both dispatch modes.
    pub enabled: bool,
    /// Opaque secret; absent until configured.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,
    /// Address the adapter should call for this provider.
    pub endpoint: String,
}

impl ProviderConfig {
    pub fn new(
        name: impl Into<String>,
        model: impl Into<String>,
        priority: u8,
        endpoint: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            model: model.into(),
            priority,
            enabled: true,
            credential: None,
            endpoint: endpoint.into(),
        }
    }

    /// Builder-style credential assignment, used when seeding from env.
    pub fn with_credential(mut self, credential: Option<String>) -> Self {
        self.credential = credential;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

/// Partial update applied by [`ProviderRegistry::reconfigure`].
///
/// `None` fields are left unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderUpdate {
    pub model: Option<String>,
    pub priority: Option<u8>,
    pub enabled: Option<bool>,
    pub credential: Option<String>,
    pub endpoint: Option<String>,
}

/// Registry of configured providers.
///
/// Providers are created at construction and never deleted; disabling is
/// the deletion substitute. Names are unique — duplicate names in the
/// initial set are dropped, first occurrence wins.
pub struct ProviderRegistry {
    providers: RwLock<Vec<ProviderConfig>>,
}

impl ProviderRegistry {
    /// Create a registry from an explicit provider set.
    pub fn new(configs: Vec<ProviderConfig>) -> Self {
        let mut providers: Vec<ProviderConfig> = Vec::with_capacity(configs.len());
        for config in configs {
            if providers.iter().any(|p| p.name == config.name) {
                debug!(provider = %config.name, "duplicate provider name ignored");
                continue;
            }
            providers.push(config);
        }
        Self {
            providers: RwLock::new(providers),
        }
    }

    /// Create an empty registry (embedding and tests).
    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    /// Create a registry pre-populated with the default provider set,
    /// seeding credentials from the environment where present.
    pub fn with_defaults() -> Self {
        Self::new(vec![
            ProviderConfig::new("openai", "gpt-4o", 1, "https://api.openai.com/v1/chat/completions")
                .with_credential(std::env::var("OPENAI_API_KEY").ok()),
            ProviderConfig::new(
                "anthropic",
                "claude-sonnet-4",
                2,
                "https://api.anthropic.com/v1/messages",
            )
            .with_credential(std::env::var("ANTHROPIC_API_KEY").ok()),
            ProviderConfig::new(
                "gemini",
                "gemini-1.5-pro",
                3,
                "https://generativelanguage.googleapis.com/v1beta/openai/chat/completions",
            )
            .with_credential(std::env::var("GEMINI_API_KEY").ok()),
            ProviderConfig::new(
                "deepseek",
                "deepseek-chat",
                4,
                "https://api.deepseek.com/chat/completions",
            )
            .with_credential(std::env::var("DEEPSEEK_API_KEY").ok())
            .disabled(),
        ])
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Vec<ProviderConfig>> {
        self.providers.read().unwrap_or_else(|p| p.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Vec<ProviderConfig>> {
        self.providers.write().unwrap_or_else(|p| p.into_inner())
    }

    /// Snapshot of every configured provider, in insertion order.
    pub fn list_all(&self) -> Vec<ProviderConfig> {
        self.read().clone()
    }

    /// Snapshot of enabled providers sorted ascending by priority.
    ///
    /// The sort is stable, so priority ties keep insertion order — the
    /// consensus tie-break relies on this being deterministic.
    pub fn list_enabled(&self) -> Vec<ProviderConfig> {
        let mut enabled: Vec<ProviderConfig> =
            self.read().iter().filter(|p| p.enabled).cloned().collect();
        enabled.sort_by_key(|p| p.priority);
        enabled
    }

    /// Look up a single provider by name.
    pub fn get(&self, name: &str) -> Option<ProviderConfig> {
        self.read().iter().find(|p| p.name == name).cloned()
    }

    fn mutate<F>(&self, name: &str, apply: F) -> RegistryResult<()>
    where
        F: FnOnce(&mut ProviderConfig),
    {
        let mut providers = self.write();
        match providers.iter_mut().find(|p| p.name == name) {
            Some(provider) => {
                apply(provider);
                Ok(())
            }
            None => Err(RegistryError::NotFound(name.to_string())),
        }
    }

    /// Enable or disable a provider. Idempotent.
    pub fn set_enabled(&self, name: &str, enabled: bool) -> RegistryResult<()> {
        debug!(provider = name, enabled, "set_enabled");
        self.mutate(name, |p| p.enabled = enabled)
    }

    /// Store or replace a provider's credential. Idempotent.
    pub fn set_credential(&self, name: &str, credential: impl Into<String>) -> RegistryResult<()> {
        let credential = credential.into();
        debug!(provider = name, "set_credential");
        self.mutate(name, move |p| p.credential = Some(credential))
    }

    /// Apply a partial configuration update.
    pub fn reconfigure(&self, name: &str, update: ProviderUpdate) -> RegistryResult<()> {
        debug!(provider = name, "reconfigure");
        self.mutate(name, move |p| {
            if let Some(model) = update.model {
                p.model = model;
            }
            if let Some(priority) = update.priority {
                p.priority = priority;
            }
            if let Some(enabled) = update.enabled {
                p.enabled = enabled;
            }
            if let Some(credential) = update.credential {
                p.credential = Some(credential);
            }
            if let Some(endpoint) = update.endpoint {
                p.endpoint = endpoint;
            }
        })
    }

    /// Number of configured providers.
    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }
}
