//! Backend Adapter contract
//!
//! Each provider family sits behind the uniform [`ChatAdapter`] capability
//! interface, and an [`AdapterSet`] maps provider names to adapter
//! instances. Dispatch resolves adapters through the set instead of
//! branching on vendor strings; an unregistered provider name is a
//! configuration error ([`ProviderFault::NoAdapter`]), never a panic.
//!
//! Adapters are stateless per call: no call depends on a prior one.

mod http;

pub use http::HttpChatAdapter;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use crate::registry::ProviderConfig;

/// Role of a message in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

/// A single conversation message.
///
/// The engine only ever builds an optional system message followed by one
/// user message, but adapters accept any ordered sequence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// Underlying cause of a failed adapter call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderFault {
    #[error("authentication rejected: {0}")]
    Auth(String),

    #[error("network failure: {0}")]
    Network(String),

    #[error("malformed response: {0}")]
    MalformedResponse(String),

    #[error("rate limited")]
    RateLimited,

    #[error("credential not configured")]
    MissingCredential,

    #[error("no adapter registered for this provider")]
    NoAdapter,

    #[error("call exceeded deadline of {0} ms")]
    DeadlineExceeded(u64),
}

/// A single adapter call failed.
///
/// Always captured into a `ProviderResponse` by fan-out dispatch; it only
/// surfaces directly from sequential fallback when every provider failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
#[error("provider '{provider}' failed: {fault}")]
pub struct ProviderError {
    pub provider: String,
    pub fault: ProviderFault,
}

impl ProviderError {
    pub fn new(provider: impl Into<String>, fault: ProviderFault) -> Self {
        Self {
            provider: provider.into(),
            fault,
        }
    }
}

/// Uniform capability interface over one AI backend.
#[async_trait]
pub trait ChatAdapter: Send + Sync {
    /// Turn a conversation into this provider's call and return raw
    /// response text.
    ///
    /// A missing required credential must be reported as
    /// [`ProviderFault::MissingCredential`] before any I/O, so the
    /// attributed latency stays near zero.
    async fn call(
        &self,
        provider: &ProviderConfig,
        messages: &[ChatMessage],
        max_tokens: u32,
    ) -> Result<String, ProviderError>;
}

/// Mapping from provider name to adapter instance.
#[derive(Clone, Default)]
pub struct AdapterSet {
    adapters: HashMap<String, Arc<dyn ChatAdapter>>,
}

impl AdapterSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an adapter set serving every named provider through the
    /// OpenAI-compatible HTTP adapter.
    pub fn openai_compatible<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let adapter: Arc<dyn ChatAdapter> = Arc::new(HttpChatAdapter::new());
        let mut set = Self::new();
        for name in names {
            set.insert(name, Arc::clone(&adapter));
        }
        set
    }

    /// Register an adapter for a provider name (builder style).
    pub fn register(mut self, name: impl Into<String>, adapter: Arc<dyn ChatAdapter>) -> Self {
        self.insert(name, adapter);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, adapter: Arc<dyn ChatAdapter>) {
        self.adapters.insert(name.into(), adapter);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ChatAdapter>> {
        self.adapters.get(name).cloned()
    }

    /// Resolve an adapter, reporting an unregistered name as a provider
    /// fault rather than a crash.
    pub fn resolve(&self, name: &str) -> Result<Arc<dyn ChatAdapter>, ProviderError> {
        self.get(name)
            .ok_or_else(|| ProviderError::new(name, ProviderFault::NoAdapter))
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}
