//! Engine facade — the external surface of the consensus engine
//!
//! Ties the provider registry, dispatcher, consensus evaluation, and
//! performance tracker together behind the interface callers (UI pages,
//! background agents) consume: list/mutate providers, dispatch in
//! consensus or fallback mode, record feedback, read stats.

use std::sync::Arc;

use tracing::info;

use crate::adapter::{AdapterSet, ChatMessage};
use crate::consensus::{self, ConsensusResult};
use crate::dispatch::{DispatchConfig, DispatchResult, Dispatcher};
use crate::registry::{ProviderConfig, ProviderRegistry, ProviderUpdate, RegistryResult};
use crate::tracker::{PerformanceTracker, ProviderStats};

/// Multi-provider AI response consensus engine.
///
/// Dispatches a prompt to several independently-configured backends,
/// tolerates partial failure, and synthesizes a single trusted answer with
/// a confidence score and auditable voting breakdown.
pub struct QuorumEngine {
    registry: Arc<ProviderRegistry>,
    dispatcher: Dispatcher,
    tracker: Arc<PerformanceTracker>,
}

impl QuorumEngine {
    /// Create an engine over an explicit registry and adapter set.
    pub fn new(registry: Arc<ProviderRegistry>, adapters: AdapterSet) -> Self {
        let tracker = Arc::new(PerformanceTracker::new());
        let dispatcher = Dispatcher::new(adapters, Arc::clone(&tracker));
        Self {
            registry,
            dispatcher,
            tracker,
        }
    }

    /// Create an engine over the default provider set, serving every
    /// default provider through the OpenAI-compatible HTTP adapter.
    pub fn with_defaults() -> Self {
        let registry = Arc::new(ProviderRegistry::with_defaults());
        let names: Vec<String> = registry.list_all().into_iter().map(|p| p.name).collect();
        Self::new(registry, AdapterSet::openai_compatible(names))
    }

    /// Override dispatch tuning (per-call deadline).
    pub fn with_config(mut self, config: DispatchConfig) -> Self {
        self.dispatcher = self.dispatcher.with_config(config);
        self
    }

    /// Snapshot of every configured provider.
    pub fn providers(&self) -> Vec<ProviderConfig> {
        self.registry.list_all()
    }

    pub fn set_provider_enabled(&self, name: &str, enabled: bool) -> RegistryResult<()> {
        self.registry.set_enabled(name, enabled)
    }

    pub fn set_provider_credential(
        &self,
        name: &str,
        credential: impl Into<String>,
    ) -> RegistryResult<()> {
        self.registry.set_credential(name, credential)
    }

    pub fn reconfigure_provider(&self, name: &str, update: ProviderUpdate) -> RegistryResult<()> {
        self.registry.reconfigure(name, update)
    }

    /// Query every enabled provider concurrently and synthesize a
    /// consensus answer.
    ///
    /// Partial provider failure still yields a usable result with reduced
    /// confidence and the failed attempts visible in
    /// [`ConsensusResult::responses`]. The only error is an empty
    /// enabled-provider set.
    pub async fn dispatch_consensus(
        &self,
        prompt: &str,
        system_prompt: Option<&str>,
        max_tokens: u32,
    ) -> DispatchResult<ConsensusResult> {
        let snapshot = self.registry.list_enabled();
        let messages = build_messages(prompt, system_prompt);
        let responses = self
            .dispatcher
            .fan_out(&snapshot, &messages, max_tokens)
            .await?;
        let result = consensus::evaluate(responses, &snapshot);
        info!(
            confidence = result.confidence,
            voters = result.vote_breakdown.len(),
            "consensus dispatch complete"
        );
        Ok(result)
    }

    /// Try enabled providers in priority order and return the first
    /// successful response text.
    pub async fn dispatch_fallback(
        &self,
        prompt: &str,
        system_prompt: Option<&str>,
        max_tokens: u32,
    ) -> DispatchResult<String> {
        let snapshot = self.registry.list_enabled();
        let messages = build_messages(prompt, system_prompt);
        self.dispatcher
            .fallback(&snapshot, &messages, max_tokens)
            .await
    }

    /// Record caller-observed feedback for a provider, optionally with a
    /// 1-5 quality rating.
    pub fn record_feedback(
        &self,
        provider: &str,
        success: bool,
        latency_ms: u64,
        rating: Option<u8>,
    ) {
        match rating {
            Some(rating) => self
                .tracker
                .record_with_rating(provider, success, latency_ms, rating),
            None => self.tracker.record(provider, success, latency_ms),
        }
    }

    /// Snapshot of per-provider performance stats.
    pub fn provider_stats(&self) -> Vec<ProviderStats> {
        self.tracker.stats()
    }

    /// Mean user rating for one provider, if any ratings exist.
    pub fn average_rating(&self, provider: &str) -> Option<f64> {
        self.tracker.average_rating(provider)
    }
}

fn build_messages(prompt: &str, system_prompt: Option<&str>) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(2);
    if let Some(system) = system_prompt {
        messages.push(ChatMessage::system(system));
    }
    messages.push(ChatMessage::user(prompt));
    messages
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_messages_with_system_prompt() {
        let messages = build_messages("question", Some("be terse"));
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].content, "be terse");
        assert_eq!(messages[1].content, "question");
    }

    #[test]
    fn test_build_messages_user_only() {
        let messages = build_messages("question", None);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].content, "question");
    }

    #[test]
    fn test_with_defaults_wires_registry_and_adapters() {
        let engine = QuorumEngine::with_defaults();
        assert_eq!(engine.providers().len(), 4);
        assert!(engine.set_provider_enabled("openai", false).is_ok());
        assert!(engine.set_provider_enabled("unknown", true).is_err());
    }

    #[test]
    fn test_record_feedback_with_and_without_rating() {
        let engine = QuorumEngine::new(Arc::new(ProviderRegistry::empty()), AdapterSet::new());
        engine.record_feedback("p", true, 120, None);
        engine.record_feedback("p", false, 80, Some(4));

        let stats = engine.provider_stats();
        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0].total_queries, 2);
        assert_eq!(stats[0].success_count, 1);
        assert!((stats[0].avg_latency_ms - 100.0).abs() < 1e-9);
        assert_eq!(engine.average_rating("p"), Some(4.0));
    }
}
