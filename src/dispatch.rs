//! Dispatch strategies over the enabled-provider snapshot
//!
//! Fan-out launches one task per enabled provider and joins them all
//! before returning; fallback walks providers in priority order until one
//! succeeds. Individual provider failures are recovered locally and
//! surfaced as data inside a [`ProviderResponse`] — only systemic
//! conditions (nothing enabled, everything failed) propagate as errors.
//!
//! Every adapter call runs under a bounded deadline so one hung provider
//! cannot stall the fan-out join indefinitely.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::adapter::{AdapterSet, ChatMessage, ProviderError, ProviderFault};
use crate::registry::ProviderConfig;
use crate::tracker::PerformanceTracker;

/// Error type for dispatch operations
#[derive(Debug, Clone, thiserror::Error)]
pub enum DispatchError {
    #[error("no providers enabled")]
    NoProvidersEnabled,

    #[error("all {attempted} providers failed; last: {last}")]
    AllProvidersFailed {
        attempted: usize,
        last: ProviderError,
    },
}

/// Result type for dispatch operations
pub type DispatchResult<T> = Result<T, DispatchError>;

/// Outcome of one dispatch attempt against one provider.
///
/// Exactly one of these is produced per attempt; `error` is present if and
/// only if the call failed, in which case `text` is empty. Immutable once
/// created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderResponse {
    pub provider: String,
    pub model: String,
    pub text: String,
    /// Wall-clock milliseconds from dispatch to completion.
    pub latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ProviderError>,
}

impl ProviderResponse {
    pub fn success(
        provider: impl Into<String>,
        model: impl Into<String>,
        text: impl Into<String>,
        latency_ms: u64,
    ) -> Self {
        Self {
            provider: provider.into(),
            model: model.into(),
            text: text.into(),
            latency_ms,
            error: None,
        }
    }

    pub fn failure(
        provider: impl Into<String>,
        model: impl Into<String>,
        error: ProviderError,
        latency_ms: u64,
    ) -> Self {
        Self {
            provider: provider.into(),
            model: model.into(),
            text: String::new(),
            latency_ms,
            error: Some(error),
        }
    }

    /// Whether this response can participate in consensus: no error and
    /// non-empty text after trimming.
    pub fn is_valid(&self) -> bool {
        self.error.is_none() && !self.text.trim().is_empty()
    }
}

/// Dispatcher tuning knobs.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Deadline for a single adapter call in either mode.
    pub call_timeout: Duration,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            call_timeout: Duration::from_secs(30),
        }
    }
}

/// Fans requests out to adapters and feeds the performance tracker.
pub struct Dispatcher {
    adapters: AdapterSet,
    tracker: Arc<PerformanceTracker>,
    config: DispatchConfig,
}

impl Dispatcher {
    pub fn new(adapters: AdapterSet, tracker: Arc<PerformanceTracker>) -> Self {
        Self {
            adapters,
            tracker,
            config: DispatchConfig::default(),
        }
    }

    pub fn with_config(mut self, config: DispatchConfig) -> Self {
        self.config = config;
        self
    }

    /// Query every enabled provider concurrently and wait for all of them.
    ///
    /// Responses come back in the same order as `providers`, independent of
    /// completion order — the consensus tie-break depends on that stable
    /// ordering. Failures are captured, never thrown; the only error here
    /// is an empty provider snapshot, raised before any task is launched.
    pub async fn fan_out(
        &self,
        providers: &[ProviderConfig],
        messages: &[ChatMessage],
        max_tokens: u32,
    ) -> DispatchResult<Vec<ProviderResponse>> {
        if providers.is_empty() {
            return Err(DispatchError::NoProvidersEnabled);
        }

        info!(providers = providers.len(), "fan-out dispatch starting");

        let messages: Arc<Vec<ChatMessage>> = Arc::new(messages.to_vec());
        let mut handles = Vec::with_capacity(providers.len());
        for provider in providers.iter().cloned() {
            let adapters = self.adapters.clone();
            let messages = Arc::clone(&messages);
            let timeout = self.config.call_timeout;
            handles.push(tokio::spawn(async move {
                run_attempt(&adapters, &provider, &messages, max_tokens, timeout).await
            }));
        }

        // Wait-for-all barrier: no task is dropped, one slow or failed
        // provider does not lose the others' results.
        let joined = futures::future::join_all(handles).await;

        let mut responses = Vec::with_capacity(providers.len());
        for (provider, outcome) in providers.iter().zip(joined) {
            let response = match outcome {
                Ok(response) => response,
                Err(e) => ProviderResponse::failure(
                    &provider.name,
                    &provider.model,
                    ProviderError::new(
                        &provider.name,
                        ProviderFault::Network(format!("dispatch task failed: {e}")),
                    ),
                    0,
                ),
            };
            self.tracker
                .record(&response.provider, response.error.is_none(), response.latency_ms);
            responses.push(response);
        }

        let failures = responses.iter().filter(|r| r.error.is_some()).count();
        info!(
            providers = responses.len(),
            failures, "fan-out dispatch complete"
        );

        Ok(responses)
    }

    /// Try providers sequentially in priority order, returning the first
    /// successful response text.
    ///
    /// Failed predecessors are recorded in the tracker; providers after the
    /// first success are never called and never recorded.
    pub async fn fallback(
        &self,
        providers: &[ProviderConfig],
        messages: &[ChatMessage],
        max_tokens: u32,
    ) -> DispatchResult<String> {
        if providers.is_empty() {
            return Err(DispatchError::NoProvidersEnabled);
        }

        let mut attempted = 0;
        let mut last: Option<ProviderError> = None;
        for provider in providers {
            attempted += 1;
            let response = run_attempt(
                &self.adapters,
                provider,
                messages,
                max_tokens,
                self.config.call_timeout,
            )
            .await;
            self.tracker
                .record(&response.provider, response.error.is_none(), response.latency_ms);

            match response.error {
                None => {
                    info!(
                        provider = %provider.name,
                        latency_ms = response.latency_ms,
                        "fallback dispatch succeeded"
                    );
                    return Ok(response.text);
                }
                Some(error) => {
                    warn!(provider = %provider.name, %error, "fallback provider failed, trying next");
                    last = Some(error);
                }
            }
        }

        match last {
            Some(last) => Err(DispatchError::AllProvidersFailed { attempted, last }),
            // Unreachable with a non-empty snapshot, kept total.
            None => Err(DispatchError::NoProvidersEnabled),
        }
    }
}

/// Execute one timed adapter call, capturing any failure as data.
async fn run_attempt(
    adapters: &AdapterSet,
    provider: &ProviderConfig,
    messages: &[ChatMessage],
    max_tokens: u32,
    timeout: Duration,
) -> ProviderResponse {
    let started = Instant::now();

    let adapter = match adapters.resolve(&provider.name) {
        Ok(adapter) => adapter,
        Err(error) => {
            warn!(provider = %provider.name, "no adapter registered");
            return ProviderResponse::failure(
                &provider.name,
                &provider.model,
                error,
                started.elapsed().as_millis() as u64,
            );
        }
    };

    let outcome = tokio::time::timeout(timeout, adapter.call(provider, messages, max_tokens)).await;
    let latency_ms = started.elapsed().as_millis() as u64;

    match outcome {
        Ok(Ok(text)) => {
            debug!(provider = %provider.name, latency_ms, "provider call succeeded");
            ProviderResponse::success(&provider.name, &provider.model, text, latency_ms)
        }
        Ok(Err(error)) => {
            debug!(provider = %provider.name, latency_ms, %error, "provider call failed");
            ProviderResponse::failure(&provider.name, &provider.model, error, latency_ms)
        }
        Err(_) => {
            let deadline_ms = timeout.as_millis() as u64;
            warn!(provider = %provider.name, deadline_ms, "provider call timed out");
            ProviderResponse::failure(
                &provider.name,
                &provider.model,
                ProviderError::new(&provider.name, ProviderFault::DeadlineExceeded(deadline_ms)),
                latency_ms,
            )
        }
    }
}
