//! OpenAI-compatible HTTP chat adapter
//!
//! Speaks the `/chat/completions` request shape against whatever endpoint
//! the provider config names, with bearer auth. Vendors exposing an
//! OpenAI-compatible surface (OpenAI, DeepSeek, Gemini's compat endpoint,
//! most gateways) can all sit behind this one adapter; anything else gets
//! its own `ChatAdapter` implementation.

use async_trait::async_trait;
use reqwest::StatusCode;
use tracing::debug;

use super::{ChatAdapter, ChatMessage, ProviderError, ProviderFault};
use crate::registry::ProviderConfig;

pub struct HttpChatAdapter {
    client: reqwest::Client,
}

impl HttpChatAdapter {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    /// Reuse an existing client (connection pooling across adapters).
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl Default for HttpChatAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChatAdapter for HttpChatAdapter {
    async fn call(
        &self,
        provider: &ProviderConfig,
        messages: &[ChatMessage],
        max_tokens: u32,
    ) -> Result<String, ProviderError> {
        // Fail before any I/O so the attributed latency stays near zero.
        let credential = provider.credential.as_deref().ok_or_else(|| {
            ProviderError::new(&provider.name, ProviderFault::MissingCredential)
        })?;

        let body = serde_json::json!({
            "model": provider.model,
            "messages": messages,
            "max_tokens": max_tokens,
        });

        debug!(provider = %provider.name, model = %provider.model, "sending chat completion request");

        let response = self
            .client
            .post(&provider.endpoint)
            .bearer_auth(credential)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                ProviderError::new(&provider.name, ProviderFault::Network(e.to_string()))
            })?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            let detail = response.text().await.unwrap_or_default();
            return Err(ProviderError::new(
                &provider.name,
                ProviderFault::Auth(format!("{status}: {detail}")),
            ));
        }
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(ProviderError::new(&provider.name, ProviderFault::RateLimited));
        }
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(ProviderError::new(
                &provider.name,
                ProviderFault::Network(format!("unexpected status {status}: {detail}")),
            ));
        }

        let parsed: serde_json::Value = response.json().await.map_err(|e| {
            ProviderError::new(&provider.name, ProviderFault::MalformedResponse(e.to_string()))
        })?;

        let content = parsed["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| {
                ProviderError::new(
                    &provider.name,
                    ProviderFault::MalformedResponse(
                        "missing choices[0].message.content".to_string(),
                    ),
                )
            })?;

        Ok(content.to_string())
    }
}
