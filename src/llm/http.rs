//! OpenAI-compatible chat-completions proxy.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, warn};

use super::persona::{SYSTEM_PROMPT, strip_static_greeting};
use super::{ChatMessage, ModelProxy, ProxyError};
use crate::config::LlmConfig;

/// Posts transcripts to `{base_url}/v1/chat/completions`.
pub struct HttpModelProxy {
    config: LlmConfig,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl std::fmt::Debug for HttpModelProxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpModelProxy")
            .field("model", &self.config.model)
            .field("base_url", &self.config.base_url)
            .field("has_key", &self.api_key.is_some())
            .finish()
    }
}

impl HttpModelProxy {
    /// Build a proxy, reading the API key from the configured env var.
    pub fn from_config(config: LlmConfig) -> Result<Self, ProxyError> {
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty());
        Self::with_api_key(config, api_key)
    }

    /// Build a proxy with an explicit key.
    pub fn with_api_key(config: LlmConfig, api_key: Option<String>) -> Result<Self, ProxyError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ProxyError::Other(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            config,
            api_key,
            client,
        })
    }

    fn build_body(&self, messages: &[ChatMessage]) -> serde_json::Value {
        let mut wire = Vec::with_capacity(messages.len() + 1);
        wire.push(json!({ "role": "system", "content": SYSTEM_PROMPT }));
        wire.extend(
            strip_static_greeting(messages)
                .iter()
                .map(|m| json!({ "role": m.role.to_string(), "content": m.content })),
        );
        json!({
            "model": self.config.model,
            "messages": wire,
            "max_tokens": self.config.max_tokens,
            "temperature": self.config.temperature,
        })
    }

    /// Map an HTTP error status to the appropriate [`ProxyError`].
    fn map_http_error(status: reqwest::StatusCode, body: &str) -> ProxyError {
        let message = extract_error_message(body);
        match status.as_u16() {
            401 | 403 => ProxyError::Auth(format!("authentication failed: {message}")),
            429 => ProxyError::RateLimited(format!("rate limited: {message}")),
            code => match ProxyError::classify(message) {
                ProxyError::Other(m) => ProxyError::Other(format!("HTTP {code}: {m}")),
                classified => classified,
            },
        }
    }
}

/// Extract an error message from an OpenAI-style error body.
fn extract_error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.get("error")
                .and_then(|e| e.get("message"))
                .and_then(|m| m.as_str())
                .map(String::from)
        })
        .unwrap_or_else(|| body.to_string())
}

#[async_trait]
impl ModelProxy for HttpModelProxy {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, ProxyError> {
        let Some(api_key) = self.api_key.as_deref() else {
            return Err(ProxyError::Auth(format!(
                "no API key in ${}",
                self.config.api_key_env
            )));
        };

        let url = format!(
            "{}/v1/chat/completions",
            self.config.base_url.trim_end_matches('/')
        );
        let body = self.build_body(messages);
        debug!(model = %self.config.model, turns = messages.len(), "sending completion request");

        let response = self
            .client
            .post(&url)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() || e.is_connect() {
                    ProxyError::Network(format!("request failed: {e}"))
                } else {
                    ProxyError::Other(format!("request failed: {e}"))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            let err = Self::map_http_error(status, &body_text);
            warn!(code = err.code(), status = status.as_u16(), "completion request failed");
            return Err(err);
        }

        let value: serde_json::Value = response
            .json()
            .await
            .map_err(|e| ProxyError::Other(format!("invalid response body: {e}")))?;

        value
            .pointer("/choices/0/message/content")
            .and_then(|c| c.as_str())
            .map(str::to_owned)
            .ok_or_else(|| ProxyError::Other("response has no message content".into()))
    }
}
