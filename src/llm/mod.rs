//! Hosted model proxy.
//!
//! The assistant never talks to a completion API directly. It hands a
//! transcript to a [`ModelProxy`], which prepends the persona prompt and
//! returns the raw reply text, tags included. [`http::HttpModelProxy`] is the
//! OpenAI-compatible implementation.

pub mod http;
pub mod persona;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use http::HttpModelProxy;

/// Stable error codes for programmatic handling.
pub mod error_codes {
    /// The provider is throttling requests.
    pub const RATE_LIMITED: &str = "RATE_LIMITED";
    /// Missing or rejected API key.
    pub const AUTH_FAILED: &str = "AUTH_FAILED";
    /// Connection failure or timeout.
    pub const NETWORK_ERROR: &str = "NETWORK_ERROR";
    /// Anything else the provider reported.
    pub const PROVIDER_ERROR: &str = "PROVIDER_ERROR";
}

/// Errors from the model proxy.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ProxyError {
    #[error("[{}] {}", error_codes::RATE_LIMITED, .0)]
    RateLimited(String),

    #[error("[{}] {}", error_codes::AUTH_FAILED, .0)]
    Auth(String),

    #[error("[{}] {}", error_codes::NETWORK_ERROR, .0)]
    Network(String),

    #[error("[{}] {}", error_codes::PROVIDER_ERROR, .0)]
    Other(String),
}

impl ProxyError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::RateLimited(_) => error_codes::RATE_LIMITED,
            Self::Auth(_) => error_codes::AUTH_FAILED,
            Self::Network(_) => error_codes::NETWORK_ERROR,
            Self::Other(_) => error_codes::PROVIDER_ERROR,
        }
    }

    /// Text shown to the user in place of a reply.
    pub fn friendly_message(&self) -> &'static str {
        match self {
            Self::RateLimited(_) => {
                "I'm getting too many requests right now. Give me a moment and try again."
            }
            Self::Auth(_) => "I can't reach my language service. Check that the API key is set.",
            Self::Network(_) => "I couldn't connect. Check your internet connection and try again.",
            Self::Other(_) => "Sorry, something went wrong on my end. Please try again.",
        }
    }

    /// Classify a failure from its message text when no status is available.
    pub fn classify(message: impl Into<String>) -> Self {
        let message = message.into();
        let lower = message.to_lowercase();
        if lower.contains("rate limit") || lower.contains("429") {
            Self::RateLimited(message)
        } else if lower.contains("api key") || lower.contains("401") || lower.contains("403") {
            Self::Auth(message)
        } else if lower.contains("network") || lower.contains("timed out") || lower.contains("connect") {
            Self::Network(message)
        } else {
            Self::Other(message)
        }
    }
}

/// Author of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

impl std::fmt::Display for ChatRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
        }
    }
}

/// One transcript entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
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

/// Forwards a transcript to a hosted model and returns its raw reply.
#[async_trait]
pub trait ModelProxy: Send + Sync {
    /// Complete the conversation. The persona prompt is added by the proxy.
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, ProxyError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_code() {
        let err = ProxyError::Auth("missing key".into());
        assert_eq!(err.to_string(), "[AUTH_FAILED] missing key");
        assert_eq!(err.code(), error_codes::AUTH_FAILED);
    }

    #[test]
    fn classify_by_message() {
        assert!(matches!(
            ProxyError::classify("Rate limit reached for requests"),
            ProxyError::RateLimited(_)
        ));
        assert!(matches!(
            ProxyError::classify("Incorrect API key provided"),
            ProxyError::Auth(_)
        ));
        assert!(matches!(
            ProxyError::classify("operation timed out"),
            ProxyError::Network(_)
        ));
        assert!(matches!(
            ProxyError::classify("model overloaded"),
            ProxyError::Other(_)
        ));
    }

    #[test]
    fn friendly_messages_are_distinct() {
        let all = [
            ProxyError::RateLimited(String::new()),
            ProxyError::Auth(String::new()),
            ProxyError::Network(String::new()),
            ProxyError::Other(String::new()),
        ];
        let mut texts: Vec<_> = all.iter().map(ProxyError::friendly_message).collect();
        texts.sort_unstable();
        texts.dedup();
        assert_eq!(texts.len(), 4);
    }

    #[test]
    fn chat_message_serializes_lowercase_role() {
        let json = serde_json::to_string(&ChatMessage::user("hi")).unwrap_or_default();
        assert_eq!(json, r#"{"role":"user","content":"hi"}"#);
    }
}
