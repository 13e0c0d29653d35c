//! Error types for the assistant.

use crate::llm::ProxyError;

/// Top-level error type for the assistant.
///
/// Side-effecting boundaries (shell, automation, search) never surface these;
/// they convert their failures into [`crate::dispatch::ExecResult`] so the
/// conversation always receives a displayable outcome.
#[derive(Debug, thiserror::Error)]
pub enum AssistantError {
    /// Missing or malformed request input. Never reaches an executor.
    #[error("invalid input: {0}")]
    Validation(String),

    /// A request is already in flight for this chat session.
    #[error("a request is already in progress")]
    Busy,

    /// The hosted completion API failed.
    #[error("model error: {0}")]
    Llm(#[from] ProxyError),

    /// Chat session lookup or persistence error.
    #[error("session error: {0}")]
    Session(String),

    /// Local state persistence error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl AssistantError {
    /// Short text suitable for an assistant chat bubble.
    pub fn user_message(&self) -> String {
        match self {
            Self::Validation(reason) => format!("I couldn't process that: {reason}."),
            Self::Busy => "I'm still working on your last request.".to_owned(),
            Self::Llm(e) => e.friendly_message().to_owned(),
            Self::Session(_) | Self::Storage(_) | Self::Io(_) => {
                "Something went wrong saving our conversation.".to_owned()
            }
            Self::Config(reason) => format!("My configuration looks wrong: {reason}."),
        }
    }
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, AssistantError>;
