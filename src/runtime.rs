//! Events emitted by the assistant for UI and observability.
//!
//! Components never reach for a global UI hook. They receive a [`Notifier`]
//! at construction and emit [`AssistantEvent`]s on it. Without subscribers the
//! events are dropped.

use tokio::sync::broadcast;

use crate::authorization::PromptView;

/// Severity of a transient notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToastLevel {
    Info,
    Success,
    Error,
}

/// Events that describe what the assistant is doing right now.
#[derive(Debug, Clone, PartialEq)]
pub enum AssistantEvent {
    /// Whether a model request is in flight.
    Thinking(bool),
    /// A finished assistant reply.
    Reply {
        /// Text for the chat transcript, tags removed.
        display: String,
        /// Shorter text for speech playback.
        spoken: String,
    },
    /// A command is waiting for the user's consent.
    PermissionPrompt(PromptView),
    /// The pending consent prompt was resolved or replaced.
    PromptClosed,
    /// The task list changed.
    TasksChanged { pending: usize },
    /// A short transient notice.
    Toast { level: ToastLevel, message: String },
}

/// Cloneable handle for emitting [`AssistantEvent`]s.
#[derive(Debug, Clone, Default)]
pub struct Notifier {
    tx: Option<broadcast::Sender<AssistantEvent>>,
}

impl Notifier {
    /// Create a notifier plus its first subscriber.
    pub fn channel(capacity: usize) -> (Self, broadcast::Receiver<AssistantEvent>) {
        let (tx, rx) = broadcast::channel(capacity.max(1));
        (Self { tx: Some(tx) }, rx)
    }

    /// A notifier that drops everything.
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> Option<broadcast::Receiver<AssistantEvent>> {
        self.tx.as_ref().map(broadcast::Sender::subscribe)
    }

    pub fn emit(&self, event: AssistantEvent) {
        if let Some(tx) = &self.tx {
            // No receivers is fine.
            let _ = tx.send(event);
        }
    }

    pub fn toast(&self, level: ToastLevel, message: impl Into<String>) {
        self.emit(AssistantEvent::Toast {
            level,
            message: message.into(),
        });
    }

    /// Emit `Thinking(true)` now and `Thinking(false)` when the guard drops.
    #[must_use]
    pub fn thinking(&self) -> ThinkingGuard {
        self.emit(AssistantEvent::Thinking(true));
        ThinkingGuard {
            notifier: self.clone(),
        }
    }
}

/// Clears the thinking indicator on drop, on every exit path.
#[derive(Debug)]
pub struct ThinkingGuard {
    notifier: Notifier,
}

impl Drop for ThinkingGuard {
    fn drop(&mut self) {
        self.notifier.emit(AssistantEvent::Thinking(false));
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    #[test]
    fn thinking_guard_emits_both_edges() {
        let (notifier, mut rx) = Notifier::channel(8);
        {
            let _guard = notifier.thinking();
            assert_eq!(rx.try_recv().unwrap(), AssistantEvent::Thinking(true));
        }
        assert_eq!(rx.try_recv().unwrap(), AssistantEvent::Thinking(false));
    }

    #[test]
    fn thinking_guard_fires_on_early_return() {
        fn fails(notifier: &Notifier) -> Result<(), &'static str> {
            let _guard = notifier.thinking();
            Err("boom")
        }
        let (notifier, mut rx) = Notifier::channel(8);
        assert!(fails(&notifier).is_err());
        assert_eq!(rx.try_recv().unwrap(), AssistantEvent::Thinking(true));
        assert_eq!(rx.try_recv().unwrap(), AssistantEvent::Thinking(false));
    }

    #[test]
    fn disabled_notifier_drops_silently() {
        let notifier = Notifier::disabled();
        notifier.toast(ToastLevel::Info, "nobody listening");
        assert!(notifier.subscribe().is_none());
    }
}
