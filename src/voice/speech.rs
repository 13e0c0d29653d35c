//! Speech recognition and synthesis capabilities.
//!
//! Both sides are optional at runtime: a platform without recognition
//! reports [`SpeechInput::is_supported`] as false, and a platform without
//! synthesis uses [`NullSpeechOutput`], which finishes instantly.

use std::process::Stdio;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Why a recognition session failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RecognitionError {
    #[error("no speech detected")]
    NoSpeech,
    #[error("recognition aborted")]
    Aborted,
    /// Microphone access refused by the user or platform.
    #[error("microphone access not allowed")]
    NotAllowed,
    #[error("recognition failed: {0}")]
    Other(String),
}

/// Something a recognition session reports.
#[derive(Debug, Clone, PartialEq)]
pub enum RecognitionEvent {
    Result {
        transcript: String,
        confidence: f32,
        is_final: bool,
    },
    Error(RecognitionError),
    /// The session is over. A closed channel means the same thing.
    End,
}

pub type RecognitionStream = mpsc::UnboundedReceiver<RecognitionEvent>;

/// Continuous speech recogniser.
#[async_trait]
pub trait SpeechInput: Send + Sync {
    fn is_supported(&self) -> bool {
        true
    }

    /// Begin a session. Events arrive on the returned stream until
    /// [`RecognitionEvent::End`] or the stream closes.
    async fn start(&self) -> Result<RecognitionStream, RecognitionError>;

    /// End the current session, if any.
    fn stop(&self);
}

/// Text-to-speech player.
#[async_trait]
pub trait SpeechOutput: Send + Sync {
    /// Start speaking `text`, cutting off anything still playing.
    async fn speak(&self, text: &str);

    fn cancel(&self);

    fn is_speaking(&self) -> bool;
}

/// Recogniser for platforms without one.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnsupportedSpeechInput;

#[async_trait]
impl SpeechInput for UnsupportedSpeechInput {
    fn is_supported(&self) -> bool {
        false
    }

    async fn start(&self) -> Result<RecognitionStream, RecognitionError> {
        Err(RecognitionError::Other("speech recognition unavailable".into()))
    }

    fn stop(&self) {}
}

/// Synthesis that is always already done.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSpeechOutput;

#[async_trait]
impl SpeechOutput for NullSpeechOutput {
    async fn speak(&self, text: &str) {
        debug!(chars = text.len(), "speech output disabled, skipping");
    }

    fn cancel(&self) {}

    fn is_speaking(&self) -> bool {
        false
    }
}

/// Speaks through an external program, one process per utterance.
///
/// A new utterance kills the previous process first.
#[derive(Debug)]
pub struct SayPlayer {
    program: String,
    current: Mutex<Option<Child>>,
}

impl SayPlayer {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            current: Mutex::new(None),
        }
    }

    fn take_current(&self) -> Option<Child> {
        self.current.lock().unwrap_or_else(|e| e.into_inner()).take()
    }
}

#[async_trait]
impl SpeechOutput for SayPlayer {
    async fn speak(&self, text: &str) {
        self.cancel();
        if text.trim().is_empty() {
            return;
        }
        match Command::new(&self.program)
            .arg(text)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
        {
            Ok(child) => {
                *self.current.lock().unwrap_or_else(|e| e.into_inner()) = Some(child);
            }
            Err(e) => warn!(program = %self.program, error = %e, "failed to start speech"),
        }
    }

    fn cancel(&self) {
        if let Some(mut child) = self.take_current() {
            let _ = child.start_kill();
        }
    }

    fn is_speaking(&self) -> bool {
        let mut guard = self.current.lock().unwrap_or_else(|e| e.into_inner());
        match guard.as_mut().map(Child::try_wait) {
            Some(Ok(None)) => true,
            Some(_) => {
                *guard = None;
                false
            }
            None => false,
        }
    }
}
