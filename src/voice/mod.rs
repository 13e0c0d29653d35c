//! Hands-free voice control.
//!
//! - [`wake`]: wake-word matching and the command/greeting split
//! - [`speech`]: recognition and synthesis capabilities
//! - [`listener`]: the always-on listener that avoids hearing itself

pub mod listener;
pub mod speech;
pub mod wake;

pub use listener::{ListenerEvent, ListenerFlags, WakeWordListener};
pub use speech::{
    NullSpeechOutput, RecognitionError, RecognitionEvent, RecognitionStream, SayPlayer,
    SpeechInput, SpeechOutput, UnsupportedSpeechInput,
};
pub use wake::{WakeAction, WakeMatcher, find_wake_word};

/// Pause/resume hooks the assistant uses around its own speech.
pub trait VoiceControl: Send + Sync {
    fn pause(&self);
    fn resume(&self);
}
