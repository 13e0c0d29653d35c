//! Wake-word matching over recogniser transcripts.
//!
//! Recognisers spell the name several ways, so matching runs against a small
//! set of near-homophones with word boundaries on both sides. Whatever
//! follows the match is the inline command.

use std::sync::LazyLock;

use rand::seq::SliceRandom;
use regex::Regex;

/// Spellings accepted as the wake word.
pub const DEFAULT_WAKE_WORDS: &[&str] = &["laila", "layla", "leila", "lela", "lila", "lyla", "laela"];

/// Replies used when the wake word arrives with no command.
pub const GREETINGS: &[&str] = &[
    "Yes? How can I help?",
    "I'm listening.",
    "Hi! What can I do for you?",
    "Hey there, what do you need?",
    "At your service.",
];

static DEFAULT_MATCHER: LazyLock<WakeMatcher> = LazyLock::new(|| {
    WakeMatcher::new(DEFAULT_WAKE_WORDS.iter().copied())
        .unwrap_or_else(|| unreachable!("default wake words are non-empty"))
});

/// Compiled wake-word pattern.
#[derive(Debug, Clone)]
pub struct WakeMatcher {
    re: Regex,
}

impl WakeMatcher {
    /// Build a matcher from spellings. Returns `None` when no usable
    /// spelling is given.
    pub fn new<'a>(words: impl IntoIterator<Item = &'a str>) -> Option<Self> {
        let alternatives: Vec<String> = words
            .into_iter()
            .map(str::trim)
            .filter(|w| !w.is_empty())
            .map(regex::escape)
            .collect();
        if alternatives.is_empty() {
            return None;
        }
        let re = Regex::new(&format!(r"(?i)\b(?:{})\b", alternatives.join("|"))).ok()?;
        Some(Self { re })
    }

    /// The text after the first wake word, or `None` if there is none.
    ///
    /// Leading punctuation is dropped so "Laila, open notes" yields
    /// "open notes".
    pub fn find(&self, transcript: &str) -> Option<String> {
        let m = self.re.find(transcript)?;
        let rest = transcript[m.end()..]
            .trim_start_matches(|c: char| c.is_whitespace() || c.is_ascii_punctuation())
            .trim_end();
        Some(rest.to_owned())
    }
}

/// [`WakeMatcher::find`] with the default spellings.
pub fn find_wake_word(transcript: &str) -> Option<String> {
    DEFAULT_MATCHER.find(transcript)
}

/// What the caller does with a wake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WakeAction {
    /// Send the trailing text as a chat message.
    Command(String),
    /// Nothing useful followed the wake word; say hello instead.
    Greet(&'static str),
}

impl WakeAction {
    /// Anything longer than two characters counts as a command.
    pub fn from_trailing(text: &str) -> Self {
        let text = text.trim();
        if text.chars().count() > 2 {
            WakeAction::Command(text.to_owned())
        } else {
            WakeAction::Greet(random_greeting())
        }
    }
}

pub fn random_greeting() -> &'static str {
    GREETINGS
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or("Yes?")
}
