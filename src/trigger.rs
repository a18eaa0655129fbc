//! Voice trigger detection over streaming transcripts
//!
//! A recognizer emits progressively-extended transcripts for one utterance
//! ("the", "the cat", "the cat sat"). The matcher keeps a sliding window of
//! recent words, appending only the delta when the new transcript extends the
//! previous one, and scans the joined window for the configured phrases.

use crate::config::PhraseConfig;
use std::collections::VecDeque;
use tracing::debug;

/// Maximum number of words retained in the sliding window
pub const MAX_RECENT_WORDS: usize = 50;

/// Discrete trigger events produced by the matcher
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// Stop phrase matched; the only way to turn the streaming gate off
    Stop,

    /// Wake phrase matched while the gate was off
    Wake,

    /// Highlight phrase matched while the gate was off
    Highlight,
}

/// Lowercase, map non-alphanumeric characters to spaces, collapse runs of
/// spaces into a canonical space-joined token string.
pub fn normalize(text: &str) -> String {
    let cleaned: String = text
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub struct PhraseMatcher {
    phrases: PhraseConfig,
    last_normalized: String,
    recent_words: VecDeque<String>,
}

impl PhraseMatcher {
    pub fn new(phrases: PhraseConfig) -> Self {
        Self {
            phrases,
            last_normalized: String::new(),
            recent_words: VecDeque::with_capacity(MAX_RECENT_WORDS),
        }
    }

    /// Feed a raw transcript update and evaluate triggers.
    ///
    /// Priority within a single update: stop beats wake beats highlight, and
    /// stop fires regardless of gate state. Wake and highlight are suppressed
    /// while the gate is already on. Any match clears the window so the same
    /// utterance cannot re-trigger; the caller is expected to restart the
    /// recognizer as well.
    pub fn observe(&mut self, raw: &str, gate_on: bool) -> Option<Trigger> {
        let normalized = normalize(raw);
        if normalized.is_empty() {
            return None;
        }

        self.extend_window(&normalized);
        let window = self.window();
        debug!(raw, norm = %normalized, window = %window, "transcript update");

        let trigger = if window.contains(&self.phrases.stop) {
            Some(Trigger::Stop)
        } else if !gate_on && self.phrases.wake.iter().any(|p| window.contains(p.as_str())) {
            Some(Trigger::Wake)
        } else if !gate_on
            && self
                .phrases
                .highlight
                .iter()
                .any(|p| window.contains(p.as_str()))
        {
            Some(Trigger::Highlight)
        } else {
            None
        };

        if trigger.is_some() {
            self.clear();
        }
        trigger
    }

    /// The joined sliding window, for logging and tests
    pub fn window(&self) -> String {
        self.recent_words
            .iter()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Reset the window and the prefix tracking state
    pub fn clear(&mut self) {
        self.last_normalized.clear();
        self.recent_words.clear();
    }

    fn extend_window(&mut self, normalized: &str) {
        if !self.last_normalized.is_empty() && normalized.starts_with(&self.last_normalized) {
            // Prefix extension: append only the new words
            let delta = &normalized[self.last_normalized.len()..];
            for word in delta.split_whitespace() {
                self.recent_words.push_back(word.to_string());
            }
        } else {
            // Recognizer restarted or revised the utterance; replace the window
            self.recent_words.clear();
            for word in normalized.split_whitespace() {
                self.recent_words.push_back(word.to_string());
            }
        }

        while self.recent_words.len() > MAX_RECENT_WORDS {
            self.recent_words.pop_front();
        }
        self.last_normalized = normalized.to_string();
    }
}
