//! Speech recognition seam
//!
//! Recognition is an external collaborator: something that consumes raw
//! capture buffers and emits progressively-extended transcript strings per
//! utterance. The pipeline only needs to feed it, restart it after a trigger
//! match, and filter the errors a deliberate restart is expected to produce.

use tokio::sync::mpsc;
use tracing::debug;

/// Events delivered by a recognizer on its transcript channel
#[derive(Debug, Clone)]
pub enum TranscriptEvent {
    /// A (possibly partial) transcript for the current utterance
    Partial(String),

    /// A recognizer failure
    Error(RecognizerError),
}

/// Classified recognizer failures
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecognizerError {
    /// The recognition task was cancelled; expected when we restart it
    Cancelled,

    /// No speech detected before the utterance was cut off; expected when a
    /// trigger match restarts recognition mid-utterance
    NoSpeech,

    /// Anything else
    Other(String),
}

impl RecognizerError {
    /// Errors a deliberate restart produces; swallowed rather than logged
    pub fn is_expected_cancellation(&self) -> bool {
        matches!(self, RecognizerError::Cancelled | RecognizerError::NoSpeech)
    }
}

/// A streaming speech-to-text collaborator.
///
/// `feed` is called from the pipeline task for every captured buffer,
/// regardless of gate state, and must not block. Transcript events arrive on
/// the channel the implementation was constructed with.
pub trait Recognizer: Send {
    /// Append captured samples to the current recognition pass
    fn feed(&mut self, samples: &[f32]);

    /// Cancel the current pass and start a fresh one. Called after every
    /// trigger match so the same utterance cannot re-trigger.
    fn restart(&mut self);
}

/// Recognizer that never produces transcripts; stands in where no STT
/// backend is wired up (demo binary, tests).
pub struct NullRecognizer {
    fed: u64,
}

impl NullRecognizer {
    pub fn new() -> Self {
        Self { fed: 0 }
    }

    /// Convenience for callers that still need a transcript channel pair
    pub fn with_channel() -> (Self, mpsc::Receiver<TranscriptEvent>) {
        let (_tx, rx) = mpsc::channel(1);
        (Self::new(), rx)
    }
}

impl Default for NullRecognizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Recognizer for NullRecognizer {
    fn feed(&mut self, samples: &[f32]) {
        self.fed += samples.len() as u64;
    }

    fn restart(&mut self) {
        debug!(samples_fed = self.fed, "null recognizer restarted");
        self.fed = 0;
    }
}
