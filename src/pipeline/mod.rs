//! The audio pipeline: the single task that ties capture, playback,
//! recognition and the connection together.
//!
//! Everything that reads or writes streaming state funnels through this task,
//! so the gate, the phrase matcher and the recognizer never need locking. The
//! capture callback, the playback callback and the connection controller each
//! run elsewhere and talk to the pipeline over channels.

use crate::audio::{AudioSessionControl, PlaybackSink, RouteChange};
use crate::codec::{decode_playback, encode_capture, pcm16_to_f32};
use crate::net::{ConnectionEvent, ConnectionHandle, WireFrame};
use crate::signal::SessionSignal;
use crate::speech::{Recognizer, TranscriptEvent};
use crate::trigger::{PhraseMatcher, Trigger};
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

/// The streaming gate. On: mic frames go to the server and server audio is
/// played. Off: capture still feeds the recognizer, everything else is
/// dropped. Only wake and stop phrases move it.
pub struct StreamingGate {
    on: bool,
}

impl StreamingGate {
    pub fn new() -> Self {
        Self { on: false }
    }

    pub fn is_on(&self) -> bool {
        self.on
    }

    /// Idempotent; logs only on an actual transition
    pub fn set(&mut self, on: bool, reason: &str) {
        if self.on == on {
            return;
        }
        self.on = on;
        info!(gate = if on { "on" } else { "off" }, reason, "streaming gate changed");
    }
}

impl Default for StreamingGate {
    fn default() -> Self {
        Self::new()
    }
}

pub struct AudioPipeline {
    gate: StreamingGate,
    matcher: PhraseMatcher,
    handle: ConnectionHandle,
    recognizer: Box<dyn Recognizer>,
    sink: Box<dyn PlaybackSink>,
    signal: SessionSignal,
    notification: Option<Vec<f32>>,
    audio_session: Option<Box<dyn AudioSessionControl>>,
    capture_rx: mpsc::Receiver<Vec<f32>>,
    event_rx: mpsc::Receiver<ConnectionEvent>,
    transcript_rx: mpsc::Receiver<TranscriptEvent>,
    route_rx: mpsc::Receiver<RouteChange>,
}

impl AudioPipeline {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        matcher: PhraseMatcher,
        handle: ConnectionHandle,
        recognizer: Box<dyn Recognizer>,
        sink: Box<dyn PlaybackSink>,
        signal: SessionSignal,
        notification: Option<Vec<f32>>,
        audio_session: Option<Box<dyn AudioSessionControl>>,
        capture_rx: mpsc::Receiver<Vec<f32>>,
        event_rx: mpsc::Receiver<ConnectionEvent>,
        transcript_rx: mpsc::Receiver<TranscriptEvent>,
        route_rx: mpsc::Receiver<RouteChange>,
    ) -> Self {
        Self {
            gate: StreamingGate::new(),
            matcher,
            handle,
            recognizer,
            sink,
            signal,
            notification,
            audio_session,
            capture_rx,
            event_rx,
            transcript_rx,
            route_rx,
        }
    }

    /// Run until the capture channel closes. Secondary channels closing only
    /// disables their branch; capture going away means the session is over.
    pub async fn run(mut self) {
        let mut events_open = true;
        let mut transcripts_open = true;
        let mut routes_open = true;

        info!("audio pipeline running");
        loop {
            tokio::select! {
                maybe = self.capture_rx.recv() => match maybe {
                    Some(samples) => self.handle_capture(&samples),
                    None => break,
                },
                maybe = self.event_rx.recv(), if events_open => match maybe {
                    Some(event) => self.handle_inbound(event),
                    None => events_open = false,
                },
                maybe = self.transcript_rx.recv(), if transcripts_open => match maybe {
                    Some(event) => self.handle_transcript(event),
                    None => transcripts_open = false,
                },
                maybe = self.route_rx.recv(), if routes_open => match maybe {
                    Some(change) => self.handle_route_change(change),
                    None => routes_open = false,
                },
            }
        }
        info!("audio pipeline stopped");
    }

    /// A captured buffer: always feed the recognizer, stream only when the
    /// gate is on.
    fn handle_capture(&mut self, samples: &[f32]) {
        self.recognizer.feed(samples);

        if self.gate.is_on() {
            self.handle.send(WireFrame::Binary(encode_capture(samples)));
        }
    }

    /// An inbound server message. Binary is PCM16 audio, gated like capture;
    /// text is informational.
    fn handle_inbound(&mut self, event: ConnectionEvent) {
        match event {
            ConnectionEvent::Binary(bytes) => {
                if !self.gate.is_on() {
                    trace!(bytes = bytes.len(), "dropping server audio, gate off");
                    return;
                }
                let pcm = decode_playback(&bytes);
                self.sink.schedule(pcm16_to_f32(&pcm));
            }
            ConnectionEvent::Text(text) => {
                debug!(%text, "server message");
            }
        }
    }

    fn handle_transcript(&mut self, event: TranscriptEvent) {
        match event {
            TranscriptEvent::Partial(text) => {
                if let Some(trigger) = self.matcher.observe(&text, self.gate.is_on()) {
                    self.apply_trigger(trigger);
                }
            }
            TranscriptEvent::Error(err) => {
                if err.is_expected_cancellation() {
                    trace!(?err, "recognizer restart fallout");
                } else {
                    warn!(?err, "recognizer error");
                }
            }
        }
    }

    fn apply_trigger(&mut self, trigger: Trigger) {
        info!(?trigger, "voice trigger");
        match trigger {
            Trigger::Wake => {
                self.gate.set(true, "wake phrase");
            }
            Trigger::Stop => {
                self.gate.set(false, "stop phrase");
            }
            Trigger::Highlight => {
                self.signal.fire();
                if let Some(chime) = &self.notification {
                    self.sink.schedule(chime.clone());
                }
            }
        }
        // One utterance, one trigger
        self.recognizer.restart();
    }

    /// Route changes never touch the connection; at most the audio session
    /// gets reconfigured.
    fn handle_route_change(&mut self, change: RouteChange) {
        info!(?change, "audio route change");
        match change {
            RouteChange::OldDeviceUnavailable | RouteChange::ConfigurationChange => {
                if let Some(session) = &mut self.audio_session {
                    match session.configure() {
                        Ok(()) => info!(route = %session.describe_route(), "audio session reconfigured"),
                        Err(e) => warn!(error = %e, "audio session reconfiguration failed"),
                    }
                }
            }
            RouteChange::NewDeviceAvailable => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PhraseConfig;
    use crate::net::{ConnectionController, ReconnectPolicy};
    use crate::speech::RecognizerError;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use url::Url;

    #[derive(Clone, Default)]
    struct MockSink {
        scheduled: Arc<Mutex<Vec<Vec<f32>>>>,
    }

    impl PlaybackSink for MockSink {
        fn schedule(&self, samples: Vec<f32>) {
            self.scheduled.lock().push(samples);
        }
    }

    #[derive(Clone, Default)]
    struct MockRecognizer {
        fed: Arc<AtomicUsize>,
        restarts: Arc<AtomicUsize>,
    }

    impl Recognizer for MockRecognizer {
        fn feed(&mut self, samples: &[f32]) {
            self.fed.fetch_add(samples.len(), Ordering::SeqCst);
        }

        fn restart(&mut self) {
            self.restarts.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct Fixture {
        pipeline: AudioPipeline,
        sink: MockSink,
        recognizer: MockRecognizer,
    }

    fn fixture() -> Fixture {
        let url = Url::parse("ws://127.0.0.1:9/ws").unwrap();
        let (handle, _events) =
            ConnectionController::spawn(url.clone(), None, ReconnectPolicy::default());

        let sink = MockSink::default();
        let recognizer = MockRecognizer::default();
        let signal = SessionSignal::new(&url, None).unwrap();

        let (_capture_tx, capture_rx) = mpsc::channel(8);
        let (_event_tx, event_rx) = mpsc::channel(8);
        let (_transcript_tx, transcript_rx) = mpsc::channel(8);
        let (_route_tx, route_rx) = mpsc::channel(8);

        let pipeline = AudioPipeline::new(
            PhraseMatcher::new(PhraseConfig::default()),
            handle,
            Box::new(recognizer.clone()),
            Box::new(sink.clone()),
            signal,
            Some(vec![0.25; 64]),
            None,
            capture_rx,
            event_rx,
            transcript_rx,
            route_rx,
        );

        Fixture {
            pipeline,
            sink,
            recognizer,
        }
    }

    #[tokio::test]
    async fn test_wake_turns_gate_on_and_restarts_recognizer() {
        let mut f = fixture();
        assert!(!f.pipeline.gate.is_on());

        f.pipeline
            .handle_transcript(TranscriptEvent::Partial("hey luma".to_string()));

        assert!(f.pipeline.gate.is_on());
        assert_eq!(f.recognizer.restarts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_stop_turns_gate_off() {
        let mut f = fixture();
        f.pipeline.gate.set(true, "test");

        f.pipeline
            .handle_transcript(TranscriptEvent::Partial("thank you".to_string()));

        assert!(!f.pipeline.gate.is_on());
        assert_eq!(f.recognizer.restarts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_highlight_schedules_chime_without_gating() {
        let mut f = fixture();

        f.pipeline
            .handle_transcript(TranscriptEvent::Partial("highlight".to_string()));

        assert!(!f.pipeline.gate.is_on());
        let scheduled = f.sink.scheduled.lock();
        assert_eq!(scheduled.len(), 1);
        assert_eq!(scheduled[0], vec![0.25; 64]);
    }

    #[tokio::test]
    async fn test_inbound_audio_dropped_while_gate_off() {
        let mut f = fixture();

        f.pipeline
            .handle_inbound(ConnectionEvent::Binary(vec![0x00, 0x40, 0x00, 0xC0]));
        assert!(f.sink.scheduled.lock().is_empty());
    }

    #[tokio::test]
    async fn test_inbound_audio_played_while_gate_on() {
        let mut f = fixture();
        f.pipeline.gate.set(true, "test");

        // 0x4000 = 16384 → 0.5, 0xC000 = -16384 → -0.5
        f.pipeline
            .handle_inbound(ConnectionEvent::Binary(vec![0x00, 0x40, 0x00, 0xC0]));

        let scheduled = f.sink.scheduled.lock();
        assert_eq!(scheduled.len(), 1);
        assert_eq!(scheduled[0], vec![0.5, -0.5]);
    }

    #[tokio::test]
    async fn test_capture_feeds_recognizer_regardless_of_gate() {
        let mut f = fixture();

        f.pipeline.handle_capture(&[0.0; 256]);
        assert_eq!(f.recognizer.fed.load(Ordering::SeqCst), 256);

        f.pipeline.gate.set(true, "test");
        f.pipeline.handle_capture(&[0.0; 256]);
        assert_eq!(f.recognizer.fed.load(Ordering::SeqCst), 512);
    }

    #[tokio::test]
    async fn test_expected_recognizer_errors_are_benign() {
        let mut f = fixture();
        f.pipeline.gate.set(true, "test");

        f.pipeline
            .handle_transcript(TranscriptEvent::Error(RecognizerError::Cancelled));
        f.pipeline
            .handle_transcript(TranscriptEvent::Error(RecognizerError::NoSpeech));
        f.pipeline
            .handle_transcript(TranscriptEvent::Error(RecognizerError::Other("boom".into())));

        // State untouched either way
        assert!(f.pipeline.gate.is_on());
        assert_eq!(f.recognizer.restarts.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_gate_idempotent_set() {
        let mut gate = StreamingGate::new();
        gate.set(false, "noop");
        assert!(!gate.is_on());
        gate.set(true, "on");
        gate.set(true, "again");
        assert!(gate.is_on());
    }
}
