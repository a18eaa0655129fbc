//! Top-level client assembly
//!
//! [`StreamClient`] wires the configuration, connection controller, audio
//! pipeline and collaborators into one object with a start/stop lifecycle.
//! Playback device ownership stays outside: the client exposes its
//! [`PlaybackQueue`] and whoever owns the output device drains it.

use crate::audio::{AudioSessionControl, CaptureSource, PlaybackQueue, RouteChange};
use crate::codec::PLAYBACK_SAMPLE_RATE;
use crate::config::ClientConfig;
use crate::net::{ConnectionController, ConnectionHandle, ConnectionState};
use crate::pipeline::AudioPipeline;
use crate::signal::{load_notification_wav, SessionSignal};
use crate::speech::{Recognizer, TranscriptEvent};
use crate::trigger::PhraseMatcher;
use crate::{LumaError, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};

const CAPTURE_QUEUE: usize = 64;
const ROUTE_QUEUE: usize = 8;

// Five seconds of buffered playback before the queue starts evicting
const PLAYBACK_QUEUE_SAMPLES: usize = PLAYBACK_SAMPLE_RATE as usize * 5;

pub struct StreamClient {
    handle: ConnectionHandle,
    capture: Box<dyn CaptureSource>,
    capture_tx: Option<mpsc::Sender<Vec<f32>>>,
    queue: PlaybackQueue,
    route_tx: mpsc::Sender<RouteChange>,
    pipeline: Option<AudioPipeline>,
    pipeline_task: Option<tokio::task::JoinHandle<()>>,
    stopped: AtomicBool,
}

impl StreamClient {
    /// Assemble a client from its configuration and collaborators. Nothing
    /// runs until [`start`](Self::start).
    pub fn new(
        config: ClientConfig,
        capture: Box<dyn CaptureSource>,
        recognizer: Box<dyn Recognizer>,
        transcript_rx: mpsc::Receiver<TranscriptEvent>,
        audio_session: Option<Box<dyn AudioSessionControl>>,
    ) -> Result<Self> {
        config.validate().map_err(LumaError::ConfigError)?;

        let notification = match &config.notification_wav {
            Some(path) => Some(load_notification_wav(path)?),
            None => None,
        };

        let signal = SessionSignal::new(&config.ws_url, config.session_id.clone())?;

        let (handle, event_rx) = ConnectionController::spawn(
            config.ws_url.clone(),
            config.session_id.clone(),
            config.reconnect,
        );

        let queue = PlaybackQueue::new(PLAYBACK_QUEUE_SAMPLES);
        let (capture_tx, capture_rx) = mpsc::channel(CAPTURE_QUEUE);
        let (route_tx, route_rx) = mpsc::channel(ROUTE_QUEUE);

        let pipeline = AudioPipeline::new(
            PhraseMatcher::new(config.phrases.clone()),
            handle.clone(),
            recognizer,
            Box::new(queue.clone()),
            signal,
            notification,
            audio_session,
            capture_rx,
            event_rx,
            transcript_rx,
            route_rx,
        );

        Ok(Self {
            handle,
            capture,
            capture_tx: Some(capture_tx),
            queue,
            route_tx,
            pipeline: Some(pipeline),
            pipeline_task: None,
            stopped: AtomicBool::new(false),
        })
    }

    /// Start the pipeline, the capture device and the connection
    pub async fn start(&mut self) -> Result<()> {
        let pipeline = match self.pipeline.take() {
            Some(p) => p,
            None => {
                warn!("client already started");
                return Ok(());
            }
        };
        self.pipeline_task = Some(tokio::spawn(pipeline.run()));

        if let Some(tx) = &self.capture_tx {
            self.capture.start(tx.clone())?;
        }
        self.handle.start().await;

        info!("stream client started");
        Ok(())
    }

    /// Tear down capture, the connection and the pipeline. Idempotent; only
    /// the first call does anything.
    pub async fn stop(&mut self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }

        self.capture.stop();
        // Closing the capture channel is what terminates the pipeline task
        self.capture_tx = None;
        self.handle.stop().await;
        self.queue.clear();

        if let Some(task) = self.pipeline_task.take() {
            let _ = task.await;
        }
        info!("stream client stopped");
    }

    /// Current connection state
    pub fn state(&self) -> ConnectionState {
        self.handle.state()
    }

    /// Watch channel following connection state transitions
    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.handle.state_changes()
    }

    /// The queue server audio is scheduled into; hand this to the output
    /// device owner
    pub fn playback_queue(&self) -> PlaybackQueue {
        self.queue.clone()
    }

    /// Sender for audio route change notifications
    pub fn route_sender(&self) -> mpsc::Sender<RouteChange> {
        self.route_tx.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::speech::NullRecognizer;
    use url::Url;

    struct FakeCapture {
        running: bool,
    }

    impl CaptureSource for FakeCapture {
        fn start(&mut self, _tx: mpsc::Sender<Vec<f32>>) -> Result<()> {
            self.running = true;
            Ok(())
        }

        fn stop(&mut self) {
            self.running = false;
        }

        fn sample_rate(&self) -> u32 {
            48_000
        }
    }

    fn client() -> StreamClient {
        let config =
            ClientConfig::new(Url::parse("ws://127.0.0.1:9/ws").unwrap()).with_session_id("test");
        let (recognizer, transcript_rx) = NullRecognizer::with_channel();
        StreamClient::new(
            config,
            Box::new(FakeCapture { running: false }),
            Box::new(recognizer),
            transcript_rx,
            None,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_start_stop_lifecycle() {
        let mut client = client();
        assert_eq!(client.state(), ConnectionState::Disconnected);

        client.start().await.unwrap();
        client.stop().await;
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let mut client = client();
        client.start().await.unwrap();

        client.stop().await;
        // Second call must be a no-op, not a second teardown
        client.stop().await;
    }

    #[tokio::test]
    async fn test_double_start_is_noop() {
        let mut client = client();
        client.start().await.unwrap();
        client.start().await.unwrap();
        client.stop().await;
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = ClientConfig::new(Url::parse("http://127.0.0.1/ws").unwrap());
        let (recognizer, transcript_rx) = NullRecognizer::with_channel();
        let result = StreamClient::new(
            config,
            Box::new(FakeCapture { running: false }),
            Box::new(recognizer),
            transcript_rx,
            None,
        );
        assert!(matches!(result, Err(LumaError::ConfigError(_))));
    }
}
