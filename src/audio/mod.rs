pub mod buffer;
#[cfg(feature = "audio-io")]
pub mod input;
#[cfg(feature = "audio-io")]
pub mod output;

pub use buffer::PlaybackQueue;
#[cfg(feature = "audio-io")]
pub use input::CpalCapture;
#[cfg(feature = "audio-io")]
pub use output::CpalPlayback;

use crate::Result;
use tokio::sync::mpsc;

/// A microphone-like collaborator delivering fixed-size sample buffers.
///
/// Implementations run on a real-time audio context and must hand buffers
/// off through the channel without blocking; a full channel drops the buffer.
pub trait CaptureSource {
    /// Begin capture, delivering each buffer to `tx`
    fn start(&mut self, tx: mpsc::Sender<Vec<f32>>) -> Result<()>;

    /// Stop capture and release the device
    fn stop(&mut self);

    /// Native sample rate of the capture hardware
    fn sample_rate(&self) -> u32;
}

/// A speaker-like collaborator accepting scheduled sample buffers.
///
/// `schedule` is called from the pipeline task and must not block; the sink
/// enforces actual temporal ordering on its own clock.
pub trait PlaybackSink: Send {
    fn schedule(&self, samples: Vec<f32>);
}

/// Asynchronous audio route reconfiguration events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteChange {
    NewDeviceAvailable,
    OldDeviceUnavailable,
    ConfigurationChange,
}

/// Process-wide audio session collaborator. The pipeline reconfigures it on
/// device-unavailable route changes without touching the connection.
pub trait AudioSessionControl: Send {
    fn configure(&mut self) -> Result<()>;
    fn describe_route(&self) -> String;
}
