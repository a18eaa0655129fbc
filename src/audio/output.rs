use crate::audio::PlaybackQueue;
use crate::{LumaError, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, Stream, StreamConfig};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Speaker playback via cpal's default output device, fed from a
/// [`PlaybackQueue`]. The queue is the sink handed to the pipeline; this
/// struct only owns the device stream draining it.
pub struct CpalPlayback {
    device: Device,
    config: StreamConfig,
    stream: Option<Stream>,
    queue: PlaybackQueue,
    is_playing: Arc<Mutex<bool>>,
}

impl CpalPlayback {
    /// Open the default output device at its native format
    pub fn new(queue: PlaybackQueue) -> Result<Self> {
        let host = cpal::default_host();

        let device = host
            .default_output_device()
            .ok_or_else(|| LumaError::AudioDeviceError("No output device available".into()))?;

        info!(
            "Using output device: {}",
            device.name().unwrap_or_else(|_| "Unknown".to_string())
        );

        let config = device
            .default_output_config()
            .map_err(|e| LumaError::AudioDeviceError(format!("Failed to get output config: {}", e)))?
            .into();

        Ok(Self {
            device,
            config,
            stream: None,
            queue,
            is_playing: Arc::new(Mutex::new(false)),
        })
    }

    /// Sample rate of the output device
    pub fn sample_rate(&self) -> u32 {
        self.config.sample_rate.0
    }

    pub fn channels(&self) -> u16 {
        self.config.channels
    }

    /// Start draining the queue into the device
    pub fn start(&mut self) -> Result<()> {
        if *self.is_playing.lock() {
            warn!("Already playing");
            return Ok(());
        }

        let channels = self.config.channels as usize;
        let is_playing = Arc::clone(&self.is_playing);
        let queue = self.queue.clone();

        let err_fn = |err| {
            error!("Audio output stream error: {}", err);
        };

        let stream = self
            .device
            .build_output_stream(
                &self.config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    if !*is_playing.lock() {
                        data.fill(0.0);
                        return;
                    }

                    let frames = data.len() / channels;
                    let mut mono = vec![0.0f32; frames];
                    queue.fill(&mut mono);

                    // Fan mono out to every channel
                    for (i, sample) in mono.iter().enumerate() {
                        for c in 0..channels {
                            data[i * channels + c] = *sample;
                        }
                    }
                },
                err_fn,
                None,
            )
            .map_err(|e| {
                LumaError::AudioDeviceError(format!("Failed to build output stream: {}", e))
            })?;

        stream
            .play()
            .map_err(|e| LumaError::AudioDeviceError(format!("Failed to start output stream: {}", e)))?;

        *self.is_playing.lock() = true;
        self.stream = Some(stream);

        info!("Started audio playback");
        Ok(())
    }

    /// Stop playback and release the device
    pub fn stop(&mut self) {
        *self.is_playing.lock() = false;

        if let Some(stream) = self.stream.take() {
            drop(stream);
            info!("Stopped audio playback");
        }
    }

    pub fn is_playing(&self) -> bool {
        *self.is_playing.lock()
    }
}

impl Drop for CpalPlayback {
    fn drop(&mut self) {
        self.stop();
    }
}
