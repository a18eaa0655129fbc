use crate::audio::PlaybackSink;
use parking_lot::Mutex;
use ringbuf::{traits::*, HeapRb};
use std::sync::Arc;

/// Thread-safe sample queue between the pipeline task and the playback
/// callback. Overflow drops the oldest samples; live audio would rather skip
/// than fall behind.
pub struct PlaybackQueue {
    buffer: Arc<Mutex<HeapRb<f32>>>,
}

impl PlaybackQueue {
    /// Create a queue holding up to `capacity` samples
    pub fn new(capacity: usize) -> Self {
        Self {
            buffer: Arc::new(Mutex::new(HeapRb::new(capacity))),
        }
    }

    /// Append samples, evicting the oldest when full.
    /// Returns the number of samples written.
    pub fn push(&self, samples: &[f32]) -> usize {
        let mut buffer = self.buffer.lock();
        let mut written = 0;

        for &sample in samples {
            if buffer.try_push(sample).is_ok() {
                written += 1;
            } else {
                let _ = buffer.try_pop();
                let _ = buffer.try_push(sample);
                written += 1;
            }
        }

        written
    }

    /// Fill `out` from the queue, zero-padding whatever is left.
    /// Returns the number of real samples written.
    pub fn fill(&self, out: &mut [f32]) -> usize {
        let mut buffer = self.buffer.lock();
        let mut filled = 0;

        for slot in out.iter_mut() {
            match buffer.try_pop() {
                Some(sample) => {
                    *slot = sample;
                    filled += 1;
                }
                None => *slot = 0.0,
            }
        }

        filled
    }

    /// Number of samples waiting to be played
    pub fn len(&self) -> usize {
        self.buffer.lock().occupied_len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.lock().is_empty()
    }

    pub fn clear(&self) {
        self.buffer.lock().clear();
    }

    pub fn capacity(&self) -> usize {
        self.buffer.lock().capacity().get()
    }
}

impl Clone for PlaybackQueue {
    fn clone(&self) -> Self {
        Self {
            buffer: Arc::clone(&self.buffer),
        }
    }
}

impl PlaybackSink for PlaybackQueue {
    fn schedule(&self, samples: Vec<f32>) {
        self.push(&samples);
    }
}
