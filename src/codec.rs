//! Wire framing for audio buffers
//!
//! Outbound frames carry raw little-endian f32 mono samples at the capture
//! hardware's native rate; inbound frames are little-endian PCM16 mono at the
//! fixed playback rate. One captured buffer maps to one wire frame.

use byteorder::{ByteOrder, LittleEndian};

/// Sample rate of inbound playback frames, fixed by the protocol
pub const PLAYBACK_SAMPLE_RATE: u32 = 24_000;

/// Encode a captured sample buffer into an outbound binary frame
pub fn encode_capture(samples: &[f32]) -> Vec<u8> {
    let mut bytes = vec![0u8; samples.len() * 4];
    LittleEndian::write_f32_into(samples, &mut bytes);
    bytes
}

/// Decode an inbound binary frame as PCM16LE mono samples.
///
/// A trailing odd byte is dropped rather than treated as an error; live audio
/// frames are best-effort and a truncated sample is not worth tearing down the
/// receive path for.
pub fn decode_playback(bytes: &[u8]) -> Vec<i16> {
    let usable = bytes.len() - (bytes.len() % 2);
    let mut samples = vec![0i16; usable / 2];
    LittleEndian::read_i16_into(&bytes[..usable], &mut samples);
    samples
}

/// Scale PCM16 samples to [-1.0, 1.0] for the playback sink
pub fn pcm16_to_f32(samples: &[i16]) -> Vec<f32> {
    samples.iter().map(|&s| f32::from(s) / 32768.0).collect()
}
