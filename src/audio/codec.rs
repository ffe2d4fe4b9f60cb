//! Conversion between transport float frames and linear 16-bit PCM.
//!
//! Encoding clips each sample to [-1.0, 1.0], averages channels down to mono
//! and scales by 32767 with round-to-nearest. Decoding divides by 32767.
//! Both directions are deterministic so tests can compare bit-for-bit.

use crate::audio::frame::AudioFrame;
use std::time::Duration;

/// Full-scale value used in both directions.
const SCALE: f32 = 32767.0;

/// Converts one normalized sample to signed 16-bit.
pub fn sample_to_i16(sample: f32) -> i16 {
    if sample.is_nan() {
        return 0;
    }
    (sample.clamp(-1.0, 1.0) * SCALE).round() as i16
}

/// Converts one signed 16-bit sample to normalized float.
pub fn sample_to_f32(sample: i16) -> f32 {
    (sample as f32 / SCALE).max(-1.0)
}

/// Encodes a float frame as mono little-endian linear16 bytes.
///
/// Multi-channel frames are downmixed by averaging the clipped channel
/// values. A trailing partial sample group is ignored.
pub fn to_linear16(frame: &AudioFrame) -> Vec<u8> {
    let channels = frame.channels.max(1) as usize;
    let mut out = Vec::with_capacity(frame.data.len() / channels * 2);

    if channels == 1 {
        for &sample in &frame.data {
            out.extend_from_slice(&sample_to_i16(sample).to_le_bytes());
        }
        return out;
    }

    for group in frame.data.chunks_exact(channels) {
        let sum: f32 = group
            .iter()
            .map(|s| if s.is_nan() { 0.0 } else { s.clamp(-1.0, 1.0) })
            .sum();
        let mixed = sum / channels as f32;
        out.extend_from_slice(&sample_to_i16(mixed).to_le_bytes());
    }
    out
}

/// Decodes little-endian linear16 bytes to normalized floats.
///
/// An odd trailing byte is ignored.
pub fn decode_linear16(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(2)
        .map(|pair| sample_to_f32(i16::from_le_bytes([pair[0], pair[1]])))
        .collect()
}

/// Splits linear16 bytes into mono frames of exactly `frame_size` samples.
///
/// The last frame is zero-padded. Empty input (or `frame_size == 0`) yields
/// no frames.
pub fn to_float_frames(bytes: &[u8], frame_size: usize, sample_rate: u32) -> Vec<AudioFrame> {
    Linear16Frames::new(bytes, frame_size, sample_rate).collect()
}

/// Lazy version of [`to_float_frames`], used by the synthesis pump so it can
/// stop between frames.
pub struct Linear16Frames<'a> {
    bytes: &'a [u8],
    frame_size: usize,
    sample_rate: u32,
    position: usize,
}

impl<'a> Linear16Frames<'a> {
    pub fn new(bytes: &'a [u8], frame_size: usize, sample_rate: u32) -> Self {
        // Drop an odd trailing byte up front so every chunk is whole samples.
        let usable = bytes.len() - bytes.len() % 2;
        Self {
            bytes: &bytes[..usable],
            frame_size,
            sample_rate,
            position: 0,
        }
    }

    /// Number of frames this iterator yields in total.
    pub fn frame_count(&self) -> usize {
        if self.frame_size == 0 {
            return 0;
        }
        (self.bytes.len() / 2).div_ceil(self.frame_size)
    }
}

impl Iterator for Linear16Frames<'_> {
    type Item = AudioFrame;

    fn next(&mut self) -> Option<AudioFrame> {
        if self.frame_size == 0 || self.position >= self.bytes.len() {
            return None;
        }
        let end = (self.position + self.frame_size * 2).min(self.bytes.len());
        let mut data = decode_linear16(&self.bytes[self.position..end]);
        data.resize(self.frame_size, 0.0);
        self.position = end;
        Some(AudioFrame::mono(self.sample_rate, data))
    }
}

/// Playback duration of mono linear16 bytes.
pub fn pcm_duration(byte_len: usize, sample_rate: u32) -> Duration {
    if sample_rate == 0 {
        return Duration::ZERO;
    }
    Duration::from_micros((byte_len / 2) as u64 * 1_000_000 / sample_rate as u64)
}

/// Encodes signed 16-bit samples as little-endian bytes.
pub fn samples_to_bytes(samples: &[i16]) -> Vec<u8> {
    samples.iter().flat_map(|s| s.to_le_bytes()).collect()
}
