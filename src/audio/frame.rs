//! Frame types exchanged with the transport and the recognizer.

/// Normalized floating-point audio, interleaved when `channels > 1`.
///
/// This is the transport's native representation for both inbound and
/// outbound audio.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFrame {
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Number of interleaved channels.
    pub channels: u16,
    /// Samples per channel in `data`.
    pub samples_per_channel: usize,
    /// Interleaved samples in [-1.0, 1.0].
    pub data: Vec<f32>,
}

impl AudioFrame {
    /// Creates a frame from interleaved samples.
    pub fn new(sample_rate: u32, channels: u16, data: Vec<f32>) -> Self {
        let samples_per_channel = data.len() / channels.max(1) as usize;
        Self {
            sample_rate,
            channels,
            samples_per_channel,
            data,
        }
    }

    /// Creates a mono frame.
    pub fn mono(sample_rate: u32, data: Vec<f32>) -> Self {
        Self::new(sample_rate, 1, data)
    }

    /// Duration of this frame in milliseconds.
    pub fn duration_ms(&self) -> u32 {
        if self.sample_rate == 0 {
            return 0;
        }
        (self.samples_per_channel as u64 * 1000 / self.sample_rate as u64) as u32
    }

    /// Copies each mono sample onto `channels` interleaved channels.
    /// Frames that are not mono, or a target of 0 or 1, are returned as is.
    pub fn upmix(self, channels: u16) -> Self {
        if self.channels != 1 || channels <= 1 {
            return self;
        }
        let data = self
            .data
            .iter()
            .flat_map(|&s| std::iter::repeat_n(s, channels as usize))
            .collect();
        Self::new(self.sample_rate, channels, data)
    }
}

/// Linear 16-bit mono PCM handed to the recognizer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PcmChunk {
    /// Ingestion order, gaps mean frames were dropped on overflow.
    pub sequence: u64,
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Little-endian signed 16-bit samples.
    pub data: Vec<u8>,
}

impl PcmChunk {
    pub fn new(sequence: u64, sample_rate: u32, data: Vec<u8>) -> Self {
        Self {
            sequence,
            sample_rate,
            data,
        }
    }

    /// Number of samples in this chunk.
    pub fn sample_count(&self) -> usize {
        self.data.len() / 2
    }

    /// Duration of this chunk in milliseconds.
    pub fn duration_ms(&self) -> u32 {
        if self.sample_rate == 0 {
            return 0;
        }
        (self.sample_count() as u64 * 1000 / self.sample_rate as u64) as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_samples_per_channel_interleaved() {
        let frame = AudioFrame::new(48000, 2, vec![0.0; 960]);
        assert_eq!(frame.samples_per_channel, 480);
        assert_eq!(frame.duration_ms(), 10);
    }

    #[test]
    fn test_mono_frame_duration() {
        let frame = AudioFrame::mono(16000, vec![0.0; 16000]);
        assert_eq!(frame.channels, 1);
        assert_eq!(frame.duration_ms(), 1000);
    }

    #[test]
    fn test_upmix_duplicates_mono_samples() {
        let frame = AudioFrame::mono(48000, vec![0.1, -0.2, 0.3]).upmix(2);
        assert_eq!(frame.channels, 2);
        assert_eq!(frame.samples_per_channel, 3);
        assert_eq!(frame.data, vec![0.1, 0.1, -0.2, -0.2, 0.3, 0.3]);

        let stereo = AudioFrame::new(48000, 2, vec![0.5; 4]);
        assert_eq!(stereo.clone().upmix(4), stereo);
        assert_eq!(AudioFrame::mono(48000, vec![0.5]).upmix(1).channels, 1);
    }

    #[test]
    fn test_pcm_chunk_duration() {
        let chunk = PcmChunk::new(3, 48000, vec![0u8; 960 * 2]);
        assert_eq!(chunk.sample_count(), 960);
        assert_eq!(chunk.duration_ms(), 20);
    }

    #[test]
    fn test_zero_rate_duration_is_zero() {
        assert_eq!(AudioFrame::mono(0, vec![0.0; 10]).duration_ms(), 0);
        assert_eq!(PcmChunk::new(0, 0, vec![0; 10]).duration_ms(), 0);
    }
}
