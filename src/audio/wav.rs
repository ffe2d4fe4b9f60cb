//! WAV file input and per-track WAV output for the file transport.

use crate::audio::codec::sample_to_i16;
use crate::audio::frame::AudioFrame;
use crate::error::{LiveTransError, Result};
use std::fs::File;
use std::io::{BufWriter, Read};
use std::path::Path;

/// Audio source that reads a whole WAV file into normalized float samples.
///
/// Integer formats of any bit depth and 32-bit float are accepted. Channels
/// and sample rate are preserved; the ingestion stage downmixes.
pub struct WavAudioSource {
    sample_rate: u32,
    channels: u16,
    samples: Vec<f32>,
    position: usize,
}

impl WavAudioSource {
    /// Create from any reader (for testing/flexibility).
    pub fn from_reader(reader: Box<dyn Read + Send>) -> Result<Self> {
        let mut wav_reader = hound::WavReader::new(reader).map_err(|e| LiveTransError::Wav {
            message: format!("Failed to parse WAV file: {}", e),
        })?;

        let spec = wav_reader.spec();
        if spec.channels == 0 || spec.sample_rate == 0 {
            return Err(LiveTransError::Wav {
                message: format!(
                    "Unsupported WAV layout: {} channels at {}Hz",
                    spec.channels, spec.sample_rate
                ),
            });
        }

        let samples: Vec<f32> = match spec.sample_format {
            hound::SampleFormat::Float => wav_reader
                .samples::<f32>()
                .collect::<std::result::Result<Vec<_>, _>>(),
            hound::SampleFormat::Int => {
                let full_scale = (1i64 << (spec.bits_per_sample.clamp(1, 32) - 1)) as f32;
                wav_reader
                    .samples::<i32>()
                    .map(|s| s.map(|v| (v as f32 / full_scale).clamp(-1.0, 1.0)))
                    .collect::<std::result::Result<Vec<_>, _>>()
            }
        }
        .map_err(|e| LiveTransError::Wav {
            message: format!("Failed to read WAV samples: {}", e),
        })?;

        Ok(Self {
            sample_rate: spec.sample_rate,
            channels: spec.channels,
            samples,
            position: 0,
        })
    }

    /// Open a WAV file from disk.
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| LiveTransError::Wav {
            message: format!("Failed to open {}: {}", path.display(), e),
        })?;
        Self::from_reader(Box::new(std::io::BufReader::new(file)))
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Total duration in milliseconds.
    pub fn duration_ms(&self) -> u64 {
        let frames = self.samples.len() / self.channels as usize;
        frames as u64 * 1000 / self.sample_rate as u64
    }

    /// Next frame of up to `frame_duration_ms`, or `None` at end of file.
    ///
    /// The last frame may be shorter; inbound frames have arbitrary size.
    pub fn next_frame(&mut self, frame_duration_ms: u32) -> Option<AudioFrame> {
        if self.position >= self.samples.len() {
            return None;
        }
        let per_channel =
            (self.sample_rate as u64 * frame_duration_ms.max(1) as u64 / 1000).max(1) as usize;
        let len = per_channel * self.channels as usize;
        let end = (self.position + len).min(self.samples.len());
        let data = self.samples[self.position..end].to_vec();
        self.position = end;
        Some(AudioFrame::new(self.sample_rate, self.channels, data))
    }
}

/// Writes frames of one outbound track to a 16-bit mono WAV file.
pub struct WavTrackWriter {
    writer: hound::WavWriter<BufWriter<File>>,
    samples_written: u64,
}

impl WavTrackWriter {
    pub fn create(path: &Path, sample_rate: u32) -> Result<Self> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let writer = hound::WavWriter::create(path, spec).map_err(|e| LiveTransError::Wav {
            message: format!("Failed to create {}: {}", path.display(), e),
        })?;
        Ok(Self {
            writer,
            samples_written: 0,
        })
    }

    /// Append a frame; multi-channel frames keep only the first channel.
    pub fn write_frame(&mut self, frame: &AudioFrame) -> Result<()> {
        let step = frame.channels.max(1) as usize;
        for &sample in frame.data.iter().step_by(step) {
            self.writer
                .write_sample(sample_to_i16(sample))
                .map_err(|e| LiveTransError::Wav {
                    message: format!("Failed to write sample: {}", e),
                })?;
            self.samples_written += 1;
        }
        Ok(())
    }

    pub fn samples_written(&self) -> u64 {
        self.samples_written
    }

    /// Flush the header and close the file.
    pub fn finalize(self) -> Result<()> {
        self.writer.finalize().map_err(|e| LiveTransError::Wav {
            message: format!("Failed to finalize WAV: {}", e),
        })
    }
}
