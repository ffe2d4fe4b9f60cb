//! Default configuration constants for livetrans.
//!
//! Shared by the configuration types and the pipeline so that every stage
//! agrees on frame geometry and queue sizes.

/// Transport sample rate in Hz.
///
/// Both inbound and outbound tracks run at 48kHz, which is what WebRTC-style
/// room transports deliver natively.
pub const SAMPLE_RATE: u32 = 48000;

/// Channel count for inbound and outbound audio.
pub const CHANNELS: u16 = 1;

/// Duration of one outbound frame in milliseconds.
///
/// 10ms at 48kHz gives 480 samples per frame.
pub const FRAME_DURATION_MS: u32 = 10;

/// Capacity of the ingestion buffer in frames.
///
/// Roughly two seconds of audio at 10ms frames. Older frames are dropped
/// once this fills up.
pub const INGEST_CAPACITY: usize = 200;

/// Capacity of each per-language synthesis queue, in segments.
pub const SYNTHESIS_CAPACITY: usize = 8;

/// Channel depth between the ingestion feeder and the recognizer.
pub const RECOGNIZER_BUFFER: usize = 32;

/// Maximum number of engine calls (translate/synthesize) running at once.
pub const ENGINE_CONCURRENCY: usize = 8;

/// Timeout for a single translate or synthesize call.
pub const ENGINE_TIMEOUT_MS: u64 = 10_000;

/// Timeout for each graceful shutdown phase.
pub const SHUTDOWN_TIMEOUT_MS: u64 = 5_000;

/// Grace period after cancellation before a stage is abandoned.
pub const CANCEL_GRACE_MS: u64 = 1_000;

/// Default recognizer backend.
pub const DEFAULT_RECOGNIZER: &str = "scripted";

/// Default translator backend.
pub const DEFAULT_TRANSLATOR: &str = "passthrough";

/// Default synthesizer backend.
pub const DEFAULT_SYNTHESIZER: &str = "tone";

/// Prefix of outbound audio track names and audio status message types.
pub const AUDIO_TRACK_PREFIX: &str = "translation-audio-";

/// Name of an outbound audio track for a language.
pub fn audio_track_name(lang: &str) -> String {
    format!("{AUDIO_TRACK_PREFIX}{lang}")
}

/// Samples per channel in one outbound frame.
pub fn frame_samples(sample_rate: u32, frame_duration_ms: u32) -> usize {
    (sample_rate as u64 * frame_duration_ms as u64 / 1000) as usize
}
