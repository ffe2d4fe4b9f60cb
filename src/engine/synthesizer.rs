use crate::audio::codec::samples_to_bytes;
use crate::error::{LiveTransError, Result};
use crate::session::LanguageTag;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

/// Trait for speech synthesis.
///
/// Returns mono little-endian linear16 PCM at the rate the synthesizer was
/// built for. Implementations may block for seconds.
pub trait Synthesizer: Send + Sync {
    fn synthesize(&self, text: &str, lang: &LanguageTag, voice: Option<&str>) -> Result<Vec<u8>>;

    /// Output sample rate in Hz.
    fn sample_rate(&self) -> u32;

    /// Backend name for logs.
    fn name(&self) -> &str;
}

/// Speech-length audio per character of input text.
const MS_PER_CHAR: u64 = 60;

/// Upper bound on placeholder audio length.
const MAX_PLACEHOLDER_MS: u64 = 10_000;

fn placeholder_samples(text: &str, sample_rate: u32) -> usize {
    let chars = text.chars().filter(|c| !c.is_whitespace()).count() as u64;
    let ms = (chars * MS_PER_CHAR).clamp(MS_PER_CHAR, MAX_PLACEHOLDER_MS);
    (sample_rate as u64 * ms / 1000) as usize
}

/// Placeholder synthesizer producing a sine tone whose length follows the
/// text and whose pitch depends on the language.
#[derive(Debug, Clone)]
pub struct ToneSynthesizer {
    sample_rate: u32,
    amplitude: f32,
}

impl ToneSynthesizer {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            amplitude: 0.2,
        }
    }

    fn frequency_for(lang: &LanguageTag, voice: Option<&str>) -> f32 {
        let key = voice.unwrap_or(lang.as_str());
        let hash = key
            .bytes()
            .fold(0u32, |acc, b| acc.wrapping_mul(31).wrapping_add(b as u32));
        220.0 + (hash % 16) as f32 * 27.5
    }
}

impl Synthesizer for ToneSynthesizer {
    fn synthesize(&self, text: &str, lang: &LanguageTag, voice: Option<&str>) -> Result<Vec<u8>> {
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }
        let count = placeholder_samples(text, self.sample_rate);
        let freq = Self::frequency_for(lang, voice);
        let rate = self.sample_rate as f32;
        // 5ms linear fade at both ends avoids clicks between segments.
        let fade = ((rate * 0.005) as usize).max(1);

        let samples: Vec<i16> = (0..count)
            .map(|i| {
                let envelope = (i.min(count - 1 - i) as f32 / fade as f32).min(1.0);
                let phase = 2.0 * std::f32::consts::PI * freq * i as f32 / rate;
                (phase.sin() * self.amplitude * envelope * 32767.0) as i16
            })
            .collect();
        Ok(samples_to_bytes(&samples))
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn name(&self) -> &str {
        "tone"
    }
}

/// Placeholder synthesizer producing silence of speech-like length.
#[derive(Debug, Clone)]
pub struct SilenceSynthesizer {
    sample_rate: u32,
}

impl SilenceSynthesizer {
    pub fn new(sample_rate: u32) -> Self {
        Self { sample_rate }
    }
}

impl Synthesizer for SilenceSynthesizer {
    fn synthesize(&self, text: &str, _lang: &LanguageTag, _voice: Option<&str>) -> Result<Vec<u8>> {
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }
        Ok(vec![0u8; placeholder_samples(text, self.sample_rate) * 2])
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn name(&self) -> &str {
        "silence"
    }
}

/// One recorded call to [`MockSynthesizer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynthesisCall {
    pub lang: String,
    pub text: String,
    pub voice: Option<String>,
}

/// Mock synthesizer for testing.
///
/// Returns `samples` samples of a constant non-zero value. Delays and
/// failures can be configured per language, and every call is recorded.
#[derive(Debug)]
pub struct MockSynthesizer {
    sample_rate: u32,
    samples: usize,
    delays: HashMap<String, Duration>,
    failing: HashSet<String>,
    calls: Mutex<Vec<SynthesisCall>>,
}

impl MockSynthesizer {
    pub fn new(sample_rate: u32, samples: usize) -> Self {
        Self {
            sample_rate,
            samples,
            delays: HashMap::new(),
            failing: HashSet::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Block for `delay` on every call for `lang`.
    pub fn with_delay_for(mut self, lang: &str, delay: Duration) -> Self {
        self.delays.insert(lang.to_string(), delay);
        self
    }

    /// Fail every call for `lang`.
    pub fn with_failure_for(mut self, lang: &str) -> Self {
        self.failing.insert(lang.to_string());
        self
    }

    /// Calls made so far, in call order.
    pub fn calls(&self) -> Vec<SynthesisCall> {
        self.calls
            .lock()
            .map(|calls| calls.clone())
            .unwrap_or_default()
    }
}

impl Synthesizer for MockSynthesizer {
    fn synthesize(&self, text: &str, lang: &LanguageTag, voice: Option<&str>) -> Result<Vec<u8>> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(SynthesisCall {
                lang: lang.to_string(),
                text: text.to_string(),
                voice: voice.map(str::to_string),
            });
        }
        if let Some(delay) = self.delays.get(lang.as_str()) {
            std::thread::sleep(*delay);
        }
        if self.failing.contains(lang.as_str()) {
            return Err(LiveTransError::Synthesis {
                lang: lang.to_string(),
                message: "mock synthesis failure".to_string(),
            });
        }
        Ok(samples_to_bytes(&vec![1000i16; self.samples]))
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn name(&self) -> &str {
        "mock"
    }
}
