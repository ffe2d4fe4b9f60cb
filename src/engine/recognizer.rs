use crate::audio::PcmChunk;
use crate::error::{LiveTransError, Result};
use crate::session::LanguageTag;
use async_trait::async_trait;
use std::path::Path;
use tokio::sync::mpsc;

/// One recognition result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecognitionEvent {
    pub text: String,
    pub is_final: bool,
    /// Language reported by the engine, when it differs from the configured one.
    pub language: Option<LanguageTag>,
}

impl RecognitionEvent {
    pub fn interim(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_final: false,
            language: None,
        }
    }

    pub fn final_text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_final: true,
            language: None,
        }
    }
}

/// Streaming speech recognition.
///
/// `run` consumes PCM chunks until the audio channel closes, sending events
/// as they become available, and returns once every pending result has been
/// flushed. Dropping `events` on return is what tells the dispatcher the
/// recognition stream has ended.
#[async_trait]
pub trait Recognizer: Send + Sync {
    async fn run(
        &self,
        language: LanguageTag,
        audio: mpsc::Receiver<PcmChunk>,
        events: mpsc::Sender<RecognitionEvent>,
    ) -> Result<()>;

    /// Backend name for logs.
    fn name(&self) -> &str;
}

/// A scripted utterance released once enough audio has been consumed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptedUtterance {
    /// Audio offset in milliseconds at which the utterance is final.
    pub at_ms: u64,
    pub text: String,
}

/// Spacing between script lines that carry no explicit offset.
const DEFAULT_SPACING_MS: u64 = 2_000;

/// Recognizer that replays a fixed transcript against the audio clock.
///
/// Each utterance becomes final once `at_ms` of audio has arrived; with
/// interims enabled, word-by-word partials are emitted first. Utterances
/// still pending when the audio ends are flushed as finals.
#[derive(Debug, Clone, Default)]
pub struct ScriptedRecognizer {
    utterances: Vec<ScriptedUtterance>,
    interims: bool,
}

impl ScriptedRecognizer {
    pub fn new(utterances: Vec<ScriptedUtterance>) -> Self {
        let mut utterances = utterances;
        utterances.sort_by_key(|u| u.at_ms);
        Self {
            utterances,
            interims: false,
        }
    }

    /// Every text becomes final on the first chunk of audio.
    pub fn immediate<I, S>(texts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(
            texts
                .into_iter()
                .map(|text| ScriptedUtterance {
                    at_ms: 0,
                    text: text.into(),
                })
                .collect(),
        )
    }

    /// Emit word-by-word interim results before each final.
    pub fn with_interims(mut self) -> Self {
        self.interims = true;
        self
    }

    /// Parses a script, one utterance per line.
    ///
    /// A line may start with `@<ms>` to pin its offset; otherwise it follows
    /// the previous line by two seconds. Blank lines and `#` comments are
    /// skipped.
    pub fn parse_script(script: &str) -> Result<Self> {
        let mut utterances = Vec::new();
        let mut next_at = DEFAULT_SPACING_MS;

        for (index, raw) in script.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (at_ms, text) = match line.strip_prefix('@') {
                Some(rest) => {
                    let (offset, text) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
                    let at = offset.parse::<u64>().map_err(|_| LiveTransError::ConfigInvalidValue {
                        key: "engines.script".to_string(),
                        message: format!("line {}: bad offset '{}'", index + 1, offset),
                    })?;
                    (at, text.trim())
                }
                None => (next_at, line),
            };
            if text.is_empty() {
                continue;
            }
            utterances.push(ScriptedUtterance {
                at_ms,
                text: text.to_string(),
            });
            next_at = at_ms + DEFAULT_SPACING_MS;
        }

        Ok(Self::new(utterances))
    }

    /// Loads a script file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let script = std::fs::read_to_string(path).map_err(|e| LiveTransError::ConfigInvalidValue {
            key: "engines.script".to_string(),
            message: format!("cannot read {}: {}", path.display(), e),
        })?;
        Self::parse_script(&script)
    }

    pub fn utterances(&self) -> &[ScriptedUtterance] {
        &self.utterances
    }

    async fn emit(
        &self,
        utterance: &ScriptedUtterance,
        events: &mpsc::Sender<RecognitionEvent>,
    ) -> bool {
        if self.interims {
            let words: Vec<&str> = utterance.text.split_whitespace().collect();
            for end in 1..words.len() {
                let partial = RecognitionEvent::interim(words[..end].join(" "));
                if events.send(partial).await.is_err() {
                    return false;
                }
            }
        }
        events
            .send(RecognitionEvent::final_text(utterance.text.clone()))
            .await
            .is_ok()
    }
}

#[async_trait]
impl Recognizer for ScriptedRecognizer {
    async fn run(
        &self,
        language: LanguageTag,
        mut audio: mpsc::Receiver<PcmChunk>,
        events: mpsc::Sender<RecognitionEvent>,
    ) -> Result<()> {
        tracing::debug!(
            %language,
            utterances = self.utterances.len(),
            "scripted recognizer started"
        );
        let mut pending = self.utterances.iter().peekable();
        let mut heard_us: u64 = 0;
        let mut last_sequence: Option<u64> = None;

        while let Some(chunk) = audio.recv().await {
            if let Some(prev) = last_sequence
                && chunk.sequence > prev + 1
            {
                tracing::debug!(
                    missing = chunk.sequence - prev - 1,
                    "audio gap in recognizer input"
                );
            }
            last_sequence = Some(chunk.sequence);
            if chunk.sample_rate > 0 {
                heard_us += chunk.sample_count() as u64 * 1_000_000 / chunk.sample_rate as u64;
            }

            while let Some(utterance) = pending.next_if(|u| u.at_ms * 1000 <= heard_us) {
                if !self.emit(utterance, &events).await {
                    return Ok(());
                }
            }
        }

        for utterance in pending {
            if !self.emit(utterance, &events).await {
                break;
            }
        }
        tracing::debug!(heard_ms = heard_us / 1000, "scripted recognizer finished");
        Ok(())
    }

    fn name(&self) -> &str {
        "scripted"
    }
}
