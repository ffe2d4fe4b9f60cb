//! Session descriptor parsing.
//!
//! A descriptor looks like:
//!
//! ```json
//! {
//!   "sourceLanguage": "en-US",
//!   "outputs": [
//!     {"lang": "es-ES", "captions": true, "audio": true, "voice": "es-ES-Neural2-A"},
//!     {"lang": "fr-FR", "captions": true, "audio": false}
//!   ]
//! }
//! ```
//!
//! Parsing is lenient about individual outputs (entries without a usable
//! `lang` are skipped, flags must be literal `true`) and strict about the
//! session as a whole: a missing source language or an empty output list
//! aborts the session.

use crate::error::{LiveTransError, Result};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;

/// Locale identifier such as `es-ES`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LanguageTag(String);

impl LanguageTag {
    /// Creates a tag from a non-empty, trimmed string.
    pub fn new(tag: impl Into<String>) -> Option<Self> {
        let tag = tag.into();
        let trimmed = tag.trim();
        if trimmed.is_empty() {
            None
        } else if trimmed.len() == tag.len() {
            Some(Self(tag))
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Primary language subtag, lowercased (`es` for `es-ES`).
    pub fn primary(&self) -> String {
        self.0
            .split(['-', '_'])
            .next()
            .unwrap_or_default()
            .to_ascii_lowercase()
    }
}

impl fmt::Display for LanguageTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for LanguageTag {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Default synthesis voice per primary language subtag.
const DEFAULT_VOICES: &[(&str, &str)] = &[
    ("es", "es-ES-Chirp-HD-D"),
    ("en", "en-US-Standard-A"),
    ("fr", "fr-FR-Standard-A"),
    ("de", "de-DE-Standard-A"),
];

/// Default voice for a language, if one is known.
pub fn default_voice(lang: &LanguageTag) -> Option<&'static str> {
    let primary = lang.primary();
    DEFAULT_VOICES
        .iter()
        .find(|(prefix, _)| *prefix == primary)
        .map(|(_, voice)| *voice)
}

/// Immutable per-session language configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    pub source_language: LanguageTag,
    /// Languages receiving text messages, first-seen order, no duplicates.
    pub caption_targets: Vec<LanguageTag>,
    /// Languages receiving a synthesized audio track, first-seen order.
    pub audio_targets: Vec<LanguageTag>,
    /// Explicit voice per language from the descriptor.
    pub voice_hints: HashMap<LanguageTag, String>,
    /// Event identifier when the descriptor came from an event service.
    pub event_id: Option<String>,
    pub event_name: Option<String>,
}

impl SessionConfig {
    /// Parses a descriptor from JSON text.
    pub fn from_json(text: &str) -> Result<Self> {
        if text.trim().is_empty() {
            return Err(LiveTransError::SessionConfig {
                message: "empty session descriptor".to_string(),
            });
        }
        let value: Value = serde_json::from_str(text).map_err(|e| LiveTransError::SessionConfig {
            message: format!("descriptor is not valid JSON: {}", e),
        })?;
        Self::from_value(&value)
    }

    /// Parses a descriptor from an already-decoded JSON value.
    pub fn from_value(value: &Value) -> Result<Self> {
        let obj = value.as_object().ok_or_else(|| LiveTransError::SessionConfig {
            message: "descriptor must be a JSON object".to_string(),
        })?;

        let source_language = obj
            .get("sourceLanguage")
            .and_then(Value::as_str)
            .and_then(LanguageTag::new)
            .ok_or_else(|| LiveTransError::SessionConfig {
                message: "missing sourceLanguage".to_string(),
            })?;

        let outputs = match obj.get("outputs").and_then(Value::as_array) {
            Some(list) if !list.is_empty() => list,
            _ => {
                return Err(LiveTransError::SessionConfig {
                    message: "no outputs configured".to_string(),
                });
            }
        };

        let mut caption_targets: Vec<LanguageTag> = Vec::new();
        let mut audio_targets: Vec<LanguageTag> = Vec::new();
        let mut voice_hints = HashMap::new();

        for output in outputs {
            let Some(entry) = output.as_object() else {
                continue;
            };
            let Some(lang) = entry
                .get("lang")
                .and_then(Value::as_str)
                .and_then(LanguageTag::new)
            else {
                tracing::debug!(?output, "skipping output without a usable lang");
                continue;
            };
            if lang == source_language {
                continue;
            }

            if entry.get("captions") == Some(&Value::Bool(true)) && !caption_targets.contains(&lang)
            {
                caption_targets.push(lang.clone());
            }
            if entry.get("audio") == Some(&Value::Bool(true)) && !audio_targets.contains(&lang) {
                audio_targets.push(lang.clone());
            }
            if let Some(voice) = entry.get("voice").and_then(Value::as_str)
                && !voice.trim().is_empty()
            {
                voice_hints
                    .entry(lang)
                    .or_insert_with(|| voice.trim().to_string());
            }
        }

        if caption_targets.is_empty() && audio_targets.is_empty() {
            return Err(LiveTransError::SessionConfig {
                message: "no enabled caption or audio output".to_string(),
            });
        }

        let text_field = |key: &str| {
            obj.get(key)
                .and_then(Value::as_str)
                .map(str::to_string)
        };

        Ok(Self {
            source_language,
            caption_targets,
            audio_targets,
            voice_hints,
            event_id: text_field("eventId"),
            event_name: text_field("eventName"),
        })
    }

    /// Every language that needs a translation, captions first, then
    /// audio-only languages, without duplicates.
    pub fn translation_targets(&self) -> Vec<LanguageTag> {
        let mut targets = self.caption_targets.clone();
        for lang in &self.audio_targets {
            if !targets.contains(lang) {
                targets.push(lang.clone());
            }
        }
        targets
    }

    pub fn is_caption_target(&self, lang: &LanguageTag) -> bool {
        self.caption_targets.contains(lang)
    }

    pub fn is_audio_target(&self, lang: &LanguageTag) -> bool {
        self.audio_targets.contains(lang)
    }

    /// Voice for a language: the descriptor's hint, else the default table.
    pub fn voice_for(&self, lang: &LanguageTag) -> Option<String> {
        self.voice_hints
            .get(lang)
            .cloned()
            .or_else(|| default_voice(lang).map(str::to_string))
    }
}
