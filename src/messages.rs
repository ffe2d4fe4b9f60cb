//! Structured data messages published on the reliable channel.
//!
//! Every message is a JSON object with a `type` field. Per-language message
//! types embed the language tag (`translation-text-es-ES`), so the wire form
//! is built by hand rather than through a serde tag.

use crate::clock::Clock;
use crate::defaults::AUDIO_TRACK_PREFIX;
use crate::error::Result;
use crate::pipeline::stats::SessionStats;
use crate::transport::Transport;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::Arc;

pub const CAPTION: &str = "caption";
pub const ORIGINAL_TEXT: &str = "original-language-text";
pub const TRANSLATION_TEXT_PREFIX: &str = "translation-text-";
pub const TRANSLATION_STATUS_PREFIX: &str = "translation-status-";
pub const SESSION_STATUS: &str = "status";

/// Phase of one synthesized segment on its audio track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioStatus {
    Start,
    End,
    Error,
}

impl AudioStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AudioStatus::Start => "start",
            AudioStatus::End => "end",
            AudioStatus::Error => "error",
        }
    }
}

/// Session-level announcement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Active,
    Draining,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Active => "active",
            SessionStatus::Draining => "draining",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// Legacy caption form of the source-language transcript.
    Caption {
        lang: String,
        text: String,
        is_final: bool,
    },
    OriginalText {
        lang: String,
        text: String,
        is_final: bool,
        seq: u64,
        ts: i64,
    },
    TranslationText {
        src_lang: String,
        lang: String,
        text: String,
        is_final: bool,
        seq: u64,
        ts: i64,
    },
    AudioStatus {
        lang: String,
        status: AudioStatus,
        seq: u64,
        ts: i64,
    },
    /// Translation for `lang` failed and the source text was sent instead.
    TranslationError {
        lang: String,
        seq: u64,
        ts: i64,
        detail: String,
    },
    SessionStatus {
        status: SessionStatus,
        ts: i64,
    },
}

impl Message {
    /// Value of the `type` field.
    pub fn message_type(&self) -> String {
        match self {
            Message::Caption { .. } => CAPTION.to_string(),
            Message::OriginalText { .. } => ORIGINAL_TEXT.to_string(),
            Message::TranslationText { lang, .. } => format!("{TRANSLATION_TEXT_PREFIX}{lang}"),
            Message::AudioStatus { lang, .. } => format!("{AUDIO_TRACK_PREFIX}{lang}"),
            Message::TranslationError { lang, .. } => format!("{TRANSLATION_STATUS_PREFIX}{lang}"),
            Message::SessionStatus { .. } => SESSION_STATUS.to_string(),
        }
    }

    pub fn to_json(&self) -> Value {
        let kind = self.message_type();
        match self {
            Message::Caption {
                lang,
                text,
                is_final,
            } => json!({"type": kind, "lang": lang, "text": text, "isFinal": is_final}),
            Message::OriginalText {
                lang,
                text,
                is_final,
                seq,
                ts,
            } => json!({
                "type": kind, "lang": lang, "text": text,
                "isFinal": is_final, "seq": seq, "ts": ts,
            }),
            Message::TranslationText {
                src_lang,
                lang,
                text,
                is_final,
                seq,
                ts,
            } => json!({
                "type": kind, "srcLang": src_lang, "lang": lang, "text": text,
                "isFinal": is_final, "seq": seq, "ts": ts,
            }),
            Message::AudioStatus {
                status, seq, ts, ..
            } => json!({"type": kind, "status": status, "seq": seq, "ts": ts}),
            Message::TranslationError {
                lang,
                seq,
                ts,
                detail,
            } => json!({
                "type": kind, "status": "error", "lang": lang,
                "seq": seq, "ts": ts, "detail": detail,
            }),
            Message::SessionStatus { status, ts } => {
                json!({"type": kind, "status": status, "ts": ts})
            }
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(&self.to_json())?)
    }

    /// Parses a wire message. Returns `None` for unknown or malformed input.
    pub fn from_json(value: &Value) -> Option<Self> {
        let kind = value.get("type")?.as_str()?;
        let text = |key: &str| value.get(key).and_then(Value::as_str).map(str::to_string);
        let seq = || value.get("seq").and_then(Value::as_u64);
        let ts = || value.get("ts").and_then(Value::as_i64);
        let is_final = || value.get("isFinal").and_then(Value::as_bool);

        if kind == CAPTION {
            return Some(Message::Caption {
                lang: text("lang")?,
                text: text("text")?,
                is_final: is_final()?,
            });
        }
        if kind == ORIGINAL_TEXT {
            return Some(Message::OriginalText {
                lang: text("lang")?,
                text: text("text")?,
                is_final: is_final()?,
                seq: seq()?,
                ts: ts()?,
            });
        }
        if kind == SESSION_STATUS {
            return Some(Message::SessionStatus {
                status: serde_json::from_value(value.get("status")?.clone()).ok()?,
                ts: ts()?,
            });
        }
        if let Some(lang) = kind.strip_prefix(TRANSLATION_TEXT_PREFIX) {
            return Some(Message::TranslationText {
                src_lang: text("srcLang")?,
                lang: lang.to_string(),
                text: text("text")?,
                is_final: is_final()?,
                seq: seq()?,
                ts: ts()?,
            });
        }
        if let Some(lang) = kind.strip_prefix(AUDIO_TRACK_PREFIX) {
            return Some(Message::AudioStatus {
                lang: lang.to_string(),
                status: serde_json::from_value(value.get("status")?.clone()).ok()?,
                seq: seq()?,
                ts: ts()?,
            });
        }
        if let Some(lang) = kind.strip_prefix(TRANSLATION_STATUS_PREFIX) {
            return Some(Message::TranslationError {
                lang: lang.to_string(),
                seq: seq()?,
                ts: ts()?,
                detail: text("detail").unwrap_or_default(),
            });
        }
        None
    }
}

/// Publishes messages on the transport's data channel.
///
/// Stamps timestamps from the session clock and never fails the caller: a
/// message that cannot be delivered is logged and counted.
#[derive(Clone)]
pub struct MessageChannel {
    transport: Arc<dyn Transport>,
    clock: Arc<dyn Clock>,
    stats: Arc<SessionStats>,
}

impl MessageChannel {
    pub fn new(
        transport: Arc<dyn Transport>,
        clock: Arc<dyn Clock>,
        stats: Arc<SessionStats>,
    ) -> Self {
        Self {
            transport,
            clock,
            stats,
        }
    }

    /// Current session time in epoch milliseconds.
    pub fn now_ms(&self) -> i64 {
        self.clock.now_ms()
    }

    /// Returns whether the message reached the transport.
    pub async fn publish(&self, message: Message) -> bool {
        let kind = message.message_type();
        let payload = match message.to_bytes() {
            Ok(payload) => payload,
            Err(e) => {
                tracing::error!(kind, error = %e, "failed to encode message");
                self.stats.record_message_failed();
                return false;
            }
        };
        match self.transport.publish_data(payload).await {
            Ok(()) => {
                tracing::trace!(kind, "message published");
                self.stats.record_message_sent();
                true
            }
            Err(e) => {
                tracing::warn!(kind, error = %e, "failed to publish message");
                self.stats.record_message_failed();
                false
            }
        }
    }

    pub async fn audio_status(&self, lang: &str, status: AudioStatus, seq: u64) -> bool {
        self.publish(Message::AudioStatus {
            lang: lang.to_string(),
            status,
            seq,
            ts: self.now_ms(),
        })
        .await
    }

    pub async fn session_status(&self, status: SessionStatus) -> bool {
        self.publish(Message::SessionStatus {
            status,
            ts: self.now_ms(),
        })
        .await
    }
}
