//! Per-language translation of one transcript.

use crate::engine::EnginePool;
use crate::messages::{Message, MessageChannel};
use crate::pipeline::queue::{DropOldestQueue, PushOutcome};
use crate::pipeline::stats::SessionStats;
use crate::pipeline::synthesis::SynthesisJob;
use crate::session::{LanguageTag, SessionConfig};
use std::collections::HashMap;
use std::sync::Arc;

/// What happened to one (transcript, language) pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TranslationOutcome {
    Translated(String),
    /// The engine failed; the source text was used instead.
    Fallback { text: String, reason: String },
}

impl TranslationOutcome {
    pub fn text(&self) -> &str {
        match self {
            TranslationOutcome::Translated(text) => text,
            TranslationOutcome::Fallback { text, .. } => text,
        }
    }
}

/// Shared by every translation task of a session.
pub struct TranslationWorker {
    session: Arc<SessionConfig>,
    engines: EnginePool,
    messages: MessageChannel,
    synthesis: HashMap<LanguageTag, Arc<DropOldestQueue<SynthesisJob>>>,
    stats: Arc<SessionStats>,
}

impl TranslationWorker {
    pub fn new(
        session: Arc<SessionConfig>,
        engines: EnginePool,
        messages: MessageChannel,
        synthesis: HashMap<LanguageTag, Arc<DropOldestQueue<SynthesisJob>>>,
        stats: Arc<SessionStats>,
    ) -> Self {
        Self {
            session,
            engines,
            messages,
            synthesis,
            stats,
        }
    }

    /// Translates `text` into `target`, publishes it for caption languages
    /// and queues synthesis for audio languages (finals only).
    pub async fn handle(
        &self,
        text: &str,
        source: &LanguageTag,
        target: &LanguageTag,
        seq: u64,
        is_final: bool,
    ) -> TranslationOutcome {
        let outcome = match self.engines.translate(text, source, target).await {
            Ok(translated) => {
                self.stats.record_translation();
                tracing::debug!(lang = %target, seq, "translated");
                TranslationOutcome::Translated(translated)
            }
            Err(e) => {
                self.stats.record_translation_fallback();
                tracing::warn!(
                    lang = %target,
                    seq,
                    error = %e,
                    "translation failed, using source text"
                );
                TranslationOutcome::Fallback {
                    text: text.to_string(),
                    reason: e.to_string(),
                }
            }
        };

        if self.session.is_caption_target(target) {
            self.messages
                .publish(Message::TranslationText {
                    src_lang: source.to_string(),
                    lang: target.to_string(),
                    text: outcome.text().to_string(),
                    is_final,
                    seq,
                    ts: self.messages.now_ms(),
                })
                .await;
        }

        if let TranslationOutcome::Fallback { reason, .. } = &outcome {
            self.messages
                .publish(Message::TranslationError {
                    lang: target.to_string(),
                    seq,
                    ts: self.messages.now_ms(),
                    detail: reason.clone(),
                })
                .await;
        }

        if is_final {
            self.enqueue_synthesis(target, seq, outcome.text());
        }
        outcome
    }

    fn enqueue_synthesis(&self, lang: &LanguageTag, seq: u64, text: &str) {
        let Some(queue) = self.synthesis.get(lang) else {
            return;
        };
        if text.trim().is_empty() {
            return;
        }
        let job = SynthesisJob {
            lang: lang.clone(),
            seq,
            text: text.to_string(),
            voice: self.session.voice_for(lang),
        };
        match queue.push(job) {
            PushOutcome::Accepted => self.stats.record_segment_enqueued(),
            PushOutcome::Evicted(old) => {
                self.stats.record_segment_enqueued();
                self.stats.record_segment_evicted();
                tracing::warn!(
                    lang = %lang,
                    seq,
                    evicted_seq = old.seq,
                    "synthesis queue full, dropped oldest segment"
                );
            }
            PushOutcome::Closed(_) => {
                tracing::debug!(lang = %lang, seq, "synthesis queue closed, segment skipped");
            }
        }
    }
}
