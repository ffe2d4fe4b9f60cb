//! Transcription dispatch: sequence numbering, source-language messages and
//! fan-out to per-language translation tasks.

use crate::engine::RecognitionEvent;
use crate::messages::{Message, MessageChannel};
use crate::pipeline::cancel::CancelToken;
use crate::pipeline::stats::SessionStats;
use crate::pipeline::translation::TranslationWorker;
use crate::session::{LanguageTag, SessionConfig};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tokio::task::JoinSet;

/// Monotonic id source for final transcripts. Ids start at 1.
#[derive(Debug)]
pub struct SequenceCounter {
    next: AtomicU64,
}

impl Default for SequenceCounter {
    fn default() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }
}

impl SequenceCounter {
    /// Assigns the next id.
    pub fn next(&self) -> u64 {
        self.next.fetch_add(1, Ordering::SeqCst)
    }

    /// The id the next final transcript will receive.
    pub fn peek(&self) -> u64 {
        self.next.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatcherState {
    WaitingForAudio,
    Streaming,
    Finalizing,
}

/// Returned when the recognition stream ends.
pub struct DispatcherOutcome {
    /// Translation tasks that may still be running.
    pub tasks: JoinSet<()>,
    /// Final transcripts accepted.
    pub finals: u64,
}

pub struct Dispatcher {
    session: Arc<SessionConfig>,
    worker: Arc<TranslationWorker>,
    messages: MessageChannel,
    stats: Arc<SessionStats>,
    sequence: SequenceCounter,
    state: DispatcherState,
    targets: Vec<LanguageTag>,
    translate_interim: bool,
    tasks: JoinSet<()>,
    finals: u64,
}

impl Dispatcher {
    pub fn new(
        session: Arc<SessionConfig>,
        worker: Arc<TranslationWorker>,
        messages: MessageChannel,
        stats: Arc<SessionStats>,
        translate_interim: bool,
    ) -> Self {
        let targets = session.translation_targets();
        Self {
            session,
            worker,
            messages,
            stats,
            sequence: SequenceCounter::default(),
            state: DispatcherState::WaitingForAudio,
            targets,
            translate_interim,
            tasks: JoinSet::new(),
            finals: 0,
        }
    }

    pub fn state(&self) -> DispatcherState {
        self.state
    }

    /// Id the next final transcript will receive.
    pub fn peek_sequence(&self) -> u64 {
        self.sequence.peek()
    }

    /// Translation tasks not yet reaped.
    pub fn pending_tasks(&self) -> usize {
        self.tasks.len()
    }

    /// Handles one recognition event. Returns the id assigned to an accepted
    /// final transcript.
    pub async fn handle_event(&mut self, event: RecognitionEvent) -> Option<u64> {
        self.reap_finished();
        if self.state == DispatcherState::WaitingForAudio {
            tracing::debug!("first recognition result, streaming");
            self.state = DispatcherState::Streaming;
        }

        let language = event
            .language
            .clone()
            .unwrap_or_else(|| self.session.source_language.clone());
        let text = event.text.trim();

        if !event.is_final {
            if text.is_empty() {
                return None;
            }
            self.stats.record_interim_transcript();
            let seq = self.sequence.peek();
            self.publish_source(&language, text, false, seq).await;
            if self.translate_interim {
                self.fan_out(text, &language, seq, false);
            }
            return None;
        }

        if text.is_empty() {
            self.stats.record_empty_final();
            tracing::debug!("discarding empty final transcript");
            return None;
        }

        self.state = DispatcherState::Finalizing;
        let seq = self.sequence.next();
        self.finals += 1;
        self.stats.record_final_transcript();
        tracing::info!(seq, lang = %language, text, "final transcript");

        self.publish_source(&language, text, true, seq).await;
        self.fan_out(text, &language, seq, true);
        self.state = DispatcherState::Streaming;
        Some(seq)
    }

    async fn publish_source(&self, language: &LanguageTag, text: &str, is_final: bool, seq: u64) {
        self.messages
            .publish(Message::Caption {
                lang: language.to_string(),
                text: text.to_string(),
                is_final,
            })
            .await;
        self.messages
            .publish(Message::OriginalText {
                lang: language.to_string(),
                text: text.to_string(),
                is_final,
                seq,
                ts: self.messages.now_ms(),
            })
            .await;
    }

    /// Starts one translation task per target without waiting for any.
    fn fan_out(&mut self, text: &str, source: &LanguageTag, seq: u64, is_final: bool) {
        for target in &self.targets {
            if target == source {
                continue;
            }
            let worker = self.worker.clone();
            let text = text.to_string();
            let source = source.clone();
            let target = target.clone();
            self.tasks.spawn(async move {
                worker.handle(&text, &source, &target, seq, is_final).await;
            });
        }
    }

    fn reap_finished(&mut self) {
        while let Some(result) = self.tasks.try_join_next() {
            if let Err(e) = result
                && e.is_panic()
            {
                tracing::error!(error = %e, "translation task panicked");
            }
        }
    }

    /// Consumes recognition events until the stream ends or `cancel` fires.
    pub async fn run(
        mut self,
        mut events: mpsc::Receiver<RecognitionEvent>,
        cancel: CancelToken,
    ) -> DispatcherOutcome {
        loop {
            let event = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                event = events.recv() => event,
            };
            match event {
                Some(event) => {
                    self.handle_event(event).await;
                }
                None => break,
            }
        }
        self.reap_finished();
        tracing::debug!(
            finals = self.finals,
            pending = self.tasks.len(),
            "recognition stream ended"
        );
        DispatcherOutcome {
            tasks: self.tasks,
            finals: self.finals,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::MockClock;
    use crate::engine::{EnginePool, MockSynthesizer, MockTranslator};
    use crate::pipeline::queue::DropOldestQueue;
    use crate::transport::{MemoryTransport, Transport};
    use std::collections::HashMap;
    use std::time::Duration;

    async fn dispatcher(
        translator: MockTranslator,
        translate_interim: bool,
    ) -> (Dispatcher, MemoryTransport) {
        let session = Arc::new(
            SessionConfig::from_json(
                r#"{"sourceLanguage":"en-US","outputs":[
                    {"lang":"es-ES","captions":true,"audio":true},
                    {"lang":"fr-FR","captions":true,"audio":false}]}"#,
            )
            .unwrap(),
        );
        let transport = MemoryTransport::new();
        let _events = transport.connect().await.unwrap();
        let stats = Arc::new(SessionStats::default());
        let pool = EnginePool::new(
            Arc::new(translator),
            Arc::new(MockSynthesizer::new(48000, 480)),
            4,
            Duration::from_secs(1),
        );
        let messages = MessageChannel::new(
            Arc::new(transport.clone()),
            Arc::new(MockClock::new(5)),
            stats.clone(),
        );
        let es = LanguageTag::new("es-ES").unwrap();
        let queues = HashMap::from([(es, Arc::new(DropOldestQueue::new(4)))]);
        let worker = Arc::new(TranslationWorker::new(
            session.clone(),
            pool,
            messages.clone(),
            queues,
            stats.clone(),
        ));
        (
            Dispatcher::new(session, worker, messages, stats, translate_interim),
            transport,
        )
    }

    async fn finish(dispatcher: Dispatcher) {
        let (_tx, rx) = mpsc::channel(1);
        let cancel = CancelToken::new();
        cancel.cancel();
        let mut outcome = dispatcher.run(rx, cancel).await;
        while outcome.tasks.join_next().await.is_some() {}
    }

    #[test]
    fn test_sequence_counter() {
        let counter = SequenceCounter::default();
        assert_eq!(counter.peek(), 1);
        assert_eq!(counter.next(), 1);
        assert_eq!(counter.next(), 2);
        assert_eq!(counter.peek(), 3);
    }

    #[tokio::test]
    async fn test_sequence_ids_gap_free() {
        let (mut d, _transport) = dispatcher(MockTranslator::new(), false).await;
        assert_eq!(d.state(), DispatcherState::WaitingForAudio);

        let mut ids = Vec::new();
        for i in 0..25 {
            if i % 3 == 0 {
                assert_eq!(d.handle_event(RecognitionEvent::interim("partial")).await, None);
            }
            if i % 7 == 0 {
                assert_eq!(d.handle_event(RecognitionEvent::final_text("   ")).await, None);
            }
            let event = RecognitionEvent::final_text(format!("utterance {}", i));
            ids.push(d.handle_event(event).await.unwrap());
        }
        assert_eq!(ids, (1..=25).collect::<Vec<u64>>());
        assert_eq!(d.state(), DispatcherState::Streaming);
        finish(d).await;
    }

    #[tokio::test]
    async fn test_final_emits_source_messages_and_fans_out() {
        let (mut d, transport) = dispatcher(MockTranslator::new(), false).await;
        d.handle_event(RecognitionEvent::final_text("Hello everyone")).await;

        // Source messages are published before the handler returns.
        let original = transport.messages_of_type("original-language-text");
        assert_eq!(original.len(), 1);
        assert_eq!(original[0]["seq"], 1);
        assert_eq!(original[0]["lang"], "en-US");
        assert_eq!(original[0]["isFinal"], true);
        assert_eq!(transport.messages_of_type("caption").len(), 1);

        finish(d).await;
        let es = transport.messages_of_type("translation-text-es-ES");
        let fr = transport.messages_of_type("translation-text-fr-FR");
        assert_eq!(es.len(), 1);
        assert_eq!(fr.len(), 1);
        assert_eq!(es[0]["text"], "[es-ES] Hello everyone");
        assert_eq!(fr[0]["seq"], 1);
    }

    #[tokio::test]
    async fn test_interim_is_caption_only() {
        let (mut d, transport) = dispatcher(MockTranslator::new(), false).await;
        d.handle_event(RecognitionEvent::interim("Hello")).await;
        assert_eq!(d.pending_tasks(), 0);
        finish(d).await;

        let captions = transport.messages_of_type("caption");
        assert_eq!(captions.len(), 1);
        assert_eq!(captions[0]["isFinal"], false);
        let original = transport.messages_of_type("original-language-text");
        assert_eq!(original[0]["seq"], 1);
        assert!(transport.messages_of_type("translation-text-es-ES").is_empty());
    }

    #[tokio::test]
    async fn test_interim_translation_when_enabled() {
        let (mut d, transport) = dispatcher(MockTranslator::new(), true).await;
        d.handle_event(RecognitionEvent::interim("Hello")).await;
        assert_eq!(d.peek_sequence(), 1);
        finish(d).await;

        let es = transport.messages_of_type("translation-text-es-ES");
        assert_eq!(es.len(), 1);
        assert_eq!(es[0]["isFinal"], false);
        assert_eq!(es[0]["seq"], 1);
    }

    #[tokio::test]
    async fn test_translation_overlaps_next_transcript() {
        let slow = MockTranslator::new().with_delay(Duration::from_millis(100));
        let (mut d, transport) = dispatcher(slow, false).await;

        d.handle_event(RecognitionEvent::final_text("first")).await;
        d.handle_event(RecognitionEvent::final_text("second")).await;
        // Both transcripts accepted while translations are still in flight.
        assert_eq!(transport.messages_of_type("original-language-text").len(), 2);
        assert!(d.pending_tasks() > 0);

        finish(d).await;
        assert_eq!(transport.messages_of_type("translation-text-es-ES").len(), 2);
    }

    #[tokio::test]
    async fn test_run_ends_when_stream_closes() {
        let (d, _transport) = dispatcher(MockTranslator::new(), false).await;
        let (tx, rx) = mpsc::channel(4);
        tx.send(RecognitionEvent::final_text("one")).await.unwrap();
        tx.send(RecognitionEvent::final_text("two")).await.unwrap();
        drop(tx);

        let mut outcome = d.run(rx, CancelToken::new()).await;
        assert_eq!(outcome.finals, 2);
        while outcome.tasks.join_next().await.is_some() {}
    }
}
