//! Bounded execution of blocking engine calls.
//!
//! Every translate and synthesize call runs on tokio's blocking pool behind a
//! shared semaphore, so a burst of utterances cannot start more engine calls
//! than `engine_concurrency`, and each call is bounded by a timeout. A call
//! that times out keeps its permit until the engine actually returns.

use crate::engine::synthesizer::Synthesizer;
use crate::engine::translator::Translator;
use crate::error::{LiveTransError, Result};
use crate::session::LanguageTag;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

#[derive(Clone)]
pub struct EnginePool {
    translator: Arc<dyn Translator>,
    synthesizer: Arc<dyn Synthesizer>,
    semaphore: Arc<Semaphore>,
    timeout: Duration,
}

impl EnginePool {
    pub fn new(
        translator: Arc<dyn Translator>,
        synthesizer: Arc<dyn Synthesizer>,
        max_concurrent: usize,
        timeout: Duration,
    ) -> Self {
        Self {
            translator,
            synthesizer,
            semaphore: Arc::new(Semaphore::new(max_concurrent.max(1))),
            timeout,
        }
    }

    pub fn translator_name(&self) -> &str {
        self.translator.name()
    }

    pub fn synthesizer_name(&self) -> &str {
        self.synthesizer.name()
    }

    /// Output sample rate of the synthesizer.
    pub fn synthesis_rate(&self) -> u32 {
        self.synthesizer.sample_rate()
    }

    /// Permits currently free.
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    pub async fn translate(
        &self,
        text: &str,
        source: &LanguageTag,
        target: &LanguageTag,
    ) -> Result<String> {
        let translator = self.translator.clone();
        let text = text.to_string();
        let source = source.clone();
        let target = target.clone();
        self.run("translate", move || {
            translator.translate(&text, &source, &target)
        })
        .await
    }

    pub async fn synthesize(
        &self,
        text: &str,
        lang: &LanguageTag,
        voice: Option<&str>,
    ) -> Result<Vec<u8>> {
        let synthesizer = self.synthesizer.clone();
        let text = text.to_string();
        let lang = lang.clone();
        let voice = voice.map(str::to_string);
        self.run("synthesize", move || {
            synthesizer.synthesize(&text, &lang, voice.as_deref())
        })
        .await
    }

    async fn run<T, F>(&self, operation: &str, call: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T> + Send + 'static,
    {
        let timeout_error = || LiveTransError::EngineTimeout {
            operation: operation.to_string(),
            timeout_ms: self.timeout.as_millis() as u64,
        };

        // Waiting for a permit counts against the call's time budget.
        let deadline = tokio::time::Instant::now() + self.timeout;
        let permit = tokio::time::timeout_at(deadline, self.semaphore.clone().acquire_owned())
            .await
            .map_err(|_| timeout_error())?
            .map_err(|_| LiveTransError::Other("engine pool closed".to_string()))?;

        let handle = tokio::task::spawn_blocking(move || {
            let _permit = permit; // Hold permit until the engine returns
            call()
        });

        match tokio::time::timeout_at(deadline, handle).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => Err(LiveTransError::Other(format!(
                "{} task panicked: {}",
                operation, e
            ))),
            Err(_) => Err(timeout_error()),
        }
    }
}
