use crate::error::{LiveTransError, Result};
use crate::session::LanguageTag;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Trait for text translation.
///
/// Implementations block; the pipeline always calls them from the engine
/// pool, never from an async stage directly.
pub trait Translator: Send + Sync {
    /// Translate `text` from `source` to `target`.
    fn translate(&self, text: &str, source: &LanguageTag, target: &LanguageTag)
    -> Result<String>;

    /// Backend name for logs.
    fn name(&self) -> &str;
}

/// Returns the input unchanged. Useful for caption-only deployments and
/// for exercising the pipeline without a translation service.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughTranslator;

impl Translator for PassthroughTranslator {
    fn translate(
        &self,
        text: &str,
        _source: &LanguageTag,
        _target: &LanguageTag,
    ) -> Result<String> {
        Ok(text.to_string())
    }

    fn name(&self) -> &str {
        "passthrough"
    }
}

/// Mock translator for testing.
///
/// By default it answers `"[{target}] {text}"`.
#[derive(Debug, Default)]
pub struct MockTranslator {
    responses: HashMap<String, String>,
    failing: HashSet<String>,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl MockTranslator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fixed answer for one target language.
    pub fn with_response(mut self, target: &str, response: &str) -> Self {
        self.responses
            .insert(target.to_string(), response.to_string());
        self
    }

    /// Fail every call for one target language.
    pub fn with_failure_for(mut self, target: &str) -> Self {
        self.failing.insert(target.to_string());
        self
    }

    /// Block for `delay` before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Number of translate calls so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Translator for MockTranslator {
    fn translate(
        &self,
        text: &str,
        source: &LanguageTag,
        target: &LanguageTag,
    ) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        if self.failing.contains(target.as_str()) {
            return Err(LiveTransError::Translation {
                source_lang: source.to_string(),
                target_lang: target.to_string(),
                message: "mock translation failure".to_string(),
            });
        }
        Ok(self
            .responses
            .get(target.as_str())
            .cloned()
            .unwrap_or_else(|| format!("[{}] {}", target, text)))
    }

    fn name(&self) -> &str {
        "mock"
    }
}

/// LibreTranslate-compatible HTTP translator.
///
/// Sends `POST {base}/translate` with `{q, source, target, format}` and reads
/// `translatedText` from the response. Language tags are reduced to their
/// primary subtag.
///
/// Uses the blocking reqwest client. It is built on first use, which happens
/// on the engine pool's blocking threads.
#[cfg(feature = "http")]
pub struct HttpTranslator {
    endpoint: String,
    api_key: Option<String>,
    client: std::sync::OnceLock<reqwest::blocking::Client>,
}

#[cfg(feature = "http")]
impl HttpTranslator {
    pub fn new(base_url: &str, api_key: Option<String>) -> Self {
        Self {
            endpoint: format!("{}/translate", base_url.trim_end_matches('/')),
            api_key,
            client: std::sync::OnceLock::new(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn request_body(
        &self,
        text: &str,
        source: &LanguageTag,
        target: &LanguageTag,
    ) -> serde_json::Value {
        let mut body = serde_json::json!({
            "q": text,
            "source": source.primary(),
            "target": target.primary(),
            "format": "text",
        });
        if let Some(key) = &self.api_key {
            body["api_key"] = serde_json::Value::String(key.clone());
        }
        body
    }

    fn client(&self) -> std::result::Result<&reqwest::blocking::Client, reqwest::Error> {
        if let Some(client) = self.client.get() {
            return Ok(client);
        }
        let client = reqwest::blocking::Client::builder().build()?;
        Ok(self.client.get_or_init(|| client))
    }
}

#[cfg(feature = "http")]
impl Translator for HttpTranslator {
    fn translate(
        &self,
        text: &str,
        source: &LanguageTag,
        target: &LanguageTag,
    ) -> Result<String> {
        let fail = |message: String| LiveTransError::Translation {
            source_lang: source.to_string(),
            target_lang: target.to_string(),
            message,
        };
        let body = self.request_body(text, source, target);

        let response = self
            .client()
            .map_err(|e| fail(e.to_string()))?
            .post(&self.endpoint)
            .json(&body)
            .send()
            .map_err(|e| fail(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(fail(format!("HTTP {}", status)));
        }
        let value: serde_json::Value = response.json().map_err(|e| fail(e.to_string()))?;

        value
            .get("translatedText")
            .and_then(serde_json::Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| fail("response has no translatedText".to_string()))
    }

    fn name(&self) -> &str {
        "http"
    }
}
