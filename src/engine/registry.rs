//! Backend selection by name.

use crate::config::Config;
use crate::engine::recognizer::{Recognizer, ScriptedRecognizer};
use crate::engine::synthesizer::{SilenceSynthesizer, Synthesizer, ToneSynthesizer};
use crate::engine::translator::{MockTranslator, PassthroughTranslator, Translator};
use crate::error::{LiveTransError, Result};
use std::sync::Arc;

pub const RECOGNIZER_BACKENDS: &[&str] = &["scripted"];
pub const TRANSLATOR_BACKENDS: &[&str] = &["passthrough", "http", "mock"];
pub const SYNTHESIZER_BACKENDS: &[&str] = &["tone", "silence"];

/// Engine clients shared by every stage of a session.
#[derive(Clone)]
pub struct Engines {
    pub recognizer: Arc<dyn Recognizer>,
    pub translator: Arc<dyn Translator>,
    pub synthesizer: Arc<dyn Synthesizer>,
}

impl Engines {
    pub fn new(
        recognizer: Arc<dyn Recognizer>,
        translator: Arc<dyn Translator>,
        synthesizer: Arc<dyn Synthesizer>,
    ) -> Self {
        Self {
            recognizer,
            translator,
            synthesizer,
        }
    }

    /// Builds the backends named in `config.engines`.
    pub fn from_config(config: &Config) -> Result<Self> {
        let engines = &config.engines;
        let recognizer = build_recognizer(config)?;
        let translator = build_translator(config)?;
        let synthesizer: Arc<dyn Synthesizer> = match engines.synthesizer.as_str() {
            "tone" => Arc::new(ToneSynthesizer::new(config.audio.sample_rate)),
            "silence" => Arc::new(SilenceSynthesizer::new(config.audio.sample_rate)),
            other => return Err(unknown("synthesizer", other)),
        };

        tracing::info!(
            recognizer = recognizer.name(),
            translator = translator.name(),
            synthesizer = synthesizer.name(),
            "engines ready"
        );
        Ok(Self::new(recognizer, translator, synthesizer))
    }
}

fn unknown(role: &str, name: &str) -> LiveTransError {
    LiveTransError::UnknownBackend {
        role: role.to_string(),
        name: name.to_string(),
    }
}

fn build_recognizer(config: &Config) -> Result<Arc<dyn Recognizer>> {
    match config.engines.recognizer.as_str() {
        "scripted" => {
            let recognizer = match &config.engines.script {
                Some(path) => ScriptedRecognizer::from_file(path)?,
                None => ScriptedRecognizer::default(),
            };
            Ok(Arc::new(recognizer))
        }
        other => Err(unknown("recognizer", other)),
    }
}

fn build_translator(config: &Config) -> Result<Arc<dyn Translator>> {
    match config.engines.translator.as_str() {
        "passthrough" => Ok(Arc::new(PassthroughTranslator)),
        "mock" => Ok(Arc::new(MockTranslator::new())),
        "http" => build_http_translator(config),
        other => Err(unknown("translator", other)),
    }
}

#[cfg(feature = "http")]
fn build_http_translator(config: &Config) -> Result<Arc<dyn Translator>> {
    let url = config
        .engines
        .translate_url
        .as_deref()
        .ok_or_else(|| LiveTransError::ConfigInvalidValue {
            key: "engines.translate_url".to_string(),
            message: "required by the http translator".to_string(),
        })?;
    Ok(Arc::new(crate::engine::translator::HttpTranslator::new(
        url,
        config.engines.translate_api_key.clone(),
    )))
}

#[cfg(not(feature = "http"))]
fn build_http_translator(_config: &Config) -> Result<Arc<dyn Translator>> {
    Err(LiveTransError::ConfigInvalidValue {
        key: "engines.translator".to_string(),
        message: "built without the http feature".to_string(),
    })
}
