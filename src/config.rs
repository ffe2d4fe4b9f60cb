use crate::defaults;
use crate::engine::registry::{RECOGNIZER_BACKENDS, SYNTHESIZER_BACKENDS, TRANSLATOR_BACKENDS};
use crate::error::{LiveTransError, Result};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub audio: AudioConfig,
    pub queues: QueueConfig,
    pub pipeline: PipelineConfig,
    pub engines: EngineConfig,
}

/// Transport audio format
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AudioConfig {
    pub sample_rate: u32,
    /// Channels of published tracks. Synthesized mono is copied onto each.
    pub channels: u16,
    pub frame_duration_ms: u32,
}

/// Queue and channel capacities
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct QueueConfig {
    pub ingest_capacity: usize,
    pub synthesis_capacity: usize,
    pub recognizer_buffer: usize,
}

/// Pipeline behaviour
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PipelineConfig {
    /// Fan interim transcripts out to translation as well as finals.
    pub translate_interim: bool,
    pub engine_concurrency: usize,
    pub engine_timeout_ms: u64,
    pub shutdown_timeout_ms: u64,
    /// Publish `{type:"status"}` messages when the session goes active/draining.
    pub announce_status: bool,
}

/// Engine backend selection
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    pub recognizer: String,
    pub translator: String,
    pub synthesizer: String,
    /// Base URL of the HTTP translation service.
    pub translate_url: Option<String>,
    pub translate_api_key: Option<String>,
    /// Transcript script for the scripted recognizer.
    pub script: Option<PathBuf>,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: defaults::SAMPLE_RATE,
            channels: defaults::CHANNELS,
            frame_duration_ms: defaults::FRAME_DURATION_MS,
        }
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            ingest_capacity: defaults::INGEST_CAPACITY,
            synthesis_capacity: defaults::SYNTHESIS_CAPACITY,
            recognizer_buffer: defaults::RECOGNIZER_BUFFER,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            translate_interim: false,
            engine_concurrency: defaults::ENGINE_CONCURRENCY,
            engine_timeout_ms: defaults::ENGINE_TIMEOUT_MS,
            shutdown_timeout_ms: defaults::SHUTDOWN_TIMEOUT_MS,
            announce_status: false,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            recognizer: defaults::DEFAULT_RECOGNIZER.to_string(),
            translator: defaults::DEFAULT_TRANSLATOR.to_string(),
            synthesizer: defaults::DEFAULT_SYNTHESIZER.to_string(),
            translate_url: None,
            translate_api_key: None,
            script: None,
        }
    }
}

impl AudioConfig {
    /// Samples per channel in one outbound frame.
    pub fn frame_samples(&self) -> usize {
        defaults::frame_samples(self.sample_rate, self.frame_duration_ms)
    }
}

impl PipelineConfig {
    pub fn engine_timeout(&self) -> Duration {
        Duration::from_millis(self.engine_timeout_ms)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Returns an error if the file contains invalid TOML.
    /// Missing fields will use default values.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config {}", path.display()))?;
        Ok(config)
    }

    /// Load configuration from a file or return defaults if file doesn't exist
    ///
    /// Only returns defaults if the file is missing.
    /// Returns errors for invalid TOML.
    pub fn load_or_default(path: &Path) -> anyhow::Result<Self> {
        match Self::load(path) {
            Ok(config) => Ok(config),
            Err(e)
                if e.downcast_ref::<std::io::Error>()
                    .is_some_and(|io_err| io_err.kind() == std::io::ErrorKind::NotFound) =>
            {
                Ok(Self::default())
            }
            Err(e) => Err(e),
        }
    }

    /// Apply environment variable overrides
    ///
    /// Supported environment variables:
    /// - LIVETRANS_RECOGNIZER → engines.recognizer
    /// - LIVETRANS_TRANSLATOR → engines.translator
    /// - LIVETRANS_SYNTHESIZER → engines.synthesizer
    /// - LIVETRANS_TRANSLATE_URL → engines.translate_url
    /// - LIVETRANS_TRANSLATE_API_KEY → engines.translate_api_key
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(name) = std::env::var("LIVETRANS_RECOGNIZER")
            && !name.is_empty()
        {
            self.engines.recognizer = name;
        }

        if let Ok(name) = std::env::var("LIVETRANS_TRANSLATOR")
            && !name.is_empty()
        {
            self.engines.translator = name;
        }

        if let Ok(name) = std::env::var("LIVETRANS_SYNTHESIZER")
            && !name.is_empty()
        {
            self.engines.synthesizer = name;
        }

        if let Ok(url) = std::env::var("LIVETRANS_TRANSLATE_URL")
            && !url.is_empty()
        {
            self.engines.translate_url = Some(url);
        }

        if let Ok(key) = std::env::var("LIVETRANS_TRANSLATE_API_KEY")
            && !key.is_empty()
        {
            self.engines.translate_api_key = Some(key);
        }

        self
    }

    /// Reject values the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        fn invalid(key: &str, message: &str) -> LiveTransError {
            LiveTransError::ConfigInvalidValue {
                key: key.to_string(),
                message: message.to_string(),
            }
        }

        if self.audio.sample_rate == 0 {
            return Err(invalid("audio.sample_rate", "must be positive"));
        }
        if self.audio.channels == 0 {
            return Err(invalid("audio.channels", "must be positive"));
        }
        if self.audio.frame_samples() == 0 {
            return Err(invalid(
                "audio.frame_duration_ms",
                "must yield at least one sample per frame",
            ));
        }
        if self.queues.ingest_capacity == 0 {
            return Err(invalid("queues.ingest_capacity", "must be positive"));
        }
        if self.queues.synthesis_capacity == 0 {
            return Err(invalid("queues.synthesis_capacity", "must be positive"));
        }
        if self.queues.recognizer_buffer == 0 {
            return Err(invalid("queues.recognizer_buffer", "must be positive"));
        }
        if self.pipeline.engine_concurrency == 0 {
            return Err(invalid("pipeline.engine_concurrency", "must be positive"));
        }
        if self.pipeline.engine_timeout_ms == 0 {
            return Err(invalid("pipeline.engine_timeout_ms", "must be positive"));
        }

        let known = [
            ("recognizer", &self.engines.recognizer, RECOGNIZER_BACKENDS),
            ("translator", &self.engines.translator, TRANSLATOR_BACKENDS),
            ("synthesizer", &self.engines.synthesizer, SYNTHESIZER_BACKENDS),
        ];
        for (role, name, backends) in known {
            if !backends.contains(&name.as_str()) {
                return Err(LiveTransError::UnknownBackend {
                    role: role.to_string(),
                    name: name.clone(),
                });
            }
        }

        Ok(())
    }

    /// Get the default configuration file path
    ///
    /// Returns ~/.config/livetrans/config.toml on Linux
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("livetrans").join("config.toml"))
    }
}
