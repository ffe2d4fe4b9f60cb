//! Error types for livetrans.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum LiveTransError {
    // Configuration errors
    #[error("Invalid configuration value for {key}: {message}")]
    ConfigInvalidValue { key: String, message: String },

    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    // Session descriptor errors
    #[error("Invalid session configuration: {message}")]
    SessionConfig { message: String },

    #[error("Session configuration unavailable: {message}")]
    SessionSource { message: String },

    // Engine errors
    #[error("Unknown {role} backend: {name}")]
    UnknownBackend { role: String, name: String },

    #[error("Translation {source_lang} -> {target_lang} failed: {message}")]
    Translation {
        source_lang: String,
        target_lang: String,
        message: String,
    },

    #[error("Speech synthesis for {lang} failed: {message}")]
    Synthesis { lang: String, message: String },

    #[error("{operation} timed out after {timeout_ms}ms")]
    EngineTimeout { operation: String, timeout_ms: u64 },

    // Transport errors
    #[error("Transport connection failed: {message}")]
    TransportConnect { message: String },

    #[error("Failed to publish track {track}: {message}")]
    TrackPublish { track: String, message: String },

    #[error("Failed to write frame to track {track}: {message}")]
    TrackWrite { track: String, message: String },

    #[error("Failed to publish data message: {message}")]
    DataPublish { message: String },

    #[error("Transport closed")]
    TransportClosed,

    // Audio errors
    #[error("WAV error: {message}")]
    Wav { message: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // General I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Generic error for cases not covered above
    #[error("{0}")]
    Other(String),
}

impl LiveTransError {
    /// True for errors that should abort session startup.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            LiveTransError::ConfigInvalidValue { .. }
                | LiveTransError::Config(_)
                | LiveTransError::SessionConfig { .. }
                | LiveTransError::SessionSource { .. }
                | LiveTransError::UnknownBackend { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, LiveTransError>;
