//! Error classification and reporting for pipeline stages.

use std::fmt;

use crate::error::LiveTransError;

/// Errors that can occur while a stage processes one item.
#[derive(Debug, Clone)]
pub enum StageError {
    /// Recoverable error; the stage keeps serving its input.
    Recoverable(String),
    /// Fatal error; the stage shuts down and the session drains.
    Fatal(String),
}

impl StageError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, StageError::Fatal(_))
    }
}

impl fmt::Display for StageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageError::Recoverable(msg) => write!(f, "Recoverable error: {}", msg),
            StageError::Fatal(msg) => write!(f, "Fatal error: {}", msg),
        }
    }
}

impl std::error::Error for StageError {}

impl From<&LiveTransError> for StageError {
    /// Configuration and closed-transport errors stop a stage; engine and
    /// single-track failures only affect the item being processed.
    fn from(err: &LiveTransError) -> Self {
        match err {
            LiveTransError::TransportClosed => StageError::Fatal(err.to_string()),
            e if e.is_configuration() => StageError::Fatal(e.to_string()),
            e => StageError::Recoverable(e.to_string()),
        }
    }
}

/// Trait for reporting stage errors.
pub trait ErrorReporter: Send + Sync {
    /// Reports an error from a stage.
    fn report(&self, stage: &str, error: &StageError);
}

/// Reporter that forwards to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogReporter;

impl ErrorReporter for LogReporter {
    fn report(&self, stage: &str, error: &StageError) {
        match error {
            StageError::Recoverable(msg) => tracing::warn!(stage, "{}", msg),
            StageError::Fatal(msg) => tracing::error!(stage, "{}", msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_error_display() {
        let recoverable = StageError::Recoverable("temporary failure".to_string());
        assert_eq!(
            recoverable.to_string(),
            "Recoverable error: temporary failure"
        );

        let fatal = StageError::Fatal("critical failure".to_string());
        assert_eq!(fatal.to_string(), "Fatal error: critical failure");
    }

    #[test]
    fn test_classification_from_crate_error() {
        let engine = LiveTransError::Synthesis {
            lang: "es-ES".to_string(),
            message: "boom".to_string(),
        };
        assert!(!StageError::from(&engine).is_fatal());
        assert!(StageError::from(&LiveTransError::TransportClosed).is_fatal());

        let config = LiveTransError::SessionConfig {
            message: "missing sourceLanguage".to_string(),
        };
        assert!(StageError::from(&config).is_fatal());
    }

    #[test]
    fn test_log_reporter() {
        let reporter = LogReporter;
        reporter.report("test", &StageError::Recoverable("test error".to_string()));
        reporter.report("test", &StageError::Fatal("test error".to_string()));
    }
}
