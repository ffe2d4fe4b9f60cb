//! livetrans - real-time speech translation for live rooms
//!
//! Listens to a speaker's audio track, recognizes speech, translates each
//! final transcript into every target language and publishes captions plus
//! synthesized audio back into the room.

#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::let_underscore_must_use)]

pub mod audio;
#[cfg(feature = "cli")]
pub mod cli;
pub mod clock;
pub mod config;
pub mod defaults;
pub mod engine;
pub mod error;
#[cfg(all(test, feature = "http"))]
mod http_stub;
pub mod messages;
pub mod pipeline;
pub mod session;
pub mod transport;

// Engine roles
pub use engine::{Engines, Recognizer, Synthesizer, Translator};

// Session lifecycle
pub use pipeline::{SessionController, SessionReport, SessionState, StopHandle};
pub use session::{LanguageTag, SessionConfig, SessionSource};
pub use transport::{OutboundTrack, Transport, TransportEvent};

// Error handling
pub use error::{LiveTransError, Result};

// Config
pub use config::Config;

/// Build version string with optional git commit hash.
///
/// Returns `"0.1.0+abc1234"` when git hash is available, `"0.1.0"` otherwise.
pub fn version_string() -> String {
    let version = env!("CARGO_PKG_VERSION");
    match option_env!("GIT_HASH") {
        Some(hash) if !hash.is_empty() => format!("{}+{}", version, hash),
        _ => version.to_string(),
    }
}
