//! Real-time translation pipeline.
//!
//! Each stage runs as its own tokio task, connected by bounded queues and
//! channels. The [`SessionController`] owns startup order and shutdown.

pub mod cancel;
pub mod controller;
pub mod dispatcher;
pub mod error;
pub mod ingest;
pub mod queue;
pub mod stats;
pub mod synthesis;
pub mod translation;

pub use cancel::CancelToken;
pub use controller::{CloseReason, SessionController, SessionState, StopHandle};
pub use dispatcher::{Dispatcher, DispatcherState, SequenceCounter};
pub use error::{ErrorReporter, LogReporter, StageError};
pub use ingest::Ingestion;
pub use queue::{DropOldestQueue, PushOutcome};
pub use stats::{SessionReport, SessionStats, StatsSnapshot};
pub use synthesis::{PumpExit, SynthesisJob, SynthesisPump, TrackFormat};
pub use translation::{TranslationOutcome, TranslationWorker};
