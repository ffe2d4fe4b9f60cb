//! Session counters shared by every stage.

use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

macro_rules! counters {
    ($($field:ident => $record:ident),* $(,)?) => {
        /// Lock-free counters updated by the pipeline stages.
        #[derive(Debug, Default)]
        pub struct SessionStats {
            $($field: AtomicU64,)*
        }

        impl SessionStats {
            $(
                pub fn $record(&self) {
                    self.$field.fetch_add(1, Ordering::Relaxed);
                }
            )*

            /// Point-in-time copy of every counter.
            pub fn snapshot(&self) -> StatsSnapshot {
                StatsSnapshot {
                    $($field: self.$field.load(Ordering::Relaxed),)*
                }
            }
        }

        /// Plain copy of [`SessionStats`].
        #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
        pub struct StatsSnapshot {
            $(pub $field: u64,)*
        }
    };
}

counters! {
    frames_received => record_frame_received,
    frames_dropped => record_frame_dropped,
    final_transcripts => record_final_transcript,
    interim_transcripts => record_interim_transcript,
    empty_finals => record_empty_final,
    translations => record_translation,
    translation_fallbacks => record_translation_fallback,
    segments_enqueued => record_segment_enqueued,
    segments_evicted => record_segment_evicted,
    segments_played => record_segment_played,
    segments_failed => record_segment_failed,
    segments_cancelled => record_segment_cancelled,
    frames_written => record_frame_written,
    messages_sent => record_message_sent,
    messages_failed => record_message_failed,
}

/// Summary returned when a session closes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionReport {
    pub source_language: String,
    pub caption_targets: Vec<String>,
    pub audio_targets: Vec<String>,
    pub stats: StatsSnapshot,
    pub duration_ms: u64,
    /// Stages that had to be cancelled or abandoned during shutdown.
    pub forced_stages: Vec<String>,
    /// Why the session ended.
    pub close_reason: String,
}

impl fmt::Display for SessionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = &self.stats;
        writeln!(
            f,
            "session {} -> captions [{}], audio [{}] ({}ms, {})",
            self.source_language,
            self.caption_targets.join(", "),
            self.audio_targets.join(", "),
            self.duration_ms,
            self.close_reason
        )?;
        writeln!(
            f,
            "  audio in:      {} frames, {} dropped",
            s.frames_received, s.frames_dropped
        )?;
        writeln!(
            f,
            "  transcripts:   {} final, {} interim, {} empty",
            s.final_transcripts, s.interim_transcripts, s.empty_finals
        )?;
        writeln!(
            f,
            "  translations:  {} ok, {} fallback",
            s.translations, s.translation_fallbacks
        )?;
        writeln!(
            f,
            "  segments:      {} queued, {} played, {} failed, {} evicted, {} cancelled",
            s.segments_enqueued,
            s.segments_played,
            s.segments_failed,
            s.segments_evicted,
            s.segments_cancelled
        )?;
        write!(
            f,
            "  output:        {} frames, {} messages ({} failed)",
            s.frames_written, s.messages_sent, s.messages_failed
        )?;
        if !self.forced_stages.is_empty() {
            write!(f, "\n  forced stop:   {}", self.forced_stages.join(", "))?;
        }
        Ok(())
    }
}
