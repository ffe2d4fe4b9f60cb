//! Per-language synthesis queue and pump.
//!
//! Each audio language owns one queue and one long-lived pump. The pump is
//! the only writer of its outbound track, so segments play in the order
//! they were queued; nothing orders one language against another.

use crate::audio::codec::{Linear16Frames, pcm_duration};
use crate::engine::EnginePool;
use crate::messages::{AudioStatus, MessageChannel};
use crate::pipeline::cancel::CancelToken;
use crate::pipeline::error::{ErrorReporter, StageError};
use crate::pipeline::queue::DropOldestQueue;
use crate::pipeline::stats::SessionStats;
use crate::session::LanguageTag;
use crate::transport::OutboundTrack;
use std::sync::Arc;

/// One translated utterance waiting to be spoken.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynthesisJob {
    pub lang: LanguageTag,
    pub seq: u64,
    pub text: String,
    pub voice: Option<String>,
}

/// How a pump finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PumpExit {
    /// Observed the queue sentinel.
    Drained,
    /// Session cancellation fired.
    Cancelled,
    /// The outbound track stopped accepting frames.
    TrackFailed,
}

/// Frame geometry of the outbound track.
#[derive(Debug, Clone, Copy)]
pub struct TrackFormat {
    pub sample_rate: u32,
    /// Samples per channel in each frame.
    pub frame_samples: usize,
    pub channels: u16,
}

pub struct SynthesisPump {
    lang: LanguageTag,
    queue: Arc<DropOldestQueue<SynthesisJob>>,
    track: Box<dyn OutboundTrack>,
    format: TrackFormat,
    engines: EnginePool,
    messages: MessageChannel,
    stats: Arc<SessionStats>,
    reporter: Arc<dyn ErrorReporter>,
    cancel: CancelToken,
}

/// Result of playing one segment.
enum Segment {
    Played,
    Failed,
    Interrupted,
    TrackFailed,
}

impl SynthesisPump {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        lang: LanguageTag,
        queue: Arc<DropOldestQueue<SynthesisJob>>,
        track: Box<dyn OutboundTrack>,
        format: TrackFormat,
        engines: EnginePool,
        messages: MessageChannel,
        stats: Arc<SessionStats>,
        reporter: Arc<dyn ErrorReporter>,
        cancel: CancelToken,
    ) -> Self {
        Self {
            lang,
            queue,
            track,
            format,
            engines,
            messages,
            stats,
            reporter,
            cancel,
        }
    }

    fn stage(&self) -> String {
        format!("pump {}", self.lang)
    }

    /// Serves the queue until the sentinel, cancellation or a track failure.
    /// Hands the track back so the controller can unpublish it.
    pub async fn run(mut self) -> (PumpExit, Box<dyn OutboundTrack>) {
        tracing::debug!(lang = %self.lang, track = self.track.name(), "pump started");
        let exit = loop {
            let job = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break PumpExit::Cancelled,
                job = self.queue.pop() => job,
            };
            let Some(job) = job else {
                break PumpExit::Drained;
            };
            match self.play(job).await {
                Segment::Played | Segment::Failed => {}
                Segment::Interrupted => break PumpExit::Cancelled,
                Segment::TrackFailed => break PumpExit::TrackFailed,
            }
        };

        // Later pushes are refused once the pump is gone.
        self.queue.shutdown();
        let discarded = self.queue.clear();
        if discarded > 0 {
            tracing::info!(lang = %self.lang, discarded, "pending segments discarded");
        }
        tracing::debug!(lang = %self.lang, ?exit, "pump finished");
        (exit, self.track)
    }

    async fn play(&mut self, job: SynthesisJob) -> Segment {
        let lang = self.lang.to_string();
        let seq = job.seq;
        self.messages
            .audio_status(&lang, AudioStatus::Start, seq)
            .await;

        let synthesized = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            result = self.engines.synthesize(&job.text, &job.lang, job.voice.as_deref()) => Some(result),
        };
        let mut pcm = match synthesized {
            None => {
                self.stats.record_segment_cancelled();
                self.messages.audio_status(&lang, AudioStatus::End, seq).await;
                return Segment::Interrupted;
            }
            Some(Err(e)) => {
                self.stats.record_segment_failed();
                self.reporter.report(&self.stage(), &StageError::from(&e));
                self.messages
                    .audio_status(&lang, AudioStatus::Error, seq)
                    .await;
                return Segment::Failed;
            }
            Some(Ok(pcm)) => pcm,
        };

        if pcm.len() % 2 != 0 {
            tracing::warn!(
                lang = %lang,
                seq,
                bytes = pcm.len(),
                "odd-length synthesis output, truncating"
            );
            pcm.pop();
        }
        let engine_rate = self.engines.synthesis_rate();
        if engine_rate != self.format.sample_rate {
            tracing::warn!(
                lang = %lang,
                engine_rate,
                track_rate = self.format.sample_rate,
                "synthesis rate differs from track rate"
            );
        }

        let frames = Linear16Frames::new(&pcm, self.format.frame_samples, self.format.sample_rate);
        let total = frames.frame_count();
        tracing::debug!(
            lang = %lang,
            seq,
            frames = total,
            duration_ms = pcm_duration(pcm.len(), engine_rate).as_millis() as u64,
            "playing segment"
        );
        let mut written = 0usize;
        let mut outcome = Segment::Played;
        for frame in frames {
            if self.cancel.is_cancelled() {
                outcome = Segment::Interrupted;
                break;
            }
            let frame = frame.upmix(self.format.channels);
            if let Err(e) = self.track.capture_frame(&frame).await {
                self.reporter
                    .report(&self.stage(), &StageError::Fatal(e.to_string()));
                outcome = Segment::TrackFailed;
                break;
            }
            self.stats.record_frame_written();
            written += 1;
        }

        match outcome {
            Segment::Played => self.stats.record_segment_played(),
            Segment::Interrupted => self.stats.record_segment_cancelled(),
            _ => self.stats.record_segment_failed(),
        }
        tracing::debug!(lang = %lang, seq, written, total, "segment finished");
        self.messages.audio_status(&lang, AudioStatus::End, seq).await;
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::engine::{MockSynthesizer, MockTranslator, Synthesizer};
    use crate::pipeline::error::LogReporter;
    use crate::transport::{MemoryTransport, MemoryTransportConfig, Transport};
    use std::time::Duration;

    const TRACK: &str = "translation-audio-es-ES";

    fn tag(s: &str) -> LanguageTag {
        LanguageTag::new(s).unwrap()
    }

    fn job(seq: u64) -> SynthesisJob {
        SynthesisJob {
            lang: tag("es-ES"),
            seq,
            text: format!("segment {}", seq),
            voice: None,
        }
    }

    struct Fixture {
        transport: MemoryTransport,
        queue: Arc<DropOldestQueue<SynthesisJob>>,
        cancel: CancelToken,
        stats: Arc<SessionStats>,
        pump: SynthesisPump,
    }

    async fn fixture(synth: MockSynthesizer, transport: MemoryTransport) -> Fixture {
        let _events = transport.connect().await.unwrap();
        let track = transport.publish_track(TRACK, 48000, 1).await.unwrap();
        let stats = Arc::new(SessionStats::default());
        let synth: Arc<dyn Synthesizer> = Arc::new(synth);
        let pool = EnginePool::new(
            Arc::new(MockTranslator::new()),
            synth,
            4,
            Duration::from_secs(2),
        );
        let messages = MessageChannel::new(
            Arc::new(transport.clone()),
            Arc::new(SystemClock),
            stats.clone(),
        );
        let queue = Arc::new(DropOldestQueue::new(8));
        let cancel = CancelToken::new();
        let pump = SynthesisPump::new(
            tag("es-ES"),
            queue.clone(),
            track,
            TrackFormat {
                sample_rate: 48000,
                frame_samples: 480,
                channels: 1,
            },
            pool,
            messages,
            stats.clone(),
            Arc::new(LogReporter),
            cancel.clone(),
        );
        Fixture {
            transport,
            queue,
            cancel,
            stats,
            pump,
        }
    }

    fn statuses(transport: &MemoryTransport) -> Vec<(u64, String)> {
        transport
            .messages_of_type(TRACK)
            .iter()
            .map(|m| (m["seq"].as_u64().unwrap(), m["status"].as_str().unwrap().to_string()))
            .collect()
    }

    #[tokio::test]
    async fn test_segments_framed_and_bracketed() {
        // 1000 samples -> 3 frames of 480, last one zero-padded
        let f = fixture(MockSynthesizer::new(48000, 1000), MemoryTransport::new()).await;
        f.queue.push(job(1));
        f.queue.push(job(2));
        f.queue.shutdown();

        let (exit, _track) = f.pump.run().await;
        assert_eq!(exit, PumpExit::Drained);

        let frames = f.transport.track_frames(TRACK);
        assert_eq!(frames.len(), 6);
        assert!(frames.iter().all(|fr| fr.samples_per_channel == 480));
        assert_eq!(frames[2].data[479], 0.0);
        assert_eq!(
            statuses(&f.transport),
            vec![
                (1, "start".to_string()),
                (1, "end".to_string()),
                (2, "start".to_string()),
                (2, "end".to_string()),
            ]
        );
        assert_eq!(f.stats.snapshot().segments_played, 2);
        assert_eq!(f.stats.snapshot().frames_written, 6);
    }

    #[tokio::test]
    async fn test_synthesis_failure_skips_segment() {
        let synth = MockSynthesizer::new(48000, 480).with_failure_for("es-ES");
        let f = fixture(synth, MemoryTransport::new()).await;
        f.queue.push(job(1));
        f.queue.push(job(2));
        f.queue.shutdown();

        let (exit, _track) = f.pump.run().await;
        assert_eq!(exit, PumpExit::Drained);
        assert!(f.transport.track_frames(TRACK).is_empty());
        assert_eq!(
            statuses(&f.transport),
            vec![
                (1, "start".to_string()),
                (1, "error".to_string()),
                (2, "start".to_string()),
                (2, "error".to_string()),
            ]
        );
        assert_eq!(f.stats.snapshot().segments_failed, 2);
    }

    #[tokio::test]
    async fn test_cancel_mid_segment_stops_frames_and_sends_end() {
        let transport = MemoryTransport::with_config(MemoryTransportConfig {
            frame_delay: Some(Duration::from_millis(5)),
            ..Default::default()
        });
        // 100 frames at 5ms each: long enough to cancel mid-way.
        let f = fixture(MockSynthesizer::new(48000, 48000), transport).await;
        f.queue.push(job(1));
        f.queue.push(job(2));

        let cancel = f.cancel.clone();
        let handle = tokio::spawn(f.pump.run());
        tokio::time::sleep(Duration::from_millis(60)).await;
        cancel.cancel();

        let (exit, _track) = tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(exit, PumpExit::Cancelled);

        let written = f.transport.track_frames(TRACK).len();
        assert!(written > 0 && written < 100, "wrote {} frames", written);
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(f.transport.track_frames(TRACK).len(), written);

        assert_eq!(
            statuses(&f.transport),
            vec![(1, "start".to_string()), (1, "end".to_string())]
        );
        assert!(f.queue.is_empty());
        assert_eq!(f.stats.snapshot().segments_cancelled, 1);
    }

    #[tokio::test]
    async fn test_track_failure_ends_pump() {
        let transport = MemoryTransport::with_config(MemoryTransportConfig {
            failing_tracks: [TRACK.to_string()].into_iter().collect(),
            ..Default::default()
        });
        let f = fixture(MockSynthesizer::new(48000, 480), transport).await;
        f.queue.push(job(1));
        f.queue.push(job(2));

        let (exit, _track) = f.pump.run().await;
        assert_eq!(exit, PumpExit::TrackFailed);
        assert_eq!(
            statuses(&f.transport),
            vec![(1, "start".to_string()), (1, "end".to_string())]
        );
    }

    #[tokio::test]
    async fn test_odd_length_pcm_is_truncated() {
        struct OddSynth;
        impl Synthesizer for OddSynth {
            fn synthesize(
                &self,
                _text: &str,
                _lang: &LanguageTag,
                _voice: Option<&str>,
            ) -> crate::error::Result<Vec<u8>> {
                Ok(vec![0x10; 961])
            }
            fn sample_rate(&self) -> u32 {
                48000
            }
            fn name(&self) -> &str {
                "odd"
            }
        }

        let transport = MemoryTransport::new();
        let _events = transport.connect().await.unwrap();
        let track = transport.publish_track(TRACK, 48000, 1).await.unwrap();
        let stats = Arc::new(SessionStats::default());
        let pool = EnginePool::new(
            Arc::new(MockTranslator::new()),
            Arc::new(OddSynth),
            1,
            Duration::from_secs(1),
        );
        let queue = Arc::new(DropOldestQueue::new(2));
        queue.push(job(1));
        queue.shutdown();
        let pump = SynthesisPump::new(
            tag("es-ES"),
            queue,
            track,
            TrackFormat {
                sample_rate: 48000,
                frame_samples: 480,
                channels: 1,
            },
            pool,
            MessageChannel::new(Arc::new(transport.clone()), Arc::new(SystemClock), stats.clone()),
            stats,
            Arc::new(LogReporter),
            CancelToken::new(),
        );
        pump.run().await;
        assert_eq!(transport.track_frames(TRACK).len(), 1);
    }
}
