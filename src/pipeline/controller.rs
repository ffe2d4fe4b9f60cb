//! Session lifecycle: ordered startup, the transport event loop and a bounded
//! two-phase shutdown.
//!
//! ```text
//! transport ─frames─► Ingestion ─► feeder ─► Recognizer ─events─► Dispatcher
//!                                                                   │ per language
//!                                                          TranslationWorker
//!                                                                   │ audio languages
//!                                            SynthesisPump ◄─ DropOldestQueue
//! ```
//!
//! Shutdown walks the same graph front to back. Each stage gets
//! `shutdown_timeout` to drain on its own; after that the session cancel
//! token fires and the stage gets one short grace period before it is
//! aborted.

use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::defaults::{CANCEL_GRACE_MS, audio_track_name};
use crate::engine::{EnginePool, Engines};
use crate::error::Result;
use crate::messages::{MessageChannel, SessionStatus};
use crate::pipeline::cancel::CancelToken;
use crate::pipeline::dispatcher::{Dispatcher, DispatcherOutcome};
use crate::pipeline::error::{ErrorReporter, LogReporter, StageError};
use crate::pipeline::ingest::{Ingestion, feed_recognizer};
use crate::pipeline::queue::DropOldestQueue;
use crate::pipeline::stats::{SessionReport, SessionStats};
use crate::pipeline::synthesis::{PumpExit, SynthesisJob, SynthesisPump, TrackFormat};
use crate::pipeline::translation::TranslationWorker;
use crate::session::{LanguageTag, SessionConfig, SessionSource};
use crate::transport::{OutboundTrack, Transport, TransportEvent};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::{JoinError, JoinHandle, JoinSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Init,
    Connecting,
    Configuring,
    Active,
    Draining,
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Init => "init",
            SessionState::Connecting => "connecting",
            SessionState::Configuring => "configuring",
            SessionState::Active => "active",
            SessionState::Draining => "draining",
            SessionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Why an active session started draining.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// [`StopHandle::stop`] or [`StopHandle::abort`] was called.
    Stopped,
    /// The room connection went away.
    Disconnected(String),
    /// The primary input track was unsubscribed.
    InputEnded,
    /// A stage the session cannot run without has failed.
    Fatal(String),
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloseReason::Stopped => write!(f, "stopped"),
            CloseReason::Disconnected(reason) => write!(f, "transport disconnected: {}", reason),
            CloseReason::InputEnded => write!(f, "input track ended"),
            CloseReason::Fatal(reason) => write!(f, "fatal: {}", reason),
        }
    }
}

/// Ends a running session from another task.
#[derive(Debug, Clone)]
pub struct StopHandle {
    stop: CancelToken,
    cancel: CancelToken,
}

impl StopHandle {
    /// Starts a graceful drain; queued segments are still played.
    pub fn stop(&self) {
        self.stop.cancel();
    }

    /// Drains with every stage cancelled at once; queued segments are dropped.
    pub fn abort(&self) {
        self.stop.cancel();
        self.cancel.cancel();
    }
}

/// Handles of the stages spawned for an active session.
struct Running {
    messages: MessageChannel,
    ingestion: Ingestion,
    intake_stop: CancelToken,
    intake_finish: CancelToken,
    intake: Option<JoinHandle<Option<u64>>>,
    feeder: JoinHandle<()>,
    recognizer: JoinHandle<Result<()>>,
    recognizer_finished: bool,
    dispatcher: JoinHandle<DispatcherOutcome>,
    queues: Vec<Arc<DropOldestQueue<SynthesisJob>>>,
    pumps: Vec<(LanguageTag, JoinHandle<(PumpExit, Box<dyn OutboundTrack>)>)>,
}

/// Runs one translation session from connect to disconnect.
pub struct SessionController {
    config: Config,
    transport: Arc<dyn Transport>,
    source: Arc<dyn SessionSource>,
    engines: Engines,
    clock: Arc<dyn Clock>,
    reporter: Arc<dyn ErrorReporter>,
    stats: Arc<SessionStats>,
    stop: CancelToken,
    cancel: CancelToken,
    state: watch::Sender<SessionState>,
}

impl SessionController {
    pub fn new(
        config: Config,
        transport: Arc<dyn Transport>,
        source: Arc<dyn SessionSource>,
        engines: Engines,
    ) -> Self {
        let (state, _) = watch::channel(SessionState::Init);
        Self {
            config,
            transport,
            source,
            engines,
            clock: Arc::new(SystemClock),
            reporter: Arc::new(LogReporter),
            stats: Arc::new(SessionStats::default()),
            stop: CancelToken::new(),
            cancel: CancelToken::new(),
            state,
        }
    }

    /// Sets the clock used for message timestamps (for deterministic testing).
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_error_reporter(mut self, reporter: Arc<dyn ErrorReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            stop: self.stop.clone(),
            cancel: self.cancel.clone(),
        }
    }

    pub fn stats(&self) -> Arc<SessionStats> {
        self.stats.clone()
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Observes state transitions while [`SessionController::run`] executes.
    pub fn watch_state(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    fn set_state(&self, state: SessionState) {
        let previous = self.state.send_replace(state);
        tracing::debug!(from = %previous, to = %state, "session state");
    }

    /// Runs the session until a shutdown trigger and returns its report.
    ///
    /// Configuration errors are returned before any stage is spawned.
    pub async fn run(self) -> Result<SessionReport> {
        let started_ms = self.clock.now_ms();
        if let Err(e) = self.config.validate() {
            self.set_state(SessionState::Closed);
            return Err(e);
        }

        self.set_state(SessionState::Connecting);
        let mut events = match self.transport.connect().await {
            Ok(events) => events,
            Err(e) => {
                self.set_state(SessionState::Closed);
                return Err(e);
            }
        };

        self.set_state(SessionState::Configuring);
        let session = match self.source.resolve().await {
            Ok(session) => Arc::new(session),
            Err(e) => {
                tracing::error!(
                    source = %self.source.describe(),
                    error = %e,
                    "session configuration rejected"
                );
                self.leave().await;
                self.set_state(SessionState::Closed);
                return Err(e);
            }
        };
        tracing::info!(
            source = %session.source_language,
            captions = session.caption_targets.len(),
            audio = session.audio_targets.len(),
            event = session.event_id.as_deref().unwrap_or("-"),
            "session configured"
        );

        let mut running = self.start(session.clone()).await;
        self.set_state(SessionState::Active);
        if self.config.pipeline.announce_status {
            running.messages.session_status(SessionStatus::Active).await;
        }

        let reason = self.event_loop(&mut events, &mut running).await;
        tracing::info!(%reason, "session draining");
        self.set_state(SessionState::Draining);
        if self.config.pipeline.announce_status {
            running.messages.session_status(SessionStatus::Draining).await;
        }

        let drain_input = reason == CloseReason::InputEnded;
        let forced_stages = self.shutdown(running, drain_input).await;
        self.leave().await;
        drop(events);
        self.set_state(SessionState::Closed);

        let report = SessionReport {
            source_language: session.source_language.to_string(),
            caption_targets: session.caption_targets.iter().map(ToString::to_string).collect(),
            audio_targets: session.audio_targets.iter().map(ToString::to_string).collect(),
            stats: self.stats.snapshot(),
            duration_ms: u64::try_from(self.clock.now_ms() - started_ms).unwrap_or(0),
            forced_stages,
            close_reason: reason.to_string(),
        };
        tracing::info!(
            finals = report.stats.final_transcripts,
            played = report.stats.segments_played,
            forced = report.forced_stages.len(),
            "session closed"
        );
        Ok(report)
    }

    /// Opens outbound tracks and spawns every stage except ingestion, which
    /// waits for the first inbound audio track.
    async fn start(&self, session: Arc<SessionConfig>) -> Running {
        let cfg = &self.config;
        let pool = EnginePool::new(
            self.engines.translator.clone(),
            self.engines.synthesizer.clone(),
            cfg.pipeline.engine_concurrency,
            cfg.pipeline.engine_timeout(),
        );
        let messages = MessageChannel::new(
            self.transport.clone(),
            self.clock.clone(),
            self.stats.clone(),
        );
        let format = TrackFormat {
            sample_rate: cfg.audio.sample_rate,
            frame_samples: cfg.audio.frame_samples(),
            channels: cfg.audio.channels,
        };

        let mut queues = HashMap::new();
        let mut pumps = Vec::new();
        for lang in &session.audio_targets {
            let name = audio_track_name(lang.as_str());
            let track = match self
                .transport
                .publish_track(&name, format.sample_rate, format.channels)
                .await
            {
                Ok(track) => track,
                Err(e) => {
                    // Captions for this language still flow.
                    self.reporter
                        .report(&format!("pump {}", lang), &StageError::from(&e));
                    continue;
                }
            };
            let queue = Arc::new(DropOldestQueue::new(cfg.queues.synthesis_capacity));
            let pump = SynthesisPump::new(
                lang.clone(),
                queue.clone(),
                track,
                format,
                pool.clone(),
                messages.clone(),
                self.stats.clone(),
                self.reporter.clone(),
                self.cancel.clone(),
            );
            tracing::info!(lang = %lang, track = %name, "audio output published");
            queues.insert(lang.clone(), queue);
            pumps.push((lang.clone(), tokio::spawn(pump.run())));
        }
        let synthesis_queues: Vec<_> = queues.values().cloned().collect();

        let worker = Arc::new(TranslationWorker::new(
            session.clone(),
            pool,
            messages.clone(),
            queues,
            self.stats.clone(),
        ));
        let dispatcher = Dispatcher::new(
            session.clone(),
            worker,
            messages.clone(),
            self.stats.clone(),
            cfg.pipeline.translate_interim,
        );

        let ingestion = Ingestion::new(cfg.queues.ingest_capacity, self.stats.clone());
        let (audio_tx, audio_rx) = mpsc::channel(cfg.queues.recognizer_buffer);
        let (events_tx, events_rx) = mpsc::channel(cfg.queues.recognizer_buffer);

        let recognizer = self.engines.recognizer.clone();
        let language = session.source_language.clone();
        tracing::debug!(recognizer = recognizer.name(), %language, "starting recognition");
        let recognizer =
            tokio::spawn(async move { recognizer.run(language, audio_rx, events_tx).await });
        let feeder = tokio::spawn(feed_recognizer(
            ingestion.queue(),
            audio_tx,
            self.cancel.clone(),
        ));
        let dispatcher = tokio::spawn(dispatcher.run(events_rx, self.cancel.clone()));

        Running {
            messages,
            ingestion,
            intake_stop: CancelToken::new(),
            intake_finish: CancelToken::new(),
            intake: None,
            feeder,
            recognizer,
            recognizer_finished: false,
            dispatcher,
            queues: synthesis_queues,
            pumps,
        }
    }

    async fn event_loop(
        &self,
        events: &mut mpsc::Receiver<TransportEvent>,
        running: &mut Running,
    ) -> CloseReason {
        let mut primary: Option<String> = None;
        loop {
            tokio::select! {
                biased;
                _ = self.stop.cancelled() => return CloseReason::Stopped,
                joined = &mut running.recognizer, if !running.recognizer_finished => {
                    running.recognizer_finished = true;
                    let reason = match joined {
                        Ok(Ok(())) => "recognition stream ended".to_string(),
                        Ok(Err(e)) => e.to_string(),
                        Err(e) => format!("recognizer task failed: {}", e),
                    };
                    self.reporter.report("recognizer", &StageError::Fatal(reason.clone()));
                    return CloseReason::Fatal(reason);
                }
                event = events.recv() => {
                    let Some(event) = event else {
                        return CloseReason::Disconnected("event stream closed".to_string());
                    };
                    if let Some(reason) = self.on_transport_event(event, running, &mut primary) {
                        return reason;
                    }
                }
            }
        }
    }

    fn on_transport_event(
        &self,
        event: TransportEvent,
        running: &mut Running,
        primary: &mut Option<String>,
    ) -> Option<CloseReason> {
        match event {
            TransportEvent::ParticipantConnected { identity } => {
                tracing::debug!(participant = %identity, "participant joined");
            }
            TransportEvent::ParticipantDisconnected { identity } => {
                tracing::debug!(participant = %identity, "participant left");
            }
            TransportEvent::AudioTrackSubscribed {
                track_id,
                participant,
                frames,
            } => {
                if let Some(current) = primary.as_deref() {
                    tracing::info!(
                        track = %track_id,
                        %participant,
                        current,
                        "ignoring additional audio track"
                    );
                    return None;
                }
                tracing::info!(track = %track_id, %participant, "input track subscribed");
                *primary = Some(track_id);
                let ingestion = running.ingestion.clone();
                let stop = running.intake_stop.clone();
                let finish = running.intake_finish.clone();
                let cancel = self.cancel.clone();
                running.intake = Some(tokio::spawn(async move {
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => None,
                        accepted = ingestion.receive(frames, stop, finish) => Some(accepted),
                    }
                }));
            }
            TransportEvent::TrackUnsubscribed { track_id } => {
                if primary.as_deref() == Some(track_id.as_str()) {
                    return Some(CloseReason::InputEnded);
                }
                tracing::debug!(track = %track_id, "track unsubscribed");
            }
            TransportEvent::Disconnected { reason } => {
                return Some(CloseReason::Disconnected(reason));
            }
        }
        None
    }

    /// Drains stages front to back. Returns the stages that had to be forced.
    ///
    /// With `drain_input` the input track has already ended, so frames it
    /// delivered before ending are still taken in. An intake that does not
    /// stop in time is cut off on its own without cancelling the session.
    async fn shutdown(&self, running: Running, drain_input: bool) -> Vec<String> {
        let mut forced = Vec::new();

        if drain_input {
            running.intake_finish.cancel();
        } else {
            running.intake_stop.cancel();
        }
        if let Some(intake) = running.intake
            && let Some(Some(accepted)) = self
                .await_stage("intake", intake, &running.intake_stop, &mut forced)
                .await
        {
            tracing::debug!(accepted, "intake stopped");
        }

        running.ingestion.close();
        self.await_stage("feeder", running.feeder, &self.cancel, &mut forced)
            .await;

        if !running.recognizer_finished
            && let Some(Err(e)) = self
                .await_stage("recognizer", running.recognizer, &self.cancel, &mut forced)
                .await
        {
            self.reporter.report("recognizer", &StageError::from(&e));
        }

        if let Some(outcome) = self
            .await_stage("dispatcher", running.dispatcher, &self.cancel, &mut forced)
            .await
        {
            tracing::debug!(
                finals = outcome.finals,
                pending = outcome.tasks.len(),
                "dispatcher drained"
            );
            self.await_translations(outcome.tasks, &mut forced).await;
        }

        for queue in &running.queues {
            queue.shutdown();
        }
        let mut tracks = Vec::new();
        for (lang, pump) in running.pumps {
            let stage = format!("pump {}", lang);
            if let Some((exit, track)) = self
                .await_stage(&stage, pump, &self.cancel, &mut forced)
                .await
            {
                tracing::debug!(lang = %lang, ?exit, "pump stopped");
                tracks.push(track);
            }
        }
        for mut track in tracks {
            if let Err(e) = track.unpublish().await {
                tracing::warn!(track = track.name(), error = %e, "failed to unpublish track");
            }
        }
        forced
    }

    /// Awaits one stage for `shutdown_timeout`, then fires `escalate` and
    /// allows a short grace period before aborting it.
    async fn await_stage<T>(
        &self,
        stage: &str,
        mut handle: JoinHandle<T>,
        escalate: &CancelToken,
        forced: &mut Vec<String>,
    ) -> Option<T> {
        let timeout = self.config.pipeline.shutdown_timeout();
        if let Ok(joined) = tokio::time::timeout(timeout, &mut handle).await {
            return self.joined(stage, joined);
        }

        tracing::warn!(
            stage,
            timeout_ms = timeout.as_millis() as u64,
            "stage did not drain in time, cancelling"
        );
        escalate.cancel();
        forced.push(stage.to_string());
        let grace = Duration::from_millis(CANCEL_GRACE_MS);
        match tokio::time::timeout(grace, &mut handle).await {
            Ok(joined) => self.joined(stage, joined),
            Err(_) => {
                handle.abort();
                self.reporter.report(
                    stage,
                    &StageError::Fatal("abandoned after cancellation".to_string()),
                );
                None
            }
        }
    }

    fn joined<T>(&self, stage: &str, joined: std::result::Result<T, JoinError>) -> Option<T> {
        match joined {
            Ok(value) => Some(value),
            Err(e) => {
                self.reporter
                    .report(stage, &StageError::Fatal(format!("task failed: {}", e)));
                None
            }
        }
    }

    async fn await_translations(&self, mut tasks: JoinSet<()>, forced: &mut Vec<String>) {
        if tasks.is_empty() {
            return;
        }
        let timeout = self.config.pipeline.shutdown_timeout();
        if tokio::time::timeout(timeout, join_all(&mut tasks)).await.is_ok() {
            return;
        }

        tracing::warn!(pending = tasks.len(), "translations did not finish in time, cancelling");
        self.cancel.cancel();
        forced.push("translations".to_string());
        let grace = Duration::from_millis(CANCEL_GRACE_MS);
        if tokio::time::timeout(grace, join_all(&mut tasks)).await.is_err() {
            tracing::error!(pending = tasks.len(), "abandoning translation tasks");
            tasks.abort_all();
        }
    }

    async fn leave(&self) {
        if let Err(e) = self.transport.disconnect().await {
            tracing::warn!(error = %e, "disconnect failed");
        }
    }
}

async fn join_all(tasks: &mut JoinSet<()>) {
    while let Some(result) = tasks.join_next().await {
        if let Err(e) = result
            && e.is_panic()
        {
            tracing::error!(error = %e, "translation task panicked");
        }
    }
}
