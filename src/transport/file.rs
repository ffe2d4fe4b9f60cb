//! File-backed transport for offline runs.
//!
//! Inbound audio is read from a WAV file and delivered as one remote track;
//! each outbound track is written to `{out_dir}/{track}.wav` and every data
//! message is appended to `{out_dir}/messages.jsonl`. When the input file is
//! exhausted the remote track is unsubscribed, which ends the session.

use crate::audio::AudioFrame;
use crate::audio::wav::{WavAudioSource, WavTrackWriter};
use crate::error::{LiveTransError, Result};
use crate::transport::{EVENT_BUFFER, OutboundTrack, Transport, TransportEvent};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, mpsc};

/// Name of the message log inside the output directory.
pub const MESSAGE_LOG: &str = "messages.jsonl";

/// Track id reported for the input file.
pub const INPUT_TRACK_ID: &str = "file-input";

#[derive(Debug, Clone)]
pub struct FileTransportConfig {
    pub input: PathBuf,
    pub out_dir: PathBuf,
    /// Size of the inbound frames the file is cut into.
    pub frame_duration_ms: u32,
    /// Pace inbound and outbound audio at wall-clock speed.
    pub realtime: bool,
    /// Stop reading input after this much audio.
    pub max_duration: Option<Duration>,
    pub participant: String,
}

impl FileTransportConfig {
    pub fn new(input: impl Into<PathBuf>, out_dir: impl Into<PathBuf>) -> Self {
        Self {
            input: input.into(),
            out_dir: out_dir.into(),
            frame_duration_ms: 20,
            realtime: false,
            max_duration: None,
            participant: "speaker".to_string(),
        }
    }
}

pub struct FileTransport {
    config: FileTransportConfig,
    log: Mutex<Option<tokio::fs::File>>,
    connected: AtomicBool,
}

impl FileTransport {
    pub fn new(config: FileTransportConfig) -> Self {
        Self {
            config,
            log: Mutex::new(None),
            connected: AtomicBool::new(false),
        }
    }

    pub fn message_log_path(&self) -> PathBuf {
        self.config.out_dir.join(MESSAGE_LOG)
    }

    pub fn track_path(&self, name: &str) -> PathBuf {
        self.config.out_dir.join(format!("{}.wav", name))
    }
}

async fn stream_input(
    mut source: WavAudioSource,
    config: FileTransportConfig,
    events: mpsc::Sender<TransportEvent>,
) {
    let (frames_tx, frames_rx) = mpsc::channel(EVENT_BUFFER);
    let subscribed = [
        TransportEvent::ParticipantConnected {
            identity: config.participant.clone(),
        },
        TransportEvent::AudioTrackSubscribed {
            track_id: INPUT_TRACK_ID.to_string(),
            participant: config.participant.clone(),
            frames: frames_rx,
        },
    ];
    for event in subscribed {
        if events.send(event).await.is_err() {
            return;
        }
    }

    let frame_duration = Duration::from_millis(config.frame_duration_ms as u64);
    let limit_ms = config.max_duration.map(|d| d.as_millis() as u64);
    let mut sent_ms: u64 = 0;
    let mut ticker = tokio::time::interval(frame_duration);

    while let Some(frame) = source.next_frame(config.frame_duration_ms) {
        if limit_ms.is_some_and(|limit| sent_ms >= limit) {
            tracing::info!(sent_ms, "input duration limit reached");
            break;
        }
        if config.realtime {
            ticker.tick().await;
        } else {
            tokio::task::yield_now().await;
        }
        sent_ms += frame.duration_ms() as u64;
        if frames_tx.send(frame).await.is_err() {
            break;
        }
    }
    drop(frames_tx);

    tracing::info!(sent_ms, "input file finished");
    let finished = [
        TransportEvent::TrackUnsubscribed {
            track_id: INPUT_TRACK_ID.to_string(),
        },
        TransportEvent::ParticipantDisconnected {
            identity: config.participant.clone(),
        },
    ];
    for event in finished {
        if events.send(event).await.is_err() {
            return;
        }
    }
}

#[async_trait]
impl Transport for FileTransport {
    async fn connect(&self) -> Result<mpsc::Receiver<TransportEvent>> {
        if self.connected.swap(true, Ordering::SeqCst) {
            return Err(LiveTransError::TransportConnect {
                message: "already connected".to_string(),
            });
        }
        let connect_err = |message: String| LiveTransError::TransportConnect { message };

        let input = self.config.input.clone();
        let source = tokio::task::spawn_blocking(move || WavAudioSource::open(&input))
            .await
            .map_err(|e| connect_err(format!("input reader panicked: {}", e)))?
            .map_err(|e| connect_err(e.to_string()))?;
        tracing::info!(
            input = %self.config.input.display(),
            sample_rate = source.sample_rate(),
            channels = source.channels(),
            duration_ms = source.duration_ms(),
            "input opened"
        );

        tokio::fs::create_dir_all(&self.config.out_dir)
            .await
            .map_err(|e| connect_err(format!("{}: {}", self.config.out_dir.display(), e)))?;
        let log = tokio::fs::File::create(self.message_log_path())
            .await
            .map_err(|e| connect_err(format!("message log: {}", e)))?;
        *self.log.lock().await = Some(log);

        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        tokio::spawn(stream_input(source, self.config.clone(), tx));
        Ok(rx)
    }

    async fn publish_track(
        &self,
        name: &str,
        sample_rate: u32,
        _channels: u16,
    ) -> Result<Box<dyn OutboundTrack>> {
        let path = self.track_path(name);
        let writer =
            WavTrackWriter::create(&path, sample_rate).map_err(|e| LiveTransError::TrackPublish {
                track: name.to_string(),
                message: e.to_string(),
            })?;
        tracing::debug!(track = name, path = %path.display(), "track published");
        Ok(Box::new(FileTrack {
            name: name.to_string(),
            writer: Some(writer),
            pacing: self.config.realtime,
        }))
    }

    async fn publish_data(&self, payload: Vec<u8>) -> Result<()> {
        let mut guard = self.log.lock().await;
        let log = guard.as_mut().ok_or(LiveTransError::TransportClosed)?;
        let write = async {
            log.write_all(&payload).await?;
            log.write_all(b"\n").await
        };
        write.await.map_err(|e| LiveTransError::DataPublish {
            message: e.to_string(),
        })
    }

    async fn disconnect(&self) -> Result<()> {
        if let Some(mut log) = self.log.lock().await.take() {
            log.flush().await?;
        }
        Ok(())
    }
}

struct FileTrack {
    name: String,
    writer: Option<WavTrackWriter>,
    pacing: bool,
}

#[async_trait]
impl OutboundTrack for FileTrack {
    fn name(&self) -> &str {
        &self.name
    }

    async fn capture_frame(&mut self, frame: &AudioFrame) -> Result<()> {
        if self.pacing {
            tokio::time::sleep(Duration::from_millis(frame.duration_ms() as u64)).await;
        }
        let writer = self.writer.as_mut().ok_or_else(|| LiveTransError::TrackWrite {
            track: self.name.clone(),
            message: "track unpublished".to_string(),
        })?;
        writer.write_frame(frame).map_err(|e| LiveTransError::TrackWrite {
            track: self.name.clone(),
            message: e.to_string(),
        })
    }

    async fn unpublish(&mut self) -> Result<()> {
        if let Some(writer) = self.writer.take() {
            let samples = writer.samples_written();
            writer.finalize()?;
            tracing::debug!(track = %self.name, samples, "track finalized");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_input(path: &std::path::Path, samples: usize) {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 48000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for _ in 0..samples {
            writer.write_sample(1000i16).unwrap();
        }
        writer.finalize().unwrap();
    }

    #[tokio::test]
    async fn test_streams_input_then_unsubscribes() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.wav");
        write_input(&input, 4800);

        let transport =
            FileTransport::new(FileTransportConfig::new(&input, dir.path().join("out")));
        let mut events = transport.connect().await.unwrap();

        let mut frames = match (events.recv().await, events.recv().await) {
            (
                Some(TransportEvent::ParticipantConnected { .. }),
                Some(TransportEvent::AudioTrackSubscribed { frames, .. }),
            ) => frames,
            other => panic!("unexpected events {:?}", other),
        };
        let mut total = 0;
        while let Some(frame) = frames.recv().await {
            total += frame.samples_per_channel;
        }
        assert_eq!(total, 4800);
        assert!(matches!(
            events.recv().await,
            Some(TransportEvent::TrackUnsubscribed { .. })
        ));
    }

    #[tokio::test]
    async fn test_max_duration_limits_input() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.wav");
        write_input(&input, 48000);

        let mut config = FileTransportConfig::new(&input, dir.path().join("out"));
        config.max_duration = Some(Duration::from_millis(100));
        let transport = FileTransport::new(config);
        let mut events = transport.connect().await.unwrap();

        events.recv().await;
        let Some(TransportEvent::AudioTrackSubscribed { mut frames, .. }) = events.recv().await
        else {
            panic!("expected subscription");
        };
        let mut count = 0;
        while frames.recv().await.is_some() {
            count += 1;
        }
        assert_eq!(count, 5);
    }

    #[tokio::test]
    async fn test_outputs_written_to_out_dir() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.wav");
        write_input(&input, 480);
        let out = dir.path().join("out");

        let transport = FileTransport::new(FileTransportConfig::new(&input, &out));
        let _events = transport.connect().await.unwrap();

        let mut track = transport
            .publish_track("translation-audio-es-ES", 48000, 1)
            .await
            .unwrap();
        track
            .capture_frame(&AudioFrame::mono(48000, vec![0.5; 480]))
            .await
            .unwrap();
        track.unpublish().await.unwrap();
        transport
            .publish_data(br#"{"type":"caption"}"#.to_vec())
            .await
            .unwrap();
        transport.disconnect().await.unwrap();

        let log = std::fs::read_to_string(out.join(MESSAGE_LOG)).unwrap();
        assert_eq!(log.lines().count(), 1);
        let wav = WavAudioSource::open(&out.join("translation-audio-es-ES.wav")).unwrap();
        assert_eq!(wav.duration_ms(), 10);
        assert!(transport.publish_data(b"{}".to_vec()).await.is_err());
    }

    #[tokio::test]
    async fn test_missing_input_fails_connect() {
        let dir = tempfile::tempdir().unwrap();
        let transport = FileTransport::new(FileTransportConfig::new(
            dir.path().join("missing.wav"),
            dir.path().join("out"),
        ));
        assert!(matches!(
            transport.connect().await,
            Err(LiveTransError::TransportConnect { .. })
        ));
    }
}
