//! In-process transport used by tests and simulations.
//!
//! Outbound frames and data messages are recorded; inbound audio and room
//! events are injected through the same handle.

use crate::audio::AudioFrame;
use crate::error::{LiveTransError, Result};
use crate::transport::{EVENT_BUFFER, OutboundTrack, Transport, TransportEvent};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::mpsc;

/// Behaviour knobs for [`MemoryTransport`].
#[derive(Debug, Clone, Default)]
pub struct MemoryTransportConfig {
    /// Delay applied to every outbound frame write.
    pub frame_delay: Option<Duration>,
    /// Make `connect` fail.
    pub fail_connect: bool,
    /// Tracks whose frame writes fail.
    pub failing_tracks: HashSet<String>,
}

#[derive(Default)]
struct State {
    events_tx: Option<mpsc::Sender<TransportEvent>>,
    events_rx: Option<mpsc::Receiver<TransportEvent>>,
    messages: Vec<Vec<u8>>,
    tracks: HashMap<String, Vec<AudioFrame>>,
    /// Every outbound write as (track, frame index), in write order.
    writes: Vec<(String, usize)>,
    published: Vec<String>,
    unpublished: Vec<String>,
    connected: bool,
    disconnected: bool,
}

/// Cloneable handle; every clone shares the same room.
#[derive(Clone)]
pub struct MemoryTransport {
    state: Arc<Mutex<State>>,
    config: Arc<MemoryTransportConfig>,
}

impl Default for MemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::with_config(MemoryTransportConfig::default())
    }

    pub fn with_config(config: MemoryTransportConfig) -> Self {
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let state = State {
            events_tx: Some(tx),
            events_rx: Some(rx),
            ..State::default()
        };
        Self {
            state: Arc::new(Mutex::new(state)),
            config: Arc::new(config),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    async fn send_event(&self, event: TransportEvent) -> Result<()> {
        let tx = self
            .lock()
            .events_tx
            .clone()
            .ok_or(LiveTransError::TransportClosed)?;
        tx.send(event)
            .await
            .map_err(|_| LiveTransError::TransportClosed)
    }

    /// Simulates a remote participant publishing an audio track. Returns the
    /// sender used to feed that track's frames.
    pub async fn add_audio_track(
        &self,
        track_id: &str,
        participant: &str,
        buffer: usize,
    ) -> Result<mpsc::Sender<AudioFrame>> {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        self.send_event(TransportEvent::ParticipantConnected {
            identity: participant.to_string(),
        })
        .await?;
        self.send_event(TransportEvent::AudioTrackSubscribed {
            track_id: track_id.to_string(),
            participant: participant.to_string(),
            frames: rx,
        })
        .await?;
        Ok(tx)
    }

    pub async fn remove_track(&self, track_id: &str) -> Result<()> {
        self.send_event(TransportEvent::TrackUnsubscribed {
            track_id: track_id.to_string(),
        })
        .await
    }

    pub async fn remove_participant(&self, identity: &str) -> Result<()> {
        self.send_event(TransportEvent::ParticipantDisconnected {
            identity: identity.to_string(),
        })
        .await
    }

    /// Simulates the room dropping the connection.
    pub async fn drop_connection(&self, reason: &str) -> Result<()> {
        self.send_event(TransportEvent::Disconnected {
            reason: reason.to_string(),
        })
        .await
    }

    /// Published data messages, decoded as JSON. Undecodable payloads are skipped.
    pub fn messages(&self) -> Vec<serde_json::Value> {
        self.lock()
            .messages
            .iter()
            .filter_map(|m| serde_json::from_slice(m).ok())
            .collect()
    }

    /// Published messages whose `type` equals `kind`.
    pub fn messages_of_type(&self, kind: &str) -> Vec<serde_json::Value> {
        self.messages()
            .into_iter()
            .filter(|m| m["type"] == kind)
            .collect()
    }

    /// Frames written to `track`, in write order.
    pub fn track_frames(&self, track: &str) -> Vec<AudioFrame> {
        self.lock().tracks.get(track).cloned().unwrap_or_default()
    }

    /// Total frames written across all tracks.
    pub fn frames_written(&self) -> usize {
        self.lock().writes.len()
    }

    pub fn write_log(&self) -> Vec<(String, usize)> {
        self.lock().writes.clone()
    }

    pub fn published_tracks(&self) -> Vec<String> {
        self.lock().published.clone()
    }

    pub fn unpublished_tracks(&self) -> Vec<String> {
        self.lock().unpublished.clone()
    }

    pub fn is_connected(&self) -> bool {
        let state = self.lock();
        state.connected && !state.disconnected
    }

    pub fn is_disconnected(&self) -> bool {
        self.lock().disconnected
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn connect(&self) -> Result<mpsc::Receiver<TransportEvent>> {
        if self.config.fail_connect {
            return Err(LiveTransError::TransportConnect {
                message: "memory transport configured to fail".to_string(),
            });
        }
        let mut state = self.lock();
        let rx = state
            .events_rx
            .take()
            .ok_or_else(|| LiveTransError::TransportConnect {
                message: "already connected".to_string(),
            })?;
        state.connected = true;
        Ok(rx)
    }

    async fn publish_track(
        &self,
        name: &str,
        _sample_rate: u32,
        channels: u16,
    ) -> Result<Box<dyn OutboundTrack>> {
        let mut state = self.lock();
        if !state.connected || state.disconnected {
            return Err(LiveTransError::TrackPublish {
                track: name.to_string(),
                message: "not connected".to_string(),
            });
        }
        state.published.push(name.to_string());
        state.tracks.entry(name.to_string()).or_default();
        Ok(Box::new(MemoryTrack {
            name: name.to_string(),
            state: self.state.clone(),
            channels,
            frame_delay: self.config.frame_delay,
            failing: self.config.failing_tracks.contains(name),
            unpublished: false,
        }))
    }

    async fn publish_data(&self, payload: Vec<u8>) -> Result<()> {
        let mut state = self.lock();
        if state.disconnected {
            return Err(LiveTransError::TransportClosed);
        }
        state.messages.push(payload);
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        let mut state = self.lock();
        state.disconnected = true;
        state.events_tx = None;
        Ok(())
    }
}

struct MemoryTrack {
    name: String,
    state: Arc<Mutex<State>>,
    channels: u16,
    frame_delay: Option<Duration>,
    failing: bool,
    unpublished: bool,
}

#[async_trait]
impl OutboundTrack for MemoryTrack {
    fn name(&self) -> &str {
        &self.name
    }

    async fn capture_frame(&mut self, frame: &AudioFrame) -> Result<()> {
        if self.unpublished || self.failing {
            return Err(LiveTransError::TrackWrite {
                track: self.name.clone(),
                message: if self.unpublished {
                    "track unpublished".to_string()
                } else {
                    "simulated write failure".to_string()
                },
            });
        }
        if frame.channels != self.channels {
            return Err(LiveTransError::TrackWrite {
                track: self.name.clone(),
                message: format!(
                    "frame has {} channels, track was published with {}",
                    frame.channels, self.channels
                ),
            });
        }
        if let Some(delay) = self.frame_delay {
            tokio::time::sleep(delay).await;
        }
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let frames = state.tracks.entry(self.name.clone()).or_default();
        frames.push(frame.clone());
        let index = frames.len() - 1;
        state.writes.push((self.name.clone(), index));
        Ok(())
    }

    async fn unpublish(&mut self) -> Result<()> {
        if !self.unpublished {
            self.unpublished = true;
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            state.unpublished.push(self.name.clone());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connect_once() {
        let transport = MemoryTransport::new();
        assert!(transport.connect().await.is_ok());
        assert!(transport.connect().await.is_err());
        assert!(transport.is_connected());
    }

    #[tokio::test]
    async fn test_injected_events_arrive_in_order() {
        let transport = MemoryTransport::new();
        let mut events = transport.connect().await.unwrap();

        let frames = transport.add_audio_track("mic", "speaker", 4).await.unwrap();
        frames
            .send(AudioFrame::mono(48000, vec![0.1; 480]))
            .await
            .unwrap();
        transport.remove_track("mic").await.unwrap();

        assert!(matches!(
            events.recv().await,
            Some(TransportEvent::ParticipantConnected { .. })
        ));
        match events.recv().await {
            Some(TransportEvent::AudioTrackSubscribed {
                track_id,
                mut frames,
                ..
            }) => {
                assert_eq!(track_id, "mic");
                assert_eq!(frames.recv().await.unwrap().samples_per_channel, 480);
            }
            other => panic!("expected AudioTrackSubscribed, got {:?}", other),
        }
        assert!(matches!(
            events.recv().await,
            Some(TransportEvent::TrackUnsubscribed { .. })
        ));
    }

    #[tokio::test]
    async fn test_tracks_and_messages_are_recorded() {
        let transport = MemoryTransport::new();
        let _events = transport.connect().await.unwrap();

        let mut track = transport
            .publish_track("translation-audio-es-ES", 48000, 1)
            .await
            .unwrap();
        track
            .capture_frame(&AudioFrame::mono(48000, vec![0.0; 480]))
            .await
            .unwrap();
        transport
            .publish_data(br#"{"type":"caption","text":"hi"}"#.to_vec())
            .await
            .unwrap();
        track.unpublish().await.unwrap();

        assert_eq!(transport.track_frames("translation-audio-es-ES").len(), 1);
        assert_eq!(transport.messages_of_type("caption").len(), 1);
        assert_eq!(transport.unpublished_tracks(), vec!["translation-audio-es-ES"]);
        assert!(
            track
                .capture_frame(&AudioFrame::mono(48000, vec![0.0; 480]))
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn test_frame_channels_must_match_track() {
        let transport = MemoryTransport::new();
        let _events = transport.connect().await.unwrap();
        let mut track = transport.publish_track("stereo", 48000, 2).await.unwrap();

        assert!(
            track
                .capture_frame(&AudioFrame::mono(48000, vec![0.0; 480]))
                .await
                .is_err()
        );
        track
            .capture_frame(&AudioFrame::new(48000, 2, vec![0.0; 960]))
            .await
            .unwrap();
        assert_eq!(transport.track_frames("stereo").len(), 1);
    }

    #[tokio::test]
    async fn test_failing_track_and_closed_data() {
        let transport = MemoryTransport::with_config(MemoryTransportConfig {
            failing_tracks: ["bad".to_string()].into_iter().collect(),
            ..Default::default()
        });
        let _events = transport.connect().await.unwrap();
        let mut track = transport.publish_track("bad", 48000, 1).await.unwrap();
        assert!(
            track
                .capture_frame(&AudioFrame::mono(48000, vec![0.0; 4]))
                .await
                .is_err()
        );

        transport.disconnect().await.unwrap();
        assert!(transport.publish_data(b"{}".to_vec()).await.is_err());
        assert!(transport.is_disconnected());
    }

    #[tokio::test]
    async fn test_fail_connect() {
        let transport = MemoryTransport::with_config(MemoryTransportConfig {
            fail_connect: true,
            ..Default::default()
        });
        assert!(matches!(
            transport.connect().await,
            Err(LiveTransError::TransportConnect { .. })
        ));
    }
}
