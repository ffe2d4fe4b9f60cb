//! Room transport abstraction.
//!
//! A transport delivers inbound audio from remote participants, accepts
//! outbound audio on named tracks and carries reliable JSON data messages.
//! Everything the room reports arrives on a single event channel that the
//! session controller consumes.

pub mod file;
pub mod memory;

use crate::audio::AudioFrame;
use crate::error::Result;
use async_trait::async_trait;
use tokio::sync::mpsc;

pub use file::{FileTransport, FileTransportConfig};
pub use memory::{MemoryTransport, MemoryTransportConfig};

/// Capacity of the transport event channel.
pub const EVENT_BUFFER: usize = 64;

/// Room events, in the order the transport observed them.
#[derive(Debug)]
pub enum TransportEvent {
    ParticipantConnected {
        identity: String,
    },
    ParticipantDisconnected {
        identity: String,
    },
    /// A remote audio track was subscribed; its frames arrive on `frames`
    /// until the track ends.
    AudioTrackSubscribed {
        track_id: String,
        participant: String,
        frames: mpsc::Receiver<AudioFrame>,
    },
    TrackUnsubscribed {
        track_id: String,
    },
    /// The connection to the room is gone; no further events follow.
    Disconnected {
        reason: String,
    },
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Joins the room. Must be called once; returns the event stream.
    async fn connect(&self) -> Result<mpsc::Receiver<TransportEvent>>;

    /// Publishes a mono outbound audio track.
    async fn publish_track(
        &self,
        name: &str,
        sample_rate: u32,
        channels: u16,
    ) -> Result<Box<dyn OutboundTrack>>;

    /// Sends one reliable data message to every participant.
    async fn publish_data(&self, payload: Vec<u8>) -> Result<()>;

    /// Leaves the room. Idempotent.
    async fn disconnect(&self) -> Result<()>;
}

/// A published outbound track, written by exactly one pump.
#[async_trait]
pub trait OutboundTrack: Send {
    fn name(&self) -> &str;

    /// Writes one frame, waiting while the transport buffer is full.
    async fn capture_frame(&mut self, frame: &AudioFrame) -> Result<()>;

    /// Removes the track from the room. Further writes fail.
    async fn unpublish(&mut self) -> Result<()>;
}
