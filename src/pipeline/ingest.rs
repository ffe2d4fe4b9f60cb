//! Ingestion: transport frames into the drop-oldest buffer, and from the
//! buffer into the recognizer at whatever rate it consumes.

use crate::audio::codec::to_linear16;
use crate::audio::{AudioFrame, PcmChunk};
use crate::pipeline::cancel::CancelToken;
use crate::pipeline::queue::{DropOldestQueue, PushOutcome};
use crate::pipeline::stats::SessionStats;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;

/// Log every this many drops after the first one.
const DROP_LOG_INTERVAL: u64 = 50;

/// Producer side of the ingestion buffer.
#[derive(Clone)]
pub struct Ingestion {
    queue: Arc<DropOldestQueue<PcmChunk>>,
    stats: Arc<SessionStats>,
    sequence: Arc<AtomicU64>,
}

impl Ingestion {
    pub fn new(capacity: usize, stats: Arc<SessionStats>) -> Self {
        Self {
            queue: Arc::new(DropOldestQueue::new(capacity)),
            stats,
            sequence: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn queue(&self) -> Arc<DropOldestQueue<PcmChunk>> {
        self.queue.clone()
    }

    /// Encodes and queues one inbound frame without blocking.
    ///
    /// Returns false once the buffer has been shut down.
    pub fn push_frame(&self, frame: &AudioFrame) -> bool {
        if frame.data.is_empty() {
            return !self.queue.is_closed();
        }
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
        let chunk = PcmChunk::new(sequence, frame.sample_rate, to_linear16(frame));

        match self.queue.push(chunk) {
            PushOutcome::Accepted => {
                self.stats.record_frame_received();
                true
            }
            PushOutcome::Evicted(oldest) => {
                self.stats.record_frame_received();
                self.stats.record_frame_dropped();
                let dropped = self.queue.dropped();
                if dropped == 1 || dropped % DROP_LOG_INTERVAL == 0 {
                    tracing::warn!(
                        dropped,
                        oldest = oldest.sequence,
                        capacity = self.queue.capacity(),
                        "ingestion buffer full, dropping oldest audio"
                    );
                }
                true
            }
            PushOutcome::Closed(_) => false,
        }
    }

    /// Pushes the shutdown sentinel; the feeder drains what is queued and stops.
    pub fn close(&self) {
        self.queue.shutdown();
    }

    /// Forwards frames from one subscribed track until it ends, the buffer
    /// closes, `stop` fires or `finish` fires. `stop` abandons whatever the
    /// track still holds; `finish` first takes in the frames it already
    /// delivered. Returns the number of frames accepted.
    pub async fn receive(
        &self,
        mut frames: mpsc::Receiver<AudioFrame>,
        stop: CancelToken,
        finish: CancelToken,
    ) -> u64 {
        let mut accepted = 0u64;
        loop {
            let frame = tokio::select! {
                biased;
                _ = stop.cancelled() => break,
                _ = finish.cancelled() => None,
                frame = frames.recv() => match frame {
                    Some(frame) => Some(frame),
                    None => break,
                },
            };
            let Some(frame) = frame else {
                accepted += self.take_delivered(&mut frames);
                break;
            };
            if !self.push_frame(&frame) {
                break;
            }
            accepted += 1;
        }
        tracing::debug!(accepted, "inbound audio stopped");
        accepted
    }

    fn take_delivered(&self, frames: &mut mpsc::Receiver<AudioFrame>) -> u64 {
        let mut taken = 0u64;
        while let Ok(frame) = frames.try_recv() {
            if !self.push_frame(&frame) {
                break;
            }
            taken += 1;
        }
        taken
    }
}

/// Moves buffered chunks into the recognizer's channel.
///
/// Ends on the buffer's sentinel or on cancellation; dropping `recognizer`
/// then closes the recognition input.
pub async fn feed_recognizer(
    queue: Arc<DropOldestQueue<PcmChunk>>,
    recognizer: mpsc::Sender<PcmChunk>,
    cancel: CancelToken,
) {
    let mut forwarded = 0u64;
    loop {
        let chunk = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            chunk = queue.pop() => chunk,
        };
        let Some(chunk) = chunk else {
            break;
        };
        let sent = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            sent = recognizer.send(chunk) => sent,
        };
        if sent.is_err() {
            tracing::warn!("recognizer stopped accepting audio");
            break;
        }
        forwarded += 1;
    }
    let discarded = queue.clear();
    tracing::debug!(forwarded, discarded, "recognizer feed finished");
}
