use crate::frame::Frame;
use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender, TrySendError};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, trace};

/// Bounded hand-off between frame producers and the pipeline worker.
///
/// Backpressure policy is **drop incoming**: when the queue is full the frame
/// being offered is rejected and the frames already queued are kept.
/// Rejections are counted rather than raised.
pub struct FrameIngestQueue {
    sender: Sender<Frame>,
    receiver: Receiver<Frame>,
    capacity: usize,
    stats: QueueStats,
}

#[derive(Debug, Default)]
struct QueueStats {
    accepted: AtomicU64,
    dropped: AtomicU64,
}

/// Snapshot of queue counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueStatsSnapshot {
    pub depth: usize,
    pub capacity: usize,
    pub accepted: u64,
    pub dropped: u64,
}

impl FrameIngestQueue {
    /// Create a queue holding at most `capacity` frames (minimum 1)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (sender, receiver) = channel::bounded(capacity);
        Self {
            sender,
            receiver,
            capacity,
            stats: QueueStats::default(),
        }
    }

    /// Offer a frame without blocking. Returns false if the frame was dropped.
    pub fn offer(&self, frame: Frame) -> bool {
        match self.sender.try_send(frame) {
            Ok(()) => {
                self.stats.accepted.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(TrySendError::Full(frame)) => {
                let dropped = self.stats.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                debug!(
                    "Frame queue full, dropping frame {} ({} dropped so far)",
                    frame.id, dropped
                );
                false
            }
            // The queue owns both ends, so this only happens during teardown
            Err(TrySendError::Disconnected(frame)) => {
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                trace!("Frame queue disconnected, dropping frame {}", frame.id);
                false
            }
        }
    }

    /// Take the oldest frame, waiting at most `timeout`
    pub fn take(&self, timeout: Duration) -> Option<Frame> {
        match self.receiver.recv_timeout(timeout) {
            Ok(frame) => Some(frame),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Discard everything currently queued, returning how many frames were removed
    pub fn clear(&self) -> usize {
        self.receiver.try_iter().count()
    }

    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn stats(&self) -> QueueStatsSnapshot {
        QueueStatsSnapshot {
            depth: self.len(),
            capacity: self.capacity,
            accepted: self.stats.accepted.load(Ordering::Relaxed),
            dropped: self.stats.dropped.load(Ordering::Relaxed),
        }
    }
}
