use super::snapshot::{BpmReading, LatestResult, PipelineSnapshot, QueueStatus};
use crate::config::RppgConfig;
use crate::error::RecordingError;
use crate::frame::Frame;
use crate::landmarks::LandmarkSet;
use crate::queue::FrameIngestQueue;
use crate::recording::{resolve_timezone, RecordingHandoff, RecordingSession, RecordingStatus};
use crate::signal::SignalStats;
use chrono::Utc;
use chrono_tz::Tz;
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

/// Shared state between frame producers, status readers and the worker.
///
/// Each field sits behind its own narrow lock and no lock is held across
/// detection or signal processing. Readers get the last published
/// [`PipelineSnapshot`] as a whole.
pub struct PipelineContext {
    queue: FrameIngestQueue,
    snapshot: RwLock<Arc<PipelineSnapshot>>,
    recording: Mutex<RecordingSession>,
    timezone: Tz,
    next_frame_id: AtomicU64,
    processing_active: AtomicBool,
    reset_requested: AtomicBool,
    frames_processed: AtomicU64,
    frame_errors: AtomicU64,
}

impl PipelineContext {
    pub fn new(config: &RppgConfig) -> Self {
        Self {
            queue: FrameIngestQueue::new(config.queue.capacity),
            snapshot: RwLock::new(Arc::new(PipelineSnapshot::default())),
            recording: Mutex::new(RecordingSession::new()),
            timezone: resolve_timezone(&config.recording.timezone),
            next_frame_id: AtomicU64::new(1),
            processing_active: AtomicBool::new(false),
            reset_requested: AtomicBool::new(false),
            frames_processed: AtomicU64::new(0),
            frame_errors: AtomicU64::new(0),
        }
    }

    /// Offer encoded frame bytes captured now. Never blocks; false when dropped.
    pub fn submit_frame(&self, bytes: Vec<u8>) -> bool {
        self.submit_frame_at(bytes, Instant::now())
    }

    /// Offer encoded frame bytes with an explicit capture time
    pub fn submit_frame_at(&self, bytes: Vec<u8>, captured_at: Instant) -> bool {
        let id = self.next_frame_id.fetch_add(1, Ordering::Relaxed);
        self.queue.offer(Frame::new(id, captured_at, bytes))
    }

    /// Last published snapshot
    pub fn snapshot(&self) -> Arc<PipelineSnapshot> {
        Arc::clone(&self.snapshot.read())
    }

    pub fn latest_result(&self) -> LatestResult {
        self.snapshot().latest.clone()
    }

    pub fn last_landmarks(&self) -> Option<Arc<LandmarkSet>> {
        self.snapshot().last_landmarks.clone()
    }

    pub fn bpm(&self) -> BpmReading {
        self.snapshot().bpm.into()
    }

    pub fn signal_stats(&self) -> SignalStats {
        self.snapshot().signal.clone()
    }

    pub fn start_recording(&self) -> Result<(), RecordingError> {
        self.recording.lock().start(Instant::now(), Utc::now())
    }

    /// Stop recording and hand over the captured frames with the current BPM
    pub fn stop_recording(&self) -> Result<RecordingHandoff, RecordingError> {
        let (completed, bpm) = {
            let mut session = self.recording.lock();
            let completed = session.stop(Instant::now())?;
            (completed, self.snapshot.read().bpm)
        };
        Ok(RecordingHandoff::new(completed, bpm, Utc::now(), self.timezone))
    }

    pub fn recording_status(&self) -> RecordingStatus {
        self.recording.lock().status(Instant::now())
    }

    pub fn queue_status(&self) -> QueueStatus {
        let stats = self.queue.stats();
        QueueStatus {
            frame_queue_size: stats.depth,
            frame_queue_capacity: stats.capacity,
            frames_accepted: stats.accepted,
            frames_dropped: stats.dropped,
            frames_processed: self.frames_processed.load(Ordering::Relaxed),
            frame_errors: self.frame_errors.load(Ordering::Relaxed),
            processing_active: self.processing_active.load(Ordering::Relaxed),
            heart_rate_samples: self.snapshot.read().signal.samples,
        }
    }

    /// Ask the worker to clear the signal buffer and BPM history
    pub fn reset_signal(&self) {
        info!("Signal reset requested");
        self.reset_requested.store(true, Ordering::Release);
    }

    pub(crate) fn queue(&self) -> &FrameIngestQueue {
        &self.queue
    }

    pub(crate) fn publish(&self, snapshot: PipelineSnapshot) {
        *self.snapshot.write() = Arc::new(snapshot);
    }

    pub(crate) fn record_landmarks(&self, at: Instant, landmarks: Arc<LandmarkSet>) -> bool {
        self.recording.lock().append(at, landmarks)
    }

    pub(crate) fn take_reset_request(&self) -> bool {
        self.reset_requested.swap(false, Ordering::AcqRel)
    }

    pub(crate) fn set_processing_active(&self, active: bool) {
        self.processing_active.store(active, Ordering::Relaxed);
    }

    pub(crate) fn frame_processed(&self) {
        self.frames_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn frame_failed(&self) {
        self.frame_errors.fetch_add(1, Ordering::Relaxed);
    }
}
