use crate::error::RecordingError;
use crate::landmarks::LandmarkSet;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::info;

/// Landmarks captured at one processed frame
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedFrame {
    /// Seconds since the session started, measured when the frame was processed
    pub elapsed_seconds: f64,
    pub landmarks: Arc<LandmarkSet>,
}

/// Frames handed over by [`RecordingSession::stop`]
#[derive(Debug, Clone)]
pub struct CompletedRecording {
    pub started_at: DateTime<Utc>,
    pub duration: Duration,
    pub frames: Vec<RecordedFrame>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RecordingStatus {
    pub active: bool,
    pub frame_count: usize,
    /// Seconds since start, one decimal; absent while idle
    pub elapsed_seconds: Option<f64>,
}

#[derive(Debug, Clone, Copy)]
struct ActiveSession {
    started: Instant,
    started_at: DateTime<Utc>,
}

/// Idle/recording state machine holding landmark snapshots while active
#[derive(Debug, Default)]
pub struct RecordingSession {
    active: Option<ActiveSession>,
    frames: Vec<RecordedFrame>,
}

impl RecordingSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enter recording. Previous frames are discarded.
    pub fn start(&mut self, now: Instant, wall_clock: DateTime<Utc>) -> Result<(), RecordingError> {
        if self.active.is_some() {
            return Err(RecordingError::AlreadyActive);
        }

        self.frames.clear();
        self.active = Some(ActiveSession {
            started: now,
            started_at: wall_clock,
        });
        info!("Recording started at {}", wall_clock.to_rfc3339());
        Ok(())
    }

    /// Append a snapshot taken at `at`. Returns false while idle.
    pub fn append(&mut self, at: Instant, landmarks: Arc<LandmarkSet>) -> bool {
        let Some(active) = self.active else {
            return false;
        };

        let mut elapsed_seconds = at.saturating_duration_since(active.started).as_secs_f64();
        if let Some(last) = self.frames.last() {
            elapsed_seconds = elapsed_seconds.max(last.elapsed_seconds);
        }

        self.frames.push(RecordedFrame {
            elapsed_seconds,
            landmarks,
        });
        true
    }

    /// Leave recording and hand over everything captured
    pub fn stop(&mut self, now: Instant) -> Result<CompletedRecording, RecordingError> {
        let active = self.active.take().ok_or(RecordingError::NotActive)?;
        let frames = std::mem::take(&mut self.frames);
        let duration = now.saturating_duration_since(active.started);

        info!(
            "Recording stopped after {:.1}s with {} frames",
            duration.as_secs_f64(),
            frames.len()
        );

        Ok(CompletedRecording {
            started_at: active.started_at,
            duration,
            frames,
        })
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    pub fn status(&self, now: Instant) -> RecordingStatus {
        RecordingStatus {
            active: self.is_active(),
            frame_count: self.frames.len(),
            elapsed_seconds: self.active.map(|a| {
                let secs = now.saturating_duration_since(a.started).as_secs_f64();
                (secs * 10.0).round() / 10.0
            }),
        }
    }
}
