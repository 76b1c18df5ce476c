use crate::landmarks::LandmarkSet;
use crate::signal::{Roi, SignalStats};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultStatus {
    /// No frame has completed yet
    Processing,
    Success,
}

/// Outcome of the most recently completed frame
#[derive(Debug, Clone, PartialEq)]
pub struct LatestResult {
    pub frame_id: Option<u64>,
    /// Annotated frame as JPEG
    pub annotated_image: Option<Arc<Vec<u8>>>,
    /// Landmarks found in this frame
    pub landmarks: Option<Arc<LandmarkSet>>,
    /// Face box in pixels
    pub face: Option<Roi>,
    pub bpm: Option<f64>,
    pub status: ResultStatus,
}

impl Default for LatestResult {
    fn default() -> Self {
        Self {
            frame_id: None,
            annotated_image: None,
            landmarks: None,
            face: None,
            bpm: None,
            status: ResultStatus::Processing,
        }
    }
}

/// Everything readers see, replaced as a unit after each frame
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PipelineSnapshot {
    pub latest: LatestResult,
    /// Most recent landmarks from any frame, kept when later frames have none
    pub last_landmarks: Option<Arc<LandmarkSet>>,
    /// Smoothed heart rate
    pub bpm: Option<f64>,
    pub signal: SignalStats,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BpmReading {
    pub value: Option<f64>,
    pub detecting: bool,
}

impl From<Option<f64>> for BpmReading {
    fn from(value: Option<f64>) -> Self {
        Self {
            value,
            detecting: value.is_none(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStatus {
    pub frame_queue_size: usize,
    pub frame_queue_capacity: usize,
    pub frames_accepted: u64,
    pub frames_dropped: u64,
    pub frames_processed: u64,
    pub frame_errors: u64,
    pub processing_active: bool,
    pub heart_rate_samples: usize,
}
