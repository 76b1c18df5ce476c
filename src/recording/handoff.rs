use super::session::CompletedRecording;
use crate::landmarks::Landmark;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

/// Serializable record of a finished session, ready for persistence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordingHandoff {
    /// Stop time formatted `%Y%m%d_%H%M%S`
    pub session_timestamp: String,
    pub frame_count: usize,
    /// RFC 3339 start time
    pub start_time: String,
    /// Smoothed BPM at stop time, 0 when none was available
    pub heart_rate_bpm: f64,
    pub frames: Vec<HandoffFrame>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandoffFrame {
    pub elapsed_seconds: f64,
    pub landmarks: Vec<HandoffLandmark>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandoffLandmark {
    pub id: u32,
    pub name: String,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub visibility: f64,
}

impl From<&Landmark> for HandoffLandmark {
    fn from(landmark: &Landmark) -> Self {
        Self {
            id: landmark.id,
            name: landmark.name(),
            x: round_to(landmark.x, 6),
            y: round_to(landmark.y, 6),
            z: round_to(landmark.z, 6),
            visibility: round_to(landmark.visibility, 6),
        }
    }
}

impl RecordingHandoff {
    pub fn new(
        recording: CompletedRecording,
        heart_rate_bpm: Option<f64>,
        stopped_at: DateTime<Utc>,
        timezone: Tz,
    ) -> Self {
        let frames: Vec<HandoffFrame> = recording
            .frames
            .iter()
            .map(|frame| HandoffFrame {
                elapsed_seconds: round_to(frame.elapsed_seconds, 3),
                landmarks: frame.landmarks.iter().map(HandoffLandmark::from).collect(),
            })
            .collect();

        Self {
            session_timestamp: stopped_at
                .with_timezone(&timezone)
                .format("%Y%m%d_%H%M%S")
                .to_string(),
            frame_count: frames.len(),
            start_time: recording.started_at.with_timezone(&timezone).to_rfc3339(),
            heart_rate_bpm: heart_rate_bpm.map(|b| round_to(b, 1)).unwrap_or(0.0),
            frames,
        }
    }
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}
