//! Landmark session recording and its persisted form

pub mod export;
pub mod handoff;
pub mod session;


pub use export::{resolve_timezone, save_handoff};
pub use handoff::{HandoffFrame, HandoffLandmark, RecordingHandoff};
pub use session::{CompletedRecording, RecordedFrame, RecordingSession, RecordingStatus};
