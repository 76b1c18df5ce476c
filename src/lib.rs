pub mod config;
pub mod detection;
pub mod error;
pub mod frame;
pub mod landmarks;
pub mod overlay;
pub mod pipeline;
pub mod queue;
pub mod recording;
pub mod replay;
pub mod signal;

pub use config::RppgConfig;
pub use detection::{
    factory_from_config, BuiltinDetectorFactory, DetectorFactory, DetectorSet, FaceBox,
    FaceDetector, PoseDetector,
};
pub use error::{RecordingError, Result, RppgError};
pub use frame::Frame;
pub use landmarks::{landmark_name, Landmark, LandmarkSet, TARGET_LANDMARKS};
pub use pipeline::{
    BpmReading, ComponentState, LatestResult, PipelineContext, PipelineSnapshot, PipelineWorker,
    QueueStatus, ResultStatus,
};
pub use queue::FrameIngestQueue;
pub use recording::{RecordingHandoff, RecordingSession, RecordingStatus};
pub use signal::{
    BpmSmoother, HeartRateEstimator, HeartRateReading, HeartRateTracker, Inconclusive,
    SignalBuffer, SignalSample, SignalStats,
};
