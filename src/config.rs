use crate::signal::estimator::min_samples_for_order;
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct RppgConfig {
    pub queue: QueueConfig,
    pub worker: WorkerConfig,
    pub signal: SignalConfig,
    pub estimator: EstimatorConfig,
    pub smoother: SmootherConfig,
    pub overlay: OverlayConfig,
    pub detection: DetectionConfig,
    pub recording: RecordingConfig,
    pub replay: ReplayConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct QueueConfig {
    /// Maximum number of encoded frames waiting for the worker
    #[serde(default = "default_queue_capacity")]
    pub capacity: usize,

    /// How long the worker waits on an empty queue before backing off
    #[serde(default = "default_take_timeout_ms")]
    pub take_timeout_ms: u64,

    /// Sleep after an empty take
    #[serde(default = "default_idle_backoff_ms")]
    pub idle_backoff_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct WorkerConfig {
    /// Upper bound on how long stop() waits for the worker thread
    #[serde(default = "default_join_timeout_ms")]
    pub join_timeout_ms: u64,

    /// Upper bound on detector construction at startup
    #[serde(default = "default_init_timeout_ms")]
    pub init_timeout_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct SignalConfig {
    /// Number of samples retained in the sliding signal buffer
    #[serde(default = "default_signal_capacity")]
    pub capacity: usize,

    /// Number of most recent samples handed to the estimator
    #[serde(default = "default_signal_window")]
    pub window: usize,

    /// Weight ROI pixels with a Gaussian centred on the ROI
    #[serde(default = "default_center_weighted")]
    pub center_weighted: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct EstimatorConfig {
    /// Lower edge of the physiological band (Hz)
    #[serde(default = "default_low_hz")]
    pub low_hz: f64,

    /// Upper edge of the physiological band (Hz)
    #[serde(default = "default_high_hz")]
    pub high_hz: f64,

    /// Butterworth prototype order
    #[serde(default = "default_filter_order")]
    pub filter_order: usize,

    /// Minimum peak/mean magnitude ratio inside the band
    #[serde(default = "default_min_quality")]
    pub min_quality: f64,

    /// Candidates must lie strictly between min_bpm and max_bpm
    #[serde(default = "default_min_bpm")]
    pub min_bpm: f64,

    #[serde(default = "default_max_bpm")]
    pub max_bpm: f64,

    /// Maximum deviation from the smoothed reference before a candidate is rejected
    #[serde(default = "default_max_jump_bpm")]
    pub max_jump_bpm: f64,

    /// Minimum share of raw spectral energy that must fall inside the band
    #[serde(default = "default_min_band_energy_ratio")]
    pub min_band_energy_ratio: f64,

    /// FFT length floor; shorter windows are zero padded
    #[serde(default = "default_min_fft_len")]
    pub min_fft_len: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct SmootherConfig {
    /// Number of accepted candidates averaged into the displayed BPM
    #[serde(default = "default_smoother_window")]
    pub window: usize,

    /// Number of smoothed values kept for avg/min/max statistics
    #[serde(default = "default_stats_history")]
    pub stats_history: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct OverlayConfig {
    /// Path to TrueType font file for overlay text
    #[serde(default = "default_font_path")]
    pub font_path: String,

    /// Font size for overlay text
    #[serde(default = "default_font_size")]
    pub font_size: f32,

    /// JPEG quality of the annotated frame
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,

    /// Draw pose connections in addition to landmark markers
    #[serde(default = "default_draw_skeleton")]
    pub draw_skeleton: bool,
}

/// Detector implementation built by the worker
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DetectorBackend {
    /// No pose model, optional fixed face region
    Builtin,
    /// ONNX Runtime pose landmark and face detection models
    Onnx,
}

impl DetectorBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Builtin => "builtin",
            Self::Onnx => "onnx",
        }
    }
}

/// Memory layout of a model's image input
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TensorLayout {
    Nhwc,
    Nchw,
}

impl TensorLayout {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Nhwc => "nhwc",
            Self::Nchw => "nchw",
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct DetectionConfig {
    #[serde(default = "default_detector_backend")]
    pub backend: DetectorBackend,

    /// MediaPipe pose landmark model. The first output holds (x, y, z,
    /// visibility, presence) per landmark in input pixels, the second the
    /// pose presence logit.
    pub pose_model: Option<String>,

    /// Square input edge of the pose model
    #[serde(default = "default_pose_input_size")]
    pub pose_input_size: u32,

    #[serde(default = "default_tensor_layout")]
    pub pose_layout: TensorLayout,

    /// Frames whose pose presence falls below this report no landmarks
    #[serde(default = "default_min_pose_presence")]
    pub min_pose_presence: f64,

    /// BlazeFace short-range model (regressors and scores over 896 anchors)
    pub face_model: Option<String>,

    /// Square input edge of the face model
    #[serde(default = "default_face_input_size")]
    pub face_input_size: u32,

    #[serde(default = "default_tensor_layout")]
    pub face_layout: TensorLayout,

    #[serde(default = "default_min_face_score")]
    pub min_face_score: f64,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct RecordingConfig {
    /// Timezone used for the session timestamp
    #[serde(default = "default_recording_timezone")]
    pub timezone: String,

    /// Directory the binary exports handoff records into
    #[serde(default = "default_recording_output_dir")]
    pub output_dir: String,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ReplayConfig {
    /// Rate at which replayed frames are offered to the queue
    #[serde(default = "default_replay_fps")]
    pub fps: u32,

    /// Relative face box (x, y, width, height in 0..1) used when no face model is available
    pub face_region: Option<[f64; 4]>,
}

impl QueueConfig {
    pub fn take_timeout(&self) -> Duration {
        Duration::from_millis(self.take_timeout_ms)
    }

    pub fn idle_backoff(&self) -> Duration {
        Duration::from_millis(self.idle_backoff_ms)
    }
}

impl WorkerConfig {
    pub fn join_timeout(&self) -> Duration {
        Duration::from_millis(self.join_timeout_ms)
    }

    pub fn init_timeout(&self) -> Duration {
        Duration::from_millis(self.init_timeout_ms)
    }
}

impl RppgConfig {
    /// Load configuration from default sources (file + environment variables)
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_file("rppg.toml")
    }

    /// Load configuration from a specific file path
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().to_string_lossy();
        debug!("Loading configuration from: {}", path_str);

        let settings = Config::builder()
            .set_default("queue.capacity", default_queue_capacity() as i64)?
            .set_default("queue.take_timeout_ms", default_take_timeout_ms())?
            .set_default("queue.idle_backoff_ms", default_idle_backoff_ms())?
            .set_default("worker.join_timeout_ms", default_join_timeout_ms())?
            .set_default("worker.init_timeout_ms", default_init_timeout_ms())?
            .set_default("signal.capacity", default_signal_capacity() as i64)?
            .set_default("signal.window", default_signal_window() as i64)?
            .set_default("signal.center_weighted", default_center_weighted())?
            .set_default("estimator.low_hz", default_low_hz())?
            .set_default("estimator.high_hz", default_high_hz())?
            .set_default("estimator.filter_order", default_filter_order() as i64)?
            .set_default("estimator.min_quality", default_min_quality())?
            .set_default("estimator.min_bpm", default_min_bpm())?
            .set_default("estimator.max_bpm", default_max_bpm())?
            .set_default("estimator.max_jump_bpm", default_max_jump_bpm())?
            .set_default(
                "estimator.min_band_energy_ratio",
                default_min_band_energy_ratio(),
            )?
            .set_default("estimator.min_fft_len", default_min_fft_len() as i64)?
            .set_default("smoother.window", default_smoother_window() as i64)?
            .set_default("smoother.stats_history", default_stats_history() as i64)?
            .set_default("overlay.font_path", default_font_path())?
            .set_default("overlay.font_size", default_font_size() as f64)?
            .set_default("overlay.jpeg_quality", default_jpeg_quality() as i64)?
            .set_default("overlay.draw_skeleton", default_draw_skeleton())?
            .set_default("detection.backend", default_detector_backend().as_str())?
            .set_default("detection.pose_input_size", default_pose_input_size() as i64)?
            .set_default("detection.pose_layout", default_tensor_layout().as_str())?
            .set_default("detection.min_pose_presence", default_min_pose_presence())?
            .set_default("detection.face_input_size", default_face_input_size() as i64)?
            .set_default("detection.face_layout", default_tensor_layout().as_str())?
            .set_default("detection.min_face_score", default_min_face_score())?
            .set_default("recording.timezone", default_recording_timezone())?
            .set_default("recording.output_dir", default_recording_output_dir())?
            .set_default("replay.fps", default_replay_fps() as i64)?
            // Add configuration file (optional)
            .add_source(File::with_name(&path_str).required(false))
            // RPPG_SIGNAL__WINDOW=300 overrides signal.window
            .add_source(
                Environment::with_prefix("RPPG")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        let config: RppgConfig = settings.try_deserialize()?;

        info!("Configuration loaded successfully");
        debug!("Final configuration: {:#?}", config);
        Ok(config)
    }

    /// Render the configuration as TOML
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.queue.capacity == 0 {
            return Err(ConfigError::Message(
                "Queue capacity must be greater than 0".to_string(),
            ));
        }

        if self.signal.window > self.signal.capacity {
            return Err(ConfigError::Message(format!(
                "Signal window ({}) cannot exceed signal capacity ({})",
                self.signal.window, self.signal.capacity
            )));
        }

        let est = &self.estimator;
        if !(est.low_hz > 0.0 && est.low_hz < est.high_hz) {
            return Err(ConfigError::Message(format!(
                "Estimator band must satisfy 0 < low_hz < high_hz (got {}..{})",
                est.low_hz, est.high_hz
            )));
        }

        if est.filter_order == 0 {
            return Err(ConfigError::Message(
                "Filter order must be greater than 0".to_string(),
            ));
        }

        let min_window = min_samples_for_order(est.filter_order);
        if self.signal.window < min_window {
            return Err(ConfigError::Message(format!(
                "Signal window ({}) is shorter than the {} samples an order-{} filter needs",
                self.signal.window, min_window, est.filter_order
            )));
        }

        if est.min_bpm >= est.max_bpm {
            return Err(ConfigError::Message(
                "Estimator min_bpm must be below max_bpm".to_string(),
            ));
        }

        if !(0.0..1.0).contains(&est.min_band_energy_ratio) {
            return Err(ConfigError::Message(
                "min_band_energy_ratio must lie in [0, 1)".to_string(),
            ));
        }

        if self.smoother.window == 0 {
            return Err(ConfigError::Message(
                "Smoother window must be greater than 0".to_string(),
            ));
        }

        if self.overlay.jpeg_quality == 0 || self.overlay.jpeg_quality > 100 {
            return Err(ConfigError::Message(
                "JPEG quality must be within 1..=100".to_string(),
            ));
        }

        let det = &self.detection;
        if det.backend == DetectorBackend::Onnx && !cfg!(feature = "onnx") {
            return Err(ConfigError::Message(
                "Detection backend 'onnx' requires building with the `onnx` feature".to_string(),
            ));
        }

        if det.pose_input_size == 0 {
            return Err(ConfigError::Message(
                "Pose model input size must be greater than 0".to_string(),
            ));
        }

        // BlazeFace anchors sit on 8- and 16-pixel grids
        if det.face_input_size == 0 || det.face_input_size % 16 != 0 {
            return Err(ConfigError::Message(
                "Face model input size must be a positive multiple of 16".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&det.min_pose_presence) || !(0.0..=1.0).contains(&det.min_face_score)
        {
            return Err(ConfigError::Message(
                "Detection thresholds must lie in [0, 1]".to_string(),
            ));
        }

        if self.replay.fps == 0 {
            return Err(ConfigError::Message(
                "Replay fps must be greater than 0".to_string(),
            ));
        }

        if let Some([x, y, w, h]) = self.replay.face_region {
            let inside = |v: f64| (0.0..=1.0).contains(&v);
            if !(inside(x) && inside(y) && w > 0.0 && h > 0.0 && inside(x + w) && inside(y + h))
            {
                return Err(ConfigError::Message(
                    "Replay face_region must be a relative box inside the frame".to_string(),
                ));
            }
        }

        Ok(())
    }
}

impl Default for RppgConfig {
    fn default() -> Self {
        Self {
            queue: QueueConfig {
                capacity: default_queue_capacity(),
                take_timeout_ms: default_take_timeout_ms(),
                idle_backoff_ms: default_idle_backoff_ms(),
            },
            worker: WorkerConfig {
                join_timeout_ms: default_join_timeout_ms(),
                init_timeout_ms: default_init_timeout_ms(),
            },
            signal: SignalConfig {
                capacity: default_signal_capacity(),
                window: default_signal_window(),
                center_weighted: default_center_weighted(),
            },
            estimator: EstimatorConfig::default(),
            smoother: SmootherConfig {
                window: default_smoother_window(),
                stats_history: default_stats_history(),
            },
            overlay: OverlayConfig {
                font_path: default_font_path(),
                font_size: default_font_size(),
                jpeg_quality: default_jpeg_quality(),
                draw_skeleton: default_draw_skeleton(),
            },
            detection: DetectionConfig {
                backend: default_detector_backend(),
                pose_model: None,
                pose_input_size: default_pose_input_size(),
                pose_layout: default_tensor_layout(),
                min_pose_presence: default_min_pose_presence(),
                face_model: None,
                face_input_size: default_face_input_size(),
                face_layout: default_tensor_layout(),
                min_face_score: default_min_face_score(),
            },
            recording: RecordingConfig {
                timezone: default_recording_timezone(),
                output_dir: default_recording_output_dir(),
            },
            replay: ReplayConfig {
                fps: default_replay_fps(),
                face_region: None,
            },
        }
    }
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            low_hz: default_low_hz(),
            high_hz: default_high_hz(),
            filter_order: default_filter_order(),
            min_quality: default_min_quality(),
            min_bpm: default_min_bpm(),
            max_bpm: default_max_bpm(),
            max_jump_bpm: default_max_jump_bpm(),
            min_band_energy_ratio: default_min_band_energy_ratio(),
            min_fft_len: default_min_fft_len(),
        }
    }
}

// Default value functions
fn default_queue_capacity() -> usize {
    3
}
fn default_take_timeout_ms() -> u64 {
    100
}
fn default_idle_backoff_ms() -> u64 {
    10
}

fn default_join_timeout_ms() -> u64 {
    2000
}
fn default_init_timeout_ms() -> u64 {
    10_000
}

fn default_signal_capacity() -> usize {
    300
} // 10 s at 30 fps
fn default_signal_window() -> usize {
    240
} // 8 s at 30 fps
fn default_center_weighted() -> bool {
    true
}

fn default_low_hz() -> f64 {
    0.75
}
fn default_high_hz() -> f64 {
    3.0
}
fn default_filter_order() -> usize {
    5
}
fn default_min_quality() -> f64 {
    2.0
}
fn default_min_bpm() -> f64 {
    40.0
}
fn default_max_bpm() -> f64 {
    180.0
}
fn default_max_jump_bpm() -> f64 {
    30.0
}
fn default_min_band_energy_ratio() -> f64 {
    0.01
}
fn default_min_fft_len() -> usize {
    1024
}

fn default_smoother_window() -> usize {
    5
}
fn default_stats_history() -> usize {
    30
}

fn default_font_path() -> String {
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf".to_string()
}
fn default_font_size() -> f32 {
    24.0
}
fn default_jpeg_quality() -> u8 {
    80
}
fn default_draw_skeleton() -> bool {
    true
}

fn default_detector_backend() -> DetectorBackend {
    if cfg!(feature = "onnx") {
        DetectorBackend::Onnx
    } else {
        DetectorBackend::Builtin
    }
}
fn default_pose_input_size() -> u32 {
    256
}
fn default_tensor_layout() -> TensorLayout {
    TensorLayout::Nhwc
}
fn default_min_pose_presence() -> f64 {
    0.5
}
fn default_face_input_size() -> u32 {
    128
}
fn default_min_face_score() -> f64 {
    0.5
}

fn default_recording_timezone() -> String {
    "UTC".to_string()
}
fn default_recording_output_dir() -> String {
    "./recordings".to_string()
}

fn default_replay_fps() -> u32 {
    30
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = RppgConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.queue.capacity, 3);
        assert_eq!(config.signal.capacity, 300);
        assert_eq!(config.smoother.window, 5);
    }

    #[test]
    fn test_config_validation() {
        let mut config = RppgConfig::default();

        config.signal.window = 400; // larger than capacity
        assert!(config.validate().is_err());
        config.signal.window = 240;

        config.estimator.low_hz = 3.5; // inverted band
        assert!(config.validate().is_err());
        config.estimator.low_hz = 0.75;

        config.signal.window = 33; // one short of what an order-5 filter needs
        assert!(config.validate().is_err());
        config.signal.window = 34;
        assert!(config.validate().is_ok());
        config.estimator.filter_order = 6; // needs 40
        assert!(config.validate().is_err());
        config.estimator.filter_order = 5;
        config.signal.window = 240;

        config.replay.face_region = Some([0.8, 0.1, 0.5, 0.5]); // spills off the frame
        assert!(config.validate().is_err());
        config.replay.face_region = Some([0.3, 0.1, 0.4, 0.5]);

        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_file_overrides_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[queue]\ncapacity = 5\n\n[estimator]\nmin_quality = 3.0\n\n[replay]\nface_region = [0.3, 0.1, 0.4, 0.5]"
        )
        .unwrap();

        let config = RppgConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.queue.capacity, 5);
        assert_eq!(config.estimator.min_quality, 3.0);
        assert_eq!(config.replay.face_region, Some([0.3, 0.1, 0.4, 0.5]));
        // Untouched values keep their defaults
        assert_eq!(config.signal.window, 240);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_environment_variable_override() {
        env::set_var("RPPG_OVERLAY__JPEG_QUALITY", "55");
        env::set_var("RPPG_ESTIMATOR__MAX_JUMP_BPM", "25");

        let dir = tempfile::tempdir().unwrap();
        let config = RppgConfig::load_from_file(dir.path().join("absent.toml"));

        env::remove_var("RPPG_OVERLAY__JPEG_QUALITY");
        env::remove_var("RPPG_ESTIMATOR__MAX_JUMP_BPM");

        let config = config.unwrap();
        assert_eq!(config.overlay.jpeg_quality, 55);
        assert_eq!(config.estimator.max_jump_bpm, 25.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_detection_section_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[detection]\nbackend = \"builtin\"\npose_model = \"models/pose.onnx\"\npose_layout = \"nchw\"\nface_input_size = 256"
        )
        .unwrap();

        let config = RppgConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.detection.backend, DetectorBackend::Builtin);
        assert_eq!(config.detection.pose_model.as_deref(), Some("models/pose.onnx"));
        assert_eq!(config.detection.pose_layout, TensorLayout::Nchw);
        assert_eq!(config.detection.face_layout, TensorLayout::Nhwc);
        assert_eq!(config.detection.face_input_size, 256);
        assert_eq!(config.detection.face_model, None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_detection_validation() {
        let mut config = RppgConfig::default();
        config.detection.face_input_size = 100;
        assert!(config.validate().is_err());
        config.detection.face_input_size = 128;

        config.detection.min_face_score = 1.5;
        assert!(config.validate().is_err());
        config.detection.min_face_score = 0.5;

        config.detection.backend = DetectorBackend::Onnx;
        assert_eq!(config.validate().is_ok(), cfg!(feature = "onnx"));
    }

    #[test]
    fn test_default_config_renders_as_toml() {
        let rendered = RppgConfig::default().to_toml().unwrap();
        assert!(rendered.contains("[estimator]"));
        assert!(rendered.contains("min_band_energy_ratio"));
    }
}
