//! Detector seams.
//!
//! Pose and face models are opaque behind these traits. A [`DetectorFactory`]
//! builds one [`DetectorSet`] on the worker thread, so the detectors themselves
//! never need to cross threads; they are released when the set is dropped.

pub mod decode;
#[cfg(feature = "onnx")]
pub mod onnx;

use crate::config::{DetectorBackend, RppgConfig};
use crate::error::Result;
use crate::landmarks::LandmarkSet;
use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// Face bounding box relative to the frame (0..1) with detector confidence
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FaceBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub score: f64,
}

impl FaceBox {
    /// Build from an `[x, y, width, height]` array
    pub fn from_relative(region: [f64; 4]) -> Self {
        let [x, y, width, height] = region;
        Self {
            x,
            y,
            width,
            height,
            score: 1.0,
        }
    }
}

pub trait PoseDetector {
    fn detect(&mut self, image: &RgbImage) -> Result<Option<LandmarkSet>>;
}

pub trait FaceDetector {
    fn detect(&mut self, image: &RgbImage) -> Result<Option<FaceBox>>;
}

/// Detectors owned by a single worker for its lifetime
pub struct DetectorSet {
    pub pose: Box<dyn PoseDetector>,
    pub face: Box<dyn FaceDetector>,
}

impl DetectorSet {
    pub fn new(pose: Box<dyn PoseDetector>, face: Box<dyn FaceDetector>) -> Self {
        Self { pose, face }
    }
}

/// Creates detector sets on the thread that will use them
pub trait DetectorFactory: Send + Sync {
    fn create(&self) -> Result<DetectorSet>;
}

/// Reports the same face box for every frame
#[derive(Debug, Clone)]
pub struct FixedRegionFaceDetector {
    region: FaceBox,
}

impl FixedRegionFaceDetector {
    pub fn new(region: FaceBox) -> Self {
        Self { region }
    }
}

impl FaceDetector for FixedRegionFaceDetector {
    fn detect(&mut self, _image: &RgbImage) -> Result<Option<FaceBox>> {
        Ok(Some(self.region))
    }
}

/// Detector that never finds anything
#[derive(Debug, Clone, Copy, Default)]
pub struct NullDetector;

impl PoseDetector for NullDetector {
    fn detect(&mut self, _image: &RgbImage) -> Result<Option<LandmarkSet>> {
        Ok(None)
    }
}

impl FaceDetector for NullDetector {
    fn detect(&mut self, _image: &RgbImage) -> Result<Option<FaceBox>> {
        Ok(None)
    }
}

/// Factory for the built-in detectors: no pose model and an optional fixed face region
#[derive(Debug, Clone, Default)]
pub struct BuiltinDetectorFactory {
    face_region: Option<FaceBox>,
}

impl BuiltinDetectorFactory {
    pub fn new(face_region: Option<[f64; 4]>) -> Self {
        Self {
            face_region: face_region.map(FaceBox::from_relative),
        }
    }
}

impl DetectorFactory for BuiltinDetectorFactory {
    fn create(&self) -> Result<DetectorSet> {
        let face: Box<dyn FaceDetector> = match self.face_region {
            Some(region) => {
                debug!("Using fixed face region {:?}", region);
                Box::new(FixedRegionFaceDetector::new(region))
            }
            None => {
                debug!("No face region configured, face detection disabled");
                Box::new(NullDetector)
            }
        };
        Ok(DetectorSet::new(Box::new(NullDetector), face))
    }
}

/// Factory for the configured detection backend
pub fn factory_from_config(config: &RppgConfig) -> Result<Arc<dyn DetectorFactory>> {
    match config.detection.backend {
        DetectorBackend::Builtin => Ok(Arc::new(BuiltinDetectorFactory::new(
            config.replay.face_region,
        ))),
        #[cfg(feature = "onnx")]
        DetectorBackend::Onnx => Ok(Arc::new(onnx::OnnxDetectorFactory::new(
            &config.detection,
            config.replay.face_region,
        ))),
        #[cfg(not(feature = "onnx"))]
        DetectorBackend::Onnx => Err(crate::error::RppgError::resource_init(
            "detectors",
            "the onnx backend needs a build with the `onnx` feature",
        )),
    }
}
