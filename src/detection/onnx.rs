//! ONNX Runtime backed pose and face detectors

use super::decode::{decode_face, decode_pose, face_anchors};
use super::{
    DetectorFactory, DetectorSet, FaceBox, FaceDetector, FixedRegionFaceDetector, PoseDetector,
};
use crate::config::{DetectionConfig, TensorLayout};
use crate::error::{Result, RppgError};
use crate::landmarks::LandmarkSet;
use image::imageops::{self, FilterType};
use image::RgbImage;
use ndarray::Array4;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Tensor;
use std::path::Path;
use tracing::{debug, info};

/// Loaded model plus the tensor names it is driven through
struct Model {
    session: Session,
    input_name: String,
    output_names: Vec<String>,
    component: &'static str,
}

impl Model {
    fn open(component: &'static str, path: Option<&str>, max_outputs: usize) -> Result<Self> {
        let Some(path) = path else {
            return Err(RppgError::resource_init(component, "no model file configured"));
        };
        if !Path::new(path).is_file() {
            return Err(RppgError::resource_init(
                component,
                &format!("model file '{}' not found", path),
            ));
        }

        let session = build_session(path).map_err(|e| {
            RppgError::resource_init(component, &format!("failed to load '{}': {:#}", path, e))
        })?;

        let input_name = session
            .inputs
            .first()
            .map(|input| input.name.clone())
            .ok_or_else(|| RppgError::resource_init(component, "model declares no inputs"))?;
        let output_names: Vec<String> = session
            .outputs
            .iter()
            .take(max_outputs)
            .map(|output| output.name.clone())
            .collect();

        info!(
            "Loaded {} model from {} (input '{}', outputs {:?})",
            component, path, input_name, output_names
        );
        Ok(Self {
            session,
            input_name,
            output_names,
            component,
        })
    }

    /// Run one inference and flatten every requested output
    fn run(&mut self, input: Array4<f32>) -> Result<Vec<Vec<f32>>> {
        let component = self.component;
        let failed = |e: ort::Error| RppgError::detector(component, &e.to_string());

        let tensor = Tensor::from_array(input).map_err(failed)?;
        let outputs = self
            .session
            .run(ort::inputs![self.input_name.as_str() => tensor])
            .map_err(failed)?;

        self.output_names
            .iter()
            .map(|name| {
                let array = outputs[name.as_str()]
                    .try_extract_array::<f32>()
                    .map_err(failed)?;
                Ok(array.iter().copied().collect())
            })
            .collect()
    }
}

fn build_session(path: &str) -> anyhow::Result<Session> {
    let session = Session::builder()?
        .with_optimization_level(GraphOptimizationLevel::Level3)?
        .commit_from_file(path)?;
    Ok(session)
}

/// Resize to a square model input and scale channels into `range`
pub(crate) fn image_tensor(
    image: &RgbImage,
    size: u32,
    layout: TensorLayout,
    range: (f32, f32),
) -> Array4<f32> {
    let resized = imageops::resize(image, size, size, FilterType::Triangle);
    let s = size as usize;
    let mut tensor = match layout {
        TensorLayout::Nhwc => Array4::<f32>::zeros((1, s, s, 3)),
        TensorLayout::Nchw => Array4::<f32>::zeros((1, 3, s, s)),
    };

    let (low, high) = range;
    for (x, y, pixel) in resized.enumerate_pixels() {
        let (x, y) = (x as usize, y as usize);
        for c in 0..3 {
            let value = low + (high - low) * pixel[c] as f32 / 255.0;
            match layout {
                TensorLayout::Nhwc => tensor[[0, y, x, c]] = value,
                TensorLayout::Nchw => tensor[[0, c, y, x]] = value,
            }
        }
    }
    tensor
}

/// MediaPipe pose landmark model run on the whole frame
pub struct OnnxPoseDetector {
    model: Model,
    input_size: u32,
    layout: TensorLayout,
    min_presence: f64,
}

impl OnnxPoseDetector {
    pub fn new(config: &DetectionConfig) -> Result<Self> {
        Ok(Self {
            // Landmarks and the presence flag; segmentation and heatmaps are skipped
            model: Model::open("pose", config.pose_model.as_deref(), 2)?,
            input_size: config.pose_input_size,
            layout: config.pose_layout,
            min_presence: config.min_pose_presence,
        })
    }
}

impl PoseDetector for OnnxPoseDetector {
    fn detect(&mut self, image: &RgbImage) -> Result<Option<LandmarkSet>> {
        let input = image_tensor(image, self.input_size, self.layout, (0.0, 1.0));
        let outputs = self.model.run(input)?;

        let landmarks = outputs
            .first()
            .ok_or_else(|| RppgError::detector("pose", "model produced no outputs"))?;
        let presence = outputs.get(1).and_then(|flag| flag.first().copied());
        decode_pose(landmarks, presence, self.input_size, self.min_presence)
    }
}

/// BlazeFace short-range detector
pub struct OnnxFaceDetector {
    model: Model,
    anchors: Vec<(f32, f32)>,
    input_size: u32,
    layout: TensorLayout,
    min_score: f64,
}

impl OnnxFaceDetector {
    pub fn new(config: &DetectionConfig) -> Result<Self> {
        Ok(Self {
            model: Model::open("face", config.face_model.as_deref(), 2)?,
            anchors: face_anchors(config.face_input_size),
            input_size: config.face_input_size,
            layout: config.face_layout,
            min_score: config.min_face_score,
        })
    }
}

impl FaceDetector for OnnxFaceDetector {
    fn detect(&mut self, image: &RgbImage) -> Result<Option<FaceBox>> {
        let input = image_tensor(image, self.input_size, self.layout, (-1.0, 1.0));
        let outputs = self.model.run(input)?;

        // Output order varies between conversions; tell them apart by size
        let anchors = self.anchors.len();
        let regressors = outputs.iter().find(|values| values.len() == anchors * 16);
        let scores = outputs.iter().find(|values| values.len() == anchors);
        match (regressors, scores) {
            (Some(regressors), Some(scores)) => decode_face(
                regressors,
                scores,
                &self.anchors,
                self.input_size,
                self.min_score,
            ),
            _ => Err(RppgError::detector(
                "face".to_string(),
                format!(
                    "unexpected output sizes {:?} for {} anchors",
                    outputs.iter().map(Vec::len).collect::<Vec<_>>(),
                    anchors
                ),
            )),
        }
    }
}

/// Builds ONNX detectors on the worker thread. Missing or unloadable models
/// fail worker startup.
#[derive(Debug, Clone)]
pub struct OnnxDetectorFactory {
    config: DetectionConfig,
    face_region: Option<FaceBox>,
}

impl OnnxDetectorFactory {
    /// `face_region` stands in for the face model when none is configured
    pub fn new(config: &DetectionConfig, face_region: Option<[f64; 4]>) -> Self {
        Self {
            config: config.clone(),
            face_region: face_region.map(FaceBox::from_relative),
        }
    }
}

impl DetectorFactory for OnnxDetectorFactory {
    fn create(&self) -> Result<DetectorSet> {
        let pose = OnnxPoseDetector::new(&self.config)?;
        let face: Box<dyn FaceDetector> = match (&self.config.face_model, self.face_region) {
            (None, Some(region)) => {
                debug!("No face model configured, using fixed face region {:?}", region);
                Box::new(FixedRegionFaceDetector::new(region))
            }
            _ => Box::new(OnnxFaceDetector::new(&self.config)?),
        };
        Ok(DetectorSet::new(Box::new(pose), face))
    }
}
