//! Output decoding for the MediaPipe pose landmark and BlazeFace models.
//!
//! Works on flattened `f32` tensors so it does not depend on the inference
//! runtime.

use super::FaceBox;
use crate::error::{Result, RppgError};
use crate::landmarks::{Landmark, LandmarkSet};

/// Pose landmarks reported per person
pub const POSE_LANDMARK_COUNT: usize = 33;

/// (x, y, z, visibility, presence) per landmark
const POSE_VALUES_PER_LANDMARK: usize = 5;

/// Box regressors per BlazeFace anchor: centre, size and six keypoints
const FACE_VALUES_PER_ANCHOR: usize = 16;

/// Anchor strides and anchors per grid cell for the short-range model
const FACE_ANCHOR_LAYERS: [(u32, usize); 2] = [(8, 2), (16, 6)];

pub fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x.clamp(-100.0, 100.0)).exp())
}

/// Anchor centres (relative to the input) in model output order
pub fn face_anchors(input_size: u32) -> Vec<(f32, f32)> {
    let mut anchors = Vec::new();
    for (stride, per_cell) in FACE_ANCHOR_LAYERS {
        let grid = (input_size + stride - 1) / stride;
        for y in 0..grid {
            for x in 0..grid {
                let centre = (
                    (x as f32 + 0.5) / grid as f32,
                    (y as f32 + 0.5) / grid as f32,
                );
                anchors.extend(std::iter::repeat(centre).take(per_cell));
            }
        }
    }
    anchors
}

/// Highest-scoring face above `min_score`, relative to the frame
pub fn decode_face(
    regressors: &[f32],
    scores: &[f32],
    anchors: &[(f32, f32)],
    input_size: u32,
    min_score: f64,
) -> Result<Option<FaceBox>> {
    if scores.len() != anchors.len() || regressors.len() != anchors.len() * FACE_VALUES_PER_ANCHOR
    {
        return Err(RppgError::detector(
            "face".to_string(),
            format!(
                "expected {} anchors, got {} scores and {} regressor values",
                anchors.len(),
                scores.len(),
                regressors.len()
            ),
        ));
    }

    let best = scores
        .iter()
        .map(|&raw| sigmoid(raw))
        .enumerate()
        .filter(|&(_, score)| score as f64 >= min_score)
        .max_by(|a, b| a.1.total_cmp(&b.1));

    let Some((index, score)) = best else {
        return Ok(None);
    };

    let size = input_size as f32;
    let raw = &regressors[index * FACE_VALUES_PER_ANCHOR..];
    let (anchor_x, anchor_y) = anchors[index];
    let cx = raw[0] / size + anchor_x;
    let cy = raw[1] / size + anchor_y;
    let width = raw[2] / size;
    let height = raw[3] / size;
    if width <= 0.0 || height <= 0.0 {
        return Ok(None);
    }

    Ok(Some(FaceBox {
        x: (cx - width / 2.0) as f64,
        y: (cy - height / 2.0) as f64,
        width: width as f64,
        height: height as f64,
        score: score as f64,
    }))
}

/// First 33 landmarks of a pose landmark tensor, relative to the frame.
///
/// `presence` is the raw pose flag logit; frames below `min_presence` yield
/// no landmarks.
pub fn decode_pose(
    values: &[f32],
    presence: Option<f32>,
    input_size: u32,
    min_presence: f64,
) -> Result<Option<LandmarkSet>> {
    let needed = POSE_LANDMARK_COUNT * POSE_VALUES_PER_LANDMARK;
    if values.len() < needed {
        return Err(RppgError::detector(
            "pose".to_string(),
            format!("expected at least {} landmark values, got {}", needed, values.len()),
        ));
    }

    if let Some(flag) = presence {
        if (sigmoid(flag) as f64) < min_presence {
            return Ok(None);
        }
    }

    let size = input_size as f64;
    let landmarks = values
        .chunks_exact(POSE_VALUES_PER_LANDMARK)
        .take(POSE_LANDMARK_COUNT)
        .enumerate()
        .map(|(id, v)| {
            Landmark::new(
                id as u32,
                v[0] as f64 / size,
                v[1] as f64 / size,
                v[2] as f64 / size,
                sigmoid(v[3]) as f64,
            )
        })
        .collect();
    Ok(Some(landmarks))
}
