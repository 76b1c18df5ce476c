use crate::detection::FaceBox;
use image::RgbImage;
use serde::{Deserialize, Serialize};

/// Pixel rectangle inside a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Roi {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Roi {
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

/// Face box in pixels, clipped to the frame. None when nothing is left.
pub fn face_rect(face: &FaceBox, frame_width: u32, frame_height: u32) -> Option<Roi> {
    let to_px = |rel: f64, extent: u32| {
        (rel * extent as f64).floor().clamp(0.0, extent as f64) as u32
    };

    let x0 = to_px(face.x, frame_width);
    let y0 = to_px(face.y, frame_height);
    let x1 = to_px(face.x + face.width, frame_width);
    let y1 = to_px(face.y + face.height, frame_height);

    let rect = Roi {
        x: x0,
        y: y0,
        width: x1.saturating_sub(x0),
        height: y1.saturating_sub(y0),
    };
    (!rect.is_empty()).then_some(rect)
}

/// Forehead region: the upper third of the face box
pub fn forehead(face: &FaceBox, frame_width: u32, frame_height: u32) -> Option<Roi> {
    let rect = face_rect(face, frame_width, frame_height)?;
    let roi = Roi {
        height: rect.height / 3,
        ..rect
    };
    (!roi.is_empty()).then_some(roi)
}

/// Mean green intensity of `roi`.
///
/// With `center_weighted` each pixel is weighted by a Gaussian centred on the
/// ROI with sigma = min(width, height) / 4.
pub fn mean_green(image: &RgbImage, roi: &Roi, center_weighted: bool) -> Option<f64> {
    let (w, h) = image.dimensions();
    if roi.is_empty() || roi.x + roi.width > w || roi.y + roi.height > h {
        return None;
    }

    let sigma = roi.width.min(roi.height) as f64 / 4.0;
    let weighted = center_weighted && sigma > 0.0;
    let cx = (roi.width / 2) as f64;
    let cy = (roi.height / 2) as f64;
    let two_sigma_sq = 2.0 * sigma * sigma;

    let mut sum = 0.0;
    let mut weight_sum = 0.0;
    for dy in 0..roi.height {
        for dx in 0..roi.width {
            let green = image.get_pixel(roi.x + dx, roi.y + dy)[1] as f64;
            let weight = if weighted {
                let d2 = (dx as f64 - cx).powi(2) + (dy as f64 - cy).powi(2);
                (-d2 / two_sigma_sq).exp()
            } else {
                1.0
            };
            sum += green * weight;
            weight_sum += weight;
        }
    }

    (weight_sum > 0.0).then(|| sum / weight_sum)
}
