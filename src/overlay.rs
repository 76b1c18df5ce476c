use crate::config::OverlayConfig;
use crate::error::{Result, RppgError};
use crate::landmarks::{LandmarkSet, POSE_CONNECTIONS};
use crate::signal::Roi;
use image::{codecs::jpeg::JpegEncoder, Rgb, RgbImage};
use imageproc::drawing::{
    draw_filled_circle_mut, draw_hollow_rect_mut, draw_line_segment_mut, draw_text_mut,
};
use imageproc::rect::Rect;
use rusttype::{Font, Scale};
use std::fs;
use tracing::{debug, warn};

const FACE_COLOUR: Rgb<u8> = Rgb([0, 255, 0]);
const ROI_COLOUR: Rgb<u8> = Rgb([0, 0, 255]);
const LANDMARK_COLOUR: Rgb<u8> = Rgb([255, 0, 0]);
const SKELETON_COLOUR: Rgb<u8> = Rgb([245, 245, 245]);
const LABEL_COLOUR: Rgb<u8> = Rgb([255, 255, 255]);
const BPM_COLOUR: Rgb<u8> = Rgb([255, 255, 0]);
const DETECTING_COLOUR: Rgb<u8> = Rgb([255, 165, 0]);
const LANDMARK_RADIUS: i32 = 8;

/// Everything drawn onto one frame
#[derive(Debug, Clone, Copy, Default)]
pub struct OverlayContent<'a> {
    pub landmarks: Option<&'a LandmarkSet>,
    pub face: Option<Roi>,
    pub roi: Option<Roi>,
    pub bpm: Option<f64>,
    pub quality: Option<f64>,
}

/// Text shown in the heart-rate banner
pub fn heart_rate_label(bpm: Option<f64>) -> String {
    match bpm {
        Some(bpm) => format!("Heart Rate: {:.1} BPM", bpm),
        None => "Heart Rate: Detecting...".to_string(),
    }
}

pub fn quality_label(quality: f64) -> String {
    format!("Signal quality: {:.2}", quality)
}

/// Draws detection results onto frames and encodes them as JPEG.
///
/// Created once per worker. Without a usable font, shapes are still drawn and
/// text is skipped.
pub struct OverlayRenderer {
    font: Option<Font<'static>>,
    font_size: f32,
    jpeg_quality: u8,
    draw_skeleton: bool,
}

impl OverlayRenderer {
    pub fn new(config: &OverlayConfig) -> Self {
        let font = match load_font(&config.font_path) {
            Ok(font) => {
                debug!("Loaded overlay font from {}", config.font_path);
                Some(font)
            }
            Err(e) => {
                warn!("Overlay text disabled: {}", e);
                None
            }
        };
        Self::with_font(config, font)
    }

    pub fn with_font(config: &OverlayConfig, font: Option<Font<'static>>) -> Self {
        Self {
            font,
            font_size: config.font_size,
            jpeg_quality: config.jpeg_quality.clamp(1, 100),
            draw_skeleton: config.draw_skeleton,
        }
    }

    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }

    pub fn render(&self, image: &mut RgbImage, content: &OverlayContent<'_>) {
        if let Some(landmarks) = content.landmarks {
            self.draw_landmarks(image, landmarks);
        }

        if let Some(face) = content.face {
            draw_thick_rect(image, face, FACE_COLOUR);
        }

        if let Some(roi) = content.roi {
            draw_thick_rect(image, roi, ROI_COLOUR);
            self.draw_label(
                image,
                "ROI",
                roi.x as i32,
                roi.y as i32 - (self.font_size * 0.9) as i32,
                0.6,
                ROI_COLOUR,
            );
        }

        let colour = if content.bpm.is_some() {
            BPM_COLOUR
        } else {
            DETECTING_COLOUR
        };
        self.draw_label(image, &heart_rate_label(content.bpm), 10, 10, 1.0, colour);

        if let Some(quality) = content.quality {
            let y = 10 + (self.font_size * 1.2) as i32;
            self.draw_label(image, &quality_label(quality), 10, y, 0.6, LABEL_COLOUR);
        }
    }

    /// Encode with the configured JPEG quality
    pub fn encode_jpeg(&self, image: &RgbImage) -> Result<Vec<u8>> {
        let mut output = Vec::new();
        JpegEncoder::new_with_quality(&mut output, self.jpeg_quality)
            .encode_image(image)
            .map_err(|e| RppgError::Render {
                details: format!("Failed to encode annotated frame: {}", e),
            })?;
        Ok(output)
    }

    fn draw_landmarks(&self, image: &mut RgbImage, landmarks: &LandmarkSet) {
        let (w, h) = image.dimensions();

        if self.draw_skeleton {
            for &(a, b) in POSE_CONNECTIONS.iter() {
                if let (Some(start), Some(end)) = (landmarks.get(a), landmarks.get(b)) {
                    let (x0, y0) = start.to_pixel(w, h);
                    let (x1, y1) = end.to_pixel(w, h);
                    draw_line_segment_mut(
                        image,
                        (x0 as f32, y0 as f32),
                        (x1 as f32, y1 as f32),
                        SKELETON_COLOUR,
                    );
                }
            }
        }

        for landmark in landmarks.targets() {
            let (cx, cy) = landmark.to_pixel(w, h);
            draw_filled_circle_mut(image, (cx, cy), LANDMARK_RADIUS, LANDMARK_COLOUR);
            self.draw_label(
                image,
                &landmark.id.to_string(),
                cx + 10,
                cy - 10 - (self.font_size * 0.5) as i32,
                0.5,
                LABEL_COLOUR,
            );
        }
    }

    fn draw_label(
        &self,
        image: &mut RgbImage,
        text: &str,
        x: i32,
        y: i32,
        relative_size: f32,
        colour: Rgb<u8>,
    ) {
        if let Some(font) = &self.font {
            let scale = Scale::uniform(self.font_size * relative_size);
            draw_text_mut(image, colour, x, y, scale, font, text);
        }
    }
}

fn load_font(path: &str) -> Result<Font<'static>> {
    let data = fs::read(path).map_err(|e| RppgError::Render {
        details: format!("Failed to read font file '{}': {}", path, e),
    })?;
    Font::try_from_vec(data).ok_or_else(|| RppgError::Render {
        details: format!("Failed to parse font file '{}'", path),
    })
}

/// Two-pixel outline
fn draw_thick_rect(image: &mut RgbImage, rect: Roi, colour: Rgb<u8>) {
    for inset in 0..2u32 {
        if rect.width <= 2 * inset || rect.height <= 2 * inset {
            break;
        }
        let r = Rect::at((rect.x + inset) as i32, (rect.y + inset) as i32)
            .of_size(rect.width - 2 * inset, rect.height - 2 * inset);
        draw_hollow_rect_mut(image, r, colour);
    }
}
