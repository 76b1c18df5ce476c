use crate::error::{Result, RppgError};
use image::RgbImage;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Encoded frame as submitted by a producer
#[derive(Debug, Clone)]
pub struct Frame {
    /// Monotonic submission sequence number
    pub id: u64,
    /// Capture timestamp
    pub captured_at: Instant,
    /// Encoded image bytes (JPEG, PNG, ...)
    pub data: Arc<Vec<u8>>,
}

impl Frame {
    pub fn new(id: u64, captured_at: Instant, data: Vec<u8>) -> Self {
        Self {
            id,
            captured_at,
            data: Arc::new(data),
        }
    }

    /// Decode the frame into an RGB image
    pub fn decode(&self) -> Result<RgbImage> {
        if self.data.is_empty() {
            return Err(RppgError::Decode {
                details: format!("frame {} is empty", self.id),
            });
        }

        let image = image::load_from_memory(&self.data).map_err(|e| RppgError::Decode {
            details: format!("frame {}: {}", self.id, e),
        })?;

        Ok(image.to_rgb8())
    }

    /// Time spent between capture and now
    pub fn age(&self) -> Duration {
        self.captured_at.elapsed()
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use image::{codecs::jpeg::JpegEncoder, Rgb, RgbImage};

    /// Encode a flat-coloured JPEG of the given size
    pub fn solid_jpeg(width: u32, height: u32, colour: [u8; 3]) -> Vec<u8> {
        let img = RgbImage::from_pixel(width, height, Rgb(colour));
        let mut buf = Vec::new();
        JpegEncoder::new_with_quality(&mut buf, 90)
            .encode_image(&img)
            .unwrap();
        buf
    }
}
