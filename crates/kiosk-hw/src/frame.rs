//! Captured camera frame and its JPEG encoding.

use chrono::{DateTime, Utc};
use image::codecs::jpeg::JpegEncoder;
use image::RgbImage;

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("cannot encode an empty frame ({0}x{1})")]
    Empty(u32, u32),
    #[error("JPEG encoding failed: {0}")]
    Encode(#[from] image::ImageError),
}

/// A decoded RGB camera frame.
#[derive(Clone)]
pub struct Frame {
    pub image: RgbImage,
    /// Wall-clock capture time.
    pub captured_at: DateTime<Utc>,
    pub sequence: u64,
}

impl Frame {
    pub fn new(image: RgbImage, captured_at: DateTime<Utc>, sequence: u64) -> Self {
        Self {
            image,
            captured_at,
            sequence,
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Capture time as fractional Unix seconds.
    pub fn timestamp_secs(&self) -> f64 {
        self.captured_at.timestamp_millis() as f64 / 1000.0
    }

    /// Encode the full frame as JPEG.
    pub fn encode_jpeg(&self, quality: u8) -> Result<Vec<u8>, FrameError> {
        let (w, h) = self.image.dimensions();
        if w == 0 || h == 0 {
            return Err(FrameError::Empty(w, h));
        }
        let mut buf = Vec::new();
        self.image
            .write_with_encoder(JpegEncoder::new_with_quality(&mut buf, quality))?;
        Ok(buf)
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.width())
            .field("height", &self.height())
            .field("captured_at", &self.captured_at)
            .field("sequence", &self.sequence)
            .finish()
    }
}
