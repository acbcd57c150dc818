use crate::error::{MoodcamError, Result};
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageFormat, RgbImage};
use serde::Serialize;
use std::sync::Arc;
use std::time::SystemTime;

/// Axis-aligned region of a frame, in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BoundingBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl BoundingBox {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// Restrict the box to a `width` x `height` frame. `None` if nothing remains.
    pub fn clamp_to(&self, width: u32, height: u32) -> Option<BoundingBox> {
        if self.x >= width || self.y >= height {
            return None;
        }
        let clamped = BoundingBox {
            x: self.x,
            y: self.y,
            width: self.width.min(width - self.x),
            height: self.height.min(height - self.y),
        };
        if clamped.width == 0 || clamped.height == 0 {
            None
        } else {
            Some(clamped)
        }
    }
}

/// Captured RGB24 frame. Pixel data is shared between clones.
#[derive(Debug, Clone)]
pub struct FrameData {
    /// Unique frame identifier within a capture session
    pub id: u64,
    /// Timestamp when frame was captured
    pub timestamp: SystemTime,
    /// Packed RGB24 pixels, row-major
    pub data: Arc<Vec<u8>>,
    pub width: u32,
    pub height: u32,
}

impl FrameData {
    pub fn new(id: u64, timestamp: SystemTime, data: Vec<u8>, width: u32, height: u32) -> Self {
        Self {
            id,
            timestamp,
            data: Arc::new(data),
            width,
            height,
        }
    }

    pub fn from_image(id: u64, timestamp: SystemTime, image: RgbImage) -> Self {
        let (width, height) = image.dimensions();
        Self::new(id, timestamp, image.into_raw(), width, height)
    }

    pub fn expected_size(&self) -> usize {
        self.width as usize * self.height as usize * 3
    }

    pub fn validate_size(&self) -> bool {
        self.data.len() == self.expected_size()
    }

    /// Get frame age in milliseconds
    pub fn age_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(self.timestamp)
            .unwrap_or_default()
            .as_millis() as u64
    }

    /// Copy the pixels into an owned image buffer
    pub fn to_rgb_image(&self) -> Result<RgbImage> {
        RgbImage::from_raw(self.width, self.height, self.data.to_vec()).ok_or_else(|| {
            MoodcamError::component(
                "frame",
                &format!(
                    "Frame {} holds {} bytes, expected {} for {}x{}",
                    self.id,
                    self.data.len(),
                    self.expected_size(),
                    self.width,
                    self.height
                ),
            )
        })
    }

    /// Cut out a region as a new frame with the same id and timestamp
    pub fn crop(&self, region: BoundingBox) -> Result<FrameData> {
        let region = region.clamp_to(self.width, self.height).ok_or_else(|| {
            MoodcamError::component(
                "frame",
                &format!("Region {:?} lies outside frame {}", region, self.id),
            )
        })?;
        let image = self.to_rgb_image()?;
        let cropped =
            image::imageops::crop_imm(&image, region.x, region.y, region.width, region.height)
                .to_image();
        Ok(FrameData::from_image(self.id, self.timestamp, cropped))
    }

    pub fn encode_jpeg(&self, quality: u8) -> Result<Vec<u8>> {
        let image = self.to_rgb_image()?;
        let mut buf = Vec::new();
        let mut encoder = JpegEncoder::new_with_quality(&mut buf, quality);
        encoder.encode_image(&DynamicImage::ImageRgb8(image)).map_err(|e| {
            MoodcamError::component("frame", &format!("JPEG encoding failed: {}", e))
        })?;
        Ok(buf)
    }

    pub fn encode_png(&self) -> Result<Vec<u8>> {
        let image = self.to_rgb_image()?;
        let mut buf = Vec::new();
        DynamicImage::ImageRgb8(image)
            .write_to(&mut std::io::Cursor::new(&mut buf), ImageFormat::Png)
            .map_err(|e| {
                MoodcamError::component("frame", &format!("PNG encoding failed: {}", e))
            })?;
        Ok(buf)
    }
}
