//! Captured colour frames

use std::path::Path;
use std::time::Instant;

use image::RgbImage;

/// Camera frame data
#[derive(Clone, Debug)]
pub struct CameraFrame {
    /// RGB pixel data
    pub image: RgbImage,
    /// Frame number since the capture loop started
    pub frame_number: u64,
    /// Frame timestamp
    pub timestamp: Instant,
}

impl CameraFrame {
    pub fn new(image: RgbImage, frame_number: u64) -> Self {
        Self {
            image,
            frame_number,
            timestamp: Instant::now(),
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Write the frame to disk; the format follows the file extension
    pub fn save(&self, path: &Path) -> image::ImageResult<()> {
        self.image.save(path)
    }
}
