//! Hardware cameras via nokhwa

use image::RgbImage;
use nokhwa::pixel_format::RgbFormat;
use nokhwa::utils::{ApiBackend, CameraIndex, RequestedFormat, RequestedFormatType, Resolution};
use nokhwa::Camera;

use super::source::{VideoBackend, VideoSource};
use crate::error::SensorError;

/// Information about an available camera
#[derive(Clone, Debug)]
pub struct CameraInfo {
    /// Camera index
    pub index: u32,
    /// Camera name
    pub name: String,
}

/// Opens cameras by index through the platform's native API
#[derive(Debug, Default, Clone, Copy)]
pub struct NokhwaBackend;

impl NokhwaBackend {
    pub fn new() -> Self {
        Self
    }

    /// List available cameras
    pub fn list_cameras() -> Vec<CameraInfo> {
        match nokhwa::query(ApiBackend::Auto) {
            Ok(cameras) => cameras
                .iter()
                .enumerate()
                .map(|(idx, info)| CameraInfo {
                    index: idx as u32,
                    name: info.human_name().to_string(),
                })
                .collect(),
            Err(e) => {
                tracing::warn!("Failed to enumerate cameras: {}", e);
                Vec::new()
            }
        }
    }

    /// Try progressively looser format requests until one is accepted
    fn open_camera(index: u32) -> Result<Camera, SensorError> {
        let attempts = [
            RequestedFormatType::HighestResolution(Resolution::new(640, 480)),
            RequestedFormatType::AbsoluteHighestFrameRate,
            RequestedFormatType::None,
        ];

        let mut last_error = String::from("no format attempted");
        for format in attempts {
            let label = format!("{:?}", format);
            let requested = RequestedFormat::new::<RgbFormat>(format);
            match Camera::new(CameraIndex::Index(index), requested) {
                Ok(camera) => return Ok(camera),
                Err(e) => {
                    tracing::warn!("Camera {} rejected {}: {}", index, label, e);
                    last_error = e.to_string();
                }
            }
        }

        Err(SensorError::CameraUnavailable {
            index,
            reason: last_error,
        })
    }
}

struct NokhwaSource {
    camera: Camera,
}

impl VideoSource for NokhwaSource {
    fn read_frame(&mut self) -> Result<RgbImage, SensorError> {
        let buffer = self
            .camera
            .frame()
            .map_err(|e| SensorError::FrameRead(e.to_string()))?;
        let decoded = buffer
            .decode_image::<RgbFormat>()
            .map_err(|e| SensorError::FrameRead(format!("decode failed: {}", e)))?;

        let (width, height) = (decoded.width(), decoded.height());
        RgbImage::from_raw(width, height, decoded.into_raw())
            .ok_or_else(|| SensorError::FrameRead(format!("short {}x{} buffer", width, height)))
    }

    fn release(&mut self) {
        if let Err(e) = self.camera.stop_stream() {
            tracing::warn!("Failed to stop camera stream: {}", e);
        }
    }
}

impl VideoBackend for NokhwaBackend {
    fn name(&self) -> &str {
        "nokhwa"
    }

    fn open(&self, index: u32) -> Result<Box<dyn VideoSource>, SensorError> {
        let mut camera = Self::open_camera(index)?;

        camera.open_stream().map_err(|e| SensorError::CameraUnavailable {
            index,
            reason: format!("failed to open stream: {}", e),
        })?;

        tracing::info!(
            "Camera opened: {} ({}x{})",
            camera.info().human_name(),
            camera.resolution().width(),
            camera.resolution().height()
        );

        Ok(Box::new(NokhwaSource { camera }))
    }
}
