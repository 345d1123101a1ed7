//! Synthetic camera for running without video hardware

use std::time::{Duration, Instant};

use image::{Rgb, RgbImage};
use imageproc::drawing::draw_filled_rect_mut;
use imageproc::rect::Rect;

use super::source::{VideoBackend, VideoSource};
use crate::error::SensorError;

/// Renders a square that sweeps across a static backdrop in bursts
#[derive(Debug, Clone)]
pub struct SimulatedCamera {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    /// Side of the moving square in pixels
    pub square_size: u32,
    /// Full cycle length (movement + rest)
    pub period: Duration,
    /// Part of each cycle during which the square moves
    pub move_length: Duration,
}

impl Default for SimulatedCamera {
    fn default() -> Self {
        Self {
            width: 320,
            height: 240,
            fps: 30,
            square_size: 60,
            period: Duration::from_secs(4),
            move_length: Duration::from_millis(1500),
        }
    }
}

impl SimulatedCamera {
    /// Top-left corner of the square `elapsed` seconds into the run
    fn square_position(&self, elapsed: f32) -> (i32, i32) {
        let travel = self.width.saturating_sub(self.square_size) as f32;
        let y = (self.height.saturating_sub(self.square_size) / 2) as i32;

        let period = self.period.as_secs_f32().max(0.001);
        let moving = self.move_length.as_secs_f32().min(period);
        let cycle = (elapsed / period).floor() as u64;
        let phase = elapsed % period;
        let progress = if moving > 0.0 { (phase / moving).min(1.0) } else { 1.0 };

        // Alternate direction every cycle so the rest position persists
        let x = if cycle % 2 == 0 {
            progress * travel
        } else {
            (1.0 - progress) * travel
        };
        (x.round() as i32, y)
    }

    fn render(&self, elapsed: f32) -> RgbImage {
        let mut image = RgbImage::from_fn(self.width, self.height, |x, y| {
            let shade = (40 + (x + y) % 32) as u8;
            Rgb([shade, shade, shade + 10])
        });
        if self.square_size > 0 {
            let (x, y) = self.square_position(elapsed);
            draw_filled_rect_mut(
                &mut image,
                Rect::at(x, y).of_size(self.square_size, self.square_size),
                Rgb([230, 200, 60]),
            );
        }
        image
    }
}

struct SimulatedSource {
    camera: SimulatedCamera,
    started: Instant,
    next_frame: Instant,
    frame_period: Duration,
}

impl VideoSource for SimulatedSource {
    fn read_frame(&mut self) -> Result<RgbImage, SensorError> {
        let now = Instant::now();
        if self.next_frame > now {
            std::thread::sleep(self.next_frame - now);
        }
        self.next_frame += self.frame_period;

        Ok(self.camera.render(self.started.elapsed().as_secs_f32()))
    }

    fn release(&mut self) {
        tracing::debug!("Simulated camera released");
    }
}

impl VideoBackend for SimulatedCamera {
    fn name(&self) -> &str {
        "simulated"
    }

    fn open(&self, index: u32) -> Result<Box<dyn VideoSource>, SensorError> {
        if self.width == 0 || self.height == 0 || self.fps == 0 {
            return Err(SensorError::CameraUnavailable {
                index,
                reason: format!("invalid simulated mode {}x{} @ {}fps", self.width, self.height, self.fps),
            });
        }

        tracing::info!(
            "Simulated camera {} opened ({}x{} @ {}fps)",
            index,
            self.width,
            self.height,
            self.fps
        );

        let now = Instant::now();
        Ok(Box::new(SimulatedSource {
            camera: self.clone(),
            started: now,
            next_frame: now,
            frame_period: Duration::from_secs_f64(1.0 / self.fps as f64),
        }))
    }
}
