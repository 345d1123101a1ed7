//! Frame-differencing motion estimate
//!
//! Each frame is reduced to a blurred luma image and compared with the one
//! before it. Pixels that changed by more than `diff_threshold` form a mask,
//! the mask is dilated, and the areas of its outer contours above
//! `min_contour_area` are summed. The summed area as a share of the frame,
//! scaled by `intensity_scale` and clamped to `max_intensity`, is the motion
//! intensity.

use image::{GrayImage, Luma, RgbImage};
use imageproc::contours::{find_contours, BorderType};
use imageproc::contrast::{threshold, ThresholdType};
use imageproc::distance_transform::Norm;
use imageproc::morphology::dilate;
use imageproc::point::Point;
use serde::{Deserialize, Serialize};

/// Default motion threshold on the 0-100 intensity scale
pub const DEFAULT_MOTION_THRESHOLD: f32 = 30.0;

/// Motion pipeline constants
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MotionConfig {
    /// Gaussian kernel width in pixels (odd; 1 disables blurring)
    pub blur_kernel: u32,
    /// Per-pixel luma change that counts as motion
    pub diff_threshold: u8,
    /// Dilation passes with a 3x3 square element
    pub dilate_iterations: u8,
    /// Contours at or below this area are ignored
    pub min_contour_area: f64,
    /// Multiplier applied to the moving fraction of the frame
    pub intensity_scale: f32,
    /// Upper clamp for the intensity
    pub max_intensity: f32,
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            blur_kernel: 21,
            diff_threshold: 25,
            dilate_iterations: 2,
            min_contour_area: 500.0,
            intensity_scale: 10_000.0,
            max_intensity: 100.0,
        }
    }
}

impl MotionConfig {
    /// Gaussian sigma matching a `blur_kernel`-wide kernel with automatic sigma
    pub fn blur_sigma(&self) -> f32 {
        if self.blur_kernel <= 1 {
            return 0.0;
        }
        0.3 * ((self.blur_kernel as f32 - 1.0) * 0.5 - 1.0) + 0.8
    }

    /// Force values into their usable ranges
    pub fn sanitize(&mut self) {
        if self.blur_kernel == 0 {
            self.blur_kernel = 1;
        } else if self.blur_kernel % 2 == 0 {
            self.blur_kernel += 1;
        }
        if !self.min_contour_area.is_finite() || self.min_contour_area < 0.0 {
            self.min_contour_area = 0.0;
        }
        if !self.intensity_scale.is_finite() || self.intensity_scale < 0.0 {
            self.intensity_scale = Self::default().intensity_scale;
        }
        if !self.max_intensity.is_finite() || self.max_intensity <= 0.0 {
            self.max_intensity = Self::default().max_intensity;
        }
    }
}

/// The motion pair, always published together
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MotionReading {
    pub detected: bool,
    pub intensity: f32,
}

impl MotionReading {
    /// Pair an intensity with its detection flag under `threshold`
    pub fn evaluate(intensity: f32, threshold: f32) -> Self {
        Self {
            detected: intensity > threshold,
            intensity,
        }
    }
}

/// Luma conversion followed by the configured Gaussian blur
pub fn to_blurred_gray(frame: &RgbImage, config: &MotionConfig) -> GrayImage {
    let gray = image::imageops::grayscale(frame);
    let sigma = config.blur_sigma();
    if sigma > 0.0 {
        imageproc::filter::gaussian_blur_f32(&gray, sigma)
    } else {
        gray
    }
}

/// Binary mask of pixels whose luma changed by more than `diff_threshold`,
/// dilated by `dilate_iterations`
pub fn difference_mask(previous: &GrayImage, current: &GrayImage, config: &MotionConfig) -> GrayImage {
    let (width, height) = current.dimensions();
    let mut diff = GrayImage::new(width, height);
    for ((out, a), b) in diff.pixels_mut().zip(previous.pixels()).zip(current.pixels()) {
        *out = Luma([a[0].abs_diff(b[0])]);
    }

    let mask = threshold(&diff, config.diff_threshold, ThresholdType::Binary);
    if config.dilate_iterations == 0 {
        mask
    } else {
        // k passes of a 3x3 square equal one pass at L-infinity radius k
        dilate(&mask, Norm::LInf, config.dilate_iterations)
    }
}

/// Area enclosed by a closed pixel contour (shoelace formula)
pub fn polygon_area(points: &[Point<i32>]) -> f64 {
    if points.len() < 3 {
        return 0.0;
    }
    let mut twice_area = 0i64;
    for (i, p) in points.iter().enumerate() {
        let q = &points[(i + 1) % points.len()];
        twice_area += p.x as i64 * q.y as i64 - q.x as i64 * p.y as i64;
    }
    twice_area.abs() as f64 / 2.0
}

/// Summed area of the outer contours in `mask` larger than `min_contour_area`.
///
/// Pixels outside the mask count as background, so regions touching the frame
/// edge are traced like interior ones.
pub fn moving_area(mask: &GrayImage, min_contour_area: f64) -> f64 {
    let (width, height) = mask.dimensions();
    let mut padded = GrayImage::new(width + 2, height + 2);
    image::imageops::replace(&mut padded, mask, 1, 1);

    // Shoelace areas do not depend on the one-pixel offset
    find_contours::<i32>(&padded)
        .iter()
        .filter(|c| matches!(c.border_type, BorderType::Outer) && c.parent.is_none())
        .map(|c| polygon_area(&c.points))
        .filter(|&area| area > min_contour_area)
        .fold(0.0, |total, area| total + area)
}

/// Scale a moving area to the clamped intensity
pub fn motion_intensity(moving_area: f64, width: u32, height: u32, config: &MotionConfig) -> f32 {
    let pixels = width as f64 * height as f64;
    if pixels <= 0.0 {
        return 0.0;
    }
    let scaled = moving_area / pixels * config.intensity_scale as f64;
    (scaled as f32).clamp(0.0, config.max_intensity)
}

/// Holds the previous frame between calls
#[derive(Debug, Default)]
pub struct MotionAnalyzer {
    config: MotionConfig,
    previous: Option<GrayImage>,
}

impl MotionAnalyzer {
    pub fn new(config: MotionConfig) -> Self {
        Self { config, previous: None }
    }

    /// Compare `frame` with the previous one.
    ///
    /// Returns `None` for the first frame and after a resolution change; the
    /// frame becomes the new reference in every case.
    pub fn analyze(&mut self, frame: &RgbImage) -> Option<f32> {
        let current = to_blurred_gray(frame, &self.config);

        let intensity = match self.previous.as_ref() {
            Some(previous) if previous.dimensions() == current.dimensions() => {
                let mask = difference_mask(previous, &current, &self.config);
                let area = moving_area(&mask, self.config.min_contour_area);
                Some(motion_intensity(area, current.width(), current.height(), &self.config))
            }
            Some(previous) => {
                tracing::debug!(
                    "Frame size changed from {:?} to {:?}, resetting reference",
                    previous.dimensions(),
                    current.dimensions()
                );
                None
            }
            None => None,
        };

        self.previous = Some(current);
        intensity
    }

    pub fn has_previous(&self) -> bool {
        self.previous.is_some()
    }

    pub fn config(&self) -> &MotionConfig {
        &self.config
    }

    pub fn reset(&mut self) {
        self.previous = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use image::Rgb;
    use imageproc::drawing::draw_filled_rect_mut;
    use imageproc::rect::Rect;
    use proptest::prelude::*;

    fn frame_with_square(x: i32, y: i32, size: u32) -> RgbImage {
        let mut image = RgbImage::from_pixel(160, 120, Rgb([0, 0, 0]));
        draw_filled_rect_mut(&mut image, Rect::at(x, y).of_size(size, size), Rgb([255, 255, 255]));
        image
    }

    #[test]
    fn test_default_sigma_matches_kernel() {
        assert_relative_eq!(MotionConfig::default().blur_sigma(), 3.5, epsilon = 1e-6);
        let unblurred = MotionConfig {
            blur_kernel: 1,
            ..Default::default()
        };
        assert_eq!(unblurred.blur_sigma(), 0.0);
    }

    #[test]
    fn test_sanitize_makes_kernel_odd() {
        let mut config = MotionConfig {
            blur_kernel: 20,
            min_contour_area: -3.0,
            max_intensity: f32::NAN,
            ..Default::default()
        };
        config.sanitize();
        assert_eq!(config.blur_kernel, 21);
        assert_eq!(config.min_contour_area, 0.0);
        assert_eq!(config.max_intensity, 100.0);
    }

    #[test]
    fn test_intensity_for_known_area() {
        let config = MotionConfig::default();
        let intensity = motion_intensity(2000.0, 1000, 1000, &config);
        assert_relative_eq!(intensity, 20.0);
        assert!(!MotionReading::evaluate(intensity, 30.0).detected);
        assert!(MotionReading::evaluate(intensity, 10.0).detected);
    }

    #[test]
    fn test_intensity_is_clamped() {
        let config = MotionConfig::default();
        assert_eq!(motion_intensity(500_000.0, 1000, 1000, &config), 100.0);
        assert_eq!(motion_intensity(10.0, 0, 0, &config), 0.0);
    }

    #[test]
    fn test_polygon_area_of_rectangle() {
        let points = [
            Point::new(0, 0),
            Point::new(50, 0),
            Point::new(50, 40),
            Point::new(0, 40),
        ];
        assert_relative_eq!(polygon_area(&points), 2000.0);
        assert_eq!(polygon_area(&points[..2]), 0.0);
    }

    #[test]
    fn test_moving_area_filters_small_contours() {
        let mut mask = GrayImage::new(200, 200);
        draw_filled_rect_mut(&mut mask, Rect::at(10, 10).of_size(51, 41), Luma([255]));
        draw_filled_rect_mut(&mut mask, Rect::at(150, 150).of_size(6, 6), Luma([255]));

        assert_relative_eq!(moving_area(&mask, 500.0), 2000.0);
        assert_relative_eq!(moving_area(&mask, 0.0), 2025.0);
    }

    #[test]
    fn test_moving_area_counts_regions_on_frame_edges() {
        let mut left = GrayImage::new(160, 120);
        draw_filled_rect_mut(&mut left, Rect::at(0, 20).of_size(60, 60), Luma([255]));
        assert_relative_eq!(moving_area(&left, 500.0), 3481.0);

        let mut corner = GrayImage::new(160, 120);
        draw_filled_rect_mut(&mut corner, Rect::at(0, 0).of_size(60, 60), Luma([255]));
        assert_relative_eq!(moving_area(&corner, 500.0), 3481.0);

        let full = GrayImage::from_pixel(160, 120, Luma([255]));
        assert_relative_eq!(moving_area(&full, 500.0), 159.0 * 119.0);
    }

    #[test]
    fn test_empty_mask_has_positive_zero_area() {
        let area = moving_area(&GrayImage::new(40, 30), 0.0);
        assert_eq!(area, 0.0);
        assert!(area.is_sign_positive());
    }

    #[test]
    fn test_difference_mask_is_binary_and_dilated() {
        let config = MotionConfig {
            blur_kernel: 1,
            ..Default::default()
        };
        let previous = GrayImage::new(20, 20);
        let mut current = GrayImage::new(20, 20);
        current.put_pixel(10, 10, Luma([200]));
        current.put_pixel(2, 2, Luma([20]));

        let mask = difference_mask(&previous, &current, &config);
        assert_eq!(mask.get_pixel(10, 10)[0], 255);
        assert_eq!(mask.get_pixel(12, 12)[0], 255);
        assert_eq!(mask.get_pixel(13, 10)[0], 0);
        assert_eq!(mask.get_pixel(2, 2)[0], 0);
    }

    #[test]
    fn test_first_frame_sets_reference() {
        let mut analyzer = MotionAnalyzer::new(MotionConfig::default());
        assert!(!analyzer.has_previous());
        assert_eq!(analyzer.analyze(&frame_with_square(20, 30, 40)), None);
        assert!(analyzer.has_previous());
    }

    #[test]
    fn test_identical_frames_have_no_motion() {
        let mut analyzer = MotionAnalyzer::new(MotionConfig::default());
        let frame = frame_with_square(20, 30, 40);
        analyzer.analyze(&frame);
        let intensity = analyzer.analyze(&frame).unwrap();
        assert_eq!(intensity, 0.0);
        assert!(intensity.is_sign_positive());
        assert!(!MotionReading::evaluate(intensity, DEFAULT_MOTION_THRESHOLD).detected);
    }

    #[test]
    fn test_moving_square_is_detected() {
        let mut analyzer = MotionAnalyzer::new(MotionConfig::default());
        analyzer.analyze(&frame_with_square(20, 30, 40));
        let intensity = analyzer.analyze(&frame_with_square(100, 30, 40)).unwrap();
        assert_eq!(intensity, 100.0);
        assert!(MotionReading::evaluate(intensity, DEFAULT_MOTION_THRESHOLD).detected);
    }

    #[test]
    fn test_motion_at_left_edge_is_detected() {
        let mut analyzer = MotionAnalyzer::new(MotionConfig::default());
        analyzer.analyze(&RgbImage::new(160, 120));
        let intensity = analyzer.analyze(&frame_with_square(0, 30, 40)).unwrap();
        assert_eq!(intensity, 100.0);
        assert!(MotionReading::evaluate(intensity, DEFAULT_MOTION_THRESHOLD).detected);
    }

    #[test]
    fn test_full_frame_change_is_maximal() {
        let mut analyzer = MotionAnalyzer::new(MotionConfig::default());
        analyzer.analyze(&RgbImage::new(160, 120));
        let white = RgbImage::from_pixel(160, 120, Rgb([255, 255, 255]));
        assert_eq!(analyzer.analyze(&white), Some(100.0));
    }

    #[test]
    fn test_small_flicker_is_ignored() {
        let mut analyzer = MotionAnalyzer::new(MotionConfig::default());
        analyzer.analyze(&frame_with_square(70, 50, 4));
        let intensity = analyzer.analyze(&RgbImage::new(160, 120)).unwrap();
        assert_eq!(intensity, 0.0);
    }

    #[test]
    fn test_resolution_change_resets_reference() {
        let mut analyzer = MotionAnalyzer::new(MotionConfig::default());
        analyzer.analyze(&frame_with_square(20, 30, 40));
        assert_eq!(analyzer.analyze(&RgbImage::new(80, 60)), None);
        assert_eq!(analyzer.analyze(&RgbImage::new(80, 60)), Some(0.0));

        analyzer.reset();
        assert!(!analyzer.has_previous());
    }

    proptest! {
        #[test]
        fn prop_detected_iff_above_threshold(intensity in 0.0f32..=100.0, threshold in 0.0f32..=100.0) {
            let reading = MotionReading::evaluate(intensity, threshold);
            prop_assert_eq!(reading.detected, intensity > threshold);
            prop_assert_eq!(reading.intensity, intensity);
        }
    }
}
