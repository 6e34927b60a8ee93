//! Image preprocessing for OCR.

use image::imageops::{self, FilterType};
use image::{DynamicImage, GrayImage, Luma};
use imageproc::filter::bilateral_filter;
use imageproc::geometric_transformations::{Interpolation, rotate_about_center};
use tracing::{debug, warn};

use super::deskew::estimate_skew;
use super::filters::{adaptive_threshold, clahe, foreground_count, otsu_binarize, remove_lines};
use super::OcrEngine;
use crate::models::config::OcrConfig;

/// Binarization chosen for a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Binarization {
    /// Local mean threshold.
    Adaptive,
    /// Global Otsu threshold.
    Otsu,
}

/// Turns a raw page image into an OCR-ready binary image.
#[derive(Debug, Clone)]
pub struct ImagePreprocessor {
    /// Pages whose larger side is below this are upscaled 2x.
    upscale_below: u32,
    /// Residual skew, in degrees, below which no rotation is applied.
    deskew_min_angle: f32,
    /// Erase table rulings after binarization.
    remove_lines: bool,
    clahe_clip_limit: f32,
    clahe_tiles: u32,
    /// Bilateral window side in pixels.
    bilateral_window: u32,
    bilateral_sigma: f32,
    threshold_block: u32,
    threshold_c: i32,
}

impl ImagePreprocessor {
    /// Create a new preprocessor with default settings.
    pub fn new() -> Self {
        Self {
            upscale_below: 1500,
            deskew_min_angle: 0.5,
            remove_lines: false,
            clahe_clip_limit: 3.0,
            clahe_tiles: 8,
            bilateral_window: 9,
            bilateral_sigma: 75.0,
            threshold_block: 31,
            threshold_c: 10,
        }
    }

    pub fn from_config(config: &OcrConfig) -> Self {
        Self::new()
            .with_upscale_below(config.upscale_below)
            .with_deskew_min_angle(config.deskew_min_angle)
            .with_line_removal(config.remove_lines)
    }

    pub fn with_upscale_below(mut self, size: u32) -> Self {
        self.upscale_below = size;
        self
    }

    pub fn with_deskew_min_angle(mut self, degrees: f32) -> Self {
        self.deskew_min_angle = degrees;
        self
    }

    pub fn with_line_removal(mut self, enabled: bool) -> Self {
        self.remove_lines = enabled;
        self
    }

    /// Run the full ladder: grayscale, upscale, orientation, deskew, contrast,
    /// denoise, binarization and optional line removal.
    pub fn process(&self, image: &DynamicImage, engine: &dyn OcrEngine) -> GrayImage {
        let gray = image.to_luma8();
        if gray.width() == 0 || gray.height() == 0 {
            return gray;
        }

        let gray = self.upscale(gray);
        let gray = self.correct_orientation(gray, engine);
        let gray = self.deskew(gray);

        let enhanced = clahe(&gray, self.clahe_clip_limit, self.clahe_tiles);
        let smoothed = bilateral_filter(
            &enhanced,
            self.bilateral_window,
            self.bilateral_sigma,
            self.bilateral_sigma,
        );

        let (binary, method) = self.binarize(&smoothed);
        debug!("Selected {:?} binarization", method);

        if self.remove_lines {
            debug!("Removing table lines");
            remove_lines(&binary)
        } else {
            binary
        }
    }

    /// Upscale 2x when the larger side is below the configured size.
    pub fn upscale(&self, gray: GrayImage) -> GrayImage {
        let (width, height) = gray.dimensions();
        if width.max(height) >= self.upscale_below {
            return gray;
        }
        debug!("Upscaling {}x{} page 2x", width, height);
        imageops::resize(&gray, width * 2, height * 2, FilterType::CatmullRom)
    }

    /// Rotate by the engine's orientation estimate. Detection failures leave
    /// the page untouched.
    pub fn correct_orientation(&self, gray: GrayImage, engine: &dyn OcrEngine) -> GrayImage {
        match engine.detect_orientation(&gray) {
            Ok(0) => gray,
            Ok(90) => {
                debug!("Rotating page 90 degrees");
                imageops::rotate90(&gray)
            }
            Ok(180) => {
                debug!("Rotating page 180 degrees");
                imageops::rotate180(&gray)
            }
            Ok(270) => {
                debug!("Rotating page 270 degrees");
                imageops::rotate270(&gray)
            }
            Ok(other) => {
                warn!("Ignoring unsupported orientation {}", other);
                gray
            }
            Err(e) => {
                warn!("Orientation detection failed: {}", e);
                gray
            }
        }
    }

    /// Rotate out residual skew measured on the minimum-area rectangle.
    pub fn deskew(&self, gray: GrayImage) -> GrayImage {
        match estimate_skew(&gray) {
            Some(angle) if angle.abs() > self.deskew_min_angle => {
                debug!("Deskewing by {:.2} degrees", angle);
                rotate_about_center(
                    &gray,
                    -angle.to_radians(),
                    Interpolation::Bicubic,
                    Luma([255]),
                )
            }
            _ => gray,
        }
    }

    /// Adaptive threshold unless it keeps less than 90% of Otsu's foreground.
    pub fn binarize(&self, gray: &GrayImage) -> (GrayImage, Binarization) {
        let adaptive = adaptive_threshold(gray, self.threshold_block, self.threshold_c);
        let otsu = otsu_binarize(gray);

        let fg_adaptive = foreground_count(&adaptive);
        let fg_otsu = foreground_count(&otsu);
        debug!("Foreground pixels: adaptive {}, otsu {}", fg_adaptive, fg_otsu);

        if fg_adaptive as f64 >= 0.9 * fg_otsu as f64 {
            (adaptive, Binarization::Adaptive)
        } else {
            (otsu, Binarization::Otsu)
        }
    }
}

impl Default for ImagePreprocessor {
    fn default() -> Self {
        Self::new()
    }
}
