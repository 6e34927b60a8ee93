//! OCR: page image preprocessing, the segmentation-mode ladder, and engines.

mod deskew;
mod filters;
#[cfg(feature = "tesseract")]
mod leptess;
mod preprocessing;
mod reader;
mod tesseract;

pub use deskew::{estimate_skew, min_area_rect_angle};
pub use filters::{adaptive_threshold, clahe, foreground_count, otsu_binarize, remove_lines};
#[cfg(feature = "tesseract")]
pub use leptess::LeptessEngine;
pub use preprocessing::{Binarization, ImagePreprocessor};
pub use reader::PageReader;
pub use tesseract::TesseractCli;

use std::fmt;
use std::sync::Arc;

use image::GrayImage;
use serde::{Deserialize, Serialize};

use crate::error::OcrError;
use crate::models::config::OcrConfig;

/// Tesseract page segmentation mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SegmentationMode(u8);

impl SegmentationMode {
    /// Orientation and script detection only.
    pub const OSD_ONLY: Self = Self(0);
    /// Fully automatic page segmentation.
    pub const AUTO: Self = Self(3);
    /// A single column of text of variable sizes.
    pub const SINGLE_COLUMN: Self = Self(4);
    /// A single uniform block of text.
    pub const SINGLE_BLOCK: Self = Self(6);
    /// As much text as possible in no particular order.
    pub const SPARSE_TEXT: Self = Self(11);
    /// Sparse text with orientation and script detection.
    pub const SPARSE_TEXT_OSD: Self = Self(12);

    /// Highest mode Tesseract accepts.
    pub const MAX: u8 = 13;

    pub fn new(mode: u8) -> Option<Self> {
        (mode <= Self::MAX).then_some(Self(mode))
    }

    pub fn value(&self) -> u8 {
        self.0
    }

    /// Uniform block, single column, sparse text, sparse text with OSD, automatic.
    pub fn default_ladder() -> Vec<Self> {
        vec![
            Self::SINGLE_BLOCK,
            Self::SINGLE_COLUMN,
            Self::SPARSE_TEXT,
            Self::SPARSE_TEXT_OSD,
            Self::AUTO,
        ]
    }

    /// Parse a comma-separated list such as `"6,4,11"`, skipping invalid entries.
    pub fn parse_list(raw: &str) -> Vec<Self> {
        raw.split(',')
            .filter_map(|tok| tok.trim().parse::<u8>().ok())
            .filter_map(Self::new)
            .collect()
    }
}

impl fmt::Display for SegmentationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Text recognition backend.
pub trait OcrEngine: Send + Sync {
    /// Short backend name for logs.
    fn name(&self) -> &str;

    /// Recognize text in a prepared page image.
    fn recognize(&self, image: &GrayImage, mode: SegmentationMode) -> Result<String, OcrError>;

    /// Clockwise rotation (0, 90, 180 or 270 degrees) that makes the page upright.
    fn detect_orientation(&self, image: &GrayImage) -> Result<u32, OcrError>;
}

/// The engine for a deployment: the linked Tesseract library when built with
/// the `tesseract` feature and it initializes, the command-line tool otherwise.
pub fn default_engine(config: &OcrConfig) -> Arc<dyn OcrEngine> {
    #[cfg(feature = "tesseract")]
    {
        match LeptessEngine::from_config(config) {
            Ok(engine) => return Arc::new(engine),
            Err(e) => tracing::warn!("Tesseract library unavailable, using the CLI: {}", e),
        }
    }

    Arc::new(TesseractCli::from_config(config))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_ladder_order() {
        let values: Vec<u8> = SegmentationMode::default_ladder()
            .iter()
            .map(|m| m.value())
            .collect();
        assert_eq!(values, vec![6, 4, 11, 12, 3]);
    }

    #[test]
    fn test_parse_list() {
        let modes = SegmentationMode::parse_list(" 3, 99, x,11 ,");
        assert_eq!(modes, vec![SegmentationMode::AUTO, SegmentationMode::SPARSE_TEXT]);
        assert!(SegmentationMode::parse_list("").is_empty());
    }

    #[test]
    fn test_serde_transparent() {
        let json = serde_json::to_string(&SegmentationMode::default_ladder()).unwrap();
        assert_eq!(json, "[6,4,11,12,3]");
    }
}
