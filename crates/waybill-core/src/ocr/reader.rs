//! Page reading: preprocessing followed by the segmentation-mode ladder.

use std::sync::Arc;

use image::{DynamicImage, GrayImage};
use tracing::{debug, warn};

use super::{ImagePreprocessor, OcrEngine, SegmentationMode};
use crate::error::OcrError;
use crate::models::config::OcrConfig;

/// Reads text from page images.
pub struct PageReader {
    engine: Arc<dyn OcrEngine>,
    preprocessor: ImagePreprocessor,
    modes: Vec<SegmentationMode>,
    min_text_chars: usize,
}

impl PageReader {
    pub fn new(engine: Arc<dyn OcrEngine>) -> Self {
        Self {
            engine,
            preprocessor: ImagePreprocessor::new(),
            modes: SegmentationMode::default_ladder(),
            min_text_chars: 10,
        }
    }

    pub fn from_config(engine: Arc<dyn OcrEngine>, config: &OcrConfig) -> Self {
        Self::new(engine)
            .with_preprocessor(ImagePreprocessor::from_config(config))
            .with_modes(config.segmentation_modes.clone())
            .with_min_text_chars(config.min_text_chars)
    }

    pub fn with_preprocessor(mut self, preprocessor: ImagePreprocessor) -> Self {
        self.preprocessor = preprocessor;
        self
    }

    pub fn with_modes(mut self, modes: Vec<SegmentationMode>) -> Self {
        self.modes = modes;
        self
    }

    pub fn with_min_text_chars(mut self, chars: usize) -> Self {
        self.min_text_chars = chars;
        self
    }

    pub fn engine_name(&self) -> &str {
        self.engine.name()
    }

    /// Preprocess and recognize a page image.
    pub fn read_image(&self, image: &DynamicImage) -> String {
        let prepared = self.preprocessor.process(image, self.engine.as_ref());
        self.recognize_ladder(&prepared)
    }

    /// Decode an encoded image (PNG, JPEG, TIFF, ...) and read it.
    pub fn read_bytes(&self, data: &[u8]) -> Result<String, OcrError> {
        let image =
            image::load_from_memory(data).map_err(|e| OcrError::InvalidImage(e.to_string()))?;
        Ok(self.read_image(&image))
    }

    /// Try each segmentation mode in order; the first output with enough
    /// non-whitespace-trimmed characters wins, otherwise the last output is kept.
    pub fn recognize_ladder(&self, image: &GrayImage) -> String {
        let mut last = String::new();

        for &mode in &self.modes {
            let text = match self.engine.recognize(image, mode) {
                Ok(text) => text,
                Err(e) => {
                    warn!("{} failed with segmentation mode {}: {}", self.engine.name(), mode, e);
                    String::new()
                }
            };

            let chars = text.trim().chars().count();
            debug!("Segmentation mode {} produced {} chars", mode, chars);
            if chars >= self.min_text_chars {
                return text;
            }
            last = text;
        }

        last
    }
}
