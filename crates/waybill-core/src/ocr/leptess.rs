//! In-process Tesseract through libtesseract (feature `tesseract`).

use std::io::Cursor;

use image::{GrayImage, ImageFormat};
use leptess::{LepTess, Variable};

use super::{OcrEngine, SegmentationMode, TesseractCli};
use crate::error::OcrError;
use crate::models::config::OcrConfig;

/// Recognition through the linked library; orientation detection still goes
/// through the command-line tool, which ships the OSD model.
pub struct LeptessEngine {
    data_path: Option<String>,
    language: String,
    whitelist: String,
    osd: TesseractCli,
}

impl LeptessEngine {
    /// Verify that the library initializes with the configured language.
    pub fn from_config(config: &OcrConfig) -> Result<Self, OcrError> {
        let engine = Self {
            data_path: None,
            language: config.language.clone(),
            whitelist: config.char_whitelist.clone(),
            osd: TesseractCli::from_config(config),
        };
        engine.init()?;
        Ok(engine)
    }

    pub fn with_data_path(mut self, path: impl Into<String>) -> Self {
        self.data_path = Some(path.into());
        self
    }

    fn init(&self) -> Result<LepTess, OcrError> {
        LepTess::new(self.data_path.as_deref(), &self.language).map_err(|e| {
            OcrError::Unavailable(format!(
                "failed to initialize Tesseract with language '{}': {}",
                self.language, e
            ))
        })
    }
}

impl OcrEngine for LeptessEngine {
    fn name(&self) -> &str {
        "leptess"
    }

    fn recognize(&self, image: &GrayImage, mode: SegmentationMode) -> Result<String, OcrError> {
        let mut lt = self.init()?;
        lt.set_variable(Variable::TesseditPagesegMode, &mode.to_string())
            .map_err(|e| OcrError::Recognition(format!("failed to set PSM: {}", e)))?;
        if !self.whitelist.is_empty() {
            lt.set_variable(Variable::TesseditCharWhitelist, &self.whitelist)
                .map_err(|e| OcrError::Recognition(format!("failed to set whitelist: {}", e)))?;
        }

        // leptess decodes encoded image data
        let mut png = Cursor::new(Vec::new());
        image
            .write_to(&mut png, ImageFormat::Png)
            .map_err(|e| OcrError::InvalidImage(e.to_string()))?;
        lt.set_image_from_mem(png.get_ref())
            .map_err(|e| OcrError::InvalidImage(e.to_string()))?;

        lt.get_utf8_text()
            .map_err(|e| OcrError::Recognition(e.to_string()))
    }

    fn detect_orientation(&self, image: &GrayImage) -> Result<u32, OcrError> {
        self.osd.detect_orientation(image)
    }
}
