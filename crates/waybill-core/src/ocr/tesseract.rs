//! OCR engine backed by the `tesseract` command-line tool.

use std::io::ErrorKind;
use std::process::{Command, Output};

use image::{GrayImage, ImageFormat};
use lazy_static::lazy_static;
use regex::Regex;
use tracing::{debug, trace};

use super::{OcrEngine, SegmentationMode};
use crate::error::OcrError;
use crate::models::config::OcrConfig;

lazy_static! {
    static ref OSD_ROTATE: Regex = Regex::new(r"Rotate:\s*(\d+)").unwrap();
}

/// Runs `tesseract <image> stdout` once per recognition attempt.
#[derive(Debug, Clone)]
pub struct TesseractCli {
    binary: String,
    language: String,
    whitelist: Option<String>,
}

impl TesseractCli {
    pub fn new() -> Self {
        Self {
            binary: "tesseract".to_string(),
            language: "eng".to_string(),
            whitelist: None,
        }
    }

    pub fn from_config(config: &OcrConfig) -> Self {
        Self::new()
            .with_binary(&config.tesseract_binary)
            .with_language(&config.language)
            .with_whitelist(&config.char_whitelist)
    }

    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    /// Restrict recognition to these characters. Empty disables the whitelist.
    pub fn with_whitelist(mut self, chars: impl Into<String>) -> Self {
        let chars = chars.into();
        self.whitelist = (!chars.is_empty()).then_some(chars);
        self
    }

    /// Whether the binary can be started.
    pub fn is_available(&self) -> bool {
        Command::new(&self.binary)
            .arg("--version")
            .output()
            .map(|out| out.status.success())
            .unwrap_or(false)
    }

    fn recognition_args(&self, mode: SegmentationMode) -> Vec<String> {
        let mut args = vec![
            "stdout".to_string(),
            "--oem".to_string(),
            "3".to_string(),
            "-l".to_string(),
            self.language.clone(),
            "--psm".to_string(),
            mode.to_string(),
        ];
        if let Some(chars) = &self.whitelist {
            args.push("-c".to_string());
            args.push(format!("tessedit_char_whitelist={}", chars));
        }
        args
    }

    /// Write the image to a scoped temporary PNG and run the binary on it.
    fn run(&self, image: &GrayImage, args: &[String]) -> Result<Output, OcrError> {
        let file = tempfile::Builder::new().suffix(".png").tempfile()?;
        image
            .save_with_format(file.path(), ImageFormat::Png)
            .map_err(|e| OcrError::InvalidImage(e.to_string()))?;

        trace!("{} {:?} {:?}", self.binary, file.path(), args);
        Command::new(&self.binary)
            .arg(file.path())
            .args(args)
            .output()
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound => {
                    OcrError::Unavailable(format!("{} not found", self.binary))
                }
                _ => OcrError::Unavailable(format!("{} failed to start: {}", self.binary, e)),
            })
    }
}

impl Default for TesseractCli {
    fn default() -> Self {
        Self::new()
    }
}

impl OcrEngine for TesseractCli {
    fn name(&self) -> &str {
        "tesseract"
    }

    fn recognize(&self, image: &GrayImage, mode: SegmentationMode) -> Result<String, OcrError> {
        let output = self.run(image, &self.recognition_args(mode))?;
        if !output.status.success() {
            return Err(OcrError::Recognition(single_line(&output.stderr)));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn detect_orientation(&self, image: &GrayImage) -> Result<u32, OcrError> {
        let args = ["stdout", "--psm", "0"].map(str::to_string);
        let output = self.run(image, &args)?;
        if !output.status.success() {
            return Err(OcrError::Orientation(single_line(&output.stderr)));
        }

        let report = String::from_utf8_lossy(&output.stdout);
        let rotation = parse_osd_rotation(&report)
            .ok_or_else(|| OcrError::Orientation("no rotation in OSD report".to_string()))?;
        debug!("OSD rotation {}", rotation);
        Ok(rotation)
    }
}

/// Extract the clockwise correction from a Tesseract OSD report.
pub(crate) fn parse_osd_rotation(report: &str) -> Option<u32> {
    OSD_ROTATE
        .captures(report)
        .and_then(|caps| caps[1].parse::<u32>().ok())
        .map(|deg| deg % 360)
}

fn single_line(stderr: &[u8]) -> String {
    String::from_utf8_lossy(stderr)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}
