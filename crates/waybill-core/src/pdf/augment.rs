//! Full-document OCR through the `ocrmypdf` command-line tool.

use std::io::{ErrorKind, Write};
use std::process::Command;

use tracing::debug;

use super::{DocumentOcrAugmenter, Result};
use crate::error::PdfError;

/// Adds a searchable text layer to a PDF, rotating and deskewing pages.
#[derive(Debug, Clone)]
pub struct OcrMyPdf {
    binary: String,
    language: String,
}

impl OcrMyPdf {
    pub fn new() -> Self {
        Self {
            binary: "ocrmypdf".to_string(),
            language: "eng".to_string(),
        }
    }

    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    fn args(&self) -> Vec<&str> {
        vec![
            "-l",
            &self.language,
            "--rotate-pages",
            "--deskew",
            "--skip-text",
            "--optimize",
            "1",
        ]
    }
}

impl Default for OcrMyPdf {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentOcrAugmenter for OcrMyPdf {
    fn augment(&self, data: &[u8]) -> Result<Vec<u8>> {
        // Both files are removed when dropped, on every return path
        let mut input = tempfile::Builder::new().suffix(".pdf").tempfile()?;
        input.write_all(data)?;
        input.flush()?;
        let output = tempfile::Builder::new().suffix(".pdf").tempfile()?;

        let result = Command::new(&self.binary)
            .args(self.args())
            .arg(input.path())
            .arg(output.path())
            .output()
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound => PdfError::Augmentation(format!("{} not found", self.binary)),
                _ => PdfError::Augmentation(format!("{} failed to start: {}", self.binary, e)),
            })?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            return Err(PdfError::Augmentation(format!(
                "{} exited with {}: {}",
                self.binary,
                result.status,
                stderr.lines().last().unwrap_or_default().trim()
            )));
        }

        let augmented = std::fs::read(output.path())?;
        debug!("OCR layer added: {} -> {} bytes", data.len(), augmented.len());
        Ok(augmented)
    }
}
