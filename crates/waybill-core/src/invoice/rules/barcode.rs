//! Barcode detection within a configured digit-length window.

use crate::models::config::{ExtractionConfig, MIN_BARCODE_LENGTH};

/// Allowed barcode lengths, inclusive on both ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BarcodeWindow {
    min: usize,
    max: usize,
}

impl BarcodeWindow {
    /// Create a window, clamping `min` to at least 4 and `max` to at least `min`.
    pub fn new(min: usize, max: usize) -> Self {
        let min = min.max(MIN_BARCODE_LENGTH);
        Self {
            min,
            max: max.max(min),
        }
    }

    pub fn from_config(config: &ExtractionConfig) -> Self {
        let (min, max) = config.barcode_bounds();
        Self::new(min, max)
    }

    pub fn min(&self) -> usize {
        self.min
    }

    pub fn max(&self) -> usize {
        self.max
    }

    /// Whether `token` is an all-digit run of allowed length.
    pub fn matches(&self, token: &str) -> bool {
        let len = token.len();
        len >= self.min && len <= self.max && token.bytes().all(|b| b.is_ascii_digit())
    }

    /// Anchored regex equivalent of [`matches`](Self::matches).
    pub fn pattern(&self) -> String {
        format!(r"^\d{{{},{}}}$", self.min, self.max)
    }

    /// Find the first isolated barcode in free text.
    ///
    /// Returns the description with the barcode token removed and whitespace
    /// collapsed, plus the barcode. Without a match the text is returned as-is.
    pub fn extract_barcode(&self, text: &str) -> (String, Option<String>) {
        let tokens: Vec<&str> = text.split_whitespace().collect();
        match tokens.iter().position(|t| self.matches(t)) {
            Some(idx) => {
                let code = tokens[idx].to_string();
                let cleaned = tokens
                    .iter()
                    .enumerate()
                    .filter(|(i, _)| *i != idx)
                    .map(|(_, t)| *t)
                    .collect::<Vec<_>>()
                    .join(" ");
                (cleaned, Some(code))
            }
            None => (text.to_string(), None),
        }
    }
}

impl Default for BarcodeWindow {
    fn default() -> Self {
        Self::new(8, 14)
    }
}
