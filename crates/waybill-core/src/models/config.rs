//! Configuration structures for the extraction pipeline.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::ConfigError;
use crate::models::document::HeaderField;
use crate::ocr::SegmentationMode;

/// Smallest barcode length accepted after clamping.
pub const MIN_BARCODE_LENGTH: usize = 4;

/// Main configuration for the waybill pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WaybillConfig {
    /// OCR configuration.
    pub ocr: OcrConfig,

    /// PDF processing configuration.
    pub pdf: PdfConfig,

    /// Line-item and header extraction configuration.
    pub extraction: ExtractionConfig,
}

/// OCR engine and preprocessing configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrConfig {
    /// Page segmentation modes tried in order until one yields enough text.
    pub segmentation_modes: Vec<SegmentationMode>,

    /// Suppress table ruling lines before recognition.
    pub remove_lines: bool,

    /// Tesseract language code(s).
    pub language: String,

    /// Characters the engine is allowed to emit.
    pub char_whitelist: String,

    /// Minimum stripped output length for an attempt to be accepted.
    pub min_text_chars: usize,

    /// Images whose longer side is below this are upscaled 2x.
    pub upscale_below: u32,

    /// Residual skew (degrees) above which the page is rotated.
    pub deskew_min_angle: f32,

    /// Path or name of the tesseract executable.
    pub tesseract_binary: String,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            segmentation_modes: SegmentationMode::default_ladder(),
            remove_lines: false,
            language: "eng".to_string(),
            char_whitelist:
                "0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz.,:%-()[] "
                    .to_string(),
            min_text_chars: 10,
            upscale_below: 1500,
            deskew_min_angle: 0.5,
            tesseract_binary: "tesseract".to_string(),
        }
    }
}

/// PDF processing configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PdfConfig {
    /// DPI for the first rasterized OCR pass.
    pub raster_dpi: u32,

    /// DPI for the retry when the first pass is below threshold.
    pub escalated_dpi: u32,

    /// Minimum stripped text length for a strategy to count as usable.
    pub min_text_length: usize,

    /// Merge table rows (bordered, then borderless) into the text layer.
    pub extract_tables: bool,

    /// Allow the OCR-augmented re-extraction strategy.
    pub augment_with_ocr: bool,

    /// Path or name of the ocrmypdf executable.
    pub ocrmypdf_binary: String,
}

impl Default for PdfConfig {
    fn default() -> Self {
        Self {
            raster_dpi: 300,
            escalated_dpi: 400,
            min_text_length: 30,
            extract_tables: true,
            augment_with_ocr: true,
            ocrmypdf_binary: "ocrmypdf".to_string(),
        }
    }
}

/// Line-item and header extraction configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Shortest digit run reported as a barcode.
    pub barcode_min_length: usize,

    /// Longest digit run reported as a barcode.
    pub barcode_max_length: usize,

    /// Layout for the configuration-driven transfer parser (absent disables it).
    pub transfer_layout: Option<TransferLayoutConfig>,

    /// Vendor names recognised in the document header when no supplier label exists.
    pub known_suppliers: Vec<KnownSupplier>,

    /// Number of non-empty leading lines treated as the header region.
    pub header_region_lines: usize,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            barcode_min_length: 8,
            barcode_max_length: 14,
            transfer_layout: Some(TransferLayoutConfig::default()),
            known_suppliers: Vec::new(),
            header_region_lines: 30,
        }
    }
}

impl ExtractionConfig {
    /// Barcode bounds after clamping (min >= 4, max >= min).
    pub fn barcode_bounds(&self) -> (usize, usize) {
        let min = self.barcode_min_length.max(MIN_BARCODE_LENGTH);
        let max = self.barcode_max_length.max(min);
        (min, max)
    }
}

/// A vendor and the identifiers that reveal it in a document header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnownSupplier {
    /// Name reported as the supplier.
    pub name: String,

    /// Case-insensitive substrings that identify the vendor.
    pub aliases: Vec<String>,
}

/// Regex-driven layout of a warehouse transfer document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferLayoutConfig {
    /// Header field patterns; each must have exactly one capture group.
    pub header_patterns: BTreeMap<HeaderField, Vec<String>>,

    /// Full-line patterns for banners, footers and repeated column headers.
    pub noise_patterns: Vec<String>,

    /// Totals row with named `qty` and `amount` groups.
    pub total_pattern: String,

    /// Barcode column pattern; derived from the barcode bounds when absent.
    pub barcode_pattern: Option<String>,

    /// Quantity column pattern.
    pub qty_pattern: String,

    /// Price and amount column pattern.
    pub money_pattern: String,
}

impl Default for TransferLayoutConfig {
    fn default() -> Self {
        let mut header_patterns = BTreeMap::new();
        header_patterns.insert(
            HeaderField::DateTransfer,
            vec![r"Date\s*Transfer\s*:\s*([0-9]{1,2}/[0-9]{1,2}/[0-9]{2,4})".to_string()],
        );
        header_patterns.insert(
            HeaderField::SerieCashNum,
            vec![r"Serie\s*/\s*Cash\s*/\s*Num\s*:\s*(.+)".to_string()],
        );
        header_patterns.insert(
            HeaderField::SourceWarehouse,
            vec![r"Source\s*Warehouse\s*:\s*(.+)".to_string()],
        );
        header_patterns.insert(
            HeaderField::DestinationLocation,
            vec![r"(?:Destination\s*(?:location|Location))\s*:\s*(.+)".to_string()],
        );
        header_patterns.insert(
            HeaderField::DateHourTransport,
            vec![r"Date\s*/\s*Hour\s*Transport\s*:\s*(.+)".to_string()],
        );

        Self {
            header_patterns,
            noise_patterns: default_noise_patterns(),
            total_pattern: DEFAULT_TOTAL_PATTERN.to_string(),
            barcode_pattern: None,
            qty_pattern: r"^\d+$".to_string(),
            money_pattern: DEFAULT_MONEY_PATTERN.to_string(),
        }
    }
}

/// Totals row shared by the built-in and default configured layouts.
pub const DEFAULT_TOTAL_PATTERN: &str =
    r"TOTAL\s*:\s*(?P<qty>\d+)\s+(?P<amount>\d{1,3}(?:,\d{3})*(?:\.\d{2})?)";

/// Money column shared by the built-in and default configured layouts.
pub const DEFAULT_MONEY_PATTERN: &str = r"^-?\d{1,3}(?:,\d{3})*(?:\.\d{2})?$";

/// Banner, footer and header lines of the warehouse transfer layout.
///
/// Patterns are unanchored unless they say otherwise, so a page marker drops
/// any line that contains one.
pub fn default_noise_patterns() -> Vec<String> {
    [
        r"^\s*WAREHOUSE\s*:\s*Transfer between warehouses\s*$",
        r"^\s*BEAUTY\s*&\s*FRAGRANCE\s*$",
        r"^\s*\d{1,2}/\d{1,2}/\d{4}\s*Page\d+\s*$",
        r"\bPage\s*\d+\b",
        r"^\s*Description\s+Bar\s*Code\s+Qty\.?\s+Price\s+Amount\s*$",
        // Repeated column headers with varying wording
        r"^\s*Description\s(?:.*\s)?Price\s",
        r"^\s*Source\s*Warehouse\s*:\s*$",
        r"^\s*Destination\s*location\s*:\s*$",
    ]
    .iter()
    .map(|p| p.to_string())
    .collect()
}

impl WaybillConfig {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| file_error(path, e))?;
        serde_json::from_str(&content).map_err(|e| file_error(path, e))
    }

    /// Save configuration to a JSON file.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = serde_json::to_string_pretty(self).map_err(|e| file_error(path, e))?;
        std::fs::write(path, content).map_err(|e| file_error(path, e))
    }

    /// Overlay the legacy variables of the current process environment.
    pub fn with_process_env(self) -> Self {
        self.with_env_overrides(|key| std::env::var(key).ok())
    }

    /// Overlay legacy variables read through `lookup`. Malformed values keep the current setting.
    pub fn with_env_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup("OCR_PSMS") {
            let modes = SegmentationMode::parse_list(&raw);
            if modes.is_empty() {
                warn!("Ignoring OCR_PSMS={:?}: no valid modes", raw);
            } else {
                self.ocr.segmentation_modes = modes;
            }
        }

        if let Some(raw) = lookup("OCR_REMOVE_LINES") {
            self.ocr.remove_lines = matches!(raw.trim(), "1" | "true" | "TRUE" | "yes" | "on");
        }

        if let Some(raw) = lookup("OCR_RASTER_DPI") {
            match raw.trim().parse::<u32>() {
                Ok(dpi) if dpi > 0 => self.pdf.raster_dpi = dpi,
                _ => warn!("Ignoring OCR_RASTER_DPI={:?}", raw),
            }
        }

        if let Some(raw) = lookup("BARCODE_MIN_LENGTH") {
            match raw.trim().parse::<usize>() {
                Ok(n) => self.extraction.barcode_min_length = n,
                Err(_) => warn!("Ignoring BARCODE_MIN_LENGTH={:?}", raw),
            }
        }

        if let Some(raw) = lookup("BARCODE_MAX_LENGTH") {
            match raw.trim().parse::<usize>() {
                Ok(n) => self.extraction.barcode_max_length = n,
                Err(_) => warn!("Ignoring BARCODE_MAX_LENGTH={:?}", raw),
            }
        }

        self
    }

    /// Reject settings that would make the pipeline misbehave on every document.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ocr.segmentation_modes.is_empty() {
            return Err(ConfigError::Value {
                key: "ocr.segmentation_modes".to_string(),
                reason: "at least one mode is required".to_string(),
            });
        }
        if self.pdf.raster_dpi == 0 || self.pdf.escalated_dpi == 0 {
            return Err(ConfigError::Value {
                key: "pdf.raster_dpi".to_string(),
                reason: "resolution must be positive".to_string(),
            });
        }
        if self.ocr.upscale_below == 0 {
            return Err(ConfigError::Value {
                key: "ocr.upscale_below".to_string(),
                reason: "must be positive".to_string(),
            });
        }
        Ok(())
    }
}

fn file_error(path: &Path, error: impl std::fmt::Display) -> ConfigError {
    ConfigError::File(format!("{}: {}", path.display(), error))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = WaybillConfig::default();
        assert_eq!(config.pdf.raster_dpi, 300);
        assert_eq!(config.pdf.escalated_dpi, 400);
        assert_eq!(config.pdf.min_text_length, 30);
        assert!(!config.ocr.remove_lines);
        assert_eq!(config.ocr.segmentation_modes.len(), 5);
        assert_eq!(config.extraction.barcode_bounds(), (8, 14));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_barcode_bounds_are_clamped() {
        let mut extraction = ExtractionConfig::default();
        extraction.barcode_min_length = 2;
        extraction.barcode_max_length = 3;
        assert_eq!(extraction.barcode_bounds(), (4, 4));

        extraction.barcode_min_length = 10;
        extraction.barcode_max_length = 6;
        assert_eq!(extraction.barcode_bounds(), (10, 10));
    }

    #[test]
    fn test_env_overrides() {
        let config = WaybillConfig::default().with_env_overrides(env(&[
            ("OCR_PSMS", "6, 11,x"),
            ("OCR_REMOVE_LINES", "yes"),
            ("OCR_RASTER_DPI", "250"),
            ("BARCODE_MIN_LENGTH", "12"),
            ("BARCODE_MAX_LENGTH", "13"),
        ]));

        assert_eq!(
            config.ocr.segmentation_modes,
            vec![SegmentationMode::SINGLE_BLOCK, SegmentationMode::SPARSE_TEXT]
        );
        assert!(config.ocr.remove_lines);
        assert_eq!(config.pdf.raster_dpi, 250);
        assert_eq!(config.extraction.barcode_bounds(), (12, 13));
    }

    #[test]
    fn test_malformed_env_keeps_defaults() {
        let config = WaybillConfig::default().with_env_overrides(env(&[
            ("OCR_PSMS", ",,"),
            ("OCR_RASTER_DPI", "high"),
            ("BARCODE_MIN_LENGTH", "eight"),
        ]));

        assert_eq!(config.ocr.segmentation_modes, SegmentationMode::default_ladder());
        assert_eq!(config.pdf.raster_dpi, 300);
        assert_eq!(config.extraction.barcode_min_length, 8);
    }

    #[test]
    fn test_file_errors_name_the_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        let missing = WaybillConfig::from_file(&path).unwrap_err();
        assert!(matches!(&missing, ConfigError::File(msg) if msg.contains("config.json")));

        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(WaybillConfig::from_file(&path), Err(ConfigError::File(_))));

        let mut config = WaybillConfig::default();
        config.pdf.raster_dpi = 200;
        config.save(&path).unwrap();
        assert_eq!(WaybillConfig::from_file(&path).unwrap().pdf.raster_dpi, 200);
    }

    #[test]
    fn test_json_roundtrip_keeps_layout() {
        let config = WaybillConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let parsed: WaybillConfig = serde_json::from_str(&json).unwrap();
        let layout = parsed.extraction.transfer_layout.unwrap();
        assert_eq!(layout.header_patterns.len(), 5);
        assert!(layout.header_patterns.contains_key(&HeaderField::SourceWarehouse));
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let parsed: WaybillConfig =
            serde_json::from_str(r#"{"ocr": {"remove_lines": true}}"#).unwrap();
        assert!(parsed.ocr.remove_lines);
        assert_eq!(parsed.ocr.language, "eng");
        assert_eq!(parsed.pdf.raster_dpi, 300);
    }

    #[test]
    fn test_validate_rejects_empty_ladder() {
        let mut config = WaybillConfig::default();
        config.ocr.segmentation_modes.clear();
        assert!(matches!(config.validate(), Err(ConfigError::Value { .. })));
    }
}
