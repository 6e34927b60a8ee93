//! Structured extraction results and the request envelope.

use std::fmt;
use std::str::FromStr;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::WaybillError;

/// Amount difference tolerated before reconciliation reports a mismatch.
pub const RECONCILE_TOLERANCE: Decimal = Decimal::from_parts(50, 0, 0, false, 2);

/// Result of parsing one document.
///
/// Optional fields stay `None` when the value was not found; they are never
/// filled with zero or empty placeholders.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParseResult {
    /// Transfer header fields.
    #[serde(default, skip_serializing_if = "TransferHeader::is_empty")]
    pub header: TransferHeader,

    /// Line items in document reading order.
    #[serde(default)]
    pub lines: Vec<LineItem>,

    /// Supplier (vendor) name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub supplier_name: Option<String>,

    /// Invoice number.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invoice_number: Option<String>,

    /// Document date.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<NaiveDate>,

    /// Document total.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<Decimal>,

    /// Quantity printed on the totals row.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reported_quantity: Option<u64>,

    /// Text the parser chain consumed.
    #[serde(default)]
    pub raw_text: String,

    /// Grammar that produced the result.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parser: Option<ParserKind>,

    /// Acquisition strategy that supplied the text.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text_source: Option<TextSource>,

    /// Advisory reconciliation notes; never block the result.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl ParseResult {
    /// An all-empty result carrying only the acquired text.
    pub fn empty(raw_text: impl Into<String>) -> Self {
        Self {
            raw_text: raw_text.into(),
            ..Default::default()
        }
    }

    /// Sum of parsed quantities, or `None` when the sum overflows.
    pub fn computed_quantity(&self) -> Option<Decimal> {
        checked_sum(self.lines.iter().map(|l| l.qty))
    }

    /// Sum of parsed line totals, or `None` when the sum overflows.
    pub fn computed_total(&self) -> Option<Decimal> {
        checked_sum(self.lines.iter().map(|l| l.line_total))
    }

    /// Compare reported totals against the parsed lines.
    ///
    /// Returns one message per mismatch. Nothing is checked when there are no
    /// lines, and a sum that overflows is not compared.
    pub fn reconcile(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if self.lines.is_empty() {
            return warnings;
        }

        if let (Some(reported), Some(computed)) = (self.reported_quantity, self.computed_quantity())
        {
            let reported = Decimal::from(reported);
            if let Some(diff) = reported.checked_sub(computed).filter(|d| !d.is_zero()) {
                warnings.push(format!(
                    "reported quantity {} differs from computed quantity {} (diff {})",
                    reported, computed, diff
                ));
            }
        }

        if let (Some(total), Some(computed)) = (self.total, self.computed_total()) {
            let Some(diff) = total.checked_sub(computed) else {
                return warnings;
            };
            if diff.abs() > RECONCILE_TOLERANCE {
                warnings.push(format!(
                    "reported total {} differs from computed total {} (diff {})",
                    total,
                    computed,
                    diff.round_dp(2)
                ));
            }
        }

        warnings
    }
}

/// Sum that yields `None` instead of panicking on overflow.
pub fn checked_sum(values: impl IntoIterator<Item = Decimal>) -> Option<Decimal> {
    values
        .into_iter()
        .try_fold(Decimal::ZERO, |acc, v| acc.checked_add(v))
}

/// Header block of a warehouse transfer document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferHeader {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_transfer: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub serie_cash_num: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_warehouse: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination_location: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_hour_transport: Option<String>,
}

impl TransferHeader {
    /// Check whether no field has been found.
    pub fn is_empty(&self) -> bool {
        HeaderField::ALL.iter().all(|f| self.get(*f).is_none())
    }

    /// Read a field.
    pub fn get(&self, field: HeaderField) -> Option<&str> {
        self.slot(field).as_deref()
    }

    /// Set a field unless it already holds a value. Returns whether it was set.
    pub fn fill(&mut self, field: HeaderField, value: impl Into<String>) -> bool {
        let slot = self.slot_mut(field);
        if slot.is_some() {
            return false;
        }
        *slot = Some(value.into());
        true
    }

    fn slot(&self, field: HeaderField) -> &Option<String> {
        match field {
            HeaderField::DateTransfer => &self.date_transfer,
            HeaderField::SerieCashNum => &self.serie_cash_num,
            HeaderField::SourceWarehouse => &self.source_warehouse,
            HeaderField::DestinationLocation => &self.destination_location,
            HeaderField::DateHourTransport => &self.date_hour_transport,
        }
    }

    fn slot_mut(&mut self, field: HeaderField) -> &mut Option<String> {
        match field {
            HeaderField::DateTransfer => &mut self.date_transfer,
            HeaderField::SerieCashNum => &mut self.serie_cash_num,
            HeaderField::SourceWarehouse => &mut self.source_warehouse,
            HeaderField::DestinationLocation => &mut self.destination_location,
            HeaderField::DateHourTransport => &mut self.date_hour_transport,
        }
    }
}

/// Names of the transfer header fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeaderField {
    DateTransfer,
    SerieCashNum,
    SourceWarehouse,
    DestinationLocation,
    DateHourTransport,
}

impl HeaderField {
    pub const ALL: [HeaderField; 5] = [
        HeaderField::DateTransfer,
        HeaderField::SerieCashNum,
        HeaderField::SourceWarehouse,
        HeaderField::DestinationLocation,
        HeaderField::DateHourTransport,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            HeaderField::DateTransfer => "date_transfer",
            HeaderField::SerieCashNum => "serie_cash_num",
            HeaderField::SourceWarehouse => "source_warehouse",
            HeaderField::DestinationLocation => "destination_location",
            HeaderField::DateHourTransport => "date_hour_transport",
        }
    }
}

impl fmt::Display for HeaderField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single line item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItem {
    /// Free-text description.
    pub description: String,

    /// Barcode digit run.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub barcode: Option<String>,

    /// Quantity.
    pub qty: Decimal,

    /// Unit price.
    pub unit_price: Decimal,

    /// Line total.
    pub line_total: Decimal,

    /// Discount percentage.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub discount_pct: Option<Decimal>,

    /// Unit price after discount.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub discounted_unit_price: Option<Decimal>,

    /// 1-based page the line was read from, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
}

impl LineItem {
    pub fn new(
        description: impl Into<String>,
        qty: Decimal,
        unit_price: Decimal,
        line_total: Decimal,
    ) -> Self {
        Self {
            description: description.into(),
            barcode: None,
            qty,
            unit_price,
            line_total,
            discount_pct: None,
            discounted_unit_price: None,
            page: None,
        }
    }

    pub fn with_barcode(mut self, barcode: Option<String>) -> Self {
        self.barcode = barcode;
        self
    }

    pub fn with_discount(mut self, pct: Decimal, discounted_unit_price: Option<Decimal>) -> Self {
        self.discount_pct = Some(pct);
        self.discounted_unit_price = discounted_unit_price;
        self
    }

    pub fn with_page(mut self, page: u32) -> Self {
        self.page = Some(page);
        self
    }
}

/// Parser variant that produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParserKind {
    /// Built-in warehouse transfer layout over acquired text.
    WarehouseTransferText,
    /// Configuration-driven transfer layout over per-page text.
    GenericTransfer,
    /// Generic invoice heuristics.
    InvoiceHeuristics,
}

impl ParserKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParserKind::WarehouseTransferText => "warehouse_transfer_text",
            ParserKind::GenericTransfer => "generic_transfer",
            ParserKind::InvoiceHeuristics => "invoice_heuristics",
        }
    }
}

impl fmt::Display for ParserKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Acquisition strategy that supplied the parsed text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextSource {
    /// Configured table parser run directly on the PDF.
    PdfDirect,
    /// Embedded text layer, optionally merged with table rows.
    PdfText,
    /// Text layer added by a full-document OCR pass.
    OcrMyPdf,
    /// Rasterized pages recognized at the given DPI.
    OcrRaster(u32),
    /// Single OCR pass on an image upload.
    OcrImage,
    /// Last-resort OCR on the raw bytes.
    OcrImageFallback,
}

impl TextSource {
    /// Whether the text came from optical recognition rather than a text layer.
    pub fn is_ocr(&self) -> bool {
        !matches!(self, TextSource::PdfDirect | TextSource::PdfText)
    }
}

impl fmt::Display for TextSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TextSource::PdfDirect => f.write_str("pdf_direct"),
            TextSource::PdfText => f.write_str("pdf_text"),
            TextSource::OcrMyPdf => f.write_str("ocrmypdf"),
            TextSource::OcrRaster(dpi) => write!(f, "ocr_raster_{}", dpi),
            TextSource::OcrImage => f.write_str("ocr_image"),
            TextSource::OcrImageFallback => f.write_str("ocr_image_fallback"),
        }
    }
}

impl FromStr for TextSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pdf_direct" => Ok(TextSource::PdfDirect),
            "pdf_text" => Ok(TextSource::PdfText),
            "ocrmypdf" => Ok(TextSource::OcrMyPdf),
            "ocr_image" => Ok(TextSource::OcrImage),
            "ocr_image_fallback" => Ok(TextSource::OcrImageFallback),
            other => other
                .strip_prefix("ocr_raster_")
                .and_then(|dpi| dpi.parse().ok())
                .map(TextSource::OcrRaster)
                .ok_or_else(|| format!("unknown text source: {}", other)),
        }
    }
}

impl Serialize for TextSource {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TextSource {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Broad document class derived from a declared content type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Pdf,
    Image,
    Unknown,
}

impl DocumentKind {
    /// Classify a MIME type (`application/pdf`, `image/png`, ...). Matching is case-insensitive.
    pub fn from_content_type(content_type: Option<&str>) -> Self {
        let ct = content_type.unwrap_or_default().trim().to_lowercase();
        if ct.contains("pdf") {
            DocumentKind::Pdf
        } else if ct.starts_with("image/") {
            DocumentKind::Image
        } else {
            DocumentKind::Unknown
        }
    }

    /// Guess a content type from a file extension.
    pub fn content_type_for_extension(ext: &str) -> Option<&'static str> {
        match ext.to_lowercase().as_str() {
            "pdf" => Some("application/pdf"),
            "png" => Some("image/png"),
            "jpg" | "jpeg" => Some("image/jpeg"),
            "tif" | "tiff" => Some("image/tiff"),
            "bmp" => Some("image/bmp"),
            "gif" => Some("image/gif"),
            "webp" => Some("image/webp"),
            _ => None,
        }
    }
}

/// Parse request as exchanged with a transport layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParseRequest {
    /// Declared MIME type.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,

    /// Base64-encoded document bytes.
    pub data: String,
}

impl ParseRequest {
    pub fn new(content_type: Option<String>, bytes: &[u8]) -> Self {
        Self {
            content_type,
            data: STANDARD.encode(bytes),
        }
    }

    /// Decode the payload. Embedded whitespace is ignored.
    pub fn decode(&self) -> Result<Vec<u8>, WaybillError> {
        let compact: String = self.data.chars().filter(|c| !c.is_whitespace()).collect();
        STANDARD
            .decode(compact.as_bytes())
            .map_err(|e| WaybillError::Request(format!("invalid base64 payload: {}", e)))
    }
}
