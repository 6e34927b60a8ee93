//! Error types for the waybill-core library.

use thiserror::Error;

/// Main error type for the waybill library.
#[derive(Error, Debug)]
pub enum WaybillError {
    /// PDF processing error.
    #[error("PDF error: {0}")]
    Pdf(#[from] PdfError),

    /// OCR processing error.
    #[error("OCR error: {0}")]
    Ocr(#[from] OcrError),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Malformed request payload.
    #[error("invalid request: {0}")]
    Request(String),
}

/// Errors related to PDF processing.
#[derive(Error, Debug)]
pub enum PdfError {
    /// Failed to open/parse the PDF file.
    #[error("failed to parse PDF: {0}")]
    Parse(String),

    /// Failed to extract text from PDF.
    #[error("failed to extract text: {0}")]
    TextExtraction(String),

    /// Failed to extract table rows from PDF.
    #[error("failed to extract tables: {0}")]
    TableExtraction(String),

    /// Failed to extract images from PDF.
    #[error("failed to extract images: {0}")]
    ImageExtraction(String),

    /// The OCR augmentation tool failed or is missing.
    #[error("OCR augmentation failed: {0}")]
    Augmentation(String),

    /// The PDF is encrypted and cannot be processed.
    #[error("PDF is encrypted")]
    Encrypted,

    /// The PDF is empty or has no pages.
    #[error("PDF has no pages")]
    NoPages,

    /// Invalid page number requested.
    #[error("invalid page number: {0}")]
    InvalidPage(u32),

    /// Temporary file handling failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors related to OCR processing.
#[derive(Error, Debug)]
pub enum OcrError {
    /// The OCR engine could not be started.
    #[error("OCR engine unavailable: {0}")]
    Unavailable(String),

    /// Text recognition failed.
    #[error("text recognition failed: {0}")]
    Recognition(String),

    /// Orientation/script detection failed.
    #[error("orientation detection failed: {0}")]
    Orientation(String),

    /// Image decoding or encoding failed.
    #[error("invalid image: {0}")]
    InvalidImage(String),

    /// Temporary file handling failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Deployment misconfiguration, raised while building parsers or pipelines.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A pattern does not compile.
    #[error("invalid pattern for {name}: {source}")]
    Pattern {
        name: String,
        #[source]
        source: regex::Error,
    },

    /// A header-field pattern must contain exactly one capture group.
    #[error("header pattern for '{field}' must contain exactly one capture group: {pattern}")]
    CaptureGroups { field: String, pattern: String },

    /// The totals pattern lacks the named `amount` group.
    #[error("totals pattern must define a named 'amount' group: {0}")]
    TotalsPattern(String),

    /// A numeric setting is out of range.
    #[error("invalid value for {key}: {reason}")]
    Value { key: String, reason: String },

    /// Configuration file could not be read or written.
    #[error("configuration file error: {0}")]
    File(String),
}

/// Result type for the waybill library.
pub type Result<T> = std::result::Result<T, WaybillError>;
