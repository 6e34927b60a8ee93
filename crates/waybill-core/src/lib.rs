//! Core library for waybill and invoice extraction.
//!
//! This crate provides:
//! - PDF processing (text layer, table rows, page images, OCR augmentation)
//! - An image preprocessing ladder and Tesseract-backed OCR engines
//! - Ordered text acquisition with per-strategy diagnostics
//! - Layout-specific and heuristic line-item parsers

pub mod acquisition;
pub mod error;
pub mod invoice;
pub mod models;
pub mod ocr;
pub mod pdf;
pub mod pipeline;

pub use acquisition::{Acquisition, Attempt, Outcome, TextAcquirer};
pub use error::{ConfigError, OcrError, PdfError, Result, WaybillError};
pub use invoice::{LineParser, ParserChain, SourceText};
pub use models::{
    DocumentKind, LineItem, ParseRequest, ParseResult, ParserKind, TextSource, TransferHeader,
    WaybillConfig,
};
pub use ocr::{OcrEngine, PageReader, SegmentationMode};
pub use pdf::{PdfBackend, PdfProcessor};
pub use pipeline::{DocumentPipeline, PipelineReport};
