//! Data models for extraction results and configuration.

pub mod config;
pub mod document;

pub use config::{
    ExtractionConfig, KnownSupplier, OcrConfig, PdfConfig, TransferLayoutConfig, WaybillConfig,
};
pub use document::{
    DocumentKind, HeaderField, LineItem, ParseRequest, ParseResult, ParserKind, TextSource,
    TransferHeader,
};
