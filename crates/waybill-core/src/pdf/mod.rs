//! PDF processing module.

mod augment;
mod extractor;
pub mod tables;

pub use augment::OcrMyPdf;
pub use extractor::{LopdfBackend, PdfExtractor};
pub use tables::{TableFlavor, TableRow};

use crate::error::PdfError;
use image::DynamicImage;
use tracing::{debug, warn};

/// Result type for PDF operations.
pub type Result<T> = std::result::Result<T, PdfError>;

/// Trait for PDF processing implementations.
pub trait PdfProcessor {
    /// Get the number of pages in the PDF.
    fn page_count(&self) -> u32;

    /// Plain text of each page, in page order.
    fn extract_page_texts(&self) -> Result<Vec<String>>;

    /// Table rows of the whole document for one extraction flavor.
    fn extract_tables(&self, flavor: TableFlavor) -> Result<Vec<TableRow>>;

    /// Render a page (1-based) as an image at the specified DPI.
    fn render_page(&self, page: u32, dpi: u32) -> Result<DynamicImage>;

    /// Extract embedded images from a page.
    fn extract_images(&self, page: u32) -> Result<Vec<DynamicImage>>;

    /// Page texts plus table rows: bordered tables first, borderless tables
    /// only when no bordered table is found. Table failures leave the rows empty.
    fn text_layer(&self, include_tables: bool) -> Result<TextLayer> {
        let pages = self.extract_page_texts()?;
        if !include_tables {
            return Ok(TextLayer::new(pages, Vec::new()));
        }

        let rows = match self.extract_tables(TableFlavor::Lattice) {
            Ok(rows) if !rows.is_empty() => Ok(rows),
            Ok(_) => self.extract_tables(TableFlavor::Stream),
            Err(e) => Err(e),
        };
        let rows = rows.unwrap_or_else(|e| {
            warn!("Table extraction failed: {}", e);
            Vec::new()
        });
        debug!("Text layer: {} pages, {} table rows", pages.len(), rows.len());

        let lines = rows.iter().map(|row| tables::row_to_line(row)).collect();
        Ok(TextLayer::new(pages, lines))
    }
}

/// Opens documents for processing.
pub trait PdfBackend: Send + Sync {
    fn open(&self, data: &[u8]) -> Result<Box<dyn PdfProcessor>>;
}

/// Produces a copy of a document with an embedded, searchable text layer.
pub trait DocumentOcrAugmenter: Send + Sync {
    fn augment(&self, data: &[u8]) -> Result<Vec<u8>>;
}

/// Extracted page text and table rows of a document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TextLayer {
    /// Text per page.
    pub pages: Vec<String>,
    /// Table rows rendered as whitespace-delimited lines.
    pub table_lines: Vec<String>,
}

impl TextLayer {
    pub fn new(pages: Vec<String>, table_lines: Vec<String>) -> Self {
        Self { pages, table_lines }
    }

    /// Non-empty pages followed by table lines, newline-separated.
    pub fn merged(&self) -> String {
        self.pages
            .iter()
            .filter(|p| !p.trim().is_empty())
            .chain(self.table_lines.iter())
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join("\n")
    }
}
