//! Text acquisition: ordered strategies for obtaining usable text from a document.
//!
//! PDFs go through direct table parsing, the embedded text layer, a
//! full-document OCR pass and finally rasterized OCR at increasing resolution.
//! Images get a single OCR pass. Any strategy that cannot run or fails is
//! recorded and skipped; acquisition itself never fails.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::invoice::{LineParser, SourceText, TransferParser};
use crate::models::config::PdfConfig;
use crate::models::document::{DocumentKind, ParseResult, TextSource};
use crate::ocr::PageReader;
use crate::pdf::{DocumentOcrAugmenter, PdfBackend, PdfProcessor};

/// How a single strategy ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Produced enough text (or line items, for direct parsing).
    Accepted,
    /// Ran but produced too little text.
    Insufficient,
    /// A required capability is not configured.
    Skipped(String),
    /// The collaborator returned an error.
    Failed(String),
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Accepted => f.write_str("accepted"),
            Outcome::Insufficient => f.write_str("insufficient"),
            Outcome::Skipped(why) => write!(f, "skipped ({})", why),
            Outcome::Failed(why) => write!(f, "failed ({})", why),
        }
    }
}

/// One strategy run, for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attempt {
    pub strategy: TextSource,
    pub outcome: Outcome,
    /// Stripped length of the text the strategy produced.
    pub chars: usize,
}

impl Attempt {
    fn new(strategy: TextSource, outcome: Outcome, chars: usize) -> Self {
        Self {
            strategy,
            outcome,
            chars,
        }
    }

    fn failed(strategy: TextSource, error: &impl fmt::Display) -> Self {
        Self::new(strategy, Outcome::Failed(error.to_string()), 0)
    }
}

/// What acquisition produced.
#[derive(Debug, Clone, Default)]
pub struct Acquisition {
    /// The text handed to the parser chain.
    pub text: SourceText,
    /// Strategy that produced `text`, if any produced text at all.
    pub source: Option<TextSource>,
    /// Complete result from direct table parsing, which bypasses the chain.
    pub parsed: Option<ParseResult>,
    pub attempts: Vec<Attempt>,
}

impl Acquisition {
    fn record(&mut self, attempt: Attempt) {
        debug!(
            "Strategy {} {} ({} chars)",
            attempt.strategy, attempt.outcome, attempt.chars
        );
        self.attempts.push(attempt);
    }

    /// Keep text from a strategy that produced any.
    fn offer(&mut self, text: SourceText, source: TextSource) {
        if text.stripped_len() > 0 {
            self.text = text;
            self.source = Some(source);
        }
    }

    fn has_text(&self) -> bool {
        self.text.stripped_len() > 0
    }
}

/// Runs the acquisition strategies against the configured collaborators.
pub struct TextAcquirer {
    pdf: Option<Arc<dyn PdfBackend>>,
    reader: Option<PageReader>,
    augmenter: Option<Arc<dyn DocumentOcrAugmenter>>,
    direct_parser: Option<TransferParser>,
    min_text_length: usize,
    raster_dpi: u32,
    escalated_dpi: u32,
    extract_tables: bool,
}

impl TextAcquirer {
    /// An acquirer with no collaborators; every strategy is skipped until
    /// capabilities are added.
    pub fn new(config: &PdfConfig) -> Self {
        Self {
            pdf: None,
            reader: None,
            augmenter: None,
            direct_parser: None,
            min_text_length: config.min_text_length,
            raster_dpi: config.raster_dpi,
            escalated_dpi: config.escalated_dpi,
            extract_tables: config.extract_tables,
        }
    }

    pub fn with_pdf_backend(mut self, backend: Arc<dyn PdfBackend>) -> Self {
        self.pdf = Some(backend);
        self
    }

    pub fn with_reader(mut self, reader: PageReader) -> Self {
        self.reader = Some(reader);
        self
    }

    pub fn with_augmenter(mut self, augmenter: Arc<dyn DocumentOcrAugmenter>) -> Self {
        self.augmenter = Some(augmenter);
        self
    }

    /// Configured layout parser run against PDF page text before anything else.
    pub fn with_direct_parser(mut self, parser: TransferParser) -> Self {
        self.direct_parser = Some(parser);
        self
    }

    fn is_usable(&self, text: &SourceText) -> bool {
        text.stripped_len() >= self.min_text_length
    }

    pub fn acquire(&self, data: &[u8], kind: DocumentKind) -> Acquisition {
        let mut acq = Acquisition::default();

        match kind {
            DocumentKind::Pdf => self.acquire_pdf(data, &mut acq),
            DocumentKind::Image => self.ocr_bytes(data, TextSource::OcrImage, &mut acq),
            DocumentKind::Unknown => debug!("Unknown content type, skipping to OCR fallback"),
        }

        if acq.parsed.is_none() && !acq.has_text() {
            self.ocr_bytes(data, TextSource::OcrImageFallback, &mut acq);
        }

        info!(
            "Acquired {} chars from {}",
            acq.text.stripped_len(),
            acq.source.map(|s| s.to_string()).unwrap_or_else(|| "nothing".into())
        );
        acq
    }

    fn acquire_pdf(&self, data: &[u8], acq: &mut Acquisition) {
        let doc = match &self.pdf {
            None => {
                acq.record(Attempt::new(
                    TextSource::PdfText,
                    Outcome::Skipped("no PDF backend".into()),
                    0,
                ));
                None
            }
            Some(backend) => match backend.open(data) {
                Ok(doc) => Some(doc),
                Err(e) => {
                    acq.record(Attempt::failed(TextSource::PdfText, &e));
                    None
                }
            },
        };

        if let Some(doc) = &doc {
            if self.parse_direct(doc.as_ref(), acq)
                || self.text_layer(doc.as_ref(), TextSource::PdfText, acq)
            {
                return;
            }
        }

        if self.augmented_text_layer(data, acq) {
            return;
        }

        if let Some(doc) = &doc {
            if self.rasterized(doc.as_ref(), self.raster_dpi, acq) {
                return;
            }
            if self.escalated_dpi != self.raster_dpi {
                self.rasterized(doc.as_ref(), self.escalated_dpi, acq);
            }
        }
    }

    /// Strategy 1: the configured layout parser on page text; wins on any line item.
    fn parse_direct(&self, doc: &dyn PdfProcessor, acq: &mut Acquisition) -> bool {
        let Some(parser) = &self.direct_parser else {
            return false;
        };

        let pages = match doc.extract_page_texts() {
            Ok(pages) => pages,
            Err(e) => {
                acq.record(Attempt::failed(TextSource::PdfDirect, &e));
                return false;
            }
        };

        let source = SourceText::from_pages(pages);
        let chars = source.stripped_len();
        match parser.parse_pages(&source.pages) {
            Some(mut result) if !result.lines.is_empty() => {
                acq.record(Attempt::new(TextSource::PdfDirect, Outcome::Accepted, chars));
                result.parser = Some(parser.kind());
                result.text_source = Some(TextSource::PdfDirect);
                result.raw_text = source.text.clone();
                acq.parsed = Some(result);
                acq.text = source;
                acq.source = Some(TextSource::PdfDirect);
                true
            }
            _ => {
                acq.record(Attempt::new(TextSource::PdfDirect, Outcome::Insufficient, chars));
                false
            }
        }
    }

    /// Strategies 2 and 3: page text merged with table rows.
    fn text_layer(
        &self,
        doc: &dyn PdfProcessor,
        strategy: TextSource,
        acq: &mut Acquisition,
    ) -> bool {
        match doc.text_layer(self.extract_tables) {
            Ok(layer) => {
                let text = SourceText {
                    text: layer.merged(),
                    pages: layer.pages,
                };
                let usable = self.is_usable(&text);
                let outcome = if usable { Outcome::Accepted } else { Outcome::Insufficient };
                acq.record(Attempt::new(strategy, outcome, text.stripped_len()));
                acq.offer(text, strategy);
                usable
            }
            Err(e) => {
                acq.record(Attempt::failed(strategy, &e));
                false
            }
        }
    }

    /// Strategy 3: add a text layer with full-document OCR, then read it.
    fn augmented_text_layer(&self, data: &[u8], acq: &mut Acquisition) -> bool {
        let (Some(augmenter), Some(backend)) = (&self.augmenter, &self.pdf) else {
            acq.record(Attempt::new(
                TextSource::OcrMyPdf,
                Outcome::Skipped("no document OCR augmenter".into()),
                0,
            ));
            return false;
        };

        let augmented = augmenter.augment(data).and_then(|bytes| backend.open(&bytes));
        match augmented {
            Ok(doc) => self.text_layer(doc.as_ref(), TextSource::OcrMyPdf, acq),
            Err(e) => {
                warn!("Document OCR failed: {}", e);
                acq.record(Attempt::failed(TextSource::OcrMyPdf, &e));
                false
            }
        }
    }

    /// Strategy 4: render every page at `dpi` and OCR it.
    fn rasterized(&self, doc: &dyn PdfProcessor, dpi: u32, acq: &mut Acquisition) -> bool {
        let strategy = TextSource::OcrRaster(dpi);
        let Some(reader) = &self.reader else {
            acq.record(Attempt::new(strategy, Outcome::Skipped("no OCR engine".into()), 0));
            return false;
        };

        let mut pages = Vec::new();
        let mut failures = Vec::new();
        for page in 1..=doc.page_count() {
            match doc.render_page(page, dpi) {
                Ok(image) => {
                    let text = reader.read_image(&image);
                    if !text.trim().is_empty() {
                        pages.push(text);
                    }
                }
                Err(e) => {
                    debug!("Page {} not rendered: {}", page, e);
                    failures.push(e.to_string());
                }
            }
        }

        if pages.is_empty() && !failures.is_empty() {
            acq.record(Attempt::new(strategy, Outcome::Failed(failures.join("; ")), 0));
            return false;
        }

        let text = SourceText {
            text: pages.join("\n\n"),
            pages,
        };
        let usable = self.is_usable(&text);
        let outcome = if usable { Outcome::Accepted } else { Outcome::Insufficient };
        acq.record(Attempt::new(strategy, outcome, text.stripped_len()));
        acq.offer(text, strategy);
        usable
    }

    /// Single OCR pass over encoded image bytes.
    fn ocr_bytes(&self, data: &[u8], strategy: TextSource, acq: &mut Acquisition) {
        let Some(reader) = &self.reader else {
            acq.record(Attempt::new(strategy, Outcome::Skipped("no OCR engine".into()), 0));
            return;
        };

        match reader.read_bytes(data) {
            Ok(text) => {
                let text = SourceText::new(text);
                let outcome = if text.stripped_len() > 0 {
                    Outcome::Accepted
                } else {
                    Outcome::Insufficient
                };
                acq.record(Attempt::new(strategy, outcome, text.stripped_len()));
                acq.offer(text, strategy);
            }
            Err(e) => acq.record(Attempt::failed(strategy, &e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{OcrError, PdfError};
    use crate::invoice::rules::BarcodeWindow;
    use crate::models::config::TransferLayoutConfig;
    use crate::ocr::{OcrEngine, SegmentationMode};
    use crate::pdf::{TableFlavor, TableRow};
    use image::{DynamicImage, GrayImage, ImageFormat, Luma};
    use std::io::Cursor;

    const TRANSFER_PAGE: &str = "\
WAREHOUSE : Transfer between warehouses
Description Bar Code Qty Price Amount
WIDGET A 12345678 3 10.00 30.00
TOTAL: 3 30.00";

    #[derive(Clone, Default)]
    struct FakeDoc {
        pages: Vec<String>,
        raster_pages: u32,
    }

    impl PdfProcessor for FakeDoc {
        fn page_count(&self) -> u32 {
            self.pages.len().max(self.raster_pages as usize) as u32
        }

        fn extract_page_texts(&self) -> crate::pdf::Result<Vec<String>> {
            Ok(self.pages.clone())
        }

        fn extract_tables(&self, _: TableFlavor) -> crate::pdf::Result<Vec<TableRow>> {
            Ok(Vec::new())
        }

        fn render_page(&self, page: u32, dpi: u32) -> crate::pdf::Result<DynamicImage> {
            if page > self.raster_pages {
                return Err(PdfError::ImageExtraction("no raster".into()));
            }
            // Image width encodes the DPI so the fake engine can tell passes apart
            Ok(DynamicImage::ImageLuma8(GrayImage::from_pixel(dpi, 10, Luma([255]))))
        }

        fn extract_images(&self, _: u32) -> crate::pdf::Result<Vec<DynamicImage>> {
            Ok(Vec::new())
        }
    }

    /// Backend that opens the original bytes as `original` and anything else
    /// (augmented output) as `augmented`.
    struct FakeBackend {
        original: Option<FakeDoc>,
        augmented: FakeDoc,
    }

    impl PdfBackend for FakeBackend {
        fn open(&self, data: &[u8]) -> crate::pdf::Result<Box<dyn PdfProcessor>> {
            if data == b"augmented" {
                return Ok(Box::new(self.augmented.clone()));
            }
            match &self.original {
                Some(doc) => Ok(Box::new(doc.clone())),
                None => Err(PdfError::Parse("bad header".into())),
            }
        }
    }

    struct FakeAugmenter(bool);

    impl DocumentOcrAugmenter for FakeAugmenter {
        fn augment(&self, _: &[u8]) -> crate::pdf::Result<Vec<u8>> {
            if self.0 {
                Ok(b"augmented".to_vec())
            } else {
                Err(PdfError::Augmentation("ocrmypdf not found".into()))
            }
        }
    }

    /// Recognizes text only on images at least `min_width` pixels wide.
    struct FakeEngine {
        min_width: u32,
        text: &'static str,
    }

    impl OcrEngine for FakeEngine {
        fn name(&self) -> &str {
            "fake"
        }

        fn recognize(&self, image: &GrayImage, _: SegmentationMode) -> Result<String, OcrError> {
            // The preprocessor upscales small pages 2x
            if image.width() / 2 >= self.min_width {
                Ok(self.text.to_string())
            } else {
                Ok(String::new())
            }
        }

        fn detect_orientation(&self, _: &GrayImage) -> Result<u32, OcrError> {
            Ok(0)
        }
    }

    fn config() -> PdfConfig {
        PdfConfig::default()
    }

    fn reader(min_width: u32, text: &'static str) -> PageReader {
        PageReader::new(Arc::new(FakeEngine { min_width, text }))
    }

    fn png_bytes() -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        GrayImage::from_pixel(20, 10, Luma([255]))
            .write_to(&mut buf, ImageFormat::Png)
            .unwrap();
        buf.into_inner()
    }

    fn backend(original: Option<FakeDoc>, augmented: FakeDoc) -> Arc<dyn PdfBackend> {
        Arc::new(FakeBackend {
            original,
            augmented,
        })
    }

    fn strategies(acq: &Acquisition) -> Vec<(TextSource, Outcome)> {
        acq.attempts
            .iter()
            .map(|a| (a.strategy, a.outcome.clone()))
            .collect()
    }

    #[test]
    fn test_direct_parse_wins() {
        let doc = FakeDoc {
            pages: vec![TRANSFER_PAGE.into()],
            raster_pages: 0,
        };
        let parser =
            TransferParser::from_config(&TransferLayoutConfig::default(), BarcodeWindow::default())
                .unwrap();
        let acquirer = TextAcquirer::new(&config())
            .with_pdf_backend(backend(Some(doc), FakeDoc::default()))
            .with_direct_parser(parser);

        let acq = acquirer.acquire(b"%PDF", DocumentKind::Pdf);
        let parsed = acq.parsed.unwrap();
        assert_eq!(parsed.lines.len(), 1);
        assert_eq!(parsed.lines[0].page, Some(1));
        assert_eq!(parsed.text_source, Some(TextSource::PdfDirect));
        assert_eq!(acq.source, Some(TextSource::PdfDirect));
    }

    #[test]
    fn test_text_layer_accepted() {
        let doc = FakeDoc {
            pages: vec!["Invoice No: INV-1 for thirty-plus characters of text".into()],
            raster_pages: 0,
        };
        let acquirer =
            TextAcquirer::new(&config()).with_pdf_backend(backend(Some(doc), FakeDoc::default()));

        let acq = acquirer.acquire(b"%PDF", DocumentKind::Pdf);
        assert!(acq.parsed.is_none());
        assert_eq!(acq.source, Some(TextSource::PdfText));
        assert_eq!(strategies(&acq), vec![(TextSource::PdfText, Outcome::Accepted)]);
    }

    #[test]
    fn test_falls_through_to_augmented_layer() {
        let scanned = FakeDoc {
            pages: vec!["   ".into()],
            raster_pages: 1,
        };
        let augmented = FakeDoc {
            pages: vec!["Recovered text layer with more than thirty characters".into()],
            raster_pages: 0,
        };
        let acquirer = TextAcquirer::new(&config())
            .with_pdf_backend(backend(Some(scanned), augmented))
            .with_augmenter(Arc::new(FakeAugmenter(true)));

        let acq = acquirer.acquire(b"%PDF", DocumentKind::Pdf);
        assert_eq!(acq.source, Some(TextSource::OcrMyPdf));
        assert_eq!(
            strategies(&acq),
            vec![
                (TextSource::PdfText, Outcome::Insufficient),
                (TextSource::OcrMyPdf, Outcome::Accepted),
            ]
        );
    }

    #[test]
    fn test_raster_escalates_resolution() {
        let scanned = FakeDoc {
            pages: vec![String::new()],
            raster_pages: 1,
        };
        let acquirer = TextAcquirer::new(&config())
            .with_pdf_backend(backend(Some(scanned), FakeDoc::default()))
            .with_augmenter(Arc::new(FakeAugmenter(false)))
            .with_reader(reader(400, "WIDGET A 12345678 3 10.00 30.00 recognised"));

        let acq = acquirer.acquire(b"%PDF", DocumentKind::Pdf);
        assert_eq!(acq.source, Some(TextSource::OcrRaster(400)));
        let outcomes = strategies(&acq);
        assert!(matches!(outcomes[1], (TextSource::OcrMyPdf, Outcome::Failed(_))));
        assert_eq!(outcomes[2], (TextSource::OcrRaster(300), Outcome::Insufficient));
        assert_eq!(outcomes[3], (TextSource::OcrRaster(400), Outcome::Accepted));
    }

    #[test]
    fn test_short_text_kept_when_everything_fails() {
        let doc = FakeDoc {
            pages: vec!["short".into()],
            raster_pages: 0,
        };
        let acquirer =
            TextAcquirer::new(&config()).with_pdf_backend(backend(Some(doc), FakeDoc::default()));

        let acq = acquirer.acquire(b"%PDF", DocumentKind::Pdf);
        assert_eq!(acq.text.text, "short");
        assert_eq!(acq.source, Some(TextSource::PdfText));
    }

    #[test]
    fn test_image_ocr() {
        let acquirer =
            TextAcquirer::new(&config()).with_reader(reader(1, "Total 30.00 and more text"));
        let acq = acquirer.acquire(&png_bytes(), DocumentKind::Image);
        assert_eq!(acq.source, Some(TextSource::OcrImage));
        assert_eq!(acq.text.text, "Total 30.00 and more text");
    }

    #[test]
    fn test_unknown_type_uses_fallback() {
        let acquirer = TextAcquirer::new(&config()).with_reader(reader(1, "fallback text"));
        let acq = acquirer.acquire(&png_bytes(), DocumentKind::Unknown);
        assert_eq!(acq.source, Some(TextSource::OcrImageFallback));
    }

    #[test]
    fn test_unreadable_pdf_without_capabilities() {
        let acquirer =
            TextAcquirer::new(&config()).with_pdf_backend(backend(None, FakeDoc::default()));
        let acq = acquirer.acquire(b"garbage", DocumentKind::Pdf);

        assert!(acq.parsed.is_none());
        assert_eq!(acq.source, None);
        assert_eq!(acq.text.stripped_len(), 0);
        let outcomes = strategies(&acq);
        assert!(matches!(outcomes[0], (TextSource::PdfText, Outcome::Failed(_))));
        assert!(matches!(
            outcomes.last(),
            Some((TextSource::OcrImageFallback, Outcome::Skipped(_)))
        ));
    }
}
