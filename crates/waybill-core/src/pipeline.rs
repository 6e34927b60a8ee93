//! End-to-end document processing: acquisition, parser dispatch and reconciliation.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info};

use crate::acquisition::{Attempt, TextAcquirer};
use crate::error::{ConfigError, Result};
use crate::invoice::rules::BarcodeWindow;
use crate::invoice::{ParserChain, TransferParser};
use crate::models::config::WaybillConfig;
use crate::models::document::{DocumentKind, ParseRequest, ParseResult};
use crate::ocr::{OcrEngine, PageReader, default_engine};
use crate::pdf::{LopdfBackend, OcrMyPdf};

/// A processed document together with how its text was obtained.
#[derive(Debug, Clone)]
pub struct PipelineReport {
    pub result: ParseResult,
    /// Acquisition strategies in the order they ran.
    pub attempts: Vec<Attempt>,
    pub processing_time_ms: u64,
}

/// Turns document bytes into a [`ParseResult`]. Never fails per document.
///
/// Instances hold no per-document state, so one pipeline can serve many
/// threads at once.
pub struct DocumentPipeline {
    acquirer: TextAcquirer,
    chain: ParserChain,
}

impl DocumentPipeline {
    pub fn new(acquirer: TextAcquirer, chain: ParserChain) -> Self {
        Self { acquirer, chain }
    }

    /// Build the production pipeline: lopdf text layer, `ocrmypdf`
    /// augmentation and the default OCR engine.
    pub fn from_config(config: &WaybillConfig) -> std::result::Result<Self, ConfigError> {
        config.validate()?;
        Self::with_engine(config, default_engine(&config.ocr))
    }

    /// Production pipeline around a caller-supplied OCR engine.
    pub fn with_engine(
        config: &WaybillConfig,
        engine: Arc<dyn OcrEngine>,
    ) -> std::result::Result<Self, ConfigError> {
        config.validate()?;
        let chain = ParserChain::from_config(&config.extraction)?;

        let mut acquirer = TextAcquirer::new(&config.pdf)
            .with_pdf_backend(Arc::new(LopdfBackend))
            .with_reader(PageReader::from_config(engine, &config.ocr));

        if config.pdf.augment_with_ocr {
            let augmenter = OcrMyPdf::new()
                .with_binary(config.pdf.ocrmypdf_binary.clone())
                .with_language(config.ocr.language.clone());
            acquirer = acquirer.with_augmenter(Arc::new(augmenter));
        }

        if let Some(layout) = &config.extraction.transfer_layout {
            let window = BarcodeWindow::from_config(&config.extraction);
            acquirer = acquirer.with_direct_parser(TransferParser::from_config(layout, window)?);
        }

        debug!("Parser chain: {:?}", chain.kinds());
        Ok(Self::new(acquirer, chain))
    }

    /// Process a document with an optional declared MIME type.
    pub fn process(&self, data: &[u8], content_type: Option<&str>) -> ParseResult {
        self.process_with_report(data, content_type).result
    }

    /// Like [`process`](Self::process), also returning the acquisition attempts.
    pub fn process_with_report(&self, data: &[u8], content_type: Option<&str>) -> PipelineReport {
        let start = Instant::now();
        let kind = DocumentKind::from_content_type(content_type);
        info!("Processing {} bytes as {:?}", data.len(), kind);

        let acquisition = self.acquirer.acquire(data, kind);

        let mut result = match acquisition.parsed {
            Some(parsed) => parsed,
            None => self
                .chain
                .parse(&acquisition.text)
                .unwrap_or_else(|| ParseResult::empty(acquisition.text.text.clone())),
        };
        result.text_source = acquisition.source;
        result.warnings.extend(result.reconcile());

        info!(
            "Parsed {} lines via {} from {}",
            result.lines.len(),
            result.parser.map(|p| p.as_str()).unwrap_or("no parser"),
            result.text_source.map(|s| s.to_string()).unwrap_or_else(|| "no text".into())
        );

        PipelineReport {
            result,
            attempts: acquisition.attempts,
            processing_time_ms: start.elapsed().as_millis() as u64,
        }
    }

    /// Decode a transport request and process it. Only a malformed payload is an error.
    pub fn process_request(&self, request: &ParseRequest) -> Result<ParseResult> {
        let data = request.decode()?;
        Ok(self.process(&data, request.content_type.as_deref()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::OcrError;
    use crate::models::config::PdfConfig;
    use crate::models::document::{ParserKind, TextSource};
    use crate::ocr::SegmentationMode;
    use image::{GrayImage, ImageFormat, Luma};
    use std::io::Cursor;

    struct FixedText(&'static str);

    impl OcrEngine for FixedText {
        fn name(&self) -> &str {
            "fixed"
        }

        fn recognize(
            &self,
            _: &GrayImage,
            _: SegmentationMode,
        ) -> std::result::Result<String, OcrError> {
            Ok(self.0.to_string())
        }

        fn detect_orientation(&self, _: &GrayImage) -> std::result::Result<u32, OcrError> {
            Ok(0)
        }
    }

    fn png() -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        GrayImage::from_pixel(32, 16, Luma([255]))
            .write_to(&mut buf, ImageFormat::Png)
            .unwrap();
        buf.into_inner()
    }

    fn pipeline(text: &'static str) -> DocumentPipeline {
        let acquirer = TextAcquirer::new(&PdfConfig::default())
            .with_reader(PageReader::new(Arc::new(FixedText(text))));
        let chain = ParserChain::from_config(&Default::default()).unwrap();
        DocumentPipeline::new(acquirer, chain)
    }

    #[test]
    fn test_image_through_transfer_layout() {
        let pipeline = pipeline(
            "Description Bar Code Qty Price Amount\n\
             WIDGET A 12345678 3 10.00 30.00\n\
             TOTAL: 3 31.00",
        );
        let report = pipeline.process_with_report(&png(), Some("image/png"));

        assert_eq!(report.result.parser, Some(ParserKind::WarehouseTransferText));
        assert_eq!(report.result.text_source, Some(TextSource::OcrImage));
        assert_eq!(report.result.lines.len(), 1);
        // Mismatch is advisory
        assert_eq!(report.result.warnings.len(), 1);
        assert_eq!(report.attempts.len(), 1);
    }

    #[test]
    fn test_nothing_recognized_is_empty_result() {
        let result = pipeline("").process(&png(), Some("image/png"));
        assert!(result.lines.is_empty());
        assert_eq!(result.total, None);
        assert_eq!(result.parser, None);
        assert_eq!(result.text_source, None);
    }

    #[test]
    fn test_process_request() {
        let pipeline = pipeline("Invoice No: INV-77\nTotal: 12.50");
        let request = ParseRequest::new(Some("image/png".into()), &png());
        let result = pipeline.process_request(&request).unwrap();
        assert_eq!(result.invoice_number.as_deref(), Some("INV-77"));

        let bad = ParseRequest {
            content_type: None,
            data: "not base64!".into(),
        };
        assert!(pipeline.process_request(&bad).is_err());
    }

    #[test]
    fn test_from_config_rejects_bad_layout() {
        let mut config = WaybillConfig::default();
        if let Some(layout) = config.extraction.transfer_layout.as_mut() {
            layout.total_pattern = "TOTAL".into();
        }
        assert!(DocumentPipeline::with_engine(&config, Arc::new(FixedText(""))).is_err());
    }
}
