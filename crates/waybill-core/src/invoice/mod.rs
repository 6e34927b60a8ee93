//! Line-item parsing: layout-specific grammars with ordered fallback.

pub mod heuristic;
pub mod rules;
pub mod transfer;

pub use heuristic::HeuristicParser;
pub use transfer::TransferParser;

use tracing::debug;

use crate::error::ConfigError;
use crate::models::config::ExtractionConfig;
use crate::models::document::{ParseResult, ParserKind};
use rules::{BarcodeWindow, SupplierDirectory};

/// Acquired text handed to the parsers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceText {
    /// Merged document text.
    pub text: String,
    /// Per-page text, when page boundaries are known.
    pub pages: Vec<String>,
}

impl SourceText {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            pages: Vec::new(),
        }
    }

    pub fn from_pages(pages: Vec<String>) -> Self {
        Self {
            text: pages.join("\n"),
            pages,
        }
    }

    /// Length of the text without surrounding whitespace.
    pub fn stripped_len(&self) -> usize {
        self.text.trim().chars().count()
    }

    /// Page texts, or the merged text as a single page.
    pub fn page_texts(&self) -> Vec<&str> {
        if self.pages.is_empty() {
            vec![self.text.as_str()]
        } else {
            self.pages.iter().map(String::as_str).collect()
        }
    }
}

/// A layout-specific grammar.
pub trait LineParser: Send + Sync {
    /// Identifier reported on results.
    fn kind(&self) -> ParserKind;

    /// Parse the text, or return `None` when this layout does not apply.
    fn attempt_parse(&self, source: &SourceText) -> Option<ParseResult>;
}

/// Ordered parsers evaluated to the first success.
pub struct ParserChain {
    parsers: Vec<Box<dyn LineParser>>,
}

impl ParserChain {
    pub fn new() -> Self {
        Self {
            parsers: Vec::new(),
        }
    }

    pub fn with_parser(mut self, parser: impl LineParser + 'static) -> Self {
        self.parsers.push(Box::new(parser));
        self
    }

    /// Built-in transfer layout, configured transfer layout (if any), then heuristics.
    pub fn from_config(config: &ExtractionConfig) -> Result<Self, ConfigError> {
        let window = BarcodeWindow::from_config(config);
        let mut chain = Self::new().with_parser(TransferParser::builtin(window)?);

        if let Some(layout) = &config.transfer_layout {
            chain = chain.with_parser(TransferParser::from_config(layout, window)?);
        }

        let heuristic = HeuristicParser::new(window)
            .with_suppliers(SupplierDirectory::from_known(&config.known_suppliers))
            .with_header_region(config.header_region_lines);

        Ok(chain.with_parser(heuristic))
    }

    pub fn kinds(&self) -> Vec<ParserKind> {
        self.parsers.iter().map(|p| p.kind()).collect()
    }

    /// Run parsers in order. The winning result carries the raw text and parser tag.
    pub fn parse(&self, source: &SourceText) -> Option<ParseResult> {
        for parser in &self.parsers {
            match parser.attempt_parse(source) {
                Some(mut result) => {
                    debug!("Parser {} matched ({} lines)", parser.kind(), result.lines.len());
                    result.raw_text = source.text.clone();
                    result.parser = Some(parser.kind());
                    return Some(result);
                }
                None => debug!("Parser {} not applicable", parser.kind()),
            }
        }
        None
    }
}

impl Default for ParserChain {
    fn default() -> Self {
        Self::new()
    }
}
