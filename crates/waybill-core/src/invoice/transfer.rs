//! Warehouse transfer layouts.
//!
//! Two variants share one implementation: the built-in layout, which only
//! applies when the column header signature is present in the merged text,
//! and the configured layout, whose every pattern comes from
//! [`TransferLayoutConfig`] and which reads per-page text so that line items
//! keep their page number.

use regex::Regex;
use tracing::debug;

use super::rules::patterns::{TRANSFER_SIGNATURE, TRANSFER_TOTAL, clean_spaces};
use super::rules::{BarcodeWindow, RowGrammar, normalize_money, parse_transfer_date};
use super::{LineParser, SourceText};
use crate::error::ConfigError;
use crate::models::config::{TransferLayoutConfig, default_noise_patterns};
use crate::models::document::{
    HeaderField, LineItem, ParseResult, ParserKind, TransferHeader, checked_sum,
};

/// Lines shorter than this are never rows in the configured layout.
const CONFIGURED_MIN_ROW_LENGTH: usize = 10;

/// Right-to-left transfer table parser.
#[derive(Debug, Clone)]
pub struct TransferParser {
    kind: ParserKind,
    signature: Option<Regex>,
    header_patterns: Vec<(HeaderField, Vec<Regex>)>,
    noise: Vec<Regex>,
    total: Regex,
    grammar: RowGrammar,
    /// Fall back to the sum of line totals when no totals row is found.
    sum_when_unreported: bool,
}

impl TransferParser {
    /// The built-in warehouse transfer layout.
    pub fn builtin(window: BarcodeWindow) -> Result<Self, ConfigError> {
        Ok(Self {
            kind: ParserKind::WarehouseTransferText,
            signature: Some(TRANSFER_SIGNATURE.clone()),
            header_patterns: Vec::new(),
            noise: compile_noise(&default_noise_patterns())?,
            total: TRANSFER_TOTAL.clone(),
            grammar: RowGrammar::standard(window)?,
            sum_when_unreported: false,
        })
    }

    /// A layout whose patterns come from configuration.
    ///
    /// Fails when a pattern does not compile, a header pattern does not have
    /// exactly one capture group, or the totals pattern lacks an `amount` group.
    pub fn from_config(
        layout: &TransferLayoutConfig,
        window: BarcodeWindow,
    ) -> Result<Self, ConfigError> {
        let mut header_patterns = Vec::with_capacity(layout.header_patterns.len());
        for (field, patterns) in &layout.header_patterns {
            let mut compiled = Vec::with_capacity(patterns.len());
            for pattern in patterns {
                let re = compile(&format!("header.{}", field), &format!("(?i){}", pattern))?;
                if re.captures_len() != 2 {
                    return Err(ConfigError::CaptureGroups {
                        field: field.to_string(),
                        pattern: pattern.clone(),
                    });
                }
                compiled.push(re);
            }
            header_patterns.push((*field, compiled));
        }

        let total = compile("total_pattern", &format!("(?i){}", layout.total_pattern))?;
        if !total.capture_names().flatten().any(|name| name == "amount") {
            return Err(ConfigError::TotalsPattern(layout.total_pattern.clone()));
        }

        let barcode_pattern = layout
            .barcode_pattern
            .clone()
            .unwrap_or_else(|| window.pattern());

        let grammar = RowGrammar::new(
            compile("money_pattern", &layout.money_pattern)?,
            compile("qty_pattern", &layout.qty_pattern)?,
            compile("barcode_pattern", &barcode_pattern)?,
        )
        .with_min_line_length(CONFIGURED_MIN_ROW_LENGTH);

        Ok(Self {
            kind: ParserKind::GenericTransfer,
            signature: None,
            header_patterns,
            noise: compile_noise(&layout.noise_patterns)?,
            total,
            grammar,
            sum_when_unreported: true,
        })
    }

    /// Parse page texts. Line items carry their 1-based page number.
    pub fn parse_pages<S: AsRef<str>>(&self, pages: &[S]) -> Option<ParseResult> {
        self.parse_pages_inner(pages.iter().map(|p| p.as_ref()), true)
    }

    fn parse_pages_inner<'a, I>(&self, pages: I, tag_pages: bool) -> Option<ParseResult>
    where
        I: Iterator<Item = &'a str>,
    {
        let mut header = TransferHeader::default();
        let mut lines = Vec::new();
        let mut reported_quantity = None;
        let mut reported_amount = None;

        for (idx, page) in pages.enumerate() {
            let page_no = idx as u32 + 1;
            self.fill_header(&mut header, page);

            for raw in page.lines() {
                let line = clean_spaces(raw);
                if line.is_empty() || self.is_noise(&line) {
                    continue;
                }

                if let Some(caps) = self.total.captures(&line) {
                    if let Some(qty) = caps.name("qty").and_then(|m| m.as_str().parse().ok()) {
                        reported_quantity = Some(qty);
                    }
                    reported_amount = caps.name("amount").and_then(|m| normalize_money(m.as_str()));
                    continue;
                }

                if let Some(row) = self.grammar.parse(&line) {
                    let item = LineItem::new(row.description, row.qty, row.price, row.amount)
                        .with_barcode(Some(row.barcode));
                    lines.push(if tag_pages { item.with_page(page_no) } else { item });
                }
            }
        }

        if lines.is_empty() {
            debug!("{}: no rows matched", self.kind);
            return None;
        }

        let total = match reported_amount {
            Some(amount) => Some(amount),
            None if self.sum_when_unreported => checked_sum(lines.iter().map(|l| l.line_total)),
            None => None,
        };

        debug!(
            "{}: {} rows, reported total {:?}, reported qty {:?}",
            self.kind,
            lines.len(),
            reported_amount,
            reported_quantity
        );

        Some(ParseResult {
            date: header.date_transfer.as_deref().and_then(parse_transfer_date),
            header,
            lines,
            total,
            reported_quantity,
            ..Default::default()
        })
    }

    fn fill_header(&self, header: &mut TransferHeader, text: &str) {
        for (field, patterns) in &self.header_patterns {
            if header.get(*field).is_some() {
                continue;
            }
            let found = patterns
                .iter()
                .find_map(|re| re.captures(text).and_then(|c| c.get(1)))
                .map(|m| clean_spaces(m.as_str()));
            if let Some(value) = found {
                header.fill(*field, value);
            }
        }
    }

    fn is_noise(&self, line: &str) -> bool {
        self.noise.iter().any(|re| re.is_match(line))
    }
}

impl LineParser for TransferParser {
    fn kind(&self) -> ParserKind {
        self.kind
    }

    fn attempt_parse(&self, source: &SourceText) -> Option<ParseResult> {
        match &self.signature {
            Some(signature) => {
                let text = source.text.replace('\r', "");
                if !signature.is_match(&text) {
                    return None;
                }
                self.parse_pages_inner(std::iter::once(text.as_str()), false)
            }
            None => self.parse_pages_inner(source.page_texts().into_iter(), true),
        }
    }
}

fn compile(name: &str, pattern: &str) -> Result<Regex, ConfigError> {
    Regex::new(pattern).map_err(|source| ConfigError::Pattern {
        name: name.to_string(),
        source,
    })
}

fn compile_noise(patterns: &[String]) -> Result<Vec<Regex>, ConfigError> {
    patterns
        .iter()
        .map(|p| compile("noise_patterns", &format!("(?i){}", p)))
        .collect()
}
