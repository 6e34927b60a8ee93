//! Generic invoice heuristics, the last parser in the chain.

use rust_decimal::Decimal;
use std::str::FromStr;
use tracing::debug;

use super::rules::patterns::{
    INVOICE_NUMBER, QTY_PREFIX, ROW_PLAIN, ROW_WITH_DISCOUNT, TABLE_BORDER_CHARS, TOTAL_KEYWORD,
    clean_spaces,
};
use super::rules::{
    BarcodeWindow, DateExtractor, FieldExtractor, MoneyExtractor, SupplierDirectory,
    SupplierExtractor, normalize_money,
};
use super::{LineParser, SourceText};
use crate::models::document::{LineItem, ParseResult, ParserKind};

/// Qty-first invoice line grammars plus labeled header fields.
#[derive(Debug, Clone)]
pub struct HeuristicParser {
    window: BarcodeWindow,
    suppliers: SupplierDirectory,
    header_region_lines: usize,
}

impl HeuristicParser {
    pub fn new(window: BarcodeWindow) -> Self {
        Self {
            window,
            suppliers: SupplierDirectory::new(),
            header_region_lines: 30,
        }
    }

    /// Vendors matched in the header region when no `Supplier:` label exists.
    pub fn with_suppliers(mut self, suppliers: SupplierDirectory) -> Self {
        self.suppliers = suppliers;
        self
    }

    /// Number of leading non-empty lines searched for known vendors.
    pub fn with_header_region(mut self, lines: usize) -> Self {
        self.header_region_lines = lines;
        self
    }

    /// Parse qty-first item lines up to the first line starting with "total".
    pub fn parse_lines(&self, text: &str) -> Vec<LineItem> {
        let mut items = Vec::new();

        for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
            if line.to_lowercase().starts_with("total") {
                break;
            }

            let cleaned = clean_spaces(&TABLE_BORDER_CHARS.replace_all(line, " "));
            if !QTY_PREFIX.is_match(&cleaned) {
                continue;
            }

            if let Some(item) = self
                .parse_discounted(&cleaned)
                .or_else(|| self.parse_plain(&cleaned))
                .or_else(|| self.parse_fuzzy(&cleaned))
            {
                items.push(item);
            }
        }

        items
    }

    /// `qty description unit pct% discounted_unit total`
    fn parse_discounted(&self, line: &str) -> Option<LineItem> {
        let caps = ROW_WITH_DISCOUNT.captures(line)?;
        let qty = Decimal::from_str(&caps[1]).ok()?;
        let (description, barcode) = self.window.extract_barcode(&caps[2]);
        let unit = normalize_money(&caps[3]).unwrap_or(Decimal::ZERO);
        let pct = Decimal::from_str(&caps[4]).ok()?;
        let discounted = normalize_money(&caps[5]);
        let total = match non_zero(normalize_money(&caps[6])) {
            Some(total) => total,
            None => qty.checked_mul(unit)?,
        };

        Some(
            LineItem::new(description, qty, unit, total)
                .with_barcode(barcode)
                .with_discount(pct, discounted),
        )
    }

    /// `qty description unit total`
    fn parse_plain(&self, line: &str) -> Option<LineItem> {
        let caps = ROW_PLAIN.captures(line)?;
        let qty = Decimal::from_str(&caps[1]).ok()?;
        let (description, barcode) = self.window.extract_barcode(&caps[2]);
        let unit = normalize_money(&caps[3]).unwrap_or(Decimal::ZERO);
        let total = match non_zero(normalize_money(&caps[4])) {
            Some(total) => total,
            None => qty.checked_mul(unit)?,
        };

        Some(LineItem::new(description, qty, unit, total).with_barcode(barcode))
    }

    /// First token is the quantity, the last numeric token the line total, and
    /// the tokens before the next numeric token the description.
    fn parse_fuzzy(&self, line: &str) -> Option<LineItem> {
        let tokens: Vec<&str> = line.split(' ').collect();
        let digits: String = tokens.first()?.chars().filter(char::is_ascii_digit).collect();
        let qty = Decimal::from_str(&digits).ok()?;
        if qty.is_zero() {
            return None;
        }

        let numeric: Vec<(usize, String)> = tokens
            .iter()
            .enumerate()
            .skip(1)
            .filter(|(_, t)| t.chars().any(|c| c.is_ascii_digit()))
            .map(|(i, t)| {
                let kept: String = t
                    .chars()
                    .filter(|c| c.is_ascii_digit() || *c == '.' || *c == ',')
                    .collect();
                (i, kept)
            })
            .collect();

        let (first_idx, _) = numeric.first()?;
        let (_, last) = numeric.last()?;
        let total = Decimal::from_str(&last.replace(',', "")).ok()?;

        let description = tokens[1..*first_idx].join(" ");
        let (description, barcode) = self.window.extract_barcode(description.trim());
        if description.is_empty() {
            return None;
        }

        let unit = (total / qty).round_dp(2);
        Some(LineItem::new(description, qty, unit, total.round_dp(2)).with_barcode(barcode))
    }

    /// Amount following the first total keyword, or on the next line when that
    /// line holds nothing but an amount.
    fn find_total(&self, text: &str) -> Option<Decimal> {
        let extractor = MoneyExtractor::new();
        let caps = TOTAL_KEYWORD.captures(text)?;

        if let Some(value) = extractor.extract_all(&caps[2]).last() {
            return Some(*value);
        }

        let end = caps.get(0)?.end();
        let next = text[end..].lines().map(str::trim).find(|l| !l.is_empty())?;
        let without_currency = next.replace("NGN", "").replace("Naira", "");
        if without_currency.chars().any(char::is_alphabetic) {
            return None;
        }
        extractor.extract_all(next).last().copied()
    }

    fn find_supplier(&self, text: &str) -> Option<String> {
        if let Some(name) = SupplierExtractor::new().extract(text) {
            return Some(name);
        }
        if self.suppliers.is_empty() {
            return None;
        }
        let header: Vec<&str> = text
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .take(self.header_region_lines)
            .collect();
        self.suppliers.lookup(&header.join("\n")).map(str::to_string)
    }
}

impl LineParser for HeuristicParser {
    fn kind(&self) -> ParserKind {
        ParserKind::InvoiceHeuristics
    }

    fn attempt_parse(&self, source: &SourceText) -> Option<ParseResult> {
        let text = source.text.replace('\r', "");

        let result = ParseResult {
            invoice_number: INVOICE_NUMBER.captures(&text).map(|c| c[2].to_string()),
            date: DateExtractor::new().extract(&text),
            supplier_name: self.find_supplier(&text),
            lines: self.parse_lines(&text),
            total: self.find_total(&text),
            ..Default::default()
        };

        let found_anything = !result.lines.is_empty()
            || result.total.is_some()
            || result.invoice_number.is_some()
            || result.date.is_some()
            || result.supplier_name.is_some();

        debug!(
            "Heuristics: {} lines, total {:?}, invoice {:?}",
            result.lines.len(),
            result.total,
            result.invoice_number
        );

        found_anything.then_some(result)
    }
}

fn non_zero(value: Option<Decimal>) -> Option<Decimal> {
    value.filter(|v| !v.is_zero())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;

    fn d(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn parser() -> HeuristicParser {
        HeuristicParser::new(BarcodeWindow::default())
    }

    #[test]
    fn test_discount_grammar() {
        let items = parser().parse_lines("2 Rose Water 1,000.00 10% 900.00 1,800.00");
        assert_eq!(items.len(), 1);
        let item = &items[0];
        assert_eq!(item.description, "Rose Water");
        assert_eq!(item.qty, d("2"));
        assert_eq!(item.unit_price, d("1000.00"));
        assert_eq!(item.discount_pct, Some(d("10")));
        assert_eq!(item.discounted_unit_price, Some(d("900.00")));
        assert_eq!(item.line_total, d("1800.00"));
    }

    #[test]
    fn test_plain_grammar_with_barcode_in_description() {
        let items = parser().parse_lines("| 3 | Hair Oil 6151100123456 | 1,500.00 | 4,500.00 |");
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].description, "Hair Oil");
        assert_eq!(items[0].barcode.as_deref(), Some("6151100123456"));
        assert_eq!(items[0].line_total, d("4500.00"));
    }

    #[test]
    fn test_plain_grammar_zero_total_uses_product() {
        let items = parser().parse_lines("4 Soap Bar 250.00 0");
        assert_eq!(items[0].line_total, d("1000.00"));
    }

    #[test]
    fn test_overflowing_product_rejects_row() {
        let line = "99999 Perfume 99999999999999999999999999 0";
        assert!(parser().parse_plain(line).is_none());
        assert!(
            parser()
                .parse_discounted("99999 Perfume 99999999999999999999999999 10% 1.00 0")
                .is_none()
        );

        // The plain grammar still reads the row with the discount folded into the description
        let items = parser().parse_lines("99999 Perfume 99999999999999999999999999 10% 1.00 0");
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].unit_price, d("1.00"));
        assert_eq!(items[0].line_total, d("99999"));
    }

    #[test]
    fn test_fuzzy_grammar() {
        let items = parser().parse_lines("3 Body Lotion 400ml x 1,200.00 each 3,600.00 NGN");
        assert_eq!(items.len(), 1);
        let item = &items[0];
        assert_eq!(item.description, "Body Lotion");
        assert_eq!(item.qty, d("3"));
        assert_eq!(item.line_total, d("3600.00"));
        assert_eq!(item.unit_price, d("1200.00"));
    }

    #[test]
    fn test_fuzzy_rounds_unit_price() {
        let items = parser().parse_lines("3 Candle Pack 10.00 total10.00x");
        assert_eq!(items[0].unit_price, d("3.33"));
        assert_eq!(items[0].line_total, d("10.00"));
    }

    #[test]
    fn test_fuzzy_needs_description_and_amount() {
        assert!(parser().parse_lines("3 apples").is_empty());
        assert!(parser().parse_lines("3 12.00 36.00 x").is_empty());
    }

    #[test]
    fn test_stops_at_total_line() {
        let text = "1 Perfume 5,000.00 5,000.00\nTotal 5,000.00\n2 Ignored 1.00 2.00";
        let items = parser().parse_lines(text);
        assert_eq!(items.len(), 1);
    }

    #[test]
    fn test_header_fields_and_total() {
        let text = "\
Supplier: Seaside Cosmetics Ltd
Invoice No: INV-2024-17
Date: 05-03-2024
Qty Description Unit Amount
2 Face Cream 2,500.00 5,000.00
1 Lip Balm 800.00 800.00
Grand Total: ₦5,800.00
";
        let result = parser().attempt_parse(&SourceText::new(text)).unwrap();
        assert_eq!(result.supplier_name.as_deref(), Some("Seaside Cosmetics Ltd"));
        assert_eq!(result.invoice_number.as_deref(), Some("INV-2024-17"));
        assert_eq!(result.date, NaiveDate::from_ymd_opt(2024, 3, 5));
        assert_eq!(result.lines.len(), 2);
        assert_eq!(result.total, Some(d("5800.00")));
    }

    #[test]
    fn test_total_on_next_line() {
        let text = "1 Comb 300.00 300.00\nAmount due\n₦ 300.00\n";
        let result = parser().attempt_parse(&SourceText::new(text)).unwrap();
        assert_eq!(result.total, Some(d("300.00")));

        let text = "Qty Item Total\n1 Comb 300.00 300.00\n";
        let result = parser().attempt_parse(&SourceText::new(text)).unwrap();
        assert_eq!(result.total, None);
    }

    #[test]
    fn test_supplier_directory_in_header_region() {
        let parser = parser()
            .with_suppliers(
                SupplierDirectory::new().with_supplier("Parfum House Ltd", ["parfumhouse"]),
            )
            .with_header_region(2);

        let text = "www.parfumhouse.example\nReceipt\n1 Mist 10.00 10.00";
        let result = parser.attempt_parse(&SourceText::new(text)).unwrap();
        assert_eq!(result.supplier_name.as_deref(), Some("Parfum House Ltd"));

        let text = "Receipt\nThanks\nwww.parfumhouse.example\n1 Mist 10.00 10.00";
        let result = parser.attempt_parse(&SourceText::new(text)).unwrap();
        assert_eq!(result.supplier_name, None);
    }

    #[test]
    fn test_not_applicable_without_findings() {
        assert!(parser().attempt_parse(&SourceText::new("hello\nworld")).is_none());
    }
}
