//! Right-to-left table row grammar.
//!
//! A row is `[description ...] BARCODE QTY PRICE AMOUNT`. The four trailing
//! columns are consumed from the end of the line; whatever remains on the left
//! is the description, so descriptions may contain spaces and digits.

use regex::Regex;
use rust_decimal::Decimal;
use std::str::FromStr;

use super::barcode::BarcodeWindow;
use super::money::normalize_money;
use super::patterns::{MONEY_TOKEN, QTY_TOKEN, clean_spaces};
use crate::error::ConfigError;

/// One parsed table row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRow {
    pub description: String,
    pub barcode: String,
    pub qty: Decimal,
    pub price: Decimal,
    pub amount: Decimal,
}

/// Column patterns for the right-to-left grammar.
#[derive(Debug, Clone)]
pub struct RowGrammar {
    money: Regex,
    qty: Regex,
    barcode: Regex,
    min_line_length: usize,
}

impl RowGrammar {
    pub fn new(money: Regex, qty: Regex, barcode: Regex) -> Self {
        Self {
            money,
            qty,
            barcode,
            min_line_length: 0,
        }
    }

    /// Default money and quantity columns with a barcode window.
    pub fn standard(window: BarcodeWindow) -> Result<Self, ConfigError> {
        let barcode = Regex::new(&window.pattern()).map_err(|source| ConfigError::Pattern {
            name: "barcode".to_string(),
            source,
        })?;
        Ok(Self::new(MONEY_TOKEN.clone(), QTY_TOKEN.clone(), barcode))
    }

    /// Reject collapsed lines shorter than `len` characters.
    pub fn with_min_line_length(mut self, len: usize) -> Self {
        self.min_line_length = len;
        self
    }

    /// Parse one line, or `None` if any column fails its pattern or the description is empty.
    pub fn parse(&self, line: &str) -> Option<TransferRow> {
        let line = clean_spaces(line);
        if line.chars().count() < self.min_line_length {
            return None;
        }

        let mut tokens: Vec<&str> = line.split(' ').collect();

        let amount = tokens.pop().filter(|t| self.money.is_match(t))?;
        let price = tokens.pop().filter(|t| self.money.is_match(t))?;
        let qty = tokens.pop().filter(|t| self.qty.is_match(t))?;
        let barcode = tokens.pop().filter(|t| self.barcode.is_match(t))?;

        let description = clean_spaces(&tokens.join(" "));
        if description.is_empty() {
            return None;
        }

        Some(TransferRow {
            description,
            barcode: barcode.to_string(),
            qty: Decimal::from_str(qty).ok()?,
            price: normalize_money(price)?,
            amount: normalize_money(amount)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn grammar() -> RowGrammar {
        RowGrammar::standard(BarcodeWindow::default()).unwrap()
    }

    fn d(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn test_parse_basic_row() {
        let row = grammar().parse("WIDGET A 12345678 3 10.00 30.00").unwrap();
        assert_eq!(
            row,
            TransferRow {
                description: "WIDGET A".to_string(),
                barcode: "12345678".to_string(),
                qty: d("3"),
                price: d("10.00"),
                amount: d("30.00"),
            }
        );
    }

    #[test]
    fn test_description_keeps_digits() {
        let row = grammar()
            .parse("OUD 100ML  EDP   6291106812345  12  1,250.00  15,000.00")
            .unwrap();
        assert_eq!(row.description, "OUD 100ML EDP");
        assert_eq!(row.amount, d("15000.00"));
    }

    #[test]
    fn test_rejects_bad_columns() {
        let g = grammar();
        // Missing description
        assert!(g.parse("12345678 3 10.00 30.00").is_none());
        // Barcode too short
        assert!(g.parse("WIDGET 1234567 3 10.00 30.00").is_none());
        // Barcode too long
        assert!(g.parse("WIDGET 123456789012345 3 10.00 30.00").is_none());
        // Non-integer quantity
        assert!(g.parse("WIDGET 12345678 3.5 10.00 30.00").is_none());
        // Bad money column
        assert!(g.parse("WIDGET 12345678 3 10.0 30.00").is_none());
        assert!(g.parse("").is_none());
    }

    #[test]
    fn test_min_line_length() {
        let g = RowGrammar::standard(BarcodeWindow::new(4, 4))
            .unwrap()
            .with_min_line_length(20);
        assert!(g.parse("A 1234 1 1.00 1.00").is_none());
        assert!(g.parse("LONGER NAME 1234 1 1.00 1.00").is_some());
    }
}
