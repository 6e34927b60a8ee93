//! Common regex patterns for transfer and invoice extraction.

use lazy_static::lazy_static;
use regex::Regex;

use crate::models::config::{DEFAULT_MONEY_PATTERN, DEFAULT_TOTAL_PATTERN};

lazy_static! {
    // Column header row of the warehouse transfer table
    pub static ref TRANSFER_SIGNATURE: Regex = Regex::new(
        r"(?i)Description\s+Bar\s*Code\s+Qty\.?\s+Price\s+Amount"
    ).unwrap();

    // Totals row: TOTAL: <qty> <amount>
    pub static ref TRANSFER_TOTAL: Regex =
        Regex::new(&format!("(?i){}", DEFAULT_TOTAL_PATTERN)).unwrap();

    // Column tokens
    pub static ref MONEY_TOKEN: Regex = Regex::new(DEFAULT_MONEY_PATTERN).unwrap();
    pub static ref QTY_TOKEN: Regex = Regex::new(r"^\d+$").unwrap();

    // Money normalization
    pub static ref NUMERIC_RUN: Regex = Regex::new(r"-?[0-9.,]+").unwrap();
    pub static ref MONEY_CANDIDATE: Regex = Regex::new(r"[-()₦NGN\s0-9.,]+").unwrap();

    // Whitespace and OCR table borders
    pub static ref WHITESPACE: Regex = Regex::new(r"\s+").unwrap();
    pub static ref TABLE_BORDER_CHARS: Regex = Regex::new(r"[\[\]()|]").unwrap();

    // Labeled invoice fields
    pub static ref INVOICE_NUMBER: Regex = Regex::new(
        r"(?i)(Invoice|Invoice\s*#|Invoice\s*No\.?):\s*([A-Z0-9-]+)"
    ).unwrap();

    pub static ref INVOICE_DATE: Regex = Regex::new(
        r"(?i)(Date|Invoice\s*Date):\s*(\d{1,2}[./-]\d{1,2}[./-]\d{2,4})"
    ).unwrap();

    pub static ref SUPPLIER_LABEL: Regex = Regex::new(
        r"(?i)Supplier:\s*([\w .&-]+)"
    ).unwrap();

    // Date parts: day, month, year with any of . / - as separator
    pub static ref DATE_DMY: Regex = Regex::new(
        r"^(\d{1,2})[./\-](\d{1,2})[./\-](\d{4}|\d{2})$"
    ).unwrap();

    // Overall total keyword and the rest of its line
    pub static ref TOTAL_KEYWORD: Regex = Regex::new(
        r"(?im)\b(total\s*amount|grand\s*total|amount\s*due|total)\b(.*)$"
    ).unwrap();

    // Heuristic line-item grammars (qty first)
    pub static ref QTY_PREFIX: Regex = Regex::new(r"^\d{1,5}\b").unwrap();

    pub static ref ROW_WITH_DISCOUNT: Regex = Regex::new(
        r"^(\d{1,5})\s+(.+?)\s+([\d,.]+)\s+(\d{1,2})%\s+([\d,.]+)\s+([\d,.]+)$"
    ).unwrap();

    pub static ref ROW_PLAIN: Regex = Regex::new(
        r"^(\d{1,5})\s+(.+?)\s+([\d,.]+)\s+([\d,.]+)$"
    ).unwrap();
}

/// Collapse runs of whitespace into single spaces and trim.
pub fn clean_spaces(s: &str) -> String {
    WHITESPACE.replace_all(s, " ").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signature_tolerates_spacing() {
        assert!(TRANSFER_SIGNATURE.is_match("Description  Bar Code  Qty. Price Amount"));
        assert!(TRANSFER_SIGNATURE.is_match("description barcode qty price amount"));
        assert!(!TRANSFER_SIGNATURE.is_match("Description Qty Price Amount"));
    }

    #[test]
    fn test_total_row() {
        let caps = TRANSFER_TOTAL.captures("Total: 12 1,234.50").unwrap();
        assert_eq!(&caps["qty"], "12");
        assert_eq!(&caps["amount"], "1,234.50");
    }

    #[test]
    fn test_clean_spaces() {
        assert_eq!(clean_spaces("  WIDGET\tA \n  3 "), "WIDGET A 3");
    }
}
