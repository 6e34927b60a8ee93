//! Money token normalization.

use rust_decimal::Decimal;
use std::str::FromStr;

use super::FieldExtractor;
use super::patterns::{MONEY_CANDIDATE, NUMERIC_RUN};

/// Currency markers removed before parsing.
const CURRENCY_MARKERS: &[&str] = &["₦", "NGN", "ngn", "Naira", "$", "€", "£"];

/// Parse a money token into a decimal.
///
/// Currency symbols and spaces are removed, a value wrapped in parentheses is
/// negative, and the first run of digits/commas/dots is parsed with commas
/// treated as thousands separators.
pub fn normalize_money(s: &str) -> Option<Decimal> {
    let mut cleaned = s.trim().to_string();
    for marker in CURRENCY_MARKERS {
        cleaned = cleaned.replace(marker, "");
    }
    cleaned.retain(|c| !c.is_whitespace());

    let mut negative = false;
    if cleaned.len() >= 2 && cleaned.starts_with('(') && cleaned.ends_with(')') {
        negative = true;
        cleaned = cleaned[1..cleaned.len() - 1].to_string();
    }

    let run = NUMERIC_RUN.find(&cleaned)?;
    let value = Decimal::from_str(&run.as_str().replace(',', "")).ok()?;

    Some(if negative { -value } else { value })
}

/// Finds every money-like run in free text.
pub struct MoneyExtractor;

impl MoneyExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl Default for MoneyExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl FieldExtractor for MoneyExtractor {
    type Output = Decimal;

    fn extract(&self, text: &str) -> Option<Self::Output> {
        self.extract_all(text).into_iter().next()
    }

    fn extract_all(&self, text: &str) -> Vec<Self::Output> {
        MONEY_CANDIDATE
            .find_iter(text)
            .filter_map(|m| normalize_money(m.as_str()))
            .collect()
    }
}
