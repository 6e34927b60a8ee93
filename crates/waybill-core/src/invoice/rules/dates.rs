//! Date parsing for invoice and transfer documents.

use chrono::NaiveDate;

use super::FieldExtractor;
use super::patterns::{DATE_DMY, INVOICE_DATE};

/// Labeled invoice date extractor (`Date: 05/03/2024`, `Invoice Date: 5-3-24`).
pub struct DateExtractor;

impl DateExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl Default for DateExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl FieldExtractor for DateExtractor {
    type Output = NaiveDate;

    fn extract(&self, text: &str) -> Option<Self::Output> {
        let caps = INVOICE_DATE.captures(text)?;
        parse_document_date(&caps[2])
    }

    fn extract_all(&self, text: &str) -> Vec<Self::Output> {
        INVOICE_DATE
            .captures_iter(text)
            .filter_map(|caps| parse_document_date(&caps[2]))
            .collect()
    }
}

/// Parse a day-first date with `.`, `/` or `-` separators and a 2- or 4-digit year.
pub fn parse_document_date(s: &str) -> Option<NaiveDate> {
    let (first, second, year) = split_date(s)?;
    NaiveDate::from_ymd_opt(year, second, first)
}

/// Parse a transfer header date: day-first, then month-first when day-first is impossible.
pub fn parse_transfer_date(s: &str) -> Option<NaiveDate> {
    let (first, second, year) = split_date(s)?;
    NaiveDate::from_ymd_opt(year, second, first)
        .or_else(|| NaiveDate::from_ymd_opt(year, first, second))
}

fn split_date(s: &str) -> Option<(u32, u32, i32)> {
    let caps = DATE_DMY.captures(s.trim())?;
    let first: u32 = caps[1].parse().ok()?;
    let second: u32 = caps[2].parse().ok()?;
    let year = parse_year(&caps[3])?;
    Some((first, second, year))
}

fn parse_year(s: &str) -> Option<i32> {
    let year: i32 = s.parse().ok()?;
    if s.len() == 2 {
        // Two-digit year: 00-68 is the 2000s, 69-99 the 1900s
        Some(if year <= 68 { 2000 + year } else { 1900 + year })
    } else {
        Some(year)
    }
}
