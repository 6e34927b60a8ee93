//! Rule-based value parsing shared by the line parsers.

pub mod barcode;
pub mod dates;
pub mod money;
pub mod patterns;
pub mod row;
pub mod suppliers;

pub use barcode::BarcodeWindow;
pub use dates::{DateExtractor, parse_document_date, parse_transfer_date};
pub use money::{MoneyExtractor, normalize_money};
pub use row::{RowGrammar, TransferRow};
pub use suppliers::{SupplierDirectory, SupplierExtractor};

/// Trait for field extractors.
pub trait FieldExtractor {
    /// The type of value this extractor produces.
    type Output;

    /// Extract the field from text.
    fn extract(&self, text: &str) -> Option<Self::Output>;

    /// Extract all occurrences of the field.
    fn extract_all(&self, text: &str) -> Vec<Self::Output>;
}
