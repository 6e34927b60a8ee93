//! Supplier name lookup.

use super::FieldExtractor;
use super::patterns::SUPPLIER_LABEL;
use crate::models::config::KnownSupplier;

/// Vendors recognised by identifiers appearing in a document header.
#[derive(Debug, Clone, Default)]
pub struct SupplierDirectory {
    entries: Vec<(String, Vec<String>)>,
}

impl SupplierDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_known(suppliers: &[KnownSupplier]) -> Self {
        suppliers.iter().fold(Self::new(), |dir, s| {
            dir.with_supplier(s.name.clone(), s.aliases.iter().cloned())
        })
    }

    /// Register a vendor. The name itself always counts as an alias.
    pub fn with_supplier<I, S>(mut self, name: impl Into<String>, aliases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let name = name.into();
        let mut needles: Vec<String> = aliases
            .into_iter()
            .map(|a| a.into().to_lowercase())
            .filter(|a| !a.trim().is_empty())
            .collect();
        needles.push(name.to_lowercase());
        self.entries.push((name, needles));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// First registered vendor with an alias contained in `header` (case-insensitive).
    pub fn lookup(&self, header: &str) -> Option<&str> {
        let haystack = header.to_lowercase();
        self.entries
            .iter()
            .find(|(_, needles)| needles.iter().any(|n| haystack.contains(n.as_str())))
            .map(|(name, _)| name.as_str())
    }
}

/// Labeled supplier extractor (`Supplier: Acme Ltd`).
pub struct SupplierExtractor;

impl SupplierExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl Default for SupplierExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl FieldExtractor for SupplierExtractor {
    type Output = String;

    fn extract(&self, text: &str) -> Option<Self::Output> {
        self.extract_all(text).into_iter().next()
    }

    fn extract_all(&self, text: &str) -> Vec<Self::Output> {
        SUPPLIER_LABEL
            .captures_iter(text)
            .map(|caps| caps[1].trim().to_string())
            .filter(|name| !name.is_empty())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_by_alias() {
        let dir = SupplierDirectory::new()
            .with_supplier("Acme Trading Ltd", ["acmeshop.example"])
            .with_supplier("Northwind", Vec::<String>::new());

        assert_eq!(dir.lookup("Visit ACMESHOP.example today"), Some("Acme Trading Ltd"));
        assert_eq!(dir.lookup("NORTHWIND depot"), Some("Northwind"));
        assert_eq!(dir.lookup("unknown vendor"), None);
    }

    #[test]
    fn test_from_known() {
        let dir = SupplierDirectory::from_known(&[KnownSupplier {
            name: "Seaside Ltd".to_string(),
            aliases: vec!["seaside".to_string(), " ".to_string()],
        }]);
        assert!(!dir.is_empty());
        assert_eq!(dir.lookup("SEASIDE"), Some("Seaside Ltd"));
        assert_eq!(dir.lookup("plain text"), None);
    }

    #[test]
    fn test_labeled_supplier() {
        let extractor = SupplierExtractor::new();
        assert_eq!(
            extractor.extract("Supplier: Blue & Co.\nDate: 1/1/2024").as_deref(),
            Some("Blue & Co.")
        );
        assert_eq!(extractor.extract("no label"), None);
    }
}
