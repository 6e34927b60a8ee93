//! Result formatting shared by `parse`, `batch` and `request`.

use waybill_core::acquisition::Attempt;
use waybill_core::models::document::ParseResult;

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    /// JSON output
    Json,
    /// CSV of line items
    Csv,
    /// Plain text summary
    Text,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Json => "json",
            OutputFormat::Csv => "csv",
            OutputFormat::Text => "txt",
        }
    }
}

pub fn format_result(result: &ParseResult, format: OutputFormat) -> anyhow::Result<String> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string(result)?),
        OutputFormat::Csv => format_csv(result),
        OutputFormat::Text => Ok(format_text(result)),
    }
}

fn format_csv(result: &ParseResult) -> anyhow::Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);

    wtr.write_record([
        "page",
        "description",
        "barcode",
        "qty",
        "unit_price",
        "line_total",
        "discount_pct",
    ])?;

    for line in &result.lines {
        wtr.write_record([
            &line.page.map(|p| p.to_string()).unwrap_or_default(),
            &line.description,
            line.barcode.as_deref().unwrap_or(""),
            &line.qty.to_string(),
            &line.unit_price.to_string(),
            &line.line_total.to_string(),
            &line.discount_pct.map(|d| d.to_string()).unwrap_or_default(),
        ])?;
    }

    let data = String::from_utf8(wtr.into_inner()?)?;
    Ok(data)
}

fn format_text(result: &ParseResult) -> String {
    let mut output = String::new();

    let field = |value: Option<String>| value.unwrap_or_else(|| "-".to_string());

    output.push_str(&format!("Parser: {}\n", field(result.parser.map(|p| p.to_string()))));
    output.push_str(&format!(
        "Text source: {}\n",
        field(result.text_source.map(|s| s.to_string()))
    ));
    output.push_str(&format!("Supplier: {}\n", field(result.supplier_name.clone())));
    output.push_str(&format!("Invoice: {}\n", field(result.invoice_number.clone())));
    output.push_str(&format!("Date: {}\n", field(result.date.map(|d| d.to_string()))));

    let header = &result.header;
    if !header.is_empty() {
        output.push('\n');
        for (label, value) in [
            ("Serie/Cash/Num", &header.serie_cash_num),
            ("Source warehouse", &header.source_warehouse),
            ("Destination", &header.destination_location),
            ("Transport", &header.date_hour_transport),
        ] {
            if let Some(value) = value {
                output.push_str(&format!("{}: {}\n", label, value));
            }
        }
    }

    output.push_str(&format!("\nLines ({}):\n", result.lines.len()));
    for line in &result.lines {
        output.push_str(&format!(
            "  {:<40} {:>14} {:>6} x {:>10} = {:>12}\n",
            line.description,
            line.barcode.as_deref().unwrap_or(""),
            line.qty,
            line.unit_price,
            line.line_total
        ));
    }

    output.push_str(&format!("\nTotal: {}\n", field(result.total.map(|t| t.to_string()))));
    if let Some(qty) = result.reported_quantity {
        output.push_str(&format!("Reported quantity: {}\n", qty));
    }

    for warning in &result.warnings {
        output.push_str(&format!("Warning: {}\n", warning));
    }

    output
}

/// One line per acquisition attempt, for `--explain`.
pub fn format_attempts(attempts: &[Attempt]) -> String {
    attempts
        .iter()
        .enumerate()
        .map(|(i, a)| {
            let strategy = a.strategy.to_string();
            format!("{}. {:<20} {} ({} chars)", i + 1, strategy, a.outcome, a.chars)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use waybill_core::models::document::LineItem;

    fn sample() -> ParseResult {
        let mut result = ParseResult::empty("raw");
        result.lines.push(
            LineItem::new(
                "WIDGET, LARGE",
                "3".parse().unwrap(),
                "10.00".parse().unwrap(),
                "30.00".parse().unwrap(),
            )
            .with_barcode(Some("12345678".into()))
            .with_page(2),
        );
        result.total = Some("30.00".parse().unwrap());
        result
    }

    #[test]
    fn test_csv_quotes_descriptions() {
        let csv = format_result(&sample(), OutputFormat::Csv).unwrap();
        let mut lines = csv.lines();
        assert_eq!(
            lines.next(),
            Some("page,description,barcode,qty,unit_price,line_total,discount_pct")
        );
        assert_eq!(lines.next(), Some("2,\"WIDGET, LARGE\",12345678,3,10.00,30.00,"));
    }

    #[test]
    fn test_text_marks_missing_fields() {
        let text = format_result(&sample(), OutputFormat::Text).unwrap();
        assert!(text.contains("Invoice: -"));
        assert!(text.contains("Lines (1):"));
        assert!(text.contains("Total: 30.00"));
    }
}
