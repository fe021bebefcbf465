//! Extraction input
//!
//! OCR and text extraction happen upstream. The pipeline receives the raw
//! text plus `(label, amount)` pairs and some upload metadata, either as JSON
//! or as a `label,amount` CSV.

use std::io::Read;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};
use crate::models::RawLineItem;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItemInput {
    pub label: String,
    pub amount: Decimal,
}

/// Everything extraction hands to the pipeline for one document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionInput {
    #[serde(default)]
    pub raw_text: String,
    #[serde(default)]
    pub line_items: Vec<LineItemInput>,
    #[serde(default)]
    pub filename_hint: Option<String>,
    pub tenant_id: String,
    #[serde(default = "Utc::now")]
    pub uploaded_at: DateTime<Utc>,
}

impl ExtractionInput {
    /// Line items as immutable raw records, numbered in document order
    pub fn raw_items(&self) -> Vec<RawLineItem> {
        self.line_items
            .iter()
            .enumerate()
            .map(|(row, item)| RawLineItem {
                label: item.label.trim().to_string(),
                amount: item.amount,
                source_row: row,
            })
            .collect()
    }

    /// SHA-256 over the content that determines processing results.
    /// Upload time is left out so re-uploads of the same file deduplicate.
    pub fn content_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.tenant_id.as_bytes());
        hasher.update([0u8]);
        hasher.update(self.filename_hint.as_deref().unwrap_or("").as_bytes());
        hasher.update([0u8]);
        hasher.update(self.raw_text.as_bytes());
        for item in &self.line_items {
            hasher.update([0u8]);
            hasher.update(item.label.as_bytes());
            hasher.update([b'|']);
            hasher.update(item.amount.normalize().to_string().as_bytes());
        }
        hex::encode(hasher.finalize())
    }
}

/// Parse an amount as printed in Mexican statements: `$1,234.50`, `(500)`, `-500`
pub fn parse_amount(text: &str) -> Result<Decimal> {
    let trimmed = text.trim();
    let negative = trimmed.starts_with('(') && trimmed.ends_with(')');
    let cleaned: String = trimmed
        .chars()
        .filter(|c| !matches!(c, '$' | ',' | ' ' | '(' | ')'))
        .collect();
    let cleaned = cleaned.trim_end_matches("MXN").trim_end_matches("mxn");
    let value: Decimal = cleaned
        .parse()
        .map_err(|_| Error::InvalidData(format!("Invalid amount: '{}'", text)))?;
    Ok(if negative { -value } else { value })
}

/// Read `label,amount` rows. A header row is skipped when its amount column
/// is not numeric. Rows with an empty label are ignored.
pub fn parse_line_items_csv<R: Read>(reader: R) -> Result<Vec<LineItemInput>> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut items = Vec::new();
    for (index, record) in rdr.records().enumerate() {
        let record = record?;
        let label = record.get(0).unwrap_or("").to_string();
        let amount = record.get(1).unwrap_or("");
        if label.is_empty() {
            continue;
        }
        match parse_amount(amount) {
            Ok(amount) => items.push(LineItemInput { label, amount }),
            Err(_) if index == 0 => continue,
            Err(e) => {
                return Err(Error::InvalidData(format!("Row {}: {}", index + 1, e)));
            }
        }
    }
    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input() -> ExtractionInput {
        ExtractionInput {
            raw_text: "ESTADO DE RESULTADOS".into(),
            line_items: vec![LineItemInput {
                label: "  NOMINAS ".into(),
                amount: Decimal::new(45000, 0),
            }],
            filename_hint: None,
            tenant_id: "franquicia-1".into(),
            uploaded_at: Utc::now(),
        }
    }

    #[test]
    fn test_raw_items_trim_and_number() {
        let items = input().raw_items();
        assert_eq!(items[0].label, "NOMINAS");
        assert_eq!(items[0].source_row, 0);
    }

    #[test]
    fn test_content_hash_ignores_upload_time() {
        let a = input();
        let mut b = input();
        b.uploaded_at = a.uploaded_at - chrono::Duration::days(3);
        assert_eq!(a.content_hash(), b.content_hash());

        b.line_items[0].amount = Decimal::new(45001, 0);
        assert_ne!(a.content_hash(), b.content_hash());
    }

    #[test]
    fn test_parse_amount() {
        assert_eq!(parse_amount("$1,234.50").unwrap(), Decimal::new(123450, 2));
        assert_eq!(parse_amount("(500)").unwrap(), Decimal::new(-500, 0));
        assert_eq!(parse_amount("-12.5").unwrap(), Decimal::new(-125, 1));
        assert!(parse_amount("abc").is_err());
    }

    #[test]
    fn test_parse_csv_with_header() {
        let csv = "concepto,importe\nNOMINAS,\"$45,000.00\"\nCFE,8000\n,10\n";
        let items = parse_line_items_csv(csv.as_bytes()).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].label, "NOMINAS");
        assert_eq!(items[0].amount, Decimal::new(45000, 0));
    }

    #[test]
    fn test_parse_csv_rejects_bad_amount() {
        let csv = "NOMINAS,45000\nCFE,ocho mil\n";
        assert!(parse_line_items_csv(csv.as_bytes()).is_err());
    }

    #[test]
    fn test_json_defaults() {
        let json = r#"{"tenant_id": "t1", "line_items": [{"label": "CFE", "amount": 8000}]}"#;
        let parsed: ExtractionInput = serde_json::from_str(json).unwrap();
        assert!(parsed.raw_text.is_empty());
        assert_eq!(parsed.line_items[0].amount, Decimal::new(8000, 0));
    }
}
