use csv::ReaderBuilder;
use std::io::Cursor;
use serde_json::{Map, Value};
use tracing::{debug, info, error};
use crate::domain::error::IngestionError;

/// Parses a CSV file with a header row into one record per line. Every field
/// stays a string; empty fields become `null` so the store sees them as absent.
pub fn parse_csv(bytes: &[u8]) -> Result<Vec<Value>, IngestionError> {
    debug!("Creating CSV reader with headers enabled");
    let cursor = Cursor::new(bytes);
    let mut reader = ReaderBuilder::new().has_headers(true).trim(csv::Trim::All).from_reader(cursor);

    let headers = reader.headers()
        .map_err(|e| {
            error!("Failed to read CSV headers: {}", e);
            IngestionError::Parse(e.to_string())
        })?.clone();

    debug!("CSV headers: {:?}", headers);
    info!("Found {} columns in CSV", headers.len());

    let mut records = Vec::new();

    for (row_count, record) in reader.records().enumerate() {
        let record = record.map_err(|e| {
            error!("Failed to read CSV record at row {}: {}", row_count + 1, e);
            IngestionError::Parse(format!("row {}: {}", row_count + 1, e))
        })?;

        let mut doc = Map::new();
        for (header, field) in headers.iter().zip(record.iter()) {
            let value = if field.is_empty() {
                Value::Null
            } else {
                Value::String(field.to_string())
            };
            doc.insert(header.to_string(), value);
        }
        records.push(Value::Object(doc));

        if (row_count + 1) % 1000 == 0 {
            debug!("Processed {} CSV rows", row_count + 1);
        }
    }

    info!("Parsed {} rows from CSV", records.len());
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn maps_headers_to_fields_and_blanks_to_null() {
        let records = parse_csv(b"term,definition,category\ndun,subimago,\nspinner, imago ,stage\n").unwrap();
        assert_eq!(
            records,
            vec![
                json!({"term": "dun", "definition": "subimago", "category": null}),
                json!({"term": "spinner", "definition": "imago", "category": "stage"}),
            ]
        );
    }

    #[test]
    fn ragged_rows_are_a_parse_error() {
        let err = parse_csv(b"a,b\n1,2,3\n").unwrap_err();
        assert!(matches!(err, IngestionError::Parse(ref m) if m.starts_with("row 1")));
    }
}
