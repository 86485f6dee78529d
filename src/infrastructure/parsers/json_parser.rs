use serde_json::Value;
use tracing::{debug, error};
use crate::domain::error::IngestionError;

/// Parses a JSON file holding an array of records.
pub fn parse_json(bytes: &[u8]) -> Result<Vec<Value>, IngestionError> {
    let value: Value = serde_json::from_slice(bytes).map_err(|e| {
        error!("Failed to parse JSON file: {}", e);
        IngestionError::Parse(e.to_string())
    })?;

    match value {
        Value::Array(records) => {
            debug!("Parsed {} records from JSON", records.len());
            Ok(records)
        }
        other => Err(IngestionError::Parse(format!(
            "expected a JSON array of records, found {}",
            if other.is_object() { "an object" } else { "a scalar" }
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_arrays_only() {
        assert_eq!(parse_json(br#"[{"venue": "A"}, {"venue": "B"}]"#).unwrap().len(), 2);
        assert!(parse_json(br#"{"venue": "A"}"#).is_err());
        assert!(parse_json(b"[").is_err());
    }
}
