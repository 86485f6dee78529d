use tracing::debug;
use serde_json::Value;
use crate::domain::{error::IngestionError, ports::DataParser};
use crate::infrastructure::parsers::{csv_parser::parse_csv, json_parser::parse_json};

#[derive(Debug, Default)]
pub struct ParserAdapter;

impl ParserAdapter {
    pub fn new() -> Self {
        Self
    }
}

impl DataParser for ParserAdapter {
    fn parse(&self, file_bytes: &[u8], file_type: &str) -> Result<Vec<Value>, IngestionError> {
        debug!("Parsing {} bytes as {}", file_bytes.len(), file_type);
        match file_type {
            "csv" => parse_csv(file_bytes),
            "json" => parse_json(file_bytes),
            other => Err(IngestionError::Parse(format!("unsupported file type '{other}'"))),
        }
    }
}
