use std::fmt::Debug;
use serde_json::Value;
use crate::domain::models::Row;

/// Per-destination record capability. The registry picks the shape, so
/// records are never sniffed at runtime to decide where they belong.
pub trait RecordShape: Debug + Send + Sync {
    /// Columns that must be present and non-null in every record.
    fn required_columns(&self) -> &[&'static str];

    fn validate_shape(&self, record: &Value) -> Result<(), String>;

    /// Turn a record into the row handed to the store.
    fn to_upsert_row(&self, record: &Value) -> Result<Row, String>;
}

/// Shape described by column lists.
///
/// Declared optional columns that a record leaves out are written as `null`, so
/// an upsert overwrites them instead of keeping stale values from a previous load.
/// Undeclared columns pass through untouched.
#[derive(Debug, Clone, Copy)]
pub struct ColumnShape {
    pub required: &'static [&'static str],
    pub optional: &'static [&'static str],
}

impl RecordShape for ColumnShape {
    fn required_columns(&self) -> &[&'static str] {
        self.required
    }

    fn validate_shape(&self, record: &Value) -> Result<(), String> {
        let obj = record
            .as_object()
            .ok_or_else(|| format!("record must be an object, got {}", type_name(record)))?;

        for column in self.required {
            match obj.get(*column) {
                None => return Err(format!("missing required column '{column}'")),
                Some(Value::Null) => return Err(format!("required column '{column}' is null")),
                Some(_) => {}
            }
        }
        Ok(())
    }

    fn to_upsert_row(&self, record: &Value) -> Result<Row, String> {
        self.validate_shape(record)?;

        let mut row = record.as_object().cloned().unwrap_or_default();
        for column in self.optional {
            row.entry(column.to_string()).or_insert(Value::Null);
        }
        Ok(row)
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
