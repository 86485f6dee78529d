use serde::{Deserialize, Serialize};
use serde_json::Value;
use crate::domain::registry::Destination;

/// One store row, keyed by column name.
pub type Row = serde_json::Map<String, Value>;

/// How a batch is written to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// One upsert call for the whole batch; it succeeds or fails as a unit.
    Batch,
    /// One upsert per record; failures are isolated and reported by index.
    Row,
}

impl ExecutionMode {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "batch" => Some(ExecutionMode::Batch),
            "row" => Some(ExecutionMode::Row),
            _ => None,
        }
    }
}

/// A validated request, ready for execution.
#[derive(Debug, Clone)]
pub struct IngestionBatch {
    pub destination: Destination,
    pub records: Vec<Value>,
    pub clear_first: bool,
    pub mode: ExecutionMode,
}

/// Outcome of a batch, as returned to the caller.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestionResult {
    pub succeeded: usize,
    pub failed: usize,
    pub errors: Vec<String>,
    /// The destination was emptied for this request. With `succeeded == 0`
    /// it means the destination is now empty.
    pub cleared: bool,
}

/// A test account to create in the identity system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountEntry {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

/// Error body returned on validation or fatal failures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}
