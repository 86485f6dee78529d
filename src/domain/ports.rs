use async_trait::async_trait;
use serde_json::Value;
use crate::domain::{
    error::IngestionError,
    models::{AccountEntry, Row},
    registry::Destination,
};

#[async_trait]
pub trait DataRepository: Send + Sync {
    /// Insert each row, or overwrite the stored row whose `destination.conflict_key`
    /// columns hold the same values. Later rows in `rows` win over earlier ones.
    async fn upsert_rows(&self, destination: &Destination, rows: &[Row]) -> Result<(), IngestionError>;

    /// Remove every row in the destination, returning how many were deleted.
    async fn delete_all(&self, destination: &Destination) -> Result<u64, IngestionError>;
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn create_account(&self, entry: &AccountEntry) -> Result<(), IngestionError>;
}

pub trait DataParser: Send + Sync {
    fn parse(&self, file_bytes: &[u8], file_type: &str) -> Result<Vec<Value>, IngestionError>;
}
