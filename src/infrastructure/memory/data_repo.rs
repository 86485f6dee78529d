use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;
use crate::domain::{
    error::IngestionError,
    models::Row,
    ports::DataRepository,
    registry::Destination,
};

/// Process-local store keyed by destination name. Backs `DATABASE_TYPE=memory`
/// dry runs and the service tests.
#[derive(Debug, Default)]
pub struct InMemoryDataRepository {
    tables: Mutex<HashMap<String, Vec<Row>>>,
    upsert_calls: AtomicUsize,
    delete_calls: AtomicUsize,
}

impl InMemoryDataRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rows(destination: &str, rows: Vec<Row>) -> Self {
        let repo = Self::default();
        if let Ok(mut tables) = repo.tables.lock() {
            tables.insert(destination.to_string(), rows);
        }
        repo
    }

    /// Snapshot of a destination's rows in insertion order.
    pub fn rows(&self, destination: &str) -> Vec<Row> {
        self.tables
            .lock()
            .map(|tables| tables.get(destination).cloned().unwrap_or_default())
            .unwrap_or_default()
    }

    pub fn upsert_calls(&self) -> usize {
        self.upsert_calls.load(Ordering::SeqCst)
    }

    pub fn delete_calls(&self) -> usize {
        self.delete_calls.load(Ordering::SeqCst)
    }

    pub fn write_calls(&self) -> usize {
        self.upsert_calls() + self.delete_calls()
    }
}

fn key_values<'r>(row: &'r Row, conflict_key: &[&str]) -> Result<Vec<&'r Value>, IngestionError> {
    conflict_key
        .iter()
        .map(|column| match row.get(*column) {
            Some(Value::Null) | None => Err(IngestionError::Database(format!(
                "null value in column \"{column}\" violates not-null constraint"
            ))),
            Some(value) => Ok(value),
        })
        .collect()
}

#[async_trait]
impl DataRepository for InMemoryDataRepository {
    async fn upsert_rows(&self, destination: &Destination, rows: &[Row]) -> Result<(), IngestionError> {
        self.upsert_calls.fetch_add(1, Ordering::SeqCst);

        // Reject the whole call before touching the table.
        for row in rows {
            key_values(row, destination.conflict_key)?;
        }

        let mut tables = self
            .tables
            .lock()
            .map_err(|e| IngestionError::Database(e.to_string()))?;
        let table = tables.entry(destination.name.to_string()).or_default();

        for row in rows {
            let key = key_values(row, destination.conflict_key)?;
            let existing = table.iter().position(|stored| {
                key_values(stored, destination.conflict_key).is_ok_and(|stored_key| stored_key == key)
            });
            match existing {
                Some(position) => table[position] = row.clone(),
                None => table.push(row.clone()),
            }
        }

        debug!("Upserted {} rows into in-memory {}", rows.len(), destination.name);
        Ok(())
    }

    async fn delete_all(&self, destination: &Destination) -> Result<u64, IngestionError> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);

        let mut tables = self
            .tables
            .lock()
            .map_err(|e| IngestionError::Database(e.to_string()))?;
        let deleted = tables
            .remove(destination.name)
            .map(|rows| rows.len() as u64)
            .unwrap_or(0);

        debug!("Deleted {} rows from in-memory {}", deleted, destination.name);
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::registry::DestinationRegistry;
    use serde_json::json;

    fn row(value: Value) -> Row {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn later_rows_win_on_the_same_key() {
        let registry = DestinationRegistry::builtin();
        let destination = registry.resolve("venue_profiles").unwrap();
        let repo = InMemoryDataRepository::new();

        repo.upsert_rows(
            destination,
            &[row(json!({"venue": "A", "depth": 1})), row(json!({"venue": "A", "depth": 2}))],
        )
        .await
        .unwrap();

        let rows = repo.rows("venue_profiles");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["depth"], json!(2));
    }

    #[tokio::test]
    async fn composite_keys_match_on_every_column() {
        let registry = DestinationRegistry::builtin();
        let destination = registry.resolve("venue_spots").unwrap();
        let repo = InMemoryDataRepository::new();

        repo.upsert_rows(
            destination,
            &[
                row(json!({"venue": "A", "spot": "pier"})),
                row(json!({"venue": "B", "spot": "pier"})),
                row(json!({"venue": "A", "spot": "pier", "depth": 3})),
            ],
        )
        .await
        .unwrap();

        let rows = repo.rows("venue_spots");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["depth"], json!(3));
    }

    #[tokio::test]
    async fn null_keys_reject_the_whole_call() {
        let registry = DestinationRegistry::builtin();
        let destination = registry.resolve("venue_profiles").unwrap();
        let repo = InMemoryDataRepository::new();

        let result = repo
            .upsert_rows(destination, &[row(json!({"venue": "A"})), row(json!({"venue": null}))])
            .await;

        assert!(matches!(result, Err(IngestionError::Database(_))));
        assert!(repo.rows("venue_profiles").is_empty());
    }

    #[tokio::test]
    async fn delete_all_removes_every_row() {
        let registry = DestinationRegistry::builtin();
        let destination = registry.resolve("terminology").unwrap();
        let repo = InMemoryDataRepository::with_rows(
            "terminology",
            vec![row(json!({"term": "dun"})), row(json!({"term": null}))],
        );

        assert_eq!(repo.delete_all(destination).await.unwrap(), 2);
        assert!(repo.rows("terminology").is_empty());
    }
}
