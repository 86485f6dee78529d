use async_trait::async_trait;
use mongodb::{
    bson::{self, doc, Bson, Document},
    Client, ClientSession, Collection,
};
use serde_json::Value;
use tracing::{debug, info, error, warn};
use crate::domain::{
    error::IngestionError,
    models::Row,
    ports::DataRepository,
    registry::Destination,
};

pub struct MongoDataRepository {
    client: Client,
    database: String,
    use_transactions: bool,
}

impl MongoDataRepository {
    /// `use_transactions` wraps multi-row upserts in a transaction, which needs
    /// a replica set or sharded cluster.
    pub fn new(client: Client, database: String, use_transactions: bool) -> Self {
        debug!("Initializing MongoDB data repository for database: {} (transactions: {})",
            database, use_transactions);
        Self { client, database, use_transactions }
    }

    fn collection(&self, destination: &Destination) -> Collection<Document> {
        self.client.database(&self.database).collection(destination.name)
    }

    /// Runs the update command inside a transaction so a failing row leaves
    /// none of the batch behind.
    async fn update_in_transaction(&self, command: Document) -> Result<Document, mongodb::error::Error> {
        let database = self.client.database(&self.database);
        let mut session: ClientSession = self.client.start_session(None).await?;
        session.start_transaction(None).await?;

        match database.run_command_with_session(command, None, &mut session).await {
            Ok(response) if write_error(&response).is_none() => {
                session.commit_transaction().await?;
                Ok(response)
            }
            outcome => {
                if let Err(abort_err) = session.abort_transaction().await {
                    warn!("Failed to abort upsert transaction on {}: {}", self.database, abort_err);
                }
                outcome
            }
        }
    }
}

/// One `update` command carrying every row as an ordered upsert statement, so
/// a later row with the same key overwrites an earlier one.
fn build_update_command(collection: &str, pairs: Vec<(Document, Document)>) -> Document {
    let updates: Vec<Bson> = pairs
        .into_iter()
        .map(|(filter, replacement)| Bson::Document(doc! {"q": filter, "u": replacement, "upsert": true}))
        .collect();
    doc! {"update": collection, "updates": updates, "ordered": true}
}

/// The first write error reported by an `update` command, if any.
fn write_error(response: &Document) -> Option<String> {
    let errors = response.get_array("writeErrors").ok()?;
    let first = errors.first()?.as_document()?;
    let index = first.get_i32("index").unwrap_or_default();
    let message = first.get_str("errmsg").unwrap_or("unknown write error");
    Some(format!("statement {index}: {message}"))
}

/// Builds the `{filter, replacement}` pair for one row. The filter holds only
/// the conflict-key columns, so it can never match rows with a different key.
fn to_upsert_pair(row: &Row, conflict_key: &[&str]) -> Result<(Document, Document), IngestionError> {
    let mut filter = Document::new();
    for column in conflict_key {
        let value = row.get(*column).unwrap_or(&Value::Null);
        if value.is_null() {
            return Err(IngestionError::Database(format!("conflict key column '{column}' is null")));
        }
        let value = bson::to_bson(value).map_err(|e| IngestionError::Database(e.to_string()))?;
        filter.insert(*column, value);
    }

    let replacement = bson::to_document(row).map_err(|e| IngestionError::Database(e.to_string()))?;
    Ok((filter, replacement))
}

#[async_trait]
impl DataRepository for MongoDataRepository {
    async fn upsert_rows(&self, destination: &Destination, rows: &[Row]) -> Result<(), IngestionError> {
        debug!("Upserting {} rows into collection: {}", rows.len(), destination.name);

        if rows.is_empty() {
            info!("No rows to upsert into {}", destination.name);
            return Ok(());
        }

        debug!("Converting {} rows to BSON", rows.len());
        let pairs = rows
            .iter()
            .enumerate()
            .map(|(i, row)| {
                to_upsert_pair(row, destination.conflict_key).map_err(|e| {
                    error!("Failed to convert row {} to BSON: {}", i, e);
                    e
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        let command = build_update_command(destination.name, pairs);

        let outcome = if self.use_transactions && rows.len() > 1 {
            self.update_in_transaction(command).await
        } else {
            self.client.database(&self.database).run_command(command, None).await
        };

        let response = outcome.map_err(|e| {
            error!("Failed to upsert rows into {}: {}", destination.name, e);
            IngestionError::Database(e.to_string())
        })?;

        if let Some(message) = write_error(&response) {
            error!("Upsert into {} stopped at a write error: {}", destination.name, message);
            return Err(IngestionError::Database(message));
        }

        info!("Upserted {} rows into collection: {}", rows.len(), destination.name);
        Ok(())
    }

    async fn delete_all(&self, destination: &Destination) -> Result<u64, IngestionError> {
        // An empty filter matches every document, including ones with null or
        // missing fields.
        let result = self
            .collection(destination)
            .delete_many(doc! {}, None)
            .await
            .map_err(|e| {
                error!("Failed to clear collection {}: {}", destination.name, e);
                IngestionError::Database(e.to_string())
            })?;

        info!("Deleted {} documents from collection: {}", result.deleted_count, destination.name);
        Ok(result.deleted_count)
    }
}
