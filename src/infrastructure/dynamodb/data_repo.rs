use std::collections::HashMap;
use async_trait::async_trait;
use aws_sdk_dynamodb::{Client, types::AttributeValue};
use serde_json::Value;
use tracing::{debug, info, error};
use crate::domain::{
    error::IngestionError,
    models::Row,
    ports::DataRepository,
    registry::Destination,
};

/// DynamoDB tables are named after their destination, and their primary key
/// must be the destination's conflict key. `put_item` then overwrites any item
/// with the same key, which is the upsert contract.
pub struct DynamoDataRepository {
    client: Client,
}

impl DynamoDataRepository {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

fn to_attribute_value(value: &Value) -> AttributeValue {
    match value {
        Value::Null => AttributeValue::Null(true),
        Value::Bool(b) => AttributeValue::Bool(*b),
        Value::Number(n) => AttributeValue::N(n.to_string()),
        Value::String(s) => AttributeValue::S(s.clone()),
        Value::Array(items) => AttributeValue::L(items.iter().map(to_attribute_value).collect()),
        Value::Object(obj) => AttributeValue::M(
            obj.iter()
                .map(|(key, value)| (key.clone(), to_attribute_value(value)))
                .collect(),
        ),
    }
}

fn to_item(row: &Row, conflict_key: &[&str]) -> Result<HashMap<String, AttributeValue>, IngestionError> {
    for column in conflict_key {
        if row.get(*column).map_or(true, Value::is_null) {
            return Err(IngestionError::Database(format!("key attribute '{column}' is missing or null")));
        }
    }
    Ok(row
        .iter()
        .map(|(key, value)| (key.clone(), to_attribute_value(value)))
        .collect())
}

#[async_trait]
impl DataRepository for DynamoDataRepository {
    async fn upsert_rows(&self, destination: &Destination, rows: &[Row]) -> Result<(), IngestionError> {
        debug!("Putting {} items into table: {}", rows.len(), destination.name);

        let items = rows
            .iter()
            .map(|row| to_item(row, destination.conflict_key))
            .collect::<Result<Vec<_>, _>>()?;

        // One put per item. BatchWriteItem and TransactWriteItems both reject
        // a request holding two items with the same key, and a batch may repeat
        // a key. A failure part way leaves the earlier items written.
        for item in items {
            self.client
                .put_item()
                .table_name(destination.name)
                .set_item(Some(item))
                .send()
                .await
                .map_err(|e| {
                    error!("Failed to put item into {}: {}", destination.name, e);
                    IngestionError::Database(e.to_string())
                })?;
        }

        info!("Put {} items into table: {}", rows.len(), destination.name);
        Ok(())
    }

    async fn delete_all(&self, destination: &Destination) -> Result<u64, IngestionError> {
        // Full scan of the key attributes; no filter expression, so items with
        // null or missing non-key attributes are still matched.
        let names: HashMap<String, String> = destination
            .conflict_key
            .iter()
            .enumerate()
            .map(|(i, column)| (format!("#k{i}"), column.to_string()))
            .collect();
        let projection = (0..destination.conflict_key.len())
            .map(|i| format!("#k{i}"))
            .collect::<Vec<_>>()
            .join(", ");

        let mut deleted = 0u64;
        let mut start_key: Option<HashMap<String, AttributeValue>> = None;

        loop {
            let page = self.client
                .scan()
                .table_name(destination.name)
                .projection_expression(&projection)
                .set_expression_attribute_names(Some(names.clone()))
                .set_exclusive_start_key(start_key.take())
                .send()
                .await
                .map_err(|e| {
                    error!("Failed to scan {}: {}", destination.name, e);
                    IngestionError::Database(e.to_string())
                })?;

            for key in page.items() {
                self.client
                    .delete_item()
                    .table_name(destination.name)
                    .set_key(Some(key.clone()))
                    .send()
                    .await
                    .map_err(|e| {
                        error!("Failed to delete item from {}: {}", destination.name, e);
                        IngestionError::Database(e.to_string())
                    })?;
                deleted += 1;
            }

            match page.last_evaluated_key() {
                Some(key) if !key.is_empty() => start_key = Some(key.clone()),
                _ => break,
            }
            debug!("Deleted {} items from {} so far", deleted, destination.name);
        }

        info!("Deleted {} items from table: {}", deleted, destination.name);
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn converts_nested_values() {
        let value = json!({"depth": 2.5, "tags": ["reservoir", true], "notes": null});
        let AttributeValue::M(map) = to_attribute_value(&value) else {
            panic!("expected a map");
        };
        assert_eq!(map["depth"], AttributeValue::N("2.5".into()));
        assert_eq!(
            map["tags"],
            AttributeValue::L(vec![AttributeValue::S("reservoir".into()), AttributeValue::Bool(true)])
        );
        assert_eq!(map["notes"], AttributeValue::Null(true));
    }

    #[test]
    fn items_need_their_key_attributes() {
        let row = json!({"venue": "A"}).as_object().cloned().unwrap();
        assert!(to_item(&row, &["venue"]).is_ok());
        assert!(to_item(&row, &["venue", "spot"]).is_err());
    }
}
