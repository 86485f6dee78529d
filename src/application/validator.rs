use serde_json::{Map, Value};
use tracing::debug;
use crate::domain::{
    error::ValidationError,
    models::{ExecutionMode, IngestionBatch},
    registry::DestinationRegistry,
};

/// Parses a raw request body. Anything that is not JSON is a malformed request.
pub fn parse_body(body: &[u8]) -> Result<Value, ValidationError> {
    serde_json::from_slice(body).map_err(|e| ValidationError::MalformedRequest(e.to_string()))
}

/// Checks an ingestion request before anything touches the store, in order:
/// object shape, destination, records array, non-empty batch, flags.
pub fn validate(
    registry: &DestinationRegistry,
    request: Value,
) -> Result<IngestionBatch, ValidationError> {
    let Value::Object(mut request) = request else {
        return Err(ValidationError::MalformedRequest(
            "expected a JSON object".to_string(),
        ));
    };

    let name = match request.get("destination") {
        None | Some(Value::Null) => return Err(ValidationError::MissingField("destination")),
        Some(Value::String(name)) => name.as_str(),
        Some(_) => {
            return Err(ValidationError::InvalidField {
                field: "destination",
                reason: "must be a string".to_string(),
            })
        }
    };
    let destination = *registry.resolve(name)?;
    if !destination.allowed {
        return Err(ValidationError::DestinationNotAllowed(name.to_string()));
    }

    let records = take_array(&mut request, "records")?;

    let clear_first = match request.get("clearFirst") {
        None | Some(Value::Null) => false,
        Some(Value::Bool(flag)) => *flag,
        Some(_) => {
            return Err(ValidationError::InvalidField {
                field: "clearFirst",
                reason: "must be a boolean".to_string(),
            })
        }
    };
    if clear_first && !destination.clearable {
        return Err(ValidationError::NotClearable(destination.name.to_string()));
    }

    let mode = match request.get("mode") {
        None | Some(Value::Null) => destination.mode,
        Some(Value::String(mode)) => {
            ExecutionMode::parse(mode).ok_or_else(|| ValidationError::InvalidField {
                field: "mode",
                reason: format!("expected \"batch\" or \"row\", got \"{mode}\""),
            })?
        }
        Some(_) => {
            return Err(ValidationError::InvalidField {
                field: "mode",
                reason: "must be a string".to_string(),
            })
        }
    };

    debug!(
        "Validated batch of {} records for {} (mode: {:?}, clear_first: {})",
        records.len(),
        destination.name,
        mode,
        clear_first
    );

    Ok(IngestionBatch {
        destination,
        records,
        clear_first,
        mode,
    })
}

/// Validates an account provisioning request and returns its entries.
pub fn validate_accounts(request: Value) -> Result<Vec<Value>, ValidationError> {
    let Value::Object(mut request) = request else {
        return Err(ValidationError::MalformedRequest(
            "expected a JSON object".to_string(),
        ));
    };
    take_array(&mut request, "accounts")
}

fn take_array(request: &mut Map<String, Value>, field: &'static str) -> Result<Vec<Value>, ValidationError> {
    match request.remove(field) {
        None | Some(Value::Null) => Err(ValidationError::MissingField(field)),
        Some(Value::Array(items)) if items.is_empty() => Err(ValidationError::EmptyBatch),
        Some(Value::Array(items)) => Ok(items),
        Some(_) => Err(ValidationError::NotAnArray(field)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn registry() -> DestinationRegistry {
        DestinationRegistry::builtin()
    }

    #[test]
    fn accepts_a_well_formed_request() {
        let batch = validate(
            &registry(),
            json!({"destination": "venue_profiles", "records": [{"venue": "A"}], "clearFirst": true}),
        )
        .unwrap();
        assert_eq!(batch.destination.name, "venue_profiles");
        assert_eq!(batch.records.len(), 1);
        assert!(batch.clear_first);
        assert_eq!(batch.mode, ExecutionMode::Batch);
    }

    #[test]
    fn rejects_bodies_that_are_not_json_objects() {
        assert!(matches!(
            parse_body(b"{not json"),
            Err(ValidationError::MalformedRequest(_))
        ));
        assert!(matches!(
            validate(&registry(), json!([1, 2, 3])),
            Err(ValidationError::MalformedRequest(_))
        ));
    }

    #[test]
    fn names_the_unknown_destination() {
        let err = validate(&registry(), json!({"destination": "weather_cache", "records": [{}]}))
            .unwrap_err();
        assert_eq!(err, ValidationError::UnknownDestination("weather_cache".into()));
        assert!(err.to_string().contains("weather_cache"));
    }

    #[test]
    fn rejects_registered_destinations_that_are_closed() {
        let err = validate(&registry(), json!({"destination": "user_profiles", "records": [{}]}))
            .unwrap_err();
        assert_eq!(err, ValidationError::DestinationNotAllowed("user_profiles".into()));
    }

    #[test]
    fn destination_is_checked_before_records() {
        let err = validate(&registry(), json!({"destination": "nope"})).unwrap_err();
        assert_eq!(err, ValidationError::UnknownDestination("nope".into()));
        let err = validate(&registry(), json!({"records": []})).unwrap_err();
        assert_eq!(err, ValidationError::MissingField("destination"));
    }

    #[test]
    fn records_must_be_a_non_empty_array() {
        let r = registry();
        assert_eq!(
            validate(&r, json!({"destination": "terminology"})).unwrap_err(),
            ValidationError::MissingField("records")
        );
        assert_eq!(
            validate(&r, json!({"destination": "terminology", "records": {"term": "dun"}}))
                .unwrap_err(),
            ValidationError::NotAnArray("records")
        );
        assert_eq!(
            validate(&r, json!({"destination": "terminology", "records": []})).unwrap_err(),
            ValidationError::EmptyBatch
        );
    }

    #[test]
    fn clear_first_requires_a_clearable_destination() {
        let err = validate(
            &registry(),
            json!({"destination": "fishing_reports", "records": [{}], "clearFirst": true}),
        )
        .unwrap_err();
        assert_eq!(err, ValidationError::NotClearable("fishing_reports".into()));
    }

    #[test]
    fn mode_override_is_parsed() {
        let batch = validate(
            &registry(),
            json!({"destination": "venue_profiles", "records": [{}], "mode": "row"}),
        )
        .unwrap();
        assert_eq!(batch.mode, ExecutionMode::Row);

        let err = validate(
            &registry(),
            json!({"destination": "venue_profiles", "records": [{}], "mode": "parallel"}),
        )
        .unwrap_err();
        assert!(matches!(err, ValidationError::InvalidField { field: "mode", .. }));
    }

    #[test]
    fn account_requests_need_a_non_empty_list() {
        assert_eq!(validate_accounts(json!({})).unwrap_err(), ValidationError::MissingField("accounts"));
        assert_eq!(
            validate_accounts(json!({"accounts": []})).unwrap_err(),
            ValidationError::EmptyBatch
        );
        assert_eq!(validate_accounts(json!({"accounts": [{}]})).unwrap().len(), 1);
    }
}
