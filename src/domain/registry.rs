use std::collections::HashMap;
use tracing::debug;
use crate::domain::{
    error::ValidationError,
    models::ExecutionMode,
    shape::{ColumnShape, RecordShape},
};

/// A named target collection in the store.
#[derive(Debug, Clone, Copy)]
pub struct Destination {
    pub name: &'static str,
    /// Ordered columns that identify a row for upsert.
    pub conflict_key: &'static [&'static str],
    pub clearable: bool,
    pub allowed: bool,
    pub mode: ExecutionMode,
    pub shape: &'static dyn RecordShape,
}

/// Closed set of destinations. Names arriving in requests are untrusted and
/// only ever used as lookup keys into this table.
#[derive(Debug)]
pub struct DestinationRegistry {
    destinations: HashMap<&'static str, Destination>,
}

impl DestinationRegistry {
    pub fn new(destinations: impl IntoIterator<Item = Destination>) -> Self {
        let destinations: HashMap<_, _> = destinations
            .into_iter()
            .map(|destination| (destination.name, destination))
            .collect();
        debug!("Destination registry initialized with {} entries", destinations.len());
        Self { destinations }
    }

    /// The destinations compiled into the service.
    pub fn builtin() -> Self {
        Self::new(builtin_destinations())
    }

    /// Looks up a registered destination. Whether it is open for ingestion is
    /// left to the caller.
    pub fn resolve(&self, name: &str) -> Result<&Destination, ValidationError> {
        self.destinations
            .get(name)
            .ok_or_else(|| ValidationError::UnknownDestination(name.to_string()))
    }

    pub fn allowed_names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self
            .destinations
            .values()
            .filter(|d| d.allowed)
            .map(|d| d.name)
            .collect();
        names.sort_unstable();
        names
    }
}

static FISHING_REPORTS: ColumnShape = ColumnShape {
    required: &["venue", "report_date"],
    optional: &["angler", "method", "fly", "catch_count", "weather", "water_temp", "notes"],
};

static TERMINOLOGY: ColumnShape = ColumnShape {
    required: &["term"],
    optional: &["definition", "category"],
};

static FLY_PATTERNS: ColumnShape = ColumnShape {
    required: &["name"],
    optional: &["category", "hook_size", "colour", "notes"],
};

static PREDICTION_PARAMS: ColumnShape = ColumnShape {
    required: &["venue", "parameter", "value"],
    optional: &["weight", "updated_by"],
};

static VENUE_PROFILES: ColumnShape = ColumnShape {
    required: &["venue"],
    optional: &["region", "depth", "description", "lat", "lng"],
};

static VENUE_SPOTS: ColumnShape = ColumnShape {
    required: &["venue", "spot"],
    optional: &["lat", "lng", "depth", "notes"],
};

static DIARY_SESSIONS: ColumnShape = ColumnShape {
    required: &["session_id", "user_id"],
    optional: &["venue", "started_at", "ended_at", "catch_count", "notes"],
};

static USER_PROFILES: ColumnShape = ColumnShape {
    required: &["user_id"],
    optional: &["display_name"],
};

fn builtin_destinations() -> Vec<Destination> {
    vec![
        Destination {
            name: "fishing_reports",
            conflict_key: &["venue", "report_date"],
            clearable: false,
            allowed: true,
            mode: ExecutionMode::Row,
            shape: &FISHING_REPORTS,
        },
        Destination {
            name: "terminology",
            conflict_key: &["term"],
            clearable: true,
            allowed: true,
            mode: ExecutionMode::Batch,
            shape: &TERMINOLOGY,
        },
        Destination {
            name: "fly_patterns",
            conflict_key: &["name"],
            clearable: true,
            allowed: true,
            mode: ExecutionMode::Batch,
            shape: &FLY_PATTERNS,
        },
        Destination {
            name: "prediction_params",
            conflict_key: &["venue", "parameter"],
            clearable: true,
            allowed: true,
            mode: ExecutionMode::Batch,
            shape: &PREDICTION_PARAMS,
        },
        Destination {
            name: "venue_profiles",
            conflict_key: &["venue"],
            clearable: true,
            allowed: true,
            mode: ExecutionMode::Batch,
            shape: &VENUE_PROFILES,
        },
        Destination {
            name: "venue_spots",
            conflict_key: &["venue", "spot"],
            clearable: true,
            allowed: true,
            mode: ExecutionMode::Row,
            shape: &VENUE_SPOTS,
        },
        Destination {
            name: "diary_sessions",
            conflict_key: &["session_id"],
            clearable: false,
            allowed: true,
            mode: ExecutionMode::Row,
            shape: &DIARY_SESSIONS,
        },
        // Owned by the identity system's signup flow.
        Destination {
            name: "user_profiles",
            conflict_key: &["user_id"],
            clearable: false,
            allowed: false,
            mode: ExecutionMode::Row,
            shape: &USER_PROFILES,
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_known_destinations() {
        let registry = DestinationRegistry::builtin();
        let venue_profiles = registry.resolve("venue_profiles").unwrap();
        assert_eq!(venue_profiles.conflict_key, &["venue"]);
        assert!(venue_profiles.allowed);
        assert!(venue_profiles.clearable);
    }

    #[test]
    fn rejects_names_outside_the_table() {
        let registry = DestinationRegistry::builtin();
        for name in ["", "users; DROP TABLE users", "Venue_Profiles", "venue_profiles "] {
            assert_eq!(
                registry.resolve(name).unwrap_err(),
                ValidationError::UnknownDestination(name.to_string())
            );
        }
    }

    #[test]
    fn registered_but_closed_destinations_resolve_as_not_allowed() {
        let registry = DestinationRegistry::builtin();
        assert!(!registry.resolve("user_profiles").unwrap().allowed);
        assert!(!registry.allowed_names().contains(&"user_profiles"));
    }

    #[test]
    fn conflict_keys_are_required_columns() {
        let registry = DestinationRegistry::builtin();
        for name in registry.allowed_names() {
            let destination = registry.resolve(name).unwrap();
            assert!(!destination.conflict_key.is_empty(), "{name} has no conflict key");
            for column in destination.conflict_key {
                assert!(
                    destination.shape.required_columns().contains(column),
                    "{name}: conflict column {column} is not required"
                );
            }
        }
    }
}
