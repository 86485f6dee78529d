use thiserror::Error;

/// Request-level problems detected before anything is written to the store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Request body is not a valid JSON object: {0}")]
    MalformedRequest(String),

    #[error("Missing required field '{0}'")]
    MissingField(&'static str),

    #[error("Field '{0}' must be an array")]
    NotAnArray(&'static str),

    #[error("Field '{field}' is invalid: {reason}")]
    InvalidField { field: &'static str, reason: String },

    #[error("Unknown destination: {0}")]
    UnknownDestination(String),

    #[error("Destination is not open for ingestion: {0}")]
    DestinationNotAllowed(String),

    #[error("Batch is empty: at least one record is required")]
    EmptyBatch,

    #[error("Destination {0} cannot be cleared before loading")]
    NotClearable(String),
}

#[derive(Error, Debug)]
pub enum IngestionError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Failed to clear destination {destination}: {message}")]
    Clear { destination: String, message: String },

    #[error("Database error: {0}")]
    Database(String),

    #[error("Identity provider error: {0}")]
    Identity(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unexpected error: {0}")]
    Unexpected(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl IngestionError {
    /// HTTP status class the error maps to when surfaced through the API.
    pub fn status_code(&self) -> u16 {
        match self {
            IngestionError::Validation(_) => 400,
            _ => 500,
        }
    }

    /// Message safe to return to a client. Unexpected faults stay generic;
    /// their detail only goes to the server log.
    pub fn public_message(&self) -> String {
        match self {
            IngestionError::Validation(e) => e.to_string(),
            IngestionError::Clear { destination, .. } => {
                format!("Failed to clear destination {destination}; nothing was loaded")
            }
            IngestionError::Config(message) => format!("Service misconfigured: {message}"),
            _ => "Internal server error".to_string(),
        }
    }
}
