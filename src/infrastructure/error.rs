use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Network error: {0}")]
    Network(String),
    #[error("{0}")]
    Conflict(String),
    #[error("Validation failed: {0}")]
    Validation(String),
    #[error("Malformed response: {0}")]
    MalformedResponse(String),
    #[error("Unknown timezone: {0}")]
    UnknownTimezone(String),
    #[error("Invalid config: {0}")]
    InvalidConfig(String),
    #[error("Selection state unavailable: {0}")]
    StatePoisoned(String),
}

impl EngineError {
    /// Message shown to the user inline. Conflicts carry the collaborator's text verbatim.
    pub fn user_message(&self) -> String {
        match self {
            Self::Conflict(message) | Self::Validation(message) => message.clone(),
            other => other.to_string(),
        }
    }
}
