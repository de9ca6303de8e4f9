use std::sync::PoisonError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ModelError {

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("settings error: {0}")]
    Settings(#[from] config::ConfigError),

    #[error("serde error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("Could not find model {0} in registry")]
    UnknownModel(String),

    #[error("Record for {0} is missing its identifier column")]
    MissingId(String),

    #[error("Malformed record for {0}: expected a JSON object")]
    MalformedRecord(String),

    #[error("No URL, cannot retrieve page {0}")]
    NoUrl(i64),

    #[error("Bad response: {0}")]
    BadResponse(String),

    #[error("Fetch error: {0}")]
    Fetch(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("Custom error: {0}")]
    Custom(String),
}

impl ModelError {
    pub fn new(msg: impl Into<String>) -> Self {
        ModelError::Custom(msg.into())
    }

    pub fn fetch(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        ModelError::Fetch(Box::new(err))
    }
}

impl<T> From<PoisonError<T>> for ModelError {
    fn from(e: PoisonError<T>) -> Self {
        ModelError::Custom(format!("Poison error: {:?}", e.to_string()))
    }
}
