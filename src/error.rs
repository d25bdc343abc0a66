use thiserror::Error;

/// Errors raised by the external collaborators (directory, database, cache)
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Schema mismatch in {entity}: {detail}")]
    Schema { entity: &'static str, detail: String },

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    pub fn schema(entity: &'static str, detail: impl Into<String>) -> Self {
        StoreError::Schema {
            entity,
            detail: detail.into(),
        }
    }
}

/// Errors raised by the advisory capability. Never fatal to a run.
#[derive(Debug, Error)]
pub enum AdvisoryError {
    #[error("Advisory service unavailable: {0}")]
    Unavailable(String),

    #[error("Advisory call timed out after {0} ms")]
    Timeout(u64),

    #[error("Invalid advisory response: {0}")]
    InvalidResponse(String),
}

/// Errors surfaced by the recommendation engine
#[derive(Debug, Error)]
pub enum RecommendationError {
    #[error("Request not found: {0}")]
    RequestNotFound(String),

    #[error("Invalid recommendation config: {0}")]
    InvalidConfig(String),

    #[error("Sanitization violation: {0}")]
    SanitizationViolation(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

pub type RecommendationResult<T> = Result<T, RecommendationError>;
