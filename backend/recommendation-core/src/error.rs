//! Error types for the recommendation core
//!
//! Errors are returned internally as `Result<T>` and converted into
//! fallback values (cold-start results, neutral scores, skipped side
//! effects) at the public boundary of each layer.

use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RecommendationError {
    /// Postgres query or connection failure
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Redis command or connection failure
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Cached payload could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Collaborator call exceeded its time budget
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    /// Upstream collaborator reported a failure
    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<envy::Error> for RecommendationError {
    fn from(err: envy::Error) -> Self {
        RecommendationError::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, RecommendationError>;
