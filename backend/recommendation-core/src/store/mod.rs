//! Collaborator contracts consumed by the recommendation core
//!
//! Every external dependency (post metadata, interaction history, the
//! embedding model, the shared cache and interest persistence) is passed
//! in as a trait object so request handlers stay stateless and tests can
//! swap in doubles.
//!
//! - [`memory`]: in-process implementations for tests and local runs
//! - [`postgres`]: `sqlx` implementations over the primary database
//! - [`redis_cache`]: [`Cache`] over a Redis `ConnectionManager`

pub mod memory;
pub mod postgres;
pub mod redis_cache;

use crate::error::Result;
use crate::models::{
    InteractionEvent, InteractionType, InterestKey, Post, PostId, TrendingWindow, UserId,
    UserInterest,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;

pub use memory::{
    InMemoryCache, InMemoryInteractionLog, InMemoryInterestRepository, InMemoryPostStore,
};
pub use postgres::{PgInterestRepository, PgPostStore};
pub use redis_cache::RedisCache;

/// Post metadata lookups
#[async_trait]
pub trait PostStore: Send + Sync {
    /// Posts for the given ids; unknown ids are simply absent from the result
    async fn get_by_ids(&self, ids: &[PostId]) -> Result<Vec<Post>>;

    async fn query_trending(&self, window: TrendingWindow, limit: usize) -> Result<Vec<Post>>;

    async fn query_by_interests(
        &self,
        tag_ids: &[String],
        topic_ids: &[String],
        limit: usize,
    ) -> Result<Vec<Post>>;
}

/// Recent interaction history, newest first
#[async_trait]
pub trait InteractionLog: Send + Sync {
    async fn recent(
        &self,
        user_id: UserId,
        types: &[InteractionType],
        limit: usize,
    ) -> Result<Vec<InteractionEvent>>;
}

/// Gate between the cold-start and warm retrieval paths
#[async_trait]
pub trait ActivityHistory: Send + Sync {
    async fn is_new_user(&self, user_id: UserId) -> Result<bool>;
}

/// Opaque text embedding model
#[async_trait]
pub trait EmbeddingService: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// Shared key/value cache with TTL support
#[async_trait]
pub trait Cache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;

    async fn del(&self, keys: &[String]) -> Result<()>;

    /// Atomic increment. `ttl` is applied when the increment created the key.
    async fn incr(&self, key: &str, by: i64, ttl: Option<Duration>) -> Result<i64>;
}

/// Persistence for per-user interest weights.
///
/// `apply_interaction` must be atomic per (user, key): an existing weight
/// becomes `update_interest_weight(weight, interaction, decay_factor)` and a
/// missing one is created with `initial_interest_weight(interaction)`.
#[async_trait]
pub trait InterestRepository: Send + Sync {
    async fn load_all(&self, user_id: UserId) -> Result<Vec<UserInterest>>;

    /// Batched upsert; returns the resulting rows
    async fn apply_interaction(
        &self,
        user_id: UserId,
        keys: &[InterestKey],
        interaction: InteractionType,
        decay_factor: f64,
        at: DateTime<Utc>,
    ) -> Result<Vec<UserInterest>>;

    /// Multiply every stored weight by `factor`; returns rows touched
    async fn scale_all(&self, factor: f64) -> Result<u64>;

    /// Remove weights below `threshold`; returns rows removed
    async fn prune_below(&self, threshold: f64) -> Result<u64>;
}
