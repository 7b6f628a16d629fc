//! Cached recommendation lists
//!
//! TTL tiers:
//! - personalized lists: minutes (interest weights move on every interaction)
//! - cold-start segments: hours, one per trending window
//!
//! Keys:
//! - recommendations:{user_id}             → serialized Vec<RankedResult>
//! - recommendations:cold:{window}         → serialized Vec<RankedResult>
//! - interests:version:{user_id}           → counter bumped on interest change
//! - embedding:user:{user_id}              → serialized user embedding
//! - trending:{window}                     → serialized Vec<Post>
//! - jobs:interest_decay:{bucket}          → run guard for the decay job
//!
//! Every operation is best-effort: cache failures are logged and read as a miss.

use crate::config::CacheConfig;
use crate::error::Result;
use crate::models::{RankedResult, TrendingWindow, UserId};
use crate::store::Cache;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

pub mod keys {
    use crate::models::{TrendingWindow, UserId};

    pub fn recommendations(user_id: UserId) -> String {
        format!("recommendations:{}", user_id)
    }

    pub fn cold_recommendations(window: TrendingWindow) -> String {
        format!("recommendations:cold:{}", window)
    }

    pub fn interest_version(user_id: UserId) -> String {
        format!("interests:version:{}", user_id)
    }

    pub fn user_embedding(user_id: UserId) -> String {
        format!("embedding:user:{}", user_id)
    }

    pub fn trending(window: TrendingWindow) -> String {
        format!("trending:{}", window)
    }

    pub fn decay_guard(bucket: &str) -> String {
        format!("jobs:interest_decay:{}", bucket)
    }
}

#[derive(Clone)]
pub struct RecommendationCache {
    cache: Arc<dyn Cache>,
    config: CacheConfig,
}

impl RecommendationCache {
    pub fn new(cache: Arc<dyn Cache>, config: CacheConfig) -> Self {
        Self { cache, config }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Cached list for a user, or `None` on miss, expiry or cache failure
    pub async fn get(&self, user_id: UserId) -> Option<Vec<RankedResult>> {
        self.read(&keys::recommendations(user_id)).await
    }

    pub async fn put(&self, user_id: UserId, results: &[RankedResult], ttl: Duration) -> bool {
        self.write(&keys::recommendations(user_id), results, ttl).await
    }

    /// Store only if no interest change landed since `version` was read
    pub async fn put_if_current(
        &self,
        user_id: UserId,
        results: &[RankedResult],
        ttl: Duration,
        version: i64,
    ) -> bool {
        let current = self.interest_version(user_id).await;
        if current != version {
            debug!(
                user_id = %user_id,
                started_at_version = version,
                current_version = current,
                "Skipping stale recommendation write"
            );
            return false;
        }
        self.put(user_id, results, ttl).await
    }

    /// Drop the user's cached list and cached embedding
    pub async fn invalidate(&self, user_id: UserId) {
        let doomed = vec![
            keys::recommendations(user_id),
            keys::user_embedding(user_id),
        ];
        if let Err(e) = self.cache.del(&doomed).await {
            warn!(user_id = %user_id, error = %e, "Failed to invalidate recommendations");
        }
    }

    /// Bump the interest version counter; `None` if the cache is unreachable
    pub async fn bump_interest_version(&self, user_id: UserId) -> Option<i64> {
        match self.cache.incr(&keys::interest_version(user_id), 1, None).await {
            Ok(v) => Some(v),
            Err(e) => {
                warn!(user_id = %user_id, error = %e, "Failed to bump interest version");
                None
            }
        }
    }

    /// Current interest version; 0 when never bumped or unreadable
    pub async fn interest_version(&self, user_id: UserId) -> i64 {
        match self.cache.get(&keys::interest_version(user_id)).await {
            Ok(Some(raw)) => raw.parse().unwrap_or(0),
            Ok(None) => 0,
            Err(e) => {
                debug!(user_id = %user_id, error = %e, "Interest version unreadable");
                0
            }
        }
    }

    pub async fn get_cold(&self, window: TrendingWindow) -> Option<Vec<RankedResult>> {
        self.read(&keys::cold_recommendations(window)).await
    }

    pub async fn put_cold(&self, window: TrendingWindow, results: &[RankedResult]) -> bool {
        let ttl = self.config.trending_ttl(window);
        self.write(&keys::cold_recommendations(window), results, ttl)
            .await
    }

    pub async fn invalidate_cold(&self, window: TrendingWindow) {
        if let Err(e) = self.cache.del(&[keys::cold_recommendations(window)]).await {
            warn!(window = %window, error = %e, "Failed to invalidate cold-start segment");
        }
    }

    /// Claim a run guard. `Ok(false)` means another run already holds it.
    pub async fn try_acquire_guard(&self, key: &str, ttl: Duration) -> Result<bool> {
        let holders = self.cache.incr(key, 1, Some(ttl)).await?;
        Ok(holders == 1)
    }

    pub async fn release_guard(&self, key: &str) {
        if let Err(e) = self.cache.del(&[key.to_string()]).await {
            warn!(key, error = %e, "Failed to release run guard");
        }
    }

    async fn read(&self, key: &str) -> Option<Vec<RankedResult>> {
        match self.try_read(key).await {
            Ok(Some(results)) => {
                let now = Utc::now();
                if results.iter().any(|r| r.expires_at <= now) {
                    debug!(key, "Cached recommendations expired");
                    return None;
                }
                debug!(key, count = results.len(), "Recommendation cache hit");
                Some(results)
            }
            Ok(None) => {
                debug!(key, "Recommendation cache miss");
                None
            }
            Err(e) => {
                warn!(key, error = %e, "Recommendation cache read failed");
                None
            }
        }
    }

    async fn try_read(&self, key: &str) -> Result<Option<Vec<RankedResult>>> {
        match self.cache.get(key).await? {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn write(&self, key: &str, results: &[RankedResult], ttl: Duration) -> bool {
        // An empty list is a degraded answer; never pin it in the cache
        if results.is_empty() {
            return false;
        }
        let outcome = match serde_json::to_string(results) {
            Ok(json) => self.cache.set(key, &json, ttl).await,
            Err(e) => Err(e.into()),
        };
        match outcome {
            Ok(()) => {
                debug!(key, ttl_secs = ttl.as_secs(), "Cached recommendations");
                true
            }
            Err(e) => {
                warn!(key, error = %e, "Recommendation cache write failed");
                false
            }
        }
    }
}
