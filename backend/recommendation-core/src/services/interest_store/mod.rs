// ============================================
// Interest Store (用戶興趣存儲)
// ============================================
//
// Per-user (tag | topic) weights in [0, 1], updated on every interaction:
//
//   first interaction:  weight = initial(interaction)
//   later interactions: weight = clamp(weight * update_decay + delta(interaction))
//
// A periodic job scales every weight by `global_decay` and prunes rows that
// fall below `prune_threshold`.
//
// Every successful update invalidates the user's cached recommendations and
// bumps their interest version, so an in-flight refresh computed against the
// old weights never lands in the cache.

use crate::config::ScoringConfig;
use crate::error::Result;
use crate::models::{InteractionEvent, InterestKey, PostId, UserId, UserInterest, UserInterests};
use crate::services::cache::RecommendationCache;
use crate::store::{InterestRepository, PostStore};
use crate::utils::with_timeout;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Outcome of one global decay pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecayReport {
    pub scaled: u64,
    pub pruned: u64,
}

pub struct InterestStore {
    repository: Arc<dyn InterestRepository>,
    posts: Arc<dyn PostStore>,
    cache: RecommendationCache,
    config: ScoringConfig,
    timeout: Duration,
}

impl InterestStore {
    pub fn new(
        repository: Arc<dyn InterestRepository>,
        posts: Arc<dyn PostStore>,
        cache: RecommendationCache,
        config: ScoringConfig,
        timeout: Duration,
    ) -> Self {
        Self {
            repository,
            posts,
            cache,
            config,
            timeout,
        }
    }

    /// Fold one interaction into the user's interests.
    ///
    /// Never fails: a post without metadata is skipped and storage errors are
    /// logged. Returns the interest rows written.
    pub async fn record_interaction(&self, event: &InteractionEvent) -> Vec<UserInterest> {
        match self.try_record_interaction(event).await {
            Ok(updated) => updated,
            Err(e) => {
                warn!(
                    user_id = %event.user_id,
                    post_id = %event.post_id,
                    interaction = %event.interaction_type,
                    error = %e,
                    "Failed to update interests"
                );
                Vec::new()
            }
        }
    }

    /// Like [`record_interaction`](Self::record_interaction) but surfaces storage errors.
    /// A post without metadata is still skipped with `Ok(vec![])`.
    pub async fn try_record_interaction(
        &self,
        event: &InteractionEvent,
    ) -> Result<Vec<UserInterest>> {
        let keys = match self.load_post_keys(event.post_id).await {
            Some(keys) if !keys.is_empty() => keys,
            _ => {
                debug!(post_id = %event.post_id, "No tags or topic for post, skipping interest update");
                return Ok(Vec::new());
            }
        };

        let updated = with_timeout(
            self.timeout,
            self.repository.apply_interaction(
                event.user_id,
                &keys,
                event.interaction_type,
                self.config.update_decay,
                Utc::now(),
            ),
        )
        .await?;

        self.cache.invalidate(event.user_id).await;
        self.cache.bump_interest_version(event.user_id).await;

        debug!(
            user_id = %event.user_id,
            interaction = %event.interaction_type,
            updated = updated.len(),
            "Interests updated"
        );
        Ok(updated)
    }

    async fn load_post_keys(&self, post_id: PostId) -> Option<Vec<InterestKey>> {
        match with_timeout(self.timeout, self.posts.get_by_ids(&[post_id])).await {
            Ok(posts) => posts
                .into_iter()
                .find(|p| p.id == post_id)
                .map(|p| p.interest_keys()),
            Err(e) => {
                debug!(post_id = %post_id, error = %e, "Post metadata unavailable");
                None
            }
        }
    }

    /// The user's strongest interests, at most `max_interests`
    pub async fn get_interests(&self, user_id: UserId) -> Result<UserInterests> {
        let rows = with_timeout(self.timeout, self.repository.load_all(user_id)).await?;
        let mut interests =
            UserInterests::new(rows.into_iter().filter(|r| r.weight > 0.0).collect());
        interests.truncate(self.config.max_interests);
        Ok(interests)
    }

    /// Scale every stored weight by `factor`, then prune negligible rows
    pub async fn decay_all(&self, factor: f64) -> Result<DecayReport> {
        let scaled = self.repository.scale_all(factor).await?;
        let pruned = self
            .repository
            .prune_below(self.config.prune_threshold)
            .await?;
        info!(factor, scaled, pruned, "Applied global interest decay");
        Ok(DecayReport { scaled, pruned })
    }

    pub fn global_decay(&self) -> f64 {
        self.config.global_decay
    }
}
