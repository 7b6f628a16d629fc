/// Recommendation Pipeline
///
/// Wires retrieval, ranking, personalization and diversity into one call.
///
/// # Workflow
/// 1. Retrieve candidates (cold start or interest match)
/// 2. Cold start: score in trending order (views, likes, recency) and truncate
/// 3. Personalized: rank with the requested or default strategy, boost/demote
///    by the user's own history, diversity rerank and truncate to `limit`
/// 4. Stamp `produced_at` / `expires_at` with the TTL of the path taken
pub mod service;

pub use service::{RecommendRequest, RecommendationService, MAX_LIMIT};

use crate::config::{CacheConfig, Config, DiversityKind, RetrievalConfig, ScoringConfig, StrategyKind};
use crate::error::Result;
use crate::models::{InteractionEvent, RankedResult, TrendingWindow, UserId};
use crate::services::cache::RecommendationCache;
use crate::services::diversity::{DiversityLayer, DiversityStrategy};
use crate::services::interest_store::InterestStore;
use crate::services::ranking::{Ranker, ScoringStrategy};
use crate::services::retrieval::{
    CandidateRetriever, EmbeddingSimilarity, RetrievalPath, TrendingPool,
};
use crate::store::{
    ActivityHistory, Cache, EmbeddingService, InteractionLog, InterestRepository, PostStore,
};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Size of the shared cold-start segment, independent of the requested limit
pub const COLD_SEGMENT_SIZE: usize = 100;

/// External collaborators the pipeline runs against
#[derive(Clone)]
pub struct Collaborators {
    pub posts: Arc<dyn PostStore>,
    pub interactions: Arc<dyn InteractionLog>,
    pub activity: Arc<dyn ActivityHistory>,
    pub interests: Arc<dyn InterestRepository>,
    pub cache: Arc<dyn Cache>,
    pub embedding: Option<Arc<dyn EmbeddingService>>,
}

/// Tunables the pipeline needs; the connection settings stay in [`Config`]
#[derive(Debug, Clone, Default)]
pub struct EngineSettings {
    pub scoring: ScoringConfig,
    pub retrieval: RetrievalConfig,
    pub cache: CacheConfig,
}

impl From<&Config> for EngineSettings {
    fn from(config: &Config) -> Self {
        Self {
            scoring: config.scoring.clone(),
            retrieval: config.retrieval.clone(),
            cache: config.cache.clone(),
        }
    }
}

/// Results of one pipeline run
#[derive(Debug, Clone)]
pub struct Recommendations {
    pub results: Vec<RankedResult>,
    pub path: RetrievalPath,
}

pub struct RecommendationEngine {
    retriever: CandidateRetriever,
    ranker: Ranker,
    interests: Arc<InterestStore>,
    cache: RecommendationCache,
    diversity: DiversityLayer,
    settings: EngineSettings,
}

impl RecommendationEngine {
    pub fn new(collaborators: Collaborators, settings: EngineSettings) -> Self {
        let timeout = settings.retrieval.timeout();
        let cache = RecommendationCache::new(collaborators.cache.clone(), settings.cache.clone());

        let interests = Arc::new(InterestStore::new(
            collaborators.interests.clone(),
            collaborators.posts.clone(),
            cache.clone(),
            settings.scoring.clone(),
            timeout,
        ));

        let trending = TrendingPool::new(
            collaborators.posts.clone(),
            collaborators.cache.clone(),
            settings.retrieval.clone(),
            settings.cache.clone(),
        );
        let mut retriever = CandidateRetriever::new(
            collaborators.posts.clone(),
            collaborators.activity.clone(),
            interests.clone(),
            trending,
            settings.retrieval.clone(),
        );
        match collaborators.embedding {
            Some(service) if settings.retrieval.embedding_enabled => {
                retriever = retriever.with_embedding(EmbeddingSimilarity::new(
                    service,
                    collaborators.cache.clone(),
                    settings.cache.embedding_ttl(),
                    timeout,
                ));
            }
            Some(_) => debug!("Embedding service provided but disabled"),
            None => {}
        }

        let ranker = Ranker::new(collaborators.posts, collaborators.interactions)
            .with_half_life(settings.scoring.half_life_days)
            .with_history_limit(settings.retrieval.interaction_history_limit)
            .with_timeout(timeout);

        let diversity = DiversityLayer::new(match settings.scoring.diversity {
            DiversityKind::BoardDecay => DiversityStrategy::BoardDecay,
            DiversityKind::Penalty => DiversityStrategy::Penalty {
                scale: settings.scoring.penalty_scale,
            },
        });

        Self {
            retriever,
            ranker,
            interests,
            cache,
            diversity,
            settings,
        }
    }

    pub fn cache(&self) -> &RecommendationCache {
        &self.cache
    }

    pub fn interests(&self) -> &InterestStore {
        &self.interests
    }

    pub fn retriever(&self) -> &CandidateRetriever {
        &self.retriever
    }

    pub fn ranker(&self) -> &Ranker {
        &self.ranker
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Run the full pipeline. Never fails; degraded collaborators shrink the
    /// result down to an empty list at worst.
    pub async fn compute(
        &self,
        user_id: Option<UserId>,
        limit: usize,
        strategy: Option<ScoringStrategy>,
    ) -> Recommendations {
        if limit == 0 {
            return Recommendations {
                results: Vec::new(),
                path: RetrievalPath::ColdStart,
            };
        }
        let outcome = self.retriever.fetch(user_id, limit).await;
        let path = outcome.path;

        let strategy = strategy.unwrap_or_else(|| self.default_strategy(path));
        let now = Utc::now();

        let mut results = match path {
            // Cold start keeps the trending order; scores are informational
            RetrievalPath::ColdStart => {
                let mut scored = self.ranker.score_in_order(
                    outcome.candidates,
                    &outcome.interests,
                    strategy,
                    now,
                );
                scored.truncate(limit);
                scored
            }
            RetrievalPath::Personalized => {
                let mut ranked =
                    self.ranker
                        .rank(outcome.candidates, &outcome.interests, strategy, now);
                if let Some(user_id) = user_id {
                    ranked = self.ranker.personalize(ranked, user_id).await;
                }
                self.diversity.rerank(ranked, limit)
            }
        };
        stamp_expiry(&mut results, now, self.ttl_for(path));

        debug!(
            user_id = ?user_id,
            path = path.as_str(),
            strategy = strategy.name(),
            count = results.len(),
            "Computed recommendations"
        );
        Recommendations { results, path }
    }

    /// Strategy used when the caller does not pick one
    pub fn default_strategy(&self, path: RetrievalPath) -> ScoringStrategy {
        match (path, self.settings.scoring.warm_strategy) {
            (RetrievalPath::Personalized, StrategyKind::Personalized) => {
                ScoringStrategy::personalized()
            }
            _ => ScoringStrategy::default(),
        }
    }

    pub fn ttl_for(&self, path: RetrievalPath) -> Duration {
        match path {
            RetrievalPath::Personalized => self.settings.cache.personalized_ttl(),
            RetrievalPath::ColdStart => self
                .settings
                .cache
                .trending_ttl(self.settings.retrieval.default_window),
        }
    }

    /// Shared cold-start list, served from its segment cache and rebuilt on miss
    pub async fn cold_recommendations(&self, limit: usize) -> Vec<RankedResult> {
        let window = self.settings.retrieval.default_window;
        if let Some(mut cached) = self.cache.get_cold(window).await {
            cached.truncate(limit);
            return cached;
        }

        let computed = self
            .compute(None, limit.max(COLD_SEGMENT_SIZE), None)
            .await;
        self.cache.put_cold(window, &computed.results).await;

        let mut results = computed.results;
        results.truncate(limit);
        results
    }

    /// Recompute and cache a user's list unless their interests moved meanwhile.
    /// Returns whether the cache was written.
    pub async fn refresh(&self, user_id: UserId, limit: usize) -> bool {
        let version = self.cache.interest_version(user_id).await;
        let computed = self.compute(Some(user_id), limit, None).await;
        let stored = self
            .cache
            .put_if_current(user_id, &computed.results, self.ttl_for(computed.path), version)
            .await;
        debug!(user_id = %user_id, stored, "Recommendation refresh finished");
        stored
    }

    pub async fn record_interaction(&self, event: &InteractionEvent) -> Result<usize> {
        let updated = self.interests.try_record_interaction(event).await?;
        Ok(updated.len())
    }

    /// Rebuild one trending window and drop the cold-start segment built on it
    pub async fn refresh_trending(&self, window: TrendingWindow) -> Result<usize> {
        let posts = self.retriever.trending().refresh(window).await?;
        self.cache.invalidate_cold(window).await;
        info!(window = %window, count = posts.len(), "Cold-start segment invalidated");
        Ok(posts.len())
    }
}

fn stamp_expiry(results: &mut [RankedResult], now: DateTime<Utc>, ttl: Duration) {
    let ttl = chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::days(1));
    let expires_at = now.checked_add_signed(ttl).unwrap_or(now);
    for result in results.iter_mut() {
        result.produced_at = now;
        result.expires_at = expires_at;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{InteractionType, Post};
    use crate::store::{
        InMemoryCache, InMemoryInteractionLog, InMemoryInterestRepository, InMemoryPostStore,
    };
    use chrono::Duration as ChronoDuration;
    use std::collections::HashSet;
    use uuid::Uuid;

    struct Fixture {
        engine: RecommendationEngine,
        posts: Arc<InMemoryPostStore>,
        log: Arc<InMemoryInteractionLog>,
    }

    fn fixture() -> Fixture {
        let posts = Arc::new(InMemoryPostStore::new());
        let log = Arc::new(InMemoryInteractionLog::new());
        let engine = RecommendationEngine::new(
            Collaborators {
                posts: posts.clone(),
                interactions: log.clone(),
                activity: log.clone(),
                interests: Arc::new(InMemoryInterestRepository::new()),
                cache: Arc::new(InMemoryCache::new()),
                embedding: None,
            },
            EngineSettings::default(),
        );
        Fixture { engine, posts, log }
    }

    fn post(board_id: Uuid, views: i64, tags: &[&str]) -> Post {
        Post {
            id: Uuid::new_v4(),
            author_id: Uuid::new_v4(),
            board_id,
            created_at: Utc::now() - ChronoDuration::hours(2),
            view_count: views,
            like_count: views / 10,
            comment_count: 0,
            tag_ids: tags.iter().map(|t| t.to_string()).collect(),
            topic_id: None,
            content: None,
        }
    }

    #[tokio::test]
    async fn test_compute_cold_user() {
        let f = fixture();
        let mut views_of = std::collections::HashMap::new();
        for i in 0..30 {
            let p = post(Uuid::new_v4(), i * 10, &[]);
            views_of.insert(p.id, p.view_count);
            f.posts.insert(p);
        }

        let recs = f.engine.compute(None, 10, None).await;

        assert_eq!(recs.path, RetrievalPath::ColdStart);
        assert_eq!(recs.results.len(), 10);
        let unique: HashSet<Uuid> = recs.results.iter().map(|r| r.post_id).collect();
        assert_eq!(unique.len(), 10);
        let views: Vec<i64> = recs
            .results
            .iter()
            .map(|r| views_of[&r.post_id])
            .collect();
        assert_eq!(views, (20..30).rev().map(|i| i * 10).collect::<Vec<_>>());
        assert!(recs.results.iter().all(|r| r.expires_at > r.produced_at));
    }

    #[tokio::test]
    async fn test_compute_limit_zero() {
        let f = fixture();
        f.posts.insert(post(Uuid::new_v4(), 10, &[]));
        assert!(f.engine.compute(None, 0, None).await.results.is_empty());
    }

    #[tokio::test]
    async fn test_interaction_then_personalized_path() {
        let f = fixture();
        let board = Uuid::new_v4();
        let liked = post(board, 10, &["rust"]);
        f.posts.insert(liked.clone());
        for _ in 0..5 {
            f.posts.insert(post(Uuid::new_v4(), 10, &["rust"]));
        }
        let user = Uuid::new_v4();
        let like = InteractionEvent::new(user, liked.id, InteractionType::Like);
        f.log.append(like.clone());

        assert_eq!(f.engine.record_interaction(&like).await.unwrap(), 1);

        let recs = f.engine.compute(Some(user), 5, None).await;
        assert_eq!(recs.path, RetrievalPath::Personalized);
        assert_eq!(recs.results.len(), 5);
    }

    #[tokio::test]
    async fn test_cold_recommendations_cached_segment() {
        let f = fixture();
        for i in 0..10 {
            f.posts.insert(post(Uuid::new_v4(), i, &[]));
        }

        let first = f.engine.cold_recommendations(3).await;
        f.posts.set_unavailable(true);
        let second = f.engine.cold_recommendations(5).await;

        assert_eq!(first.len(), 3);
        assert_eq!(second.len(), 5);
        let first_ids: Vec<Uuid> = first.iter().map(|r| r.post_id).collect();
        let second_ids: Vec<Uuid> = second.iter().take(3).map(|r| r.post_id).collect();
        assert_eq!(first_ids, second_ids);
    }

    #[tokio::test]
    async fn test_refresh_writes_cache() {
        let f = fixture();
        let liked = post(Uuid::new_v4(), 10, &["rust"]);
        f.posts.insert(liked.clone());
        let user = Uuid::new_v4();
        f.log
            .append(InteractionEvent::new(user, liked.id, InteractionType::Like));

        assert!(f.engine.refresh(user, 10).await);
        assert!(f.engine.cache().get(user).await.is_some());
    }
}
