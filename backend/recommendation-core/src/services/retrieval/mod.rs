mod embedding;
mod trending;

pub use embedding::EmbeddingSimilarity;
pub use trending::{dedupe_posts, sort_trending, TrendingPool};

use crate::config::RetrievalConfig;
use crate::models::{Candidate, TrendingWindow, UserId, UserInterests};
use crate::services::interest_store::InterestStore;
use crate::store::{ActivityHistory, PostStore};
use crate::utils::with_timeout;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Which path produced a candidate set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetrievalPath {
    ColdStart,
    Personalized,
}

impl RetrievalPath {
    pub fn as_str(&self) -> &'static str {
        match self {
            RetrievalPath::ColdStart => "cold_start",
            RetrievalPath::Personalized => "personalized",
        }
    }
}

#[derive(Debug, Clone)]
pub struct RetrievalOutcome {
    pub candidates: Vec<Candidate>,
    pub path: RetrievalPath,
    /// Interests loaded on the way, empty for cold users
    pub interests: UserInterests,
}

/// Candidate Retriever - 候選召回
///
/// - New or anonymous users get the trending pool for the default window.
/// - Warm users get posts matching their tags/topics, falling back to
///   trending whenever interests are empty, the query fails or finds nothing.
///
/// Never fails: the last resort is an empty candidate list.
pub struct CandidateRetriever {
    posts: Arc<dyn PostStore>,
    activity: Arc<dyn ActivityHistory>,
    interests: Arc<InterestStore>,
    trending: TrendingPool,
    embedding: Option<EmbeddingSimilarity>,
    config: RetrievalConfig,
}

impl CandidateRetriever {
    pub fn new(
        posts: Arc<dyn PostStore>,
        activity: Arc<dyn ActivityHistory>,
        interests: Arc<InterestStore>,
        trending: TrendingPool,
        config: RetrievalConfig,
    ) -> Self {
        Self {
            posts,
            activity,
            interests,
            trending,
            embedding: None,
            config,
        }
    }

    pub fn with_embedding(mut self, embedding: EmbeddingSimilarity) -> Self {
        self.embedding = Some(embedding);
        self
    }

    pub fn trending(&self) -> &TrendingPool {
        &self.trending
    }

    /// Retrieve up to `2 * limit` unique candidates
    pub async fn fetch(&self, user_id: Option<UserId>, limit: usize) -> RetrievalOutcome {
        let Some(user_id) = user_id else {
            return self.cold_outcome(limit, UserInterests::default()).await;
        };

        if self.is_new_user(user_id).await {
            debug!(user_id = %user_id, "New user, using cold start");
            return self.cold_outcome(limit, UserInterests::default()).await;
        }

        self.warm_path(user_id, limit).await
    }

    /// A failing activity lookup counts as a new user
    pub async fn is_new_user(&self, user_id: UserId) -> bool {
        match with_timeout(self.config.timeout(), self.activity.is_new_user(user_id)).await {
            Ok(is_new) => is_new,
            Err(e) => {
                warn!(user_id = %user_id, error = %e, "Activity lookup failed, treating as new user");
                true
            }
        }
    }

    /// Trending candidates for the default window
    pub async fn cold_start(&self, limit: usize) -> Vec<Candidate> {
        self.cold_start_for(self.config.default_window, limit).await
    }

    pub async fn cold_start_for(&self, window: TrendingWindow, limit: usize) -> Vec<Candidate> {
        self.trending
            .get(window, candidate_budget(limit))
            .await
            .into_iter()
            .map(Candidate::from)
            .collect()
    }

    async fn warm_path(&self, user_id: UserId, limit: usize) -> RetrievalOutcome {
        let interests = match self.interests.get_interests(user_id).await {
            Ok(interests) => interests,
            Err(e) => {
                warn!(user_id = %user_id, error = %e, "Interests unavailable, using cold start");
                return self.cold_outcome(limit, UserInterests::default()).await;
            }
        };
        if interests.is_empty() {
            debug!(user_id = %user_id, "No interests yet, using cold start");
            return self.cold_outcome(limit, interests).await;
        }

        let budget = candidate_budget(limit);
        let (tags, topics) = (interests.tags(), interests.topics());
        let fetched = with_timeout(
            self.config.timeout(),
            self.posts.query_by_interests(&tags, &topics, budget),
        )
        .await;

        let mut posts = match fetched {
            Ok(posts) if !posts.is_empty() => dedupe_posts(posts),
            Ok(_) => {
                debug!(user_id = %user_id, "No posts match interests, using cold start");
                return self.cold_outcome(limit, interests).await;
            }
            Err(e) => {
                warn!(user_id = %user_id, error = %e, "Interest query failed, using cold start");
                return self.cold_outcome(limit, interests).await;
            }
        };
        posts.truncate(budget);

        let mut candidates: Vec<Candidate> = posts.into_iter().map(Candidate::from).collect();
        if let Some(embedding) = &self.embedding {
            embedding.annotate(user_id, &interests, &mut candidates).await;
        }

        info!(
            user_id = %user_id,
            interests = interests.len(),
            candidates = candidates.len(),
            "Personalized retrieval completed"
        );
        RetrievalOutcome {
            candidates,
            path: RetrievalPath::Personalized,
            interests,
        }
    }

    async fn cold_outcome(&self, limit: usize, interests: UserInterests) -> RetrievalOutcome {
        RetrievalOutcome {
            candidates: self.cold_start(limit).await,
            path: RetrievalPath::ColdStart,
            interests,
        }
    }
}

/// Candidates retrieved per requested result
fn candidate_budget(limit: usize) -> usize {
    limit.saturating_mul(2)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CacheConfig, ScoringConfig};
    use crate::models::{InteractionEvent, InteractionType, InterestKey, Post, UserInterest};
    use crate::services::cache::RecommendationCache;
    use crate::store::{InMemoryCache, InMemoryInteractionLog, InMemoryInterestRepository, InMemoryPostStore};
    use chrono::{Duration as ChronoDuration, Utc};
    use std::collections::HashSet;
    use std::time::Duration;
    use uuid::Uuid;

    struct Fixture {
        retriever: CandidateRetriever,
        posts: Arc<InMemoryPostStore>,
        log: Arc<InMemoryInteractionLog>,
        repository: Arc<InMemoryInterestRepository>,
    }

    fn fixture() -> Fixture {
        let posts = Arc::new(InMemoryPostStore::new());
        let log = Arc::new(InMemoryInteractionLog::new());
        let repository = Arc::new(InMemoryInterestRepository::new());
        let cache = Arc::new(InMemoryCache::new());
        let interests = Arc::new(InterestStore::new(
            repository.clone(),
            posts.clone(),
            RecommendationCache::new(cache.clone(), CacheConfig::default()),
            ScoringConfig::default(),
            Duration::from_millis(200),
        ));
        let trending = TrendingPool::new(
            posts.clone(),
            cache,
            RetrievalConfig::default(),
            CacheConfig::default(),
        );
        let retriever = CandidateRetriever::new(
            posts.clone(),
            log.clone(),
            interests,
            trending,
            RetrievalConfig::default(),
        );
        Fixture {
            retriever,
            posts,
            log,
            repository,
        }
    }

    fn post(views: i64, tags: &[&str]) -> Post {
        Post {
            id: Uuid::new_v4(),
            author_id: Uuid::new_v4(),
            board_id: Uuid::new_v4(),
            created_at: Utc::now() - ChronoDuration::hours(1),
            view_count: views,
            like_count: 0,
            comment_count: 0,
            tag_ids: tags.iter().map(|t| t.to_string()).collect(),
            topic_id: None,
            content: None,
        }
    }

    fn make_warm(f: &Fixture, user: UserId, tag: &str) {
        f.log.append(InteractionEvent::new(user, Uuid::new_v4(), InteractionType::View));
        f.repository.insert(UserInterest {
            user_id: user,
            key: InterestKey::Tag(tag.into()),
            weight: 0.6,
            updated_at: Utc::now(),
        });
    }

    #[tokio::test]
    async fn test_anonymous_gets_trending() {
        let f = fixture();
        for views in [5, 50, 500] {
            f.posts.insert(post(views, &[]));
        }

        let outcome = f.retriever.fetch(None, 10).await;
        assert_eq!(outcome.path, RetrievalPath::ColdStart);
        let views: Vec<i64> = outcome.candidates.iter().map(|c| c.post.view_count).collect();
        assert_eq!(views, vec![500, 50, 5]);
    }

    #[tokio::test]
    async fn test_new_user_gets_cold_start() {
        let f = fixture();
        f.posts.insert(post(1, &["rust"]));
        let user = Uuid::new_v4();
        f.repository.insert(UserInterest {
            user_id: user,
            key: InterestKey::Tag("rust".into()),
            weight: 0.9,
            updated_at: Utc::now(),
        });

        let outcome = f.retriever.fetch(Some(user), 10).await;
        assert_eq!(outcome.path, RetrievalPath::ColdStart);
    }

    #[tokio::test]
    async fn test_warm_user_gets_matching_posts() {
        let f = fixture();
        let matching = post(1, &["rust"]);
        f.posts.insert(matching.clone());
        f.posts.insert(post(1000, &["cooking"]));
        let user = Uuid::new_v4();
        make_warm(&f, user, "rust");

        let outcome = f.retriever.fetch(Some(user), 10).await;
        assert_eq!(outcome.path, RetrievalPath::Personalized);
        assert_eq!(outcome.candidates.len(), 1);
        assert_eq!(outcome.candidates[0].post.id, matching.id);
        assert!(!outcome.interests.is_empty());
    }

    #[tokio::test]
    async fn test_warm_user_without_matches_falls_back() {
        let f = fixture();
        f.posts.insert(post(10, &["cooking"]));
        let user = Uuid::new_v4();
        make_warm(&f, user, "rust");

        let outcome = f.retriever.fetch(Some(user), 10).await;
        assert_eq!(outcome.path, RetrievalPath::ColdStart);
        assert_eq!(outcome.candidates.len(), 1);
    }

    #[tokio::test]
    async fn test_store_outage_yields_empty_without_panic() {
        let f = fixture();
        f.posts.insert(post(10, &["rust"]));
        f.posts.set_unavailable(true);
        let user = Uuid::new_v4();
        make_warm(&f, user, "rust");

        let outcome = f.retriever.fetch(Some(user), 10).await;
        assert_eq!(outcome.path, RetrievalPath::ColdStart);
        assert!(outcome.candidates.is_empty());
    }

    #[tokio::test]
    async fn test_candidates_unique_and_bounded() {
        let f = fixture();
        for i in 0..30 {
            f.posts.insert(post(i, &["rust"]));
        }
        let user = Uuid::new_v4();
        make_warm(&f, user, "rust");

        let outcome = f.retriever.fetch(Some(user), 5).await;
        assert_eq!(outcome.candidates.len(), 10);
        let unique: HashSet<Uuid> = outcome.candidates.iter().map(|c| c.post.id).collect();
        assert_eq!(unique.len(), 10);
    }
}
