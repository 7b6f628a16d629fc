/// Ranking Module
///
/// Scores candidates and orders them best first.
///
/// # Strategies
/// - **Blended**: similarity, recency and engagement, used for cold users
/// - **Personalized**: interest match plus similarity, used for warm users
///
/// # Workflow
/// 1. Compute the factor breakdown for every candidate
/// 2. Score with the selected strategy
/// 3. Stable sort by score, descending
/// 4. Optionally boost/demote by the user's own history (`personalize`)
pub mod personalize;

pub use personalize::HistoryBoosts;

use crate::models::{Candidate, FactorBreakdown, PostId, RankedResult, UserId, UserInterests};
use crate::services::scoring::{
    blended_score, combined_score, interest_match_score, post_engagement_score, recency_score,
    tag_overlap_similarity, BlendWeights, CombineWeights, DEFAULT_HALF_LIFE_DAYS,
};
use crate::store::{InteractionLog, PostStore};
use crate::utils::{sanitize_unit, with_timeout};
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScoringStrategy {
    Blended(BlendWeights),
    Personalized(CombineWeights),
}

impl Default for ScoringStrategy {
    fn default() -> Self {
        ScoringStrategy::Blended(BlendWeights::default())
    }
}

impl ScoringStrategy {
    pub fn personalized() -> Self {
        ScoringStrategy::Personalized(CombineWeights::default())
    }

    pub fn name(&self) -> &'static str {
        match self {
            ScoringStrategy::Blended(_) => "blended",
            ScoringStrategy::Personalized(_) => "personalized",
        }
    }
}

/// Ranking Layer
pub struct Ranker {
    posts: Arc<dyn PostStore>,
    interactions: Arc<dyn InteractionLog>,
    half_life_days: f64,
    history_limit: usize,
    timeout: Duration,
}

impl Ranker {
    pub fn new(posts: Arc<dyn PostStore>, interactions: Arc<dyn InteractionLog>) -> Self {
        Self {
            posts,
            interactions,
            half_life_days: DEFAULT_HALF_LIFE_DAYS,
            history_limit: 200,
            timeout: Duration::from_millis(500),
        }
    }

    pub fn with_half_life(mut self, half_life_days: f64) -> Self {
        self.half_life_days = half_life_days;
        self
    }

    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Score and sort candidates, best first.
    /// Pure in its inputs: the same candidates, interests, strategy and `now`
    /// always produce the same list.
    pub fn rank(
        &self,
        candidates: Vec<Candidate>,
        interests: &UserInterests,
        strategy: ScoringStrategy,
        now: DateTime<Utc>,
    ) -> Vec<RankedResult> {
        let mut ranked = self.score_in_order(candidates, interests, strategy, now);

        // Scores are sanitized, so total_cmp never sees NaN; sort is stable
        ranked.sort_by(|a, b| b.ranking_score.total_cmp(&a.ranking_score));

        debug!(
            strategy = strategy.name(),
            count = ranked.len(),
            "Ranked candidates"
        );
        ranked
    }

    /// Score candidates but keep the order they arrived in
    pub fn score_in_order(
        &self,
        candidates: Vec<Candidate>,
        interests: &UserInterests,
        strategy: ScoringStrategy,
        now: DateTime<Utc>,
    ) -> Vec<RankedResult> {
        candidates
            .into_iter()
            .map(|candidate| self.score_candidate(candidate, interests, strategy, now))
            .collect()
    }

    /// Rank posts known only by id. Ids the post store cannot resolve are dropped.
    pub async fn rank_post_ids(
        &self,
        post_ids: &[PostId],
        interests: &UserInterests,
        strategy: ScoringStrategy,
        now: DateTime<Utc>,
    ) -> Vec<RankedResult> {
        let mut seen = HashSet::new();
        let unique: Vec<PostId> = post_ids
            .iter()
            .copied()
            .filter(|id| seen.insert(*id))
            .collect();
        if unique.is_empty() {
            return Vec::new();
        }

        let posts = match with_timeout(self.timeout, self.posts.get_by_ids(&unique)).await {
            Ok(posts) => posts,
            Err(e) => {
                warn!(count = unique.len(), error = %e, "Failed to load posts for ranking");
                return Vec::new();
            }
        };

        let mut by_id: HashMap<PostId, _> = posts.into_iter().map(|p| (p.id, p)).collect();
        let candidates: Vec<Candidate> = unique
            .iter()
            .filter_map(|id| by_id.remove(id))
            .map(Candidate::from)
            .collect();

        let missing = unique.len() - candidates.len();
        if missing > 0 {
            warn!(missing, "Excluding posts with missing metadata from ranking");
        }

        self.rank(candidates, interests, strategy, now)
    }

    /// Boost or demote by the user's own likes, dislikes and bookmarks, then re-sort.
    /// A failing interaction log leaves the list untouched.
    pub async fn personalize(
        &self,
        ranked: Vec<RankedResult>,
        user_id: UserId,
    ) -> Vec<RankedResult> {
        if ranked.is_empty() {
            return ranked;
        }

        let history = with_timeout(
            self.timeout,
            self.interactions
                .recent(user_id, HistoryBoosts::TRACKED, self.history_limit),
        )
        .await;

        match history {
            Ok(events) => HistoryBoosts::from_events(&events).apply(ranked),
            Err(e) => {
                warn!(user_id = %user_id, error = %e, "Interaction history unavailable, skipping personalization");
                ranked
            }
        }
    }

    fn score_candidate(
        &self,
        candidate: Candidate,
        interests: &UserInterests,
        strategy: ScoringStrategy,
        now: DateTime<Utc>,
    ) -> RankedResult {
        let post = candidate.post;
        let similarity = candidate
            .similarity
            .map(sanitize_unit)
            .unwrap_or_else(|| tag_overlap_similarity(&post, interests));
        let factors = FactorBreakdown {
            similarity,
            recency: recency_score(post.created_at, now, self.half_life_days),
            engagement: post_engagement_score(&post),
        };

        let score = match strategy {
            ScoringStrategy::Blended(weights) => blended_score(
                factors.similarity,
                factors.recency,
                factors.engagement,
                weights,
            ),
            ScoringStrategy::Personalized(weights) => combined_score(
                interest_match_score(&post, interests),
                factors.similarity,
                weights,
            ),
        };
        let score = sanitize_unit(score);

        RankedResult {
            post_id: post.id,
            board_id: post.board_id,
            author_id: post.author_id,
            ranking_score: score,
            base_score: score,
            factors,
            produced_at: now,
            expires_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{InteractionEvent, InteractionType, InterestKey, Post, UserInterest};
    use crate::store::{InMemoryInteractionLog, InMemoryPostStore};
    use chrono::Duration as ChronoDuration;
    use uuid::Uuid;

    fn post(age_hours: i64, likes: i64, views: i64, tags: &[&str]) -> Post {
        Post {
            id: Uuid::new_v4(),
            author_id: Uuid::new_v4(),
            board_id: Uuid::new_v4(),
            created_at: Utc::now() - ChronoDuration::hours(age_hours),
            view_count: views,
            like_count: likes,
            comment_count: 0,
            tag_ids: tags.iter().map(|t| t.to_string()).collect(),
            topic_id: None,
            content: None,
        }
    }

    fn ranker(posts: Arc<InMemoryPostStore>, log: Arc<InMemoryInteractionLog>) -> Ranker {
        Ranker::new(posts, log)
    }

    fn interests(user: UserId, pairs: &[(&str, f64)]) -> UserInterests {
        UserInterests::new(
            pairs
                .iter()
                .map(|(tag, weight)| UserInterest {
                    user_id: user,
                    key: InterestKey::Tag(tag.to_string()),
                    weight: *weight,
                    updated_at: Utc::now(),
                })
                .collect(),
        )
    }

    #[test]
    fn test_rank_sorts_descending() {
        let r = ranker(Arc::default(), Arc::default());
        let candidates = vec![
            Candidate::from(post(96, 0, 100, &[])),
            Candidate::from(post(1, 50, 100, &[])),
            Candidate::from(post(24, 5, 100, &[])),
        ];

        let ranked = r.rank(
            candidates,
            &UserInterests::default(),
            ScoringStrategy::default(),
            Utc::now(),
        );

        assert_eq!(ranked.len(), 3);
        for pair in ranked.windows(2) {
            assert!(pair[0].ranking_score >= pair[1].ranking_score);
        }
        assert!(ranked.iter().all(|r| r.ranking_score == r.base_score));
    }

    #[test]
    fn test_rank_is_deterministic() {
        let r = ranker(Arc::default(), Arc::default());
        let now = Utc::now();
        let candidates: Vec<Candidate> = (0..10)
            .map(|i| Candidate::from(post(i * 7, i, 100, &["rust"])))
            .collect();
        let user = Uuid::new_v4();
        let interests = interests(user, &[("rust", 0.7)]);

        let first = r.rank(candidates.clone(), &interests, ScoringStrategy::personalized(), now);
        let second = r.rank(candidates, &interests, ScoringStrategy::personalized(), now);
        assert_eq!(first, second);
    }

    #[test]
    fn test_personalized_prefers_matching_interests() {
        let r = ranker(Arc::default(), Arc::default());
        let user = Uuid::new_v4();
        let interests = interests(user, &[("rust", 0.9)]);
        let matching = post(48, 0, 10, &["rust"]);
        let other = post(1, 10, 10, &["cooking"]);
        let matching_id = matching.id;

        let ranked = r.rank(
            vec![Candidate::from(other), Candidate::from(matching)],
            &interests,
            ScoringStrategy::personalized(),
            Utc::now(),
        );

        assert_eq!(ranked[0].post_id, matching_id);
        // 0.6 * 0.9 + 0.4 * 1.0
        assert!((ranked[0].ranking_score - 0.94).abs() < 1e-9);
    }

    #[test]
    fn test_candidate_similarity_overrides_tag_overlap() {
        let r = ranker(Arc::default(), Arc::default());
        let mut candidate = Candidate::from(post(0, 0, 0, &[]));
        candidate.similarity = Some(f64::NAN);

        let ranked = r.rank(
            vec![candidate],
            &UserInterests::default(),
            ScoringStrategy::default(),
            Utc::now(),
        );
        assert_eq!(ranked[0].factors.similarity, 0.0);
        assert!(ranked[0].ranking_score.is_finite());
    }

    #[tokio::test]
    async fn test_rank_post_ids_drops_missing_metadata() {
        let known = post(1, 1, 10, &[]);
        let known_id = known.id;
        let posts = Arc::new(InMemoryPostStore::with_posts(vec![known]));
        let r = ranker(posts, Arc::default());

        let ranked = r
            .rank_post_ids(
                &[Uuid::new_v4(), known_id, known_id],
                &UserInterests::default(),
                ScoringStrategy::default(),
                Utc::now(),
            )
            .await;

        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].post_id, known_id);
    }

    #[tokio::test]
    async fn test_rank_post_ids_store_outage_yields_empty() {
        let posts = Arc::new(InMemoryPostStore::with_posts(vec![post(1, 1, 10, &[])]));
        posts.set_unavailable(true);
        let r = ranker(posts, Arc::default());

        let ranked = r
            .rank_post_ids(
                &[Uuid::new_v4()],
                &UserInterests::default(),
                ScoringStrategy::default(),
                Utc::now(),
            )
            .await;
        assert!(ranked.is_empty());
    }

    #[tokio::test]
    async fn test_personalize_demotes_disliked() {
        let user = Uuid::new_v4();
        let log = Arc::new(InMemoryInteractionLog::new());
        let r = ranker(Arc::default(), log.clone());

        let now = Utc::now();
        let candidates = vec![
            Candidate::from(post(1, 10, 100, &[])),
            Candidate::from(post(1, 9, 100, &[])),
        ];
        let ranked = r.rank(candidates, &UserInterests::default(), ScoringStrategy::default(), now);
        let top = ranked[0].post_id;
        log.append(InteractionEvent::new(user, top, InteractionType::Dislike));

        let personalized = r.personalize(ranked.clone(), user).await;

        assert_eq!(personalized.len(), 2);
        let demoted = personalized.iter().find(|r| r.post_id == top).unwrap();
        assert!((demoted.base_score - ranked[0].base_score * 0.8).abs() < 1e-12);
    }
}
