// ============================================
// Scoring Kernel (打分內核)
// ============================================
//
// Pure, total functions shared by the retriever, ranker and interest store.
// No I/O. Malformed numeric input (NaN, infinities, negative counts)
// degrades to a zero contribution instead of propagating.
//
// Signals:
// - recency:    exp(-ln2 * age_days / half_life_days)
// - engagement: log10(1 + (likes + 3 * comments) / views), capped at 1
// - similarity: tag/topic overlap or embedding cosine
//
// Interest weights:
// - update:  clamp(weight * decay + delta(interaction))
// - initial: per-interaction seed for a first interaction

use crate::models::{InteractionType, InterestKey, Post, RankedResult, UserInterests};
use crate::utils::{sanitize_count, sanitize_unit};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::f64::consts::{LN_10, LN_2};
use uuid::Uuid;

/// Decay applied to an existing weight on every new interaction
pub const DEFAULT_UPDATE_DECAY: f64 = 0.9;

/// Decay applied to every stored weight by the periodic job
pub const DEFAULT_GLOBAL_DECAY: f64 = 0.98;

pub const DEFAULT_HALF_LIFE_DAYS: f64 = 3.0;

const MILLIS_PER_DAY: f64 = 86_400_000.0;

/// Weights for the personalized variant: interest match vs similarity
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CombineWeights {
    pub interest: f64,
    pub similarity: f64,
}

impl Default for CombineWeights {
    fn default() -> Self {
        Self {
            interest: 0.6,
            similarity: 0.4,
        }
    }
}

/// Weights for the base ranking
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BlendWeights {
    pub similarity: f64,
    pub recency: f64,
    pub engagement: f64,
}

impl Default for BlendWeights {
    fn default() -> Self {
        Self {
            similarity: 0.5,
            recency: 0.3,
            engagement: 0.2,
        }
    }
}

/// Recency in [0, 1] for a post created at `created_at`, observed at `now`.
/// Posts from the future or from `now` score 1.0.
pub fn recency_score(created_at: DateTime<Utc>, now: DateTime<Utc>, half_life_days: f64) -> f64 {
    let age_days = (now - created_at).num_milliseconds() as f64 / MILLIS_PER_DAY;
    recency_score_for_age(age_days, half_life_days)
}

/// Same as [`recency_score`] with the age already expressed in days
pub fn recency_score_for_age(age_days: f64, half_life_days: f64) -> f64 {
    if age_days.is_nan() {
        return 0.0;
    }
    if age_days <= 0.0 {
        return 1.0;
    }
    if !half_life_days.is_finite() || half_life_days <= 0.0 {
        return 0.0;
    }
    sanitize_unit((-LN_2 * age_days / half_life_days).exp())
}

/// Engagement in [0, 1]. Zero views always score 0.
pub fn engagement_score(likes: f64, comments: f64, views: f64) -> f64 {
    let views = sanitize_count(views);
    if views == 0.0 {
        return 0.0;
    }
    let interactions = sanitize_count(likes) + 3.0 * sanitize_count(comments);
    let raw = (1.0 + interactions / views).ln() / LN_10;
    sanitize_unit(raw.min(1.0))
}

pub fn post_engagement_score(post: &Post) -> f64 {
    engagement_score(
        post.like_count as f64,
        post.comment_count as f64,
        post.view_count as f64,
    )
}

/// Weighted sum of interest and similarity. Inputs are clamped to [0, 1]
/// first; non-finite inputs or weights count as 0.
pub fn combined_score(interest_score: f64, similarity_score: f64, weights: CombineWeights) -> f64 {
    finite_or_zero(
        sanitize_count(weights.interest) * sanitize_unit(interest_score)
            + sanitize_count(weights.similarity) * sanitize_unit(similarity_score),
    )
}

pub fn blended_score(similarity: f64, recency: f64, engagement: f64, weights: BlendWeights) -> f64 {
    finite_or_zero(
        sanitize_count(weights.similarity) * sanitize_unit(similarity)
            + sanitize_count(weights.recency) * sanitize_unit(recency)
            + sanitize_count(weights.engagement) * sanitize_unit(engagement),
    )
}

/// Weight change contributed by one interaction on an existing interest
pub fn interaction_delta(interaction: InteractionType) -> f64 {
    match interaction {
        InteractionType::Like => 0.05,
        InteractionType::Favorite => 0.1,
        InteractionType::Dislike => -0.05,
        InteractionType::View => 0.01,
        InteractionType::Follow | InteractionType::Unknown => 0.0,
    }
}

/// `clamp(current * decay + delta)`; always within [0, 1]
pub fn update_interest_weight(current_weight: f64, interaction: InteractionType, decay_factor: f64) -> f64 {
    let current = sanitize_unit(current_weight);
    let decay = sanitize_unit(decay_factor);
    sanitize_unit(current * decay + interaction_delta(interaction))
}

/// Seed weight for an interest seen for the first time
pub fn initial_interest_weight(interaction: InteractionType) -> f64 {
    match interaction {
        InteractionType::Like => 0.5,
        InteractionType::Favorite => 0.7,
        InteractionType::Follow => 0.6,
        InteractionType::View => 0.3,
        InteractionType::Dislike | InteractionType::Unknown => 0.4,
    }
}

/// Board and author a recommendation is attributed to
pub trait Attribution {
    fn board_id(&self) -> Uuid;
    fn author_id(&self) -> Uuid;
}

impl Attribution for Post {
    fn board_id(&self) -> Uuid {
        self.board_id
    }

    fn author_id(&self) -> Uuid {
        self.author_id
    }
}

impl Attribution for RankedResult {
    fn board_id(&self) -> Uuid {
        self.board_id
    }

    fn author_id(&self) -> Uuid {
        self.author_id
    }
}

/// `2 * same_board + 3 * same_author` over what is already recommended
pub fn diversity_penalty<P, R>(post: &P, already_recommended: &[R]) -> f64
where
    P: Attribution,
    R: Attribution,
{
    let same_board = already_recommended
        .iter()
        .filter(|r| r.board_id() == post.board_id())
        .count();
    let same_author = already_recommended
        .iter()
        .filter(|r| r.author_id() == post.author_id())
        .count();
    2.0 * same_board as f64 + 3.0 * same_author as f64
}

/// Multiplier for a post preceded by `prior_same_board` posts from its board
pub fn board_decay_factor(prior_same_board: usize) -> f64 {
    (1.0 - 0.1 * prior_same_board as f64).max(0.5)
}

/// Share of the post's tags/topic the user has any interest in
pub fn tag_overlap_similarity(post: &Post, interests: &UserInterests) -> f64 {
    let keys = post.interest_keys();
    if keys.is_empty() {
        return 0.0;
    }
    let matched = keys.iter().filter(|k| interests.contains(k)).count();
    sanitize_unit(matched as f64 / keys.len() as f64)
}

/// Mean interest weight over the post's tags/topic; unknown keys count 0
pub fn interest_match_score(post: &Post, interests: &UserInterests) -> f64 {
    let keys: Vec<InterestKey> = post.interest_keys();
    if keys.is_empty() {
        return 0.0;
    }
    let total: f64 = keys
        .iter()
        .map(|k| sanitize_unit(interests.weight_of(k).unwrap_or(0.0)))
        .sum();
    sanitize_unit(total / keys.len() as f64)
}

/// Cosine similarity clipped to [0, 1]. Empty, mismatched or zero vectors score 0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.is_empty() || a.len() != b.len() {
        return 0.0;
    }
    let (mut dot, mut norm_a, mut norm_b) = (0.0f64, 0.0f64, 0.0f64);
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (*x as f64, *y as f64);
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    sanitize_unit(dot / (norm_a.sqrt() * norm_b.sqrt()))
}

fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}
