use crate::models::{InteractionEvent, InteractionType, PostId, RankedResult};
use crate::utils::sanitize_unit;
use std::collections::HashSet;

const LIKED_BOOST: f64 = 1.05;
const DISLIKED_PENALTY: f64 = 0.8;
const FAVORITED_BOOST: f64 = 1.10;

/// Multipliers derived from what the user already did with the ranked posts
#[derive(Debug, Clone, Default)]
pub struct HistoryBoosts {
    liked: HashSet<PostId>,
    disliked: HashSet<PostId>,
    favorited: HashSet<PostId>,
}

impl HistoryBoosts {
    /// Interaction types that move a post's score
    pub const TRACKED: &'static [InteractionType] = &[
        InteractionType::Like,
        InteractionType::Dislike,
        InteractionType::Favorite,
    ];

    pub fn from_events(events: &[InteractionEvent]) -> Self {
        let mut boosts = Self::default();
        for event in events {
            match event.interaction_type {
                InteractionType::Like => {
                    boosts.liked.insert(event.post_id);
                }
                InteractionType::Dislike => {
                    boosts.disliked.insert(event.post_id);
                }
                InteractionType::Favorite => {
                    boosts.favorited.insert(event.post_id);
                }
                _ => {}
            }
        }
        boosts
    }

    pub fn is_empty(&self) -> bool {
        self.liked.is_empty() && self.disliked.is_empty() && self.favorited.is_empty()
    }

    /// Product of every multiplier that applies to the post
    pub fn multiplier(&self, post_id: &PostId) -> f64 {
        let mut factor = 1.0;
        if self.liked.contains(post_id) {
            factor *= LIKED_BOOST;
        }
        if self.disliked.contains(post_id) {
            factor *= DISLIKED_PENALTY;
        }
        if self.favorited.contains(post_id) {
            factor *= FAVORITED_BOOST;
        }
        factor
    }

    /// Rescale both scores and re-sort. Boosted scores stay within [0, 1].
    pub fn apply(&self, mut ranked: Vec<RankedResult>) -> Vec<RankedResult> {
        if self.is_empty() {
            return ranked;
        }
        for result in ranked.iter_mut() {
            let factor = self.multiplier(&result.post_id);
            if factor != 1.0 {
                result.base_score = sanitize_unit(result.base_score * factor);
                result.ranking_score = sanitize_unit(result.ranking_score * factor);
            }
        }
        ranked.sort_by(|a, b| b.ranking_score.total_cmp(&a.ranking_score));
        ranked
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FactorBreakdown;
    use chrono::Utc;
    use uuid::Uuid;

    fn result(score: f64) -> RankedResult {
        let now = Utc::now();
        RankedResult {
            post_id: Uuid::new_v4(),
            board_id: Uuid::new_v4(),
            author_id: Uuid::new_v4(),
            ranking_score: score,
            base_score: score,
            factors: FactorBreakdown::default(),
            produced_at: now,
            expires_at: now,
        }
    }

    #[test]
    fn test_multipliers() {
        let user = Uuid::new_v4();
        let (a, b, c) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let boosts = HistoryBoosts::from_events(&[
            InteractionEvent::new(user, a, InteractionType::Like),
            InteractionEvent::new(user, b, InteractionType::Dislike),
            InteractionEvent::new(user, c, InteractionType::Favorite),
            InteractionEvent::new(user, c, InteractionType::View),
        ]);

        assert_eq!(boosts.multiplier(&a), LIKED_BOOST);
        assert_eq!(boosts.multiplier(&b), DISLIKED_PENALTY);
        assert_eq!(boosts.multiplier(&c), FAVORITED_BOOST);
        assert_eq!(boosts.multiplier(&Uuid::new_v4()), 1.0);
    }

    #[test]
    fn test_apply_reorders() {
        let user = Uuid::new_v4();
        let ranked = vec![result(0.50), result(0.48)];
        let boosts = HistoryBoosts::from_events(&[
            InteractionEvent::new(user, ranked[0].post_id, InteractionType::Dislike),
            InteractionEvent::new(user, ranked[1].post_id, InteractionType::Favorite),
        ]);
        let second = ranked[1].post_id;

        let reordered = boosts.apply(ranked);
        assert_eq!(reordered[0].post_id, second);
        assert!(reordered[0].ranking_score <= 1.0);
    }

    #[test]
    fn test_apply_clamps_to_unit() {
        let user = Uuid::new_v4();
        let ranked = vec![result(0.99)];
        let boosts = HistoryBoosts::from_events(&[
            InteractionEvent::new(user, ranked[0].post_id, InteractionType::Like),
            InteractionEvent::new(user, ranked[0].post_id, InteractionType::Favorite),
        ]);

        let boosted = boosts.apply(ranked);
        assert_eq!(boosted[0].ranking_score, 1.0);
        assert_eq!(boosted[0].base_score, 1.0);
    }
}
