use crate::models::RankedResult;
use crate::services::scoring::{board_decay_factor, diversity_penalty};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// How repeated boards/authors are pushed down the list
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DiversityStrategy {
    /// The n-th post of a board (0-based) keeps `max(0.5, 1 - 0.1n)` of its base score
    BoardDecay,
    /// Greedy selection maximizing `base_score - scale * diversity_penalty`
    Penalty { scale: f64 },
}

impl Default for DiversityStrategy {
    fn default() -> Self {
        DiversityStrategy::BoardDecay
    }
}

/// Diversity Layer - 多樣性重排
pub struct DiversityLayer {
    strategy: DiversityStrategy,
}

impl Default for DiversityLayer {
    fn default() -> Self {
        Self::new(DiversityStrategy::default())
    }
}

impl DiversityLayer {
    pub fn new(strategy: DiversityStrategy) -> Self {
        Self { strategy }
    }

    pub fn strategy(&self) -> DiversityStrategy {
        self.strategy
    }

    /// Rerank and keep at most `top_k` results
    pub fn rerank(&self, ranked: Vec<RankedResult>, top_k: usize) -> Vec<RankedResult> {
        let mut reranked = match self.strategy {
            DiversityStrategy::BoardDecay => apply_board_decay(ranked),
            DiversityStrategy::Penalty { scale } => rerank_with_penalty(ranked, scale, top_k),
        };
        reranked.truncate(top_k);
        reranked
    }
}

/// Decay repeated boards, then stable re-sort.
///
/// `ranking_score` is always recomputed from `base_score`, so feeding the
/// output back in yields the same order: within a board the relative order
/// never changes, hence every post sees the same number of predecessors
/// from its board on the second pass.
pub fn apply_board_decay(mut ranked: Vec<RankedResult>) -> Vec<RankedResult> {
    let mut seen_per_board: HashMap<Uuid, usize> = HashMap::new();

    for result in ranked.iter_mut() {
        let prior = seen_per_board.entry(result.board_id).or_insert(0);
        result.ranking_score = result.base_score * board_decay_factor(*prior);
        *prior += 1;
    }

    ranked.sort_by(|a, b| b.ranking_score.total_cmp(&a.ranking_score));
    ranked
}

/// Greedy rerank: at each step pick the post with the best
/// `base_score - scale * penalty(already selected)`. Ties go to the earlier post.
pub fn rerank_with_penalty(ranked: Vec<RankedResult>, scale: f64, top_k: usize) -> Vec<RankedResult> {
    if ranked.is_empty() {
        return Vec::new();
    }
    let scale = if scale.is_finite() { scale.max(0.0) } else { 0.0 };

    let mut selected: Vec<RankedResult> = Vec::with_capacity(top_k.min(ranked.len()));
    let mut remaining = ranked;

    while selected.len() < top_k && !remaining.is_empty() {
        let mut best_idx = 0;
        let mut best_score = f64::NEG_INFINITY;

        for (i, candidate) in remaining.iter().enumerate() {
            let adjusted = candidate.base_score - scale * diversity_penalty(candidate, &selected);
            if adjusted > best_score {
                best_score = adjusted;
                best_idx = i;
            }
        }

        let mut chosen = remaining.remove(best_idx);
        chosen.ranking_score = best_score.max(0.0);
        selected.push(chosen);
    }

    selected
}
