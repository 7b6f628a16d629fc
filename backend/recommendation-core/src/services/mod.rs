pub mod cache;
pub mod diversity;
pub mod interest_store;
pub mod ranking;
pub mod recommendation;
pub mod retrieval;
pub mod scoring;

pub use cache::RecommendationCache;
pub use diversity::{DiversityLayer, DiversityStrategy};
pub use interest_store::{DecayReport, InterestStore};
pub use ranking::{Ranker, ScoringStrategy};
pub use recommendation::{
    Collaborators, EngineSettings, RecommendRequest, RecommendationEngine, RecommendationService,
    Recommendations,
};
pub use retrieval::{CandidateRetriever, EmbeddingSimilarity, RetrievalOutcome, RetrievalPath};
