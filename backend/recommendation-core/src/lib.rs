pub mod config;
pub mod error;
pub mod jobs;
pub mod models;
pub mod services;
pub mod store;
pub mod utils;

pub use config::Config;
pub use error::{RecommendationError, Result};
pub use services::{
    CandidateRetriever, Collaborators, DiversityLayer, EngineSettings, InterestStore, Ranker,
    RecommendRequest, RecommendationCache, RecommendationEngine, RecommendationService,
};
